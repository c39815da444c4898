//! Per-session normalization: venue translation followed by book sync.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::book::{BookSynchronizer, DeltaAction, SnapshotAction, TopOfBookView};
use crate::domain::{EventPayload, InstrumentId, Venue, VenueEvent};
use crate::port::{Normalizer, RawFrame};

/// Events ready for sequencing plus books that need a fresh snapshot.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub events: Vec<VenueEvent>,
    pub resync: Vec<InstrumentId>,
}

/// Owned by one supervisor; the only writer for its session's books.
pub struct NormalizationPipeline {
    normalizer: Arc<dyn Normalizer>,
    books: BookSynchronizer,
    dropped: Arc<AtomicU64>,
}

impl NormalizationPipeline {
    pub fn new(normalizer: Arc<dyn Normalizer>) -> Self {
        Self {
            normalizer,
            books: BookSynchronizer::new(),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn venue(&self) -> Venue {
        self.normalizer.venue()
    }

    #[must_use]
    pub fn book_view(&self) -> TopOfBookView {
        self.books.view()
    }

    /// Shared counter of malformed frames dropped so far.
    #[must_use]
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Translate a frame. A malformed frame is logged, counted and skipped.
    pub fn process(&mut self, frame: &RawFrame) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let events = match self.normalizer.normalize(frame) {
            Ok(events) => events,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(venue = %frame.venue, error = %e, "Dropping malformed frame");
                debug!(body = %truncate(&frame.body, 512), "Malformed frame body");
                return batch;
            }
        };

        for event in events {
            match &event.payload {
                EventPayload::OrderBookSnapshot(snapshot) => {
                    let Some(instrument) = event.topic.instrument.clone() else {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(topic = %event.topic, "Book snapshot without instrument");
                        continue;
                    };
                    match self.books.on_snapshot(&instrument, snapshot) {
                        SnapshotAction::Apply(replayed) => {
                            let topic = event.topic.clone();
                            let timestamp = event.timestamp;
                            batch.events.push(event);
                            batch.events.extend(replayed.into_iter().map(|delta| {
                                VenueEvent::new(
                                    topic.clone(),
                                    timestamp,
                                    EventPayload::OrderBookDelta(delta),
                                )
                            }));
                        }
                        SnapshotAction::Resync => push_unique(&mut batch.resync, instrument),
                    }
                }
                EventPayload::OrderBookDelta(delta) => {
                    let Some(instrument) = event.topic.instrument.clone() else {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(topic = %event.topic, "Book delta without instrument");
                        continue;
                    };
                    match self.books.on_delta(&instrument, delta) {
                        DeltaAction::Apply => batch.events.push(event),
                        DeltaAction::Buffered | DeltaAction::Discarded => {}
                        DeltaAction::Resync => push_unique(&mut batch.resync, instrument),
                    }
                }
                _ => batch.events.push(event),
            }
        }
        batch
    }

    /// Discard a book and wait for its next snapshot.
    pub fn reset_book(&mut self, instrument: &InstrumentId) {
        self.books.reset(instrument);
    }

    pub fn remove_book(&mut self, instrument: &InstrumentId) {
        self.books.remove(instrument);
    }
}

fn push_unique(list: &mut Vec<InstrumentId>, instrument: InstrumentId) {
    if !list.contains(&instrument) {
        list.push(instrument);
    }
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::book::BookStatus;
    use crate::domain::{BookSequence, Topic};
    use crate::error::{Error, Result};
    use crate::testkit;
    use rust_decimal_macros::dec;

    /// Emits the events queued for each body, or fails on "bad".
    struct FixedNormalizer {
        events: Vec<VenueEvent>,
    }

    impl Normalizer for FixedNormalizer {
        fn venue(&self) -> Venue {
            Venue::Binance
        }

        fn normalize(&self, frame: &RawFrame) -> Result<Vec<VenueEvent>> {
            if frame.body == "bad" {
                return Err(Error::normalization(Venue::Binance, "unparseable"));
            }
            Ok(self.events.clone())
        }
    }

    fn instrument() -> InstrumentId {
        InstrumentId::new("BTC", "USDT")
    }

    fn delta_event(first: u64, last: u64) -> VenueEvent {
        VenueEvent::new(
            Topic::book(Venue::Binance, instrument()),
            None,
            EventPayload::OrderBookDelta(testkit::domain::book_delta(
                vec![(dec!(100), dec!(1))],
                vec![],
                Some(BookSequence::Range { first, last }),
            )),
        )
    }

    #[test]
    fn test_malformed_frame_counted_and_skipped() {
        let mut pipeline = NormalizationPipeline::new(Arc::new(FixedNormalizer { events: vec![] }));
        let batch = pipeline.process(&RawFrame::new(Venue::Binance, "bad"));
        assert!(batch.events.is_empty());
        assert_eq!(pipeline.dropped(), 1);

        pipeline.process(&RawFrame::new(Venue::Binance, "{}"));
        assert_eq!(pipeline.dropped(), 1);
    }

    #[test]
    fn test_deltas_before_snapshot_are_withheld() {
        let mut pipeline = NormalizationPipeline::new(Arc::new(FixedNormalizer {
            events: vec![delta_event(10, 12)],
        }));
        let batch = pipeline.process(&RawFrame::new(Venue::Binance, "delta"));
        assert!(batch.events.is_empty());
        assert!(batch.resync.is_empty());
    }

    #[test]
    fn test_snapshot_releases_buffered_deltas() {
        let mut pipeline = NormalizationPipeline::new(Arc::new(FixedNormalizer {
            events: vec![delta_event(10, 12)],
        }));
        pipeline.process(&RawFrame::new(Venue::Binance, "delta"));

        let snapshot = VenueEvent::new(
            Topic::book(Venue::Binance, instrument()),
            None,
            EventPayload::OrderBookSnapshot(testkit::domain::book_snapshot(
                vec![(dec!(99), dec!(2))],
                vec![],
                Some(9),
            )),
        );
        pipeline.normalizer = Arc::new(FixedNormalizer { events: vec![snapshot] });
        let batch = pipeline.process(&RawFrame::new(Venue::Binance, "snapshot"));

        assert_eq!(batch.events.len(), 2);
        assert!(matches!(batch.events[0].payload, EventPayload::OrderBookSnapshot(_)));
        assert!(matches!(batch.events[1].payload, EventPayload::OrderBookDelta(_)));
        let view = pipeline.book_view();
        let top = view.get(&instrument()).unwrap();
        assert_eq!(top.status, BookStatus::Synced);
        assert_eq!(top.best_bid.unwrap().price, dec!(100));
    }

    #[test]
    fn test_gap_reports_resync_once() {
        let mut pipeline = NormalizationPipeline::new(Arc::new(FixedNormalizer {
            events: vec![VenueEvent::new(
                Topic::book(Venue::Binance, instrument()),
                None,
                EventPayload::OrderBookSnapshot(testkit::domain::book_snapshot(vec![], vec![], Some(5))),
            )],
        }));
        pipeline.process(&RawFrame::new(Venue::Binance, "snapshot"));

        pipeline.normalizer = Arc::new(FixedNormalizer {
            events: vec![delta_event(20, 21), delta_event(22, 23)],
        });
        let batch = pipeline.process(&RawFrame::new(Venue::Binance, "gap"));
        assert!(batch.events.is_empty());
        assert_eq!(batch.resync, vec![instrument()]);
    }
}
