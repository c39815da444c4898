//! Local sequence numbers per topic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{CanonicalEvent, TimestampSource, Topic, VenueEvent};

/// Assigns strictly increasing sequence numbers per topic, starting at 1.
///
/// Callers serialize access; the venue dispatcher holds it under a lock.
#[derive(Debug, Default)]
pub struct Sequencer {
    next: HashMap<Topic, u64>,
}

impl Sequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, topic: &Topic) -> u64 {
        let counter = self.next.entry(topic.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Turn a translated event into a canonical one, stamping time and sequence.
    pub fn stamp(&mut self, event: VenueEvent, received_at: DateTime<Utc>) -> CanonicalEvent {
        let sequence = self.next(&event.topic);
        let (timestamp, timestamp_source) = match event.timestamp {
            Some(ts) => (ts, TimestampSource::Venue),
            None => (received_at, TimestampSource::Receipt),
        };
        CanonicalEvent {
            topic: event.topic,
            timestamp,
            timestamp_source,
            sequence,
            payload: event.payload,
        }
    }

    /// Last sequence issued for a topic, 0 if none.
    #[must_use]
    pub fn last(&self, topic: &Topic) -> u64 {
        self.next.get(topic).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Venue;
    use crate::testkit;

    #[test]
    fn test_sequences_are_per_topic() {
        let mut seq = Sequencer::new();
        let btc = testkit::domain::trades_topic(Venue::Huobi, "BTC/USDT");
        let eth = testkit::domain::trades_topic(Venue::Huobi, "ETH/USDT");

        assert_eq!(seq.next(&btc), 1);
        assert_eq!(seq.next(&btc), 2);
        assert_eq!(seq.next(&eth), 1);
        assert_eq!(seq.last(&btc), 2);
    }

    #[test]
    fn test_stamp_falls_back_to_receipt_time() {
        let mut seq = Sequencer::new();
        let topic = testkit::domain::trades_topic(Venue::Okx, "BTC/USDT");
        let received = Utc::now();
        let event = VenueEvent::new(topic, None, testkit::domain::trade_payload());

        let stamped = seq.stamp(event, received);
        assert_eq!(stamped.timestamp, received);
        assert_eq!(stamped.timestamp_source, TimestampSource::Receipt);
        assert_eq!(stamped.sequence, 1);
    }
}
