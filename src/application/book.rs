//! Order book synchronization: snapshot/delta sequencing per instrument.
//!
//! Deltas received before a snapshot are buffered and replayed once it
//! arrives. Until a delta connects to a fresh snapshot, deltas at or below
//! the snapshot sequence are discarded; a REST snapshot can overtake deltas
//! still in flight on the socket. After that, a delta that is stale or
//! discontinuous with the last applied sequence marks the book out of sync
//! and asks for a fresh snapshot instead of applying it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::domain::{BookDelta, BookSnapshot, Continuity, InstrumentId, OrderBook, PriceLevel};

/// Deltas buffered per instrument while waiting for a snapshot.
const MAX_BUFFERED_DELTAS: usize = 1_000;

/// Synchronization status of one instrument's book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookStatus {
    AwaitingSnapshot,
    Synced,
    OutOfSync,
}

/// Best levels of a book, published for read-only queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopOfBook {
    pub best_bid: Option<PriceLevel>,
    pub best_ask: Option<PriceLevel>,
    pub status: BookStatus,
}

/// Shared read view of every book a synchronizer maintains.
pub type TopOfBookView = Arc<DashMap<InstrumentId, TopOfBook>>;

enum SyncState {
    AwaitingSnapshot(VecDeque<BookDelta>),
    OutOfSync(VecDeque<BookDelta>),
    /// Last applied venue sequence; `None` for venues without sequencing.
    Synced(Option<u64>),
}

impl SyncState {
    fn status(&self) -> BookStatus {
        match self {
            Self::AwaitingSnapshot(_) => BookStatus::AwaitingSnapshot,
            Self::OutOfSync(_) => BookStatus::OutOfSync,
            Self::Synced(_) => BookStatus::Synced,
        }
    }
}

struct InstrumentBook {
    state: SyncState,
    book: OrderBook,
    /// Snapshot applied and no delta has connected to it yet.
    bridging: bool,
}

impl Default for InstrumentBook {
    fn default() -> Self {
        Self {
            state: SyncState::AwaitingSnapshot(VecDeque::new()),
            book: OrderBook::new(),
            bridging: false,
        }
    }
}

/// What to do with an incoming delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaAction {
    /// Applied; publish it.
    Apply,
    /// Held until a snapshot arrives.
    Buffered,
    /// Predates the snapshot just applied; dropped.
    Discarded,
    /// Book is out of sync; request a snapshot.
    Resync,
}

/// Outcome of applying a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotAction {
    /// Applied; publish the snapshot, then these buffered deltas in order.
    Apply(Vec<BookDelta>),
    /// Buffered deltas do not connect to the snapshot; request another.
    Resync,
}

#[derive(Default)]
pub struct BookSynchronizer {
    books: HashMap<InstrumentId, InstrumentBook>,
    view: TopOfBookView,
}

impl BookSynchronizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for read-only top-of-book queries from other tasks.
    #[must_use]
    pub fn view(&self) -> TopOfBookView {
        Arc::clone(&self.view)
    }

    #[must_use]
    pub fn status(&self, instrument: &InstrumentId) -> Option<BookStatus> {
        self.books.get(instrument).map(|b| b.state.status())
    }

    pub fn on_delta(&mut self, instrument: &InstrumentId, delta: &BookDelta) -> DeltaAction {
        let entry = self.books.entry(instrument.clone()).or_default();

        let action = match &mut entry.state {
            SyncState::AwaitingSnapshot(buffered) | SyncState::OutOfSync(buffered) => {
                if buffered.len() >= MAX_BUFFERED_DELTAS {
                    warn!(instrument = %instrument, "Delta buffer full while awaiting snapshot");
                    buffered.clear();
                    DeltaAction::Resync
                } else {
                    buffered.push_back(delta.clone());
                    DeltaAction::Buffered
                }
            }
            SyncState::Synced(last) => match (delta.sequence, *last) {
                (Some(sequence), Some(applied)) => match sequence.continuity(applied) {
                    Continuity::Next => {
                        entry.book.apply_delta(delta);
                        *last = Some(sequence.last().max(applied));
                        entry.bridging = false;
                        DeltaAction::Apply
                    }
                    Continuity::Stale if entry.bridging => DeltaAction::Discarded,
                    continuity => {
                        warn!(
                            instrument = %instrument,
                            applied,
                            ?sequence,
                            ?continuity,
                            "Book sequence broken, resyncing"
                        );
                        entry.book.clear();
                        entry.bridging = false;
                        entry.state = SyncState::OutOfSync(VecDeque::new());
                        DeltaAction::Resync
                    }
                },
                (Some(sequence), None) => {
                    entry.book.apply_delta(delta);
                    *last = Some(sequence.last());
                    DeltaAction::Apply
                }
                (None, _) => {
                    entry.book.apply_delta(delta);
                    DeltaAction::Apply
                }
            },
        };

        self.publish_view(instrument);
        action
    }

    pub fn on_snapshot(&mut self, instrument: &InstrumentId, snapshot: &BookSnapshot) -> SnapshotAction {
        let entry = self.books.entry(instrument.clone()).or_default();

        let buffered = match std::mem::replace(&mut entry.state, SyncState::Synced(snapshot.sequence)) {
            SyncState::AwaitingSnapshot(buffered) | SyncState::OutOfSync(buffered) => buffered,
            SyncState::Synced(_) => VecDeque::new(),
        };
        entry.book.apply_snapshot(snapshot);

        let mut replayed = Vec::new();
        let mut last = snapshot.sequence;
        let mut pending = buffered;
        while let Some(delta) = pending.pop_front() {
            match (delta.sequence, last) {
                (Some(sequence), Some(applied)) => match sequence.continuity(applied) {
                    Continuity::Stale => continue,
                    Continuity::Next => {
                        last = Some(sequence.last().max(applied));
                    }
                    Continuity::Gap => {
                        debug!(
                            instrument = %instrument,
                            snapshot = ?snapshot.sequence,
                            ?sequence,
                            "Snapshot does not connect to buffered deltas"
                        );
                        pending.push_front(delta);
                        entry.book.clear();
                        entry.state = SyncState::OutOfSync(pending);
                        self.publish_view(instrument);
                        return SnapshotAction::Resync;
                    }
                },
                (Some(sequence), None) => last = Some(sequence.last()),
                (None, _) => {}
            }
            entry.book.apply_delta(&delta);
            replayed.push(delta);
        }

        entry.state = SyncState::Synced(last);
        entry.bridging = replayed.is_empty();
        self.publish_view(instrument);
        SnapshotAction::Apply(replayed)
    }

    /// Forget the book and wait for a new snapshot, e.g. after a reconnect.
    pub fn reset(&mut self, instrument: &InstrumentId) {
        let entry = self.books.entry(instrument.clone()).or_default();
        entry.book.clear();
        entry.bridging = false;
        entry.state = SyncState::AwaitingSnapshot(VecDeque::new());
        self.publish_view(instrument);
    }

    /// Stop tracking an instrument.
    pub fn remove(&mut self, instrument: &InstrumentId) {
        self.books.remove(instrument);
        self.view.remove(instrument);
    }

    fn publish_view(&self, instrument: &InstrumentId) {
        if let Some(entry) = self.books.get(instrument) {
            self.view.insert(
                instrument.clone(),
                TopOfBook {
                    best_bid: entry.book.best_bid(),
                    best_ask: entry.book.best_ask(),
                    status: entry.state.status(),
                },
            );
        }
    }
}
