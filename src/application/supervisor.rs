//! Reconnection supervisor for one venue session.
//!
//! Drives a [`WireSession`] through connect, authenticate and subscribe,
//! pumps its inbound frames through normalization and dispatch, and
//! reconnects with exponential backoff and a circuit breaker when the
//! session drops or goes silent past its heartbeat window.

use std::collections::BTreeSet;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::book::TopOfBookView;
use super::dispatch::Dispatcher;
use super::normalize::NormalizationPipeline;
use crate::domain::{ConnectionState, SessionChannel, Topic, TopicKind, Venue};
use crate::error::{Error, Result};
use crate::infrastructure::config::reconnect::ReconnectionConfig;
use crate::port::{RawFrame, RawMessage, SessionCapabilities, WireSession};

const COMMAND_CAPACITY: usize = 64;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    /// Normal operation, connections allowed.
    Closed,
    /// Too many failures, blocking connections temporarily.
    Open { until: Instant },
}

/// Exponential backoff with jitter and a circuit breaker.
#[derive(Debug)]
struct Backoff {
    config: ReconnectionConfig,
    consecutive_failures: u32,
    current_delay_ms: u64,
    circuit_state: CircuitState,
}

impl Backoff {
    fn new(config: ReconnectionConfig) -> Self {
        let initial_delay = config.initial_delay_ms;
        Self {
            config,
            consecutive_failures: 0,
            current_delay_ms: initial_delay,
            circuit_state: CircuitState::Closed,
        }
    }

    /// Reset backoff state after successful connection.
    fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay_ms = self.config.initial_delay_ms;
        self.circuit_state = CircuitState::Closed;
    }

    /// Calculate next backoff delay using exponential backoff.
    fn next_delay(&mut self) -> Duration {
        let base_delay = Duration::from_millis(self.current_delay_ms);
        let delay = base_delay + self.jitter(base_delay);

        let next_delay = (self.current_delay_ms as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay_ms = next_delay.min(self.config.max_delay_ms);

        delay
    }

    /// Uniform in `[0, jitter_ratio * base]`.
    fn jitter(&self, base_delay: Duration) -> Duration {
        let range_ms = (base_delay.as_millis() as f64 * self.config.jitter_ratio) as u64;
        if range_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=range_ms))
    }

    /// Check if circuit breaker allows connection attempts.
    fn circuit_allows_connection(&mut self) -> bool {
        match self.circuit_state {
            CircuitState::Closed => true,
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    info!("Circuit breaker cooldown expired, allowing reconnection");
                    self.reset();
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a connection failure and possibly trip circuit breaker.
    fn record_failure(&mut self) {
        self.consecutive_failures += 1;

        if self.consecutive_failures >= self.config.max_consecutive_failures {
            let cooldown = Duration::from_millis(self.config.circuit_breaker_cooldown_ms);
            self.circuit_state = CircuitState::Open {
                until: Instant::now() + cooldown,
            };
            error!(
                failures = self.consecutive_failures,
                cooldown_secs = cooldown.as_secs(),
                "Circuit breaker tripped, pausing reconnection attempts"
            );
        }
    }

    /// Total wait before the next attempt, including any circuit cooldown.
    fn wait_duration(&mut self) -> Duration {
        let mut wait = Duration::ZERO;
        if !self.circuit_allows_connection() {
            if let CircuitState::Open { until } = self.circuit_state {
                wait = until.saturating_duration_since(Instant::now());
                warn!(
                    remaining_secs = wait.as_secs(),
                    "Circuit breaker open, waiting for cooldown"
                );
                self.reset();
            }
        }
        wait + self.next_delay()
    }
}

/// Runtime change to a session's topic set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Subscribe(Vec<Topic>),
    Unsubscribe(Vec<Topic>),
}

/// Why the inbound pump stopped.
enum PumpExit {
    Cancelled,
    Disconnected(String),
    HeartbeatMissed,
}

/// Control and observation side of a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    venue: Venue,
    channel: SessionChannel,
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
    books: TopOfBookView,
    dropped: Arc<AtomicU64>,
}

impl SupervisorHandle {
    #[must_use]
    pub const fn channel(&self) -> SessionChannel {
        self.channel
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    #[must_use]
    pub fn books(&self) -> &TopOfBookView {
        &self.books
    }

    /// Malformed frames dropped by this session.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub async fn subscribe(&self, topics: Vec<Topic>) -> Result<()> {
        self.send(SessionCommand::Subscribe(topics)).await
    }

    pub async fn unsubscribe(&self, topics: Vec<Topic>) -> Result<()> {
        self.send(SessionCommand::Unsubscribe(topics)).await
    }

    /// Non-blocking unsubscribe, for use from `Drop`.
    pub fn try_unsubscribe(&self, topics: Vec<Topic>) -> Result<()> {
        self.commands
            .try_send(SessionCommand::Unsubscribe(topics))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    Error::Transport("session command queue full".into())
                }
                mpsc::error::TrySendError::Closed(_) => Error::VenueNotRunning(self.venue),
            })
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::VenueNotRunning(self.venue))
    }
}

/// Owns one session for its whole lifetime. Run with [`run`](Self::run).
pub struct SessionSupervisor<S: WireSession> {
    session: S,
    venue: Venue,
    channel: SessionChannel,
    capabilities: SessionCapabilities,
    pipeline: NormalizationPipeline,
    dispatcher: Arc<Dispatcher>,
    backoff: Backoff,
    max_auth_attempts: u32,
    auth_failures: u32,
    /// Topics replayed on every reconnect.
    active: BTreeSet<Topic>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    commands: mpsc::Receiver<SessionCommand>,
    cancel: CancellationToken,
}

impl<S: WireSession> SessionSupervisor<S> {
    pub fn new(
        session: S,
        pipeline: NormalizationPipeline,
        dispatcher: Arc<Dispatcher>,
        config: ReconnectionConfig,
        cancel: CancellationToken,
    ) -> (Self, SupervisorHandle) {
        let venue = session.venue();
        let channel = session.channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let handle = SupervisorHandle {
            venue,
            channel,
            commands: command_tx,
            state: state_rx,
            books: pipeline.book_view(),
            dropped: pipeline.dropped_counter(),
        };

        let supervisor = Self {
            capabilities: session.capabilities(),
            session,
            venue,
            channel,
            pipeline,
            dispatcher,
            max_auth_attempts: config.max_auth_attempts.max(1),
            backoff: Backoff::new(config),
            auth_failures: 0,
            active: BTreeSet::new(),
            state: ConnectionState::Disconnected,
            state_tx,
            commands: command_rx,
            cancel,
        };
        (supervisor, handle)
    }

    /// Topics to subscribe on the first connect.
    #[must_use]
    pub fn with_topics(mut self, topics: impl IntoIterator<Item = Topic>) -> Self {
        self.active.extend(topics);
        self
    }

    /// Run until cancelled or authentication is exhausted. Always ends Closed.
    pub async fn run(mut self) {
        let cancel = self.cancel.clone();
        info!(venue = %self.venue, channel = self.channel.as_str(), "Session supervisor started");

        let mut first_attempt = true;
        loop {
            if !first_attempt {
                let delay = self.backoff.wait_duration();
                info!(
                    venue = %self.venue,
                    channel = self.channel.as_str(),
                    delay_ms = delay.as_millis() as u64,
                    attempt = self.backoff.consecutive_failures + 1,
                    "Reconnecting after delay"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = sleep(delay) => {}
                }
            }
            first_attempt = false;

            let established = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.establish() => result,
            };

            match established {
                Ok(()) => {
                    self.backoff.reset();
                    self.auth_failures = 0;
                    match self.pump(&cancel).await {
                        PumpExit::Cancelled => break,
                        PumpExit::Disconnected(reason) => {
                            warn!(venue = %self.venue, channel = self.channel.as_str(), reason = %reason, "Connection lost, will reconnect");
                            self.session.close().await;
                            self.set_state(ConnectionState::Disconnected, Some(reason));
                            self.backoff.record_failure();
                        }
                        PumpExit::HeartbeatMissed => {
                            let timeout = self.capabilities.heartbeat_timeout;
                            warn!(
                                venue = %self.venue,
                                channel = self.channel.as_str(),
                                timeout_ms = timeout.as_millis() as u64,
                                "Heartbeat deadline missed"
                            );
                            self.session.close().await;
                            self.set_state(
                                ConnectionState::Degraded,
                                Some(format!("no message within {}ms", timeout.as_millis())),
                            );
                            self.backoff.record_failure();
                        }
                    }
                }
                Err(e) if e.is_auth() => {
                    self.auth_failures += 1;
                    self.session.close().await;
                    if self.auth_failures >= self.max_auth_attempts {
                        error!(
                            venue = %self.venue,
                            channel = self.channel.as_str(),
                            attempts = self.auth_failures,
                            error = %e,
                            "Authentication failed, giving up on session"
                        );
                        self.set_state(
                            ConnectionState::Closed,
                            Some(format!("authentication failed: {e}")),
                        );
                        return;
                    }
                    warn!(venue = %self.venue, attempt = self.auth_failures, error = %e, "Authentication failed");
                    self.set_state(ConnectionState::Disconnected, Some(e.to_string()));
                    self.backoff.record_failure();
                }
                Err(e) => {
                    error!(venue = %self.venue, channel = self.channel.as_str(), error = %e, "Connection attempt failed");
                    self.session.close().await;
                    self.set_state(ConnectionState::Disconnected, Some(e.to_string()));
                    self.backoff.record_failure();
                }
            }
        }

        self.session.close().await;
        self.set_state(ConnectionState::Closed, Some("shutdown".into()));
        info!(venue = %self.venue, channel = self.channel.as_str(), "Session supervisor stopped");
    }

    async fn establish(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting, None);
        self.session.connect().await?;

        self.set_state(ConnectionState::Authenticating, None);
        self.session.authenticate().await?;

        let topics: Vec<Topic> = self.active.iter().cloned().collect();
        if !topics.is_empty() {
            debug!(venue = %self.venue, topics = topics.len(), "Resubscribing to topics");
            self.session.subscribe(&topics).await?;
        }
        self.set_state(ConnectionState::Subscribed, None);
        self.prime_books(&topics).await;
        Ok(())
    }

    async fn pump(&mut self, cancel: &CancellationToken) -> PumpExit {
        let timeout = self.capabilities.heartbeat_timeout;
        let mut deadline = Instant::now() + timeout;
        let mut keepalive = self.capabilities.ping_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return PumpExit::Cancelled,
                Some(command) = self.commands.recv() => {
                    if let Err(e) = self.apply_command(command).await {
                        return PumpExit::Disconnected(format!("subscription change failed: {e}"));
                    }
                }
                () = sleep_until(deadline) => return PumpExit::HeartbeatMissed,
                () = tick(&mut keepalive) => {
                    if let Err(e) = self.session.keepalive().await {
                        return PumpExit::Disconnected(format!("keepalive failed: {e}"));
                    }
                }
                message = self.session.next_message() => match message {
                    Some(RawMessage::Frame(frame)) => {
                        deadline = Instant::now() + timeout;
                        self.handle_frame(frame).await;
                    }
                    Some(RawMessage::Keepalive) => deadline = Instant::now() + timeout,
                    Some(RawMessage::Disconnected { reason }) => return PumpExit::Disconnected(reason),
                    None => return PumpExit::Disconnected("stream ended".into()),
                },
            }
        }
    }

    async fn handle_frame(&mut self, frame: RawFrame) {
        let received_at = frame.received_at;
        let batch = self.pipeline.process(&frame);
        for event in batch.events {
            self.dispatcher.dispatch(event, received_at);
        }
        for instrument in batch.resync {
            info!(venue = %self.venue, instrument = %instrument, "Requesting book snapshot");
            if let Err(e) = self.session.request_snapshot(&instrument).await {
                warn!(venue = %self.venue, instrument = %instrument, error = %e, "Snapshot request failed");
            }
        }
    }

    async fn apply_command(&mut self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::Subscribe(topics) => {
                let added: Vec<Topic> = topics
                    .into_iter()
                    .filter(|topic| self.active.insert(topic.clone()))
                    .collect();
                if added.is_empty() {
                    return Ok(());
                }
                self.session.subscribe(&added).await?;
                self.prime_books(&added).await;
            }
            SessionCommand::Unsubscribe(topics) => {
                let removed: Vec<Topic> = topics
                    .into_iter()
                    .filter(|topic| self.active.remove(topic))
                    .collect();
                if removed.is_empty() {
                    return Ok(());
                }
                for instrument in book_instruments(&removed) {
                    self.pipeline.remove_book(instrument);
                }
                self.session.unsubscribe(&removed).await?;
            }
        }
        Ok(())
    }

    /// Mark freshly subscribed books out of sync and ask for snapshots.
    async fn prime_books(&mut self, topics: &[Topic]) {
        for instrument in book_instruments(topics) {
            self.pipeline.reset_book(instrument);
            if self.capabilities.snapshot_on_subscribe {
                continue;
            }
            if let Err(e) = self.session.request_snapshot(instrument).await {
                warn!(venue = %self.venue, instrument = %instrument, error = %e, "Snapshot request failed");
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState, reason: Option<String>) {
        if self.state == state {
            return;
        }
        debug!(
            venue = %self.venue,
            channel = self.channel.as_str(),
            from = %self.state,
            to = %state,
            "Connection state change"
        );
        self.state = state;
        self.state_tx.send_replace(state);
        self.dispatcher.connection_changed(self.channel, state, reason);
    }
}

fn book_instruments(topics: &[Topic]) -> impl Iterator<Item = &crate::domain::InstrumentId> {
    topics
        .iter()
        .filter(|topic| topic.kind == TopicKind::Book)
        .filter_map(|topic| topic.instrument.as_ref())
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
