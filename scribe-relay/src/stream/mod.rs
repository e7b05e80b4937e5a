//! Streaming connection manager
//!
//! Owns the single persistent websocket to the meeting platform's event
//! stream: handshake, heartbeat, frame classification, and reconnection
//! with capped exponential backoff. Every failure inside this lifecycle
//! becomes a state transition plus a scheduled retry; nothing here is
//! allowed to take the host process down. The one terminal condition is
//! exhausting the reconnect budget, which is reported on the event bus
//! and halts automatic attempts until `connect()` is invoked again.

pub mod envelope;
pub mod transport;

pub use envelope::{classify_frame, FrameKind, MeetingEvent, RECORDING_COMPLETED};
pub use transport::{StreamReader, StreamTransport, StreamWriter, TungsteniteTransport};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use scribe_common::events::{EventBus, ScribeEvent};
use scribe_common::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenSource;
use crate::config::StreamSettings;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected in this session
    Idle,
    /// Handshake in flight
    Connecting,
    /// Live connection, heartbeat running
    Open,
    /// Caller-initiated shutdown in progress
    Closing,
    /// No connection; reconnect may be pending
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{}", name)
    }
}

/// Reconnect backoff parameters
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts before the circuit opens permanently
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub base_delay: Duration,
    /// Delay ceiling
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Undithered delay before attempt `n` (1-indexed):
    /// `min(base * 1.5^(n-1), max)`.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 1.5_f64.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }

    /// Delay with jitter drawn uniformly from [0.9, 1.1], so a fleet of
    /// relays does not reconnect in lockstep after a shared outage.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.9..=1.1);
        Duration::from_secs_f64(self.capped_delay(attempt).as_secs_f64() * jitter)
    }
}

/// Streaming connection configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Websocket endpoint, without credentials
    pub endpoint: String,
    /// Event subscription to attach to
    pub subscription_id: String,
    /// Liveness probe interval
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl From<&StreamSettings> for StreamConfig {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            subscription_id: settings.subscription_id.clone(),
            heartbeat_interval: Duration::from_secs(settings.heartbeat_secs),
            reconnect: ReconnectPolicy {
                max_attempts: settings.max_reconnect_attempts,
                base_delay: Duration::from_millis(settings.base_delay_ms),
                max_delay: Duration::from_millis(settings.max_delay_ms),
            },
        }
    }
}

/// Receiver for decoded domain events
///
/// Implementations contain their own failures; the read loop neither
/// awaits the handling of a frame nor reacts to its outcome.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn handle_event(&self, event: MeetingEvent);
}

/// Mutable connection state, guarded by one mutex
///
/// Held only for short synchronous sections, never across an await.
struct ConnState {
    state: ConnectionState,
    /// Reconnect attempt counter; reset to 0 on reaching Open
    attempt: u32,
    /// Ensures the exhaustion condition is reported exactly once
    fatal_reported: bool,
    cancel: Option<CancellationToken>,
    connection_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl ConnState {
    /// Release session resources. Safe to call repeatedly.
    fn cleanup(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

struct ManagerInner {
    config: StreamConfig,
    tokens: Arc<dyn TokenSource>,
    transport: Arc<dyn StreamTransport>,
    sink: Arc<dyn EventSink>,
    event_bus: EventBus,
    conn: Mutex<ConnState>,
}

/// The single owner of the streaming connection
///
/// Constructed once and shared by handle; `connect()`/`close()` are the
/// only mutation entry points, preserving the one-connection-at-a-time
/// invariant without hidden globals.
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<ManagerInner>,
}

impl StreamManager {
    pub fn new(
        config: StreamConfig,
        tokens: Arc<dyn TokenSource>,
        transport: Arc<dyn StreamTransport>,
        sink: Arc<dyn EventSink>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                tokens,
                transport,
                sink,
                event_bus,
                conn: Mutex::new(ConnState {
                    state: ConnectionState::Idle,
                    attempt: 0,
                    fatal_reported: false,
                    cancel: None,
                    connection_task: None,
                    reconnect_timer: None,
                }),
            }),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.inner.conn.lock().unwrap().state
    }

    /// Pure query used by health checks
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Open the connection
    ///
    /// No-op while a handshake is already in flight or the connection is
    /// open. Failures are contained: they transition the state machine to
    /// Closed and schedule a reconnect instead of propagating.
    pub async fn connect(&self) {
        connect_session(self.inner.clone()).await;
    }

    /// Caller-initiated shutdown
    ///
    /// Cancels any pending reconnect timer and the heartbeat, releases
    /// the socket, and resets the attempt counter so a later `connect()`
    /// starts a fresh session. Idempotent.
    pub fn close(&self) {
        let inner = &self.inner;
        let mut conn = inner.conn.lock().unwrap();
        conn.cancel_reconnect();

        match conn.state {
            ConnectionState::Idle | ConnectionState::Closed => {
                conn.cleanup();
            }
            _ => {
                inner.transition(&mut conn, ConnectionState::Closing);
                conn.cleanup();
                inner.transition(&mut conn, ConnectionState::Closed);
            }
        }

        conn.attempt = 0;
        conn.fatal_reported = false;
    }
}

impl ManagerInner {
    /// Apply and report one state transition. Caller holds the lock.
    fn transition(&self, conn: &mut ConnState, new_state: ConnectionState) {
        let old_state = conn.state;
        if old_state == new_state {
            return;
        }
        conn.state = new_state;
        tracing::info!(from = %old_state, to = %new_state, "Connection state changed");
        self.emit(ScribeEvent::ConnectionStateChanged {
            old_state: old_state.to_string(),
            new_state: new_state.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: ScribeEvent) {
        if self.event_bus.emit(event).is_err() {
            tracing::debug!("No event bus subscribers");
        }
    }

    /// Classify one inbound frame and hand domain events off
    fn handle_frame(&self, text: String) {
        match classify_frame(&text) {
            FrameKind::Event(event) => {
                tracing::debug!(event = %event.event, "Forwarding domain event");
                let sink = self.sink.clone();
                // Handed off independently: a slow processor must not
                // block the reading of subsequent frames
                tokio::spawn(async move {
                    sink.handle_event(event).await;
                });
            }
            FrameKind::Notice(tag) => {
                tracing::debug!(frame = %tag, "Connection-level frame dropped");
            }
            FrameKind::Malformed(error) => {
                tracing::warn!(error = %error, "Malformed frame dropped");
            }
        }
    }
}

/// Open a session: guard re-entry, obtain a credential, handshake, and
/// start the connection task. All failures end in Closed + scheduled
/// reconnect.
async fn connect_session(inner: Arc<ManagerInner>) {
    {
        let mut conn = inner.conn.lock().unwrap();
        match conn.state {
            ConnectionState::Connecting => {
                tracing::debug!("Connect requested while already connecting");
                return;
            }
            ConnectionState::Open => {
                tracing::debug!("Connect requested while already open");
                return;
            }
            _ => {}
        }
        inner.transition(&mut conn, ConnectionState::Connecting);
    }

    if let Err(e) = open_session(&inner).await {
        tracing::warn!(error = %e, "Connection attempt failed");
        {
            let mut conn = inner.conn.lock().unwrap();
            // A close() racing the failed handshake wins
            if conn.state != ConnectionState::Connecting {
                return;
            }
            inner.transition(&mut conn, ConnectionState::Closed);
        }
        schedule_reconnect(&inner);
    }
}

async fn open_session(inner: &Arc<ManagerInner>) -> Result<()> {
    let token = inner.tokens.get_token().await?;
    let url = format!(
        "{}?subscriptionId={}&access_token={}",
        inner.config.endpoint, inner.config.subscription_id, token
    );

    let (reader, writer) = inner.transport.connect(&url).await?;

    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_connection(inner.clone(), reader, writer, cancel.clone()));

    let mut conn = inner.conn.lock().unwrap();
    if conn.state != ConnectionState::Connecting {
        // close() ran while the handshake was in flight; abandon quietly
        cancel.cancel();
        task.abort();
        return Ok(());
    }

    conn.cancel = Some(cancel);
    conn.connection_task = Some(task);
    conn.attempt = 0;
    conn.fatal_reported = false;
    inner.transition(&mut conn, ConnectionState::Open);
    Ok(())
}

/// One session: read loop plus a heartbeat subtask over the writer half.
/// Exits either on cancellation (caller shutdown, no reconnect) or on
/// close/error (recovered via reconnect scheduling).
async fn run_connection(
    inner: Arc<ManagerInner>,
    mut reader: Box<dyn StreamReader>,
    writer: Box<dyn StreamWriter>,
    cancel: CancellationToken,
) {
    let heartbeat = tokio::spawn(run_heartbeat(
        inner.config.heartbeat_interval,
        writer,
        cancel.clone(),
    ));

    let lost = loop {
        tokio::select! {
            _ = cancel.cancelled() => break false,
            frame = reader.next_frame() => {
                match frame {
                    Some(Ok(text)) => inner.handle_frame(text),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Stream read error");
                        break true;
                    }
                    None => {
                        tracing::info!("Stream closed by remote");
                        break true;
                    }
                }
            }
        }
    };

    heartbeat.abort();
    if lost {
        on_connection_lost(&inner);
    }
}

/// Periodic liveness probe over the writer half
///
/// Send failures are tolerated; the read loop is where a dead connection
/// actually surfaces.
async fn run_heartbeat(
    interval: Duration,
    mut writer: Box<dyn StreamWriter>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the probe can wait one interval
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = writer.close().await;
                return;
            }
            _ = ticker.tick() => {
                let probe = serde_json::json!({ "module": "heartbeat" }).to_string();
                if let Err(e) = writer.send_text(probe).await {
                    tracing::warn!(error = %e, "Heartbeat send failed");
                }
            }
        }
    }
}

/// Server-initiated close or transport error: clean up, transition to
/// Closed, schedule recovery. Skipped when a caller shutdown already ran.
fn on_connection_lost(inner: &Arc<ManagerInner>) {
    {
        let mut conn = inner.conn.lock().unwrap();
        if conn.state != ConnectionState::Open && conn.state != ConnectionState::Connecting {
            return;
        }
        conn.cleanup();
        inner.transition(&mut conn, ConnectionState::Closed);
    }
    schedule_reconnect(inner);
}

/// Bump the attempt counter and either arm the one-shot reconnect timer
/// or, past the budget, report the terminal condition exactly once.
fn schedule_reconnect(inner: &Arc<ManagerInner>) {
    let mut conn = inner.conn.lock().unwrap();
    conn.attempt += 1;
    let attempt = conn.attempt;

    if attempt > inner.config.reconnect.max_attempts {
        if !conn.fatal_reported {
            conn.fatal_reported = true;
            tracing::error!(
                attempts = attempt - 1,
                "Reconnect attempts exhausted; manual connect() required"
            );
            inner.emit(ScribeEvent::ReconnectExhausted {
                attempts: attempt - 1,
                timestamp: Utc::now(),
            });
        }
        return;
    }

    let delay = inner.config.reconnect.jittered_delay(attempt);
    tracing::info!(
        attempt,
        delay_ms = delay.as_millis() as u64,
        "Scheduling reconnect"
    );
    inner.emit(ScribeEvent::ReconnectScheduled {
        attempt,
        delay_ms: delay.as_millis() as u64,
        timestamp: Utc::now(),
    });

    let for_timer = inner.clone();
    conn.reconnect_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        connect_session(for_timer).await;
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(60_000),
        }
    }

    #[test]
    fn test_capped_delay_grows_geometrically() {
        let policy = policy();
        assert_eq!(policy.capped_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.capped_delay(2), Duration::from_millis(1500));
        assert_eq!(policy.capped_delay(3), Duration::from_millis(2250));
    }

    #[test]
    fn test_capped_delay_hits_ceiling() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2000),
        };
        assert_eq!(policy.capped_delay(5), Duration::from_millis(2000));
        assert_eq!(policy.capped_delay(50), Duration::from_millis(2000));
    }

    #[test]
    fn test_jittered_delay_within_envelope() {
        let policy = policy();
        for attempt in 1..=8 {
            let ideal = policy.capped_delay(attempt).as_secs_f64();
            for _ in 0..50 {
                let jittered = policy.jittered_delay(attempt).as_secs_f64();
                assert!(
                    jittered >= ideal * 0.9 - 1e-9 && jittered <= ideal * 1.1 + 1e-9,
                    "attempt {} delay {}s outside [{}, {}]",
                    attempt,
                    jittered,
                    ideal * 0.9,
                    ideal * 1.1
                );
            }
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Idle.to_string(), "Idle");
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionState::Open.to_string(), "Open");
        assert_eq!(ConnectionState::Closing.to_string(), "Closing");
        assert_eq!(ConnectionState::Closed.to_string(), "Closed");
    }
}
