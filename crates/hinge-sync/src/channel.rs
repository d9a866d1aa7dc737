//! One live WebSocket channel per topic.
//!
//! [`ChannelConnection::open`] spawns a background task that owns the
//! transport: it handshakes, parses inbound frames into [`Event`]s, and
//! reconnects with [`Backoff`] when the transport drops. Parsed events are
//! fanned out over a [`broadcast`] queue so every subscriber sees them in
//! delivery order; connectivity is published separately on a [`watch`]
//! channel so a status indicator never has to consume events.
//!
//! Nothing here returns transport or parse failures to the caller. A
//! failed handshake or a dropped socket becomes `reconnecting` (and
//! eventually `unreachable`); a malformed frame is logged and skipped.
//!
//! [`Backoff`]: crate::backoff::Backoff

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt as _;
use hinge_types::{ConnectionState, Event, Frame, Topic};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::{BackoffConfig, SyncConfig};
use crate::error::SyncError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sentinel stored while no event has been received yet.
const NO_EVENT: i64 = i64::MIN;

/// Connectivity snapshot published by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStatus {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful handshake.
    pub attempt: u32,
}

/// Inputs that move a channel between lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A handshake completed.
    HandshakeSucceeded,
    /// A handshake failed or an open transport dropped.
    TransportLost {
        /// Failures so far, including this one.
        attempt: u32,
    },
    /// The retry budget ran out.
    RetriesExhausted {
        /// Failures recorded, including the last one.
        attempt: u32,
    },
    /// The owner closed the channel.
    Close,
}

/// Apply `signal` to `current`.
///
/// `closed` absorbs every signal; `unreachable` only yields to `closed`.
pub const fn transition(current: ConnectionState, signal: Signal) -> ConnectionState {
    match (current, signal) {
        (ConnectionState::Closed, _) | (_, Signal::Close) => ConnectionState::Closed,
        (ConnectionState::Unreachable, _) | (_, Signal::RetriesExhausted { .. }) => {
            ConnectionState::Unreachable
        }
        (_, Signal::HandshakeSucceeded) => ConnectionState::Open,
        (_, Signal::TransportLost { .. }) => ConnectionState::Reconnecting,
    }
}

/// Shared connectivity cell. All writes go through [`transition`] under the
/// watch channel's lock, so nothing can be published after `closed`.
#[derive(Debug)]
struct StatusCell {
    tx: watch::Sender<ChannelStatus>,
}

impl StatusCell {
    fn new() -> Self {
        let (tx, _) = watch::channel(ChannelStatus::default());
        Self { tx }
    }

    /// Apply a signal; returns whether the published status changed.
    fn signal(&self, signal: Signal) -> bool {
        self.tx.send_if_modified(|status| {
            let next = ChannelStatus {
                state: transition(status.state, signal),
                attempt: match (status.state, signal) {
                    (ConnectionState::Closed | ConnectionState::Unreachable, _) => status.attempt,
                    (_, Signal::TransportLost { attempt } | Signal::RetriesExhausted { attempt }) => {
                        attempt
                    }
                    (_, Signal::HandshakeSucceeded) => 0,
                    _ => status.attempt,
                },
            };
            if next == *status {
                false
            } else {
                *status = next;
                true
            }
        })
    }

    fn current(&self) -> ChannelStatus {
        *self.tx.borrow()
    }

    fn is_closed(&self) -> bool {
        self.current().state == ConnectionState::Closed
    }
}

/// A live connection to one topic.
///
/// Dropping the connection closes it.
#[derive(Debug)]
pub struct ChannelConnection {
    topic: Topic,
    url: String,
    events: broadcast::Sender<Arc<Event>>,
    status: Arc<StatusCell>,
    last_event_ms: Arc<AtomicI64>,
    closed: AtomicBool,
    task: JoinHandle<()>,
}

impl ChannelConnection {
    /// Start connecting to `topic`.
    ///
    /// Returns immediately in the `connecting` state; the handshake runs in
    /// the background. Must be called from within a Tokio runtime.
    pub fn open(topic: Topic, config: &SyncConfig) -> Self {
        let url = channel_url(&config.endpoints.ws_url, &topic);
        let (events, _) = broadcast::channel(config.channel.event_buffer.max(1));
        let status = Arc::new(StatusCell::new());
        let last_event_ms = Arc::new(AtomicI64::new(NO_EVENT));

        info!(topic = %topic, url = url, "opening channel");

        let worker = ChannelWorker {
            topic: topic.clone(),
            url: url.clone(),
            handshake_timeout: config.channel.handshake_timeout(),
            backoff: config.backoff,
            events: events.clone(),
            status: Arc::clone(&status),
            last_event_ms: Arc::clone(&last_event_ms),
        };
        let task = tokio::spawn(worker.run());

        Self {
            topic,
            url,
            events,
            status,
            last_event_ms,
            closed: AtomicBool::new(false),
            task,
        }
    }

    /// The topic this connection serves.
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// The full channel address.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.status.current().state
    }

    /// Current connectivity snapshot.
    pub fn status(&self) -> ChannelStatus {
        self.status.current()
    }

    /// Wall-clock time the last well-formed frame arrived.
    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        load_instant(&self.last_event_ms)
    }

    /// Open a queue of parsed events plus a connectivity watch.
    ///
    /// Events published before this call are not replayed.
    pub fn subscribe(&self) -> ChannelSubscription {
        ChannelSubscription {
            topic: self.topic.clone(),
            events: self.events.subscribe(),
            status: self.status.tx.subscribe(),
            last_event_ms: Arc::clone(&self.last_event_ms),
        }
    }

    /// Invoke `callback` once per parsed event, in delivery order.
    ///
    /// Delivery stops when the returned forwarder is dropped.
    pub fn on_event<F>(&self, mut callback: F) -> EventForwarder
    where
        F: FnMut(Arc<Event>) + Send + 'static,
    {
        let mut subscription = self.subscribe();
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                callback(event);
            }
        });
        EventForwarder { task }
    }

    /// Release the transport and move to `closed`.
    ///
    /// Idempotent. Safe to call while the first handshake is still pending;
    /// the in-flight handshake is dropped with the task.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.status.signal(Signal::Close);
        self.task.abort();
        info!(topic = %self.topic, "channel closed");
    }
}

impl Drop for ChannelConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn load_instant(cell: &AtomicI64) -> Option<DateTime<Utc>> {
    match cell.load(Ordering::Acquire) {
        NO_EVENT => None,
        ms => DateTime::from_timestamp_millis(ms),
    }
}

/// One input read from a [`ChannelSubscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    /// A parsed event, in delivery order.
    Event(Arc<Event>),
    /// Connectivity changed.
    Status(ChannelStatus),
}

/// Consumer end of a channel: an ordered event queue and a status watch.
#[derive(Debug)]
pub struct ChannelSubscription {
    topic: Topic,
    events: broadcast::Receiver<Arc<Event>>,
    status: watch::Receiver<ChannelStatus>,
    last_event_ms: Arc<AtomicI64>,
}

impl ChannelSubscription {
    /// Next event in delivery order.
    ///
    /// A consumer that falls more than the buffer size behind skips ahead;
    /// the snapshot poller repairs the gap. Returns `None` once the
    /// connection has been dropped. Cancel-safe.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(topic = %self.topic, skipped, "channel subscriber lagged, skipping ahead");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Latest connectivity snapshot, marking it seen.
    pub fn status(&mut self) -> ChannelStatus {
        *self.status.borrow_and_update()
    }

    /// Wait for the next connectivity change.
    ///
    /// Returns `None` once the connection has been dropped. Cancel-safe.
    pub async fn status_changed(&mut self) -> Option<ChannelStatus> {
        self.status.changed().await.ok()?;
        Some(*self.status.borrow_and_update())
    }

    /// Next event or connectivity change, whichever comes first.
    ///
    /// A pending status change is reported before buffered events, so an
    /// event is never seen ahead of the `open` that preceded it. Returns
    /// `None` once the connection has been dropped. Cancel-safe.
    pub async fn next(&mut self) -> Option<ChannelUpdate> {
        loop {
            tokio::select! {
                biased;
                changed = self.status.changed() => {
                    changed.ok()?;
                    return Some(ChannelUpdate::Status(*self.status.borrow_and_update()));
                }
                event = self.events.recv() => match event {
                    Ok(event) => return Some(ChannelUpdate::Event(event)),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(topic = %self.topic, skipped, "channel subscriber lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Wall-clock time the last well-formed frame arrived on this channel.
    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        load_instant(&self.last_event_ms)
    }

    /// The topic this subscription reads.
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }
}

/// Handle for a callback registered with [`ChannelConnection::on_event`].
#[derive(Debug)]
pub struct EventForwarder {
    task: JoinHandle<()>,
}

impl Drop for EventForwarder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// `{ws_url}/{channel}` with exactly one slash between them.
pub fn channel_url(ws_url: &str, topic: &Topic) -> String {
    format!("{}/{}", ws_url.trim_end_matches('/'), topic.channel_name())
}

/// State owned by the background transport task.
struct ChannelWorker {
    topic: Topic,
    url: String,
    handshake_timeout: Duration,
    backoff: BackoffConfig,
    events: broadcast::Sender<Arc<Event>>,
    status: Arc<StatusCell>,
    last_event_ms: Arc<AtomicI64>,
}

impl ChannelWorker {
    /// Connect, read, reconnect -- until closed or out of retries.
    async fn run(self) {
        let mut backoff = Backoff::new(self.backoff);
        loop {
            match handshake(&self.url, self.handshake_timeout).await {
                Ok(socket) => {
                    backoff.reset();
                    self.status.signal(Signal::HandshakeSucceeded);
                    info!(topic = %self.topic, "channel open");
                    let reason = self.read_frames(socket).await;
                    warn!(topic = %self.topic, error = %reason, "channel transport lost");
                }
                Err(e) => {
                    warn!(
                        topic = %self.topic,
                        attempt = backoff.attempt().saturating_add(1),
                        error = %e,
                        "channel handshake failed"
                    );
                }
            }

            if self.status.is_closed() {
                return;
            }

            let Some(delay) = backoff.next_delay() else {
                warn!(
                    topic = %self.topic,
                    attempts = backoff.attempt(),
                    "channel retry budget exhausted, giving up"
                );
                self.status.signal(Signal::RetriesExhausted {
                    attempt: backoff.attempt(),
                });
                return;
            };
            self.status.signal(Signal::TransportLost {
                attempt: backoff.attempt(),
            });
            debug!(
                topic = %self.topic,
                attempt = backoff.attempt(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnecting after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Deliver frames until the transport ends; returns why it ended.
    async fn read_frames(&self, mut socket: Socket) -> SyncError {
        while let Some(message) = socket.next().await {
            match message {
                Ok(Message::Text(text)) => self.deliver(&text),
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.deliver(text),
                    Err(e) => {
                        warn!(topic = %self.topic, error = %e, "dropping non-UTF-8 binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    let reason = frame.map_or_else(
                        || String::from("no reason given"),
                        |f| format!("{} {}", f.code, f.reason),
                    );
                    return SyncError::Transport(format!("server closed the channel: {reason}"));
                }
                // Ping/pong are answered by the transport itself.
                Ok(_) => {}
                Err(e) => return e.into(),
            }
        }
        SyncError::Transport(String::from("stream ended"))
    }

    /// Parse one text frame and fan it out.
    fn deliver(&self, text: &str) {
        let event = match Frame::parse_event(text) {
            Ok(event) => event,
            Err(e) => {
                let e = SyncError::from(e);
                warn!(topic = %self.topic, error = %e, "dropping malformed frame");
                return;
            }
        };
        if self.status.is_closed() {
            return;
        }
        self.last_event_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
        debug!(topic = %self.topic, id = %event.id(), kind = %event.kind(), "event received");
        // Err only means nobody is subscribed right now.
        let _ = self.events.send(Arc::new(event));
    }
}

/// One bounded handshake attempt.
async fn handshake(url: &str, timeout: Duration) -> Result<Socket, SyncError> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(e.into()),
        Err(_elapsed) => Err(SyncError::Transport(format!(
            "handshake timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_opens_from_connecting_and_reconnecting() {
        assert_eq!(
            transition(ConnectionState::Connecting, Signal::HandshakeSucceeded),
            ConnectionState::Open
        );
        assert_eq!(
            transition(ConnectionState::Reconnecting, Signal::HandshakeSucceeded),
            ConnectionState::Open
        );
    }

    #[test]
    fn transport_loss_means_reconnecting() {
        let lost = Signal::TransportLost { attempt: 1 };
        assert_eq!(transition(ConnectionState::Open, lost), ConnectionState::Reconnecting);
        assert_eq!(transition(ConnectionState::Connecting, lost), ConnectionState::Reconnecting);
    }

    #[test]
    fn closed_is_absorbing() {
        for signal in [
            Signal::HandshakeSucceeded,
            Signal::TransportLost { attempt: 3 },
            Signal::RetriesExhausted { attempt: 4 },
            Signal::Close,
        ] {
            assert_eq!(transition(ConnectionState::Closed, signal), ConnectionState::Closed);
        }
    }

    #[test]
    fn unreachable_only_yields_to_close() {
        assert_eq!(
            transition(ConnectionState::Unreachable, Signal::HandshakeSucceeded),
            ConnectionState::Unreachable
        );
        assert_eq!(
            transition(ConnectionState::Unreachable, Signal::Close),
            ConnectionState::Closed
        );
    }

    #[test]
    fn status_cell_ignores_updates_after_close() {
        let cell = StatusCell::new();
        assert!(cell.signal(Signal::TransportLost { attempt: 2 }));
        assert_eq!(cell.current().attempt, 2);
        assert!(cell.signal(Signal::Close));
        assert!(!cell.signal(Signal::HandshakeSucceeded));
        assert_eq!(cell.current().state, ConnectionState::Closed);
        assert_eq!(cell.current().attempt, 2);
    }

    #[test]
    fn repeated_signal_is_not_a_change() {
        let cell = StatusCell::new();
        assert!(cell.signal(Signal::HandshakeSucceeded));
        assert!(!cell.signal(Signal::HandshakeSucceeded));
    }

    #[test]
    fn channel_url_joins_cleanly() {
        assert_eq!(
            channel_url("ws://localhost:8000/ws/", &Topic::Feed),
            "ws://localhost:8000/ws/feed"
        );
        assert_eq!(
            channel_url("ws://h/ws", &Topic::Match("9".into())),
            "ws://h/ws/match_9"
        );
    }

    #[tokio::test]
    async fn close_before_handshake_is_final_and_idempotent() {
        let mut config = SyncConfig::default();
        // Nothing listens on port 9; the handshake would fail or hang.
        config.endpoints.ws_url = String::from("ws://127.0.0.1:9/ws");
        let connection = ChannelConnection::open(Topic::Feed, &config);
        assert_eq!(connection.state(), ConnectionState::Connecting);
        connection.close();
        connection.close();
        assert_eq!(connection.state(), ConnectionState::Closed);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.last_event_at(), None);
    }
}
