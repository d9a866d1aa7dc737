//! Periodic authoritative reads that correct drift in the pushed state.
//!
//! [`SnapshotClient`] performs the plain REST reads. A [`SnapshotSource`]
//! binds one read to one resource, and [`SnapshotPoller`] runs a source on
//! a fixed cadence, handing each successful result to its consumer over a
//! queue. A failed fetch is logged and skipped: the consumer keeps whatever
//! it had.

use std::future::Future;
use std::time::Duration;

use hinge_types::{ConversationSnapshot, Event, MatchId, MatchSnapshot, MessageEvent};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;

/// Queue depth between a poller and its consumer.
///
/// One is enough: a snapshot that cannot be handed over yet is superseded by
/// the next fetch anyway.
const SNAPSHOT_QUEUE_DEPTH: usize = 1;

/// HTTP client for the backend's read endpoints.
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    client: reqwest::Client,
    api_url: String,
}

impl SnapshotClient {
    /// Build a client against `config.endpoints.api_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch.timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.endpoints.api_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Global activity list, newest first (`GET /activity?limit=N`).
    ///
    /// Rows that do not describe an event are dropped individually.
    pub async fn activity(&self, limit: usize) -> Result<Vec<Event>, SyncError> {
        let rows: Vec<Value> = self.get(&format!("/activity?limit={limit}")).await?;
        Ok(parse_rows(rows, "activity"))
    }

    /// Conversation list (`GET /matches`).
    pub async fn conversations(&self) -> Result<Vec<MatchSnapshot>, SyncError> {
        let rows: Vec<Value> = self.get("/matches").await?;
        Ok(parse_rows(rows, "match"))
    }

    /// Metadata for one conversation (`GET /matches/{id}`).
    pub async fn match_meta(&self, id: &MatchId) -> Result<MatchSnapshot, SyncError> {
        self.get(&format!("/matches/{id}")).await
    }

    /// Messages for one conversation, oldest first (`GET /matches/{id}/messages`).
    pub async fn messages(&self, id: &MatchId) -> Result<Vec<MessageEvent>, SyncError> {
        let rows: Vec<Value> = self.get(&format!("/matches/{id}/messages")).await?;
        Ok(parse_rows(rows, "message"))
    }

    /// Metadata and messages for one conversation, read independently.
    ///
    /// A failed half is logged and left out; only when both reads fail is
    /// there no snapshot at all.
    pub async fn conversation(&self, id: &MatchId) -> Result<ConversationSnapshot, SyncError> {
        match tokio::join!(self.match_meta(id), self.messages(id)) {
            (Ok(meta), Ok(messages)) => Ok(ConversationSnapshot {
                meta: Some(meta),
                messages,
            }),
            (Err(e), Ok(messages)) => {
                warn!(conversation = %id, error = %e, "metadata read failed, merging messages only");
                Ok(ConversationSnapshot {
                    meta: None,
                    messages,
                })
            }
            (Ok(meta), Err(e)) => {
                warn!(conversation = %id, error = %e, "message read failed, merging metadata only");
                Ok(ConversationSnapshot {
                    meta: Some(meta),
                    messages: Vec::new(),
                })
            }
            (Err(e), Err(_)) => Err(e),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let url = format!("{}{path}", self.api_url);
        debug!(url = url, "fetching snapshot");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("{url} returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| SyncError::Fetch(format!("{url} returned an unreadable body: {e}")))
    }
}

/// Deserialize each row on its own so one bad row cannot sink the list.
fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(resource = what, error = %e, "dropping malformed snapshot row");
                None
            }
        })
        .collect()
}

/// One authoritative read the poller can repeat.
pub trait SnapshotSource: Send + Sync + 'static {
    /// What a successful read produces.
    type Snapshot: Send + 'static;

    /// Short label for logs.
    fn describe(&self) -> String;

    /// Perform one read.
    fn fetch(&self) -> impl Future<Output = Result<Self::Snapshot, SyncError>> + Send;
}

/// The global activity list.
#[derive(Debug, Clone)]
pub struct ActivitySource {
    client: SnapshotClient,
    limit: usize,
}

impl ActivitySource {
    /// Read up to `limit` recent events.
    pub const fn new(client: SnapshotClient, limit: usize) -> Self {
        Self { client, limit }
    }
}

impl SnapshotSource for ActivitySource {
    type Snapshot = Vec<Event>;

    fn describe(&self) -> String {
        String::from("activity")
    }

    fn fetch(&self) -> impl Future<Output = Result<Self::Snapshot, SyncError>> + Send {
        self.client.activity(self.limit)
    }
}

/// One conversation's metadata and transcript.
#[derive(Debug, Clone)]
pub struct ConversationSource {
    client: SnapshotClient,
    match_id: MatchId,
}

impl ConversationSource {
    /// Read the conversation `match_id`.
    pub const fn new(client: SnapshotClient, match_id: MatchId) -> Self {
        Self { client, match_id }
    }
}

impl SnapshotSource for ConversationSource {
    type Snapshot = ConversationSnapshot;

    fn describe(&self) -> String {
        format!("match_{}", self.match_id)
    }

    fn fetch(&self) -> impl Future<Output = Result<Self::Snapshot, SyncError>> + Send {
        self.client.conversation(&self.match_id)
    }
}

/// A repeating fetch whose results arrive on a queue.
///
/// Polling stops when the handle is dropped or the receiving side goes away.
#[derive(Debug)]
pub struct SnapshotPoller {
    task: JoinHandle<()>,
}

impl SnapshotPoller {
    /// Fetch from `source` now and then every `interval`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<S: SnapshotSource>(
        source: S,
        interval: Duration,
    ) -> (Self, mpsc::Receiver<S::Snapshot>) {
        let (tx, rx) = mpsc::channel(SNAPSHOT_QUEUE_DEPTH);
        let task = tokio::spawn(poll_loop(source, interval, tx));
        (Self { task }, rx)
    }

    /// Stop polling. Idempotent.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for SnapshotPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop<S: SnapshotSource>(
    source: S,
    interval: Duration,
    tx: mpsc::Sender<S::Snapshot>,
) {
    let label = source.describe();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match source.fetch().await {
            Ok(snapshot) => {
                debug!(resource = label, "snapshot fetched");
                if tx.send(snapshot).await.is_err() {
                    debug!(resource = label, "snapshot consumer gone, stopping poller");
                    return;
                }
            }
            Err(e) => {
                warn!(resource = label, error = %e, "snapshot fetch failed, keeping previous state");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Fails on every odd call, succeeds with the call number otherwise.
    struct Flaky {
        calls: Arc<AtomicU32>,
    }

    impl SnapshotSource for Flaky {
        type Snapshot = u32;

        fn describe(&self) -> String {
            String::from("flaky")
        }

        fn fetch(&self) -> impl Future<Output = Result<u32, SyncError>> + Send {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n % 2 == 1 {
                    Err(SyncError::Fetch(String::from("backend unavailable")))
                } else {
                    Ok(n)
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetches_are_skipped() {
        let calls = Arc::new(AtomicU32::new(0));
        let (_poller, mut rx) = SnapshotPoller::spawn(
            Flaky {
                calls: Arc::clone(&calls),
            },
            Duration::from_secs(10),
        );
        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(4));
        assert!(calls.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_poller_stops_fetching() {
        let calls = Arc::new(AtomicU32::new(0));
        let (poller, mut rx) = SnapshotPoller::spawn(
            Flaky {
                calls: Arc::clone(&calls),
            },
            Duration::from_secs(10),
        );
        assert_eq!(rx.recv().await, Some(0));
        drop(poller);
        assert_eq!(rx.recv().await, None);
        let seen = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn bad_rows_are_dropped_individually() {
        let rows = vec![
            serde_json::json!({"type": "like", "id": "a"}),
            serde_json::json!({"type": "like"}),
            serde_json::json!({"type": "match", "id": "b"}),
        ];
        let events: Vec<Event> = parse_rows(rows, "activity");
        assert_eq!(events.len(), 2);
    }
}
