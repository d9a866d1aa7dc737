//! Live sessions: one channel lease, one poller, one pump, one view.
//!
//! The pump task is the only writer of its reconciler. It waits on the
//! channel (events and connectivity) and the snapshot queue at once, applies
//! whatever arrives, and publishes a new view only when something changed.
//!
//! ```text
//!   ChannelConnection ──events/status──┐
//!                                      ├──▶ pump ──▶ Reconciler ──▶ ViewPublisher ──▶ subscribers
//!   SnapshotPoller ──────snapshots─────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use hinge_types::{MatchId, Topic};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{ChannelSubscription, ChannelUpdate};
use crate::pool::{ChannelLease, ChannelPool};
use crate::reconcile::{ConversationReconciler, FeedReconciler, Reconciler};
use crate::snapshot::{
    ActivitySource, ConversationSource, SnapshotClient, SnapshotPoller, SnapshotSource,
};
use crate::view::{ViewContext, ViewPublisher, ViewSubscription};

/// The live activity feed.
pub type LiveFeed = LiveSession<FeedReconciler>;

/// One live conversation.
pub type LiveConversation = LiveSession<ConversationReconciler>;

/// A running synchronization of one resource.
///
/// Dropping the session tears it down as [`close`](Self::close) does.
#[derive(Debug)]
pub struct LiveSession<R: Reconciler> {
    topic: Topic,
    publisher: Arc<ViewPublisher<R::View>>,
    pump: JoinHandle<()>,
    poller: SnapshotPoller,
    lease: Option<ChannelLease>,
}

impl LiveSession<FeedReconciler> {
    /// Follow the global activity feed.
    ///
    /// Populated from the activity list right away, then kept current by
    /// the feed channel and periodic re-reads. Must be called from within a
    /// Tokio runtime.
    pub fn start(pool: &ChannelPool, client: SnapshotClient) -> Self {
        let feed = &pool.config().feed;
        Self::spawn(
            pool,
            Topic::Feed,
            FeedReconciler::new(feed.capacity),
            ActivitySource::new(client, feed.capacity),
            feed.poll_interval(),
        )
    }
}

impl LiveSession<ConversationReconciler> {
    /// Follow one conversation's transcript and status.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(pool: &ChannelPool, client: SnapshotClient, match_id: MatchId) -> Self {
        let conversation = &pool.config().conversation;
        Self::spawn(
            pool,
            Topic::Match(match_id.clone()),
            ConversationReconciler::new(
                match_id.clone(),
                conversation.heating_threshold,
                conversation.sticky_terminal_status,
            ),
            ConversationSource::new(client, match_id),
            conversation.poll_interval(),
        )
    }
}

impl<R: Reconciler> LiveSession<R> {
    fn spawn<S>(
        pool: &ChannelPool,
        topic: Topic,
        reconciler: R,
        source: S,
        poll_interval: Duration,
    ) -> Self
    where
        S: SnapshotSource<Snapshot = R::Snapshot>,
    {
        let lease = pool.acquire(topic.clone());
        // Subscribe before the first fetch so nothing falls between them.
        let mut channel = lease.subscribe();
        let context = ViewContext {
            connection: channel.status(),
            last_event_at: channel.last_event_at(),
            version: 0,
        };
        let publisher = Arc::new(ViewPublisher::new(reconciler.view(context)));
        let (poller, snapshots) = SnapshotPoller::spawn(source, poll_interval);
        let pump = tokio::spawn(pump(
            reconciler,
            channel,
            snapshots,
            Arc::clone(&publisher),
            context,
        ));

        info!(topic = %topic, "live session started");
        Self {
            topic,
            publisher,
            pump,
            poller,
            lease: Some(lease),
        }
    }

    /// The topic this session follows.
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// The latest view.
    pub fn current(&self) -> Arc<R::View> {
        self.publisher.current()
    }

    /// A handle that observes every published view.
    pub fn subscribe(&self) -> ViewSubscription<R::View> {
        self.publisher.subscribe()
    }

    /// Whether the session has been closed.
    pub const fn is_closed(&self) -> bool {
        self.lease.is_none()
    }

    /// Stop the session. Idempotent.
    ///
    /// The view is frozen first, so once this returns no subscriber can
    /// observe another change. Then the pump and poller stop and the channel
    /// lease is released.
    pub fn close(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        self.publisher.close();
        self.pump.abort();
        self.poller.stop();
        drop(lease);
        info!(topic = %self.topic, "live session closed");
    }
}

impl<R: Reconciler> Drop for LiveSession<R> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Apply channel input and snapshots until the view is closed.
async fn pump<R: Reconciler>(
    mut reconciler: R,
    mut channel: ChannelSubscription,
    mut snapshots: mpsc::Receiver<R::Snapshot>,
    publisher: Arc<ViewPublisher<R::View>>,
    mut context: ViewContext,
) {
    let mut channel_live = true;
    let mut polling = true;
    loop {
        let changed = tokio::select! {
            update = channel.next(), if channel_live => match update {
                Some(ChannelUpdate::Event(event)) => {
                    context.last_event_at = channel.last_event_at();
                    reconciler.ingest(event)
                }
                Some(ChannelUpdate::Status(status)) => {
                    let changed = status != context.connection;
                    context.connection = status;
                    changed
                }
                None => {
                    debug!(topic = %channel.topic(), "channel gone, continuing on snapshots");
                    channel_live = false;
                    false
                }
            },
            snapshot = snapshots.recv(), if polling => match snapshot {
                Some(snapshot) => reconciler.apply_snapshot(snapshot),
                None => {
                    polling = false;
                    false
                }
            },
            else => return,
        };

        if changed {
            context.version = context.version.saturating_add(1);
            if !publisher.publish(reconciler.view(context)) {
                return;
            }
        }
    }
}
