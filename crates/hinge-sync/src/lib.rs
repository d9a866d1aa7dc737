//! Live update synchronization for the Agentic Hinge observer.
//!
//! Keeps client-side views of the activity feed and of individual
//! conversations current while the backend pushes events, and corrects
//! them with periodic authoritative reads. Rendering layers observe views
//! and never talk to the network themselves.
//!
//! - **Channels** ([`channel`]): one `WebSocket` per topic with bounded
//!   exponential reconnect ([`backoff`]) and an `unreachable` state once the
//!   retry budget is spent.
//! - **Pool** ([`pool`]): reference-counted sharing of one channel per topic.
//! - **Snapshots** ([`snapshot`]): REST reads on a fixed cadence.
//! - **Reconciliation** ([`reconcile`], [`sequence`], [`status`]): dedup,
//!   ordering, capacity and the authoritative/derived status rule.
//! - **Views** ([`view`]): immutable, versioned views behind a close gate.
//! - **Sessions** ([`live`]): the wiring of all of the above.
//!
//! # Architecture
//!
//! Each [`LiveSession`] owns one pump task that is the single writer of
//! its reconciler. Channels and pollers feed the pump over queues, so no
//! state is ever written from two places. Transport and fetch failures are
//! logged and folded into connectivity state; they never reach a view.

pub mod backoff;
pub mod channel;
pub mod config;
pub mod error;
pub mod live;
pub mod pool;
pub mod reconcile;
pub mod sequence;
pub mod snapshot;
pub mod status;
pub mod view;

// Re-export primary types for convenience.
pub use channel::{ChannelConnection, ChannelStatus, ChannelSubscription, ChannelUpdate};
pub use config::SyncConfig;
pub use error::SyncError;
pub use live::{LiveConversation, LiveFeed, LiveSession};
pub use pool::{ChannelLease, ChannelPool};
pub use reconcile::{ConversationReconciler, FeedReconciler, Reconciler};
pub use sequence::MergedSequence;
pub use snapshot::{SnapshotClient, SnapshotPoller, SnapshotSource};
pub use status::ExposedStatus;
pub use view::{ConversationView, FeedView, ViewPublisher, ViewSubscription};
