//! Observable views for rendering layers.
//!
//! A [`ViewPublisher`] holds the latest view behind a closed gate; any
//! number of [`ViewSubscription`]s read it and wait for changes. Views are
//! immutable once published and handed out as `Arc`s, so a renderer can hold
//! one across awaits without blocking the writer.
//!
//! The gate lives inside the watched value and is checked under the watch
//! channel's own lock. Once [`ViewPublisher::close`] returns, no later
//! publish can become visible to any subscriber.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hinge_types::{AgentId, Event, MatchId, MatchSnapshot};
use tokio::sync::watch;

use crate::channel::ChannelStatus;
use crate::status::ExposedStatus;

#[derive(Debug)]
struct Gated<V> {
    view: Arc<V>,
    closed: bool,
}

/// Single-writer side of an observable view.
#[derive(Debug)]
pub struct ViewPublisher<V> {
    tx: watch::Sender<Gated<V>>,
}

impl<V> ViewPublisher<V> {
    /// Start with `initial` as the current view.
    pub fn new(initial: V) -> Self {
        let (tx, _) = watch::channel(Gated {
            view: Arc::new(initial),
            closed: false,
        });
        Self { tx }
    }

    /// Replace the current view and wake subscribers.
    ///
    /// Returns `false` (and discards `view`) once the publisher is closed.
    pub fn publish(&self, view: V) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.closed {
                return false;
            }
            slot.view = Arc::new(view);
            true
        })
    }

    /// Stop accepting publishes. Idempotent; subscribers are not woken.
    pub fn close(&self) {
        self.tx.send_if_modified(|slot| {
            slot.closed = true;
            false
        });
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }

    /// The current view.
    pub fn current(&self) -> Arc<V> {
        Arc::clone(&self.tx.borrow().view)
    }

    /// A new consumer handle; the current view counts as seen.
    pub fn subscribe(&self) -> ViewSubscription<V> {
        ViewSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// Consumer side of an observable view. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ViewSubscription<V> {
    rx: watch::Receiver<Gated<V>>,
}

impl<V> Clone for ViewSubscription<V> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<V> ViewSubscription<V> {
    /// The latest view, without marking it seen.
    pub fn current(&self) -> Arc<V> {
        Arc::clone(&self.rx.borrow().view)
    }

    /// Wait until a view newer than the last one seen is published.
    ///
    /// Returns `None` once the publisher is gone. Cancel-safe.
    pub async fn changed(&mut self) -> Option<Arc<V>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update().view))
    }

    /// Wait until the view satisfies `predicate`, checking the current one first.
    ///
    /// Returns `None` if the publisher goes away first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<Arc<V>>
    where
        F: FnMut(&V) -> bool,
    {
        let slot = self.rx.wait_for(|slot| predicate(&slot.view)).await.ok()?;
        Some(Arc::clone(&slot.view))
    }
}

/// Connectivity and bookkeeping shared by every view kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewContext {
    /// Channel connectivity.
    pub connection: ChannelStatus,
    /// Wall-clock time of the last pushed event.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Incremented once per published change.
    pub version: u64,
}

/// The global activity feed, newest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedView {
    /// At most the configured capacity of recent events.
    pub entries: Vec<Arc<Event>>,
    /// Channel connectivity.
    pub connection: ChannelStatus,
    /// Wall-clock time of the last pushed event.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Incremented once per published change.
    pub version: u64,
}

/// One conversation, oldest message first.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationView {
    /// The conversation shown.
    pub match_id: MatchId,
    /// Messages in display order.
    pub messages: Vec<Arc<Event>>,
    /// Last metadata snapshot, if one has been read.
    pub meta: Option<MatchSnapshot>,
    /// Status label and its origin.
    pub status: ExposedStatus,
    /// Channel connectivity.
    pub connection: ChannelStatus,
    /// Wall-clock time of the last pushed event.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Incremented once per published change.
    pub version: u64,
}

impl ConversationView {
    /// The two participants, once metadata has been read.
    pub fn participants(&self) -> (Option<&AgentId>, Option<&AgentId>) {
        self.meta.as_ref().map_or((None, None), |meta| {
            (meta.agent1_id.as_ref(), meta.agent2_id.as_ref())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_published_views() {
        let publisher = ViewPublisher::new(0_u32);
        let mut subscription = publisher.subscribe();
        assert!(publisher.publish(1));
        assert_eq!(subscription.changed().await.as_deref(), Some(&1));
        assert_eq!(*subscription.current(), 1);
    }

    #[tokio::test]
    async fn nothing_is_published_after_close() {
        let publisher = ViewPublisher::new(0_u32);
        let mut subscription = publisher.subscribe();
        publisher.close();
        publisher.close();
        assert!(publisher.is_closed());
        assert!(!publisher.publish(7));
        assert_eq!(*publisher.current(), 0);

        let woke = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            subscription.changed(),
        )
        .await;
        assert!(woke.is_err());
    }

    #[tokio::test]
    async fn changed_returns_none_when_the_publisher_is_dropped() {
        let publisher = ViewPublisher::new(0_u32);
        let mut subscription = publisher.subscribe();
        drop(publisher);
        assert_eq!(subscription.changed().await, None);
        assert_eq!(*subscription.current(), 0);
    }

    #[tokio::test]
    async fn wait_for_checks_the_current_view_first() {
        let publisher = ViewPublisher::new(5_u32);
        let mut subscription = publisher.subscribe();
        let view = subscription.wait_for(|v| *v >= 5).await;
        assert_eq!(view.as_deref(), Some(&5));
    }

    #[test]
    fn current_view_is_shared_not_copied() {
        let publisher = ViewPublisher::new(String::from("feed"));
        let subscription = publisher.subscribe();
        assert!(Arc::ptr_eq(&publisher.current(), &subscription.current()));
    }

    #[test]
    fn participants_come_from_metadata() {
        let mut view = ConversationView {
            match_id: MatchId::from("m"),
            messages: Vec::new(),
            meta: None,
            status: crate::status::expose(hinge_types::MatchStatus::Unknown, 0, 10),
            connection: ChannelStatus::default(),
            last_event_at: None,
            version: 0,
        };
        assert_eq!(view.participants(), (None, None));
        view.meta = Some(MatchSnapshot {
            id: MatchId::from("m"),
            agent1_id: Some(AgentId::from("a")),
            agent2_id: Some(AgentId::from("b")),
            compatibility_score: None,
            status: hinge_types::MatchStatus::Active,
            created_at: None,
        });
        let (a, b) = view.participants();
        assert_eq!(a.map(AgentId::as_str), Some("a"));
        assert_eq!(b.map(AgentId::as_str), Some("b"));
    }
}
