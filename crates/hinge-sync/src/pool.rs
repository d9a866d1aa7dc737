//! Reference-counted sharing of channel connections.
//!
//! Several views of the same topic share one transport. The pool hands out
//! [`ChannelLease`]s; the connection lives as long as at least one lease
//! does and is closed when the last one is dropped.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use hinge_types::Topic;
use tracing::{debug, info};

use crate::channel::ChannelConnection;
use crate::config::SyncConfig;

type Registry = HashMap<Topic, Weak<ChannelConnection>>;

/// Shared registry of open channels, one per topic.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct ChannelPool {
    config: Arc<SyncConfig>,
    registry: Arc<Mutex<Registry>>,
}

impl ChannelPool {
    /// An empty pool whose connections use `config`.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The configuration connections are opened with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Share the live connection for `topic`, opening one if needed.
    ///
    /// A connection that has gone `unreachable` or `closed` is not handed out
    /// again; a fresh one replaces it for new lessees while existing lessees
    /// keep the old one until they let go. Must be called from within a
    /// Tokio runtime.
    pub fn acquire(&self, topic: Topic) -> ChannelLease {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = registry.get(&topic).and_then(Weak::upgrade) {
            if existing.state().is_final() {
                info!(topic = %topic, state = %existing.state(), "replacing dead channel");
            } else {
                debug!(
                    topic = %topic,
                    leases = Arc::strong_count(&existing),
                    "sharing existing channel"
                );
                return self.lease(existing);
            }
        }

        let connection = Arc::new(ChannelConnection::open(topic.clone(), &self.config));
        registry.insert(topic, Arc::downgrade(&connection));
        drop(registry);
        self.lease(connection)
    }

    fn lease(&self, connection: Arc<ChannelConnection>) -> ChannelLease {
        ChannelLease {
            connection,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Live leases on the current connection for `topic`.
    pub fn ref_count(&self, topic: &Topic) -> usize {
        let Ok(registry) = self.registry.lock() else {
            return 0;
        };
        registry.get(topic).map_or(0, Weak::strong_count)
    }

    /// Topics with at least one live lease, sorted.
    pub fn active_topics(&self) -> Vec<Topic> {
        let Ok(mut registry) = self.registry.lock() else {
            return Vec::new();
        };
        registry.retain(|_, connection| connection.strong_count() > 0);
        let mut topics: Vec<Topic> = registry.keys().cloned().collect();
        topics.sort();
        topics
    }
}

/// A share of one pooled connection.
///
/// Dereferences to the [`ChannelConnection`]. Dropping the last lease for a
/// connection closes it.
#[derive(Debug)]
pub struct ChannelLease {
    connection: Arc<ChannelConnection>,
    registry: Weak<Mutex<Registry>>,
}

impl Deref for ChannelLease {
    type Target = ChannelConnection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        // Upgrades happen under this lock, so a count of one is final.
        if Arc::strong_count(&self.connection) != 1 {
            return;
        }
        let topic = self.connection.topic();
        let ours = registry
            .get(topic)
            .is_some_and(|weak| weak.as_ptr() == Arc::as_ptr(&self.connection));
        if ours {
            registry.remove(topic);
        }
        debug!(topic = %topic, "last lease released");
    }
}
