//! Reconciliation of pushed events with authoritative snapshots.
//!
//! A [`Reconciler`] is owned by exactly one task and is the only writer of
//! its state. Both inputs report whether they changed anything so the owner
//! publishes only real changes.

use std::sync::Arc;

use hinge_types::{ConversationSnapshot, Event, MatchId, MatchSnapshot};
use tracing::{debug, warn};

use crate::sequence::MergedSequence;
use crate::status::{ExposedStatus, StatusTracker, expose};
use crate::view::{ConversationView, FeedView, ViewContext};

/// Merges one resource's pushed events and snapshots into a view.
pub trait Reconciler: Send + 'static {
    /// What the resource's snapshot fetch produces.
    type Snapshot: Send + 'static;
    /// What consumers observe.
    type View: std::fmt::Debug + Send + Sync + 'static;

    /// Apply one pushed event; returns whether the state changed.
    fn ingest(&mut self, event: Arc<Event>) -> bool;

    /// Apply one snapshot; returns whether the state changed.
    ///
    /// Never removes or reorders entries already present.
    fn apply_snapshot(&mut self, snapshot: Self::Snapshot) -> bool;

    /// Render the current state.
    fn view(&self, context: ViewContext) -> Self::View;
}

// ---------------------------------------------------------------------------
// Activity feed
// ---------------------------------------------------------------------------

/// The global feed: newest first, bounded.
#[derive(Debug, Clone)]
pub struct FeedReconciler {
    entries: MergedSequence,
}

impl FeedReconciler {
    /// An empty feed holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: MergedSequence::newest_first(capacity),
        }
    }

    /// The merged entries.
    pub const fn entries(&self) -> &MergedSequence {
        &self.entries
    }
}

impl Reconciler for FeedReconciler {
    type Snapshot = Vec<Event>;
    type View = FeedView;

    fn ingest(&mut self, event: Arc<Event>) -> bool {
        if matches!(*event, Event::Status(_)) {
            debug!(id = %event.id(), "status event ignored by feed");
            return false;
        }
        self.entries.ingest(event)
    }

    fn apply_snapshot(&mut self, snapshot: Vec<Event>) -> bool {
        self.entries.merge_fetched(
            snapshot
                .into_iter()
                .filter(|event| !matches!(event, Event::Status(_)))
                .map(Arc::new),
        )
    }

    fn view(&self, context: ViewContext) -> FeedView {
        FeedView {
            entries: self.entries.to_vec(),
            connection: context.connection,
            last_event_at: context.last_event_at,
            version: context.version,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// One conversation: transcript oldest first, plus status and metadata.
#[derive(Debug, Clone)]
pub struct ConversationReconciler {
    match_id: MatchId,
    messages: MergedSequence,
    meta: Option<MatchSnapshot>,
    status: StatusTracker,
    heating_threshold: usize,
}

impl ConversationReconciler {
    /// An empty conversation.
    pub fn new(match_id: MatchId, heating_threshold: usize, sticky_terminal: bool) -> Self {
        Self {
            match_id,
            messages: MergedSequence::oldest_first(),
            meta: None,
            status: StatusTracker::new(sticky_terminal),
            heating_threshold,
        }
    }

    /// The conversation this reconciler tracks.
    pub const fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    /// The merged transcript.
    pub const fn messages(&self) -> &MergedSequence {
        &self.messages
    }

    /// Current status label and its origin.
    pub fn status(&self) -> ExposedStatus {
        expose(
            self.status.current(),
            self.messages.len(),
            self.heating_threshold,
        )
    }

    fn is_foreign(&self, match_id: Option<&MatchId>) -> bool {
        match_id.is_some_and(|id| *id != self.match_id)
    }
}

impl Reconciler for ConversationReconciler {
    type Snapshot = ConversationSnapshot;
    type View = ConversationView;

    fn ingest(&mut self, event: Arc<Event>) -> bool {
        if self.is_foreign(event.match_id()) {
            debug!(
                conversation = %self.match_id,
                id = %event.id(),
                "event for another conversation ignored"
            );
            return false;
        }
        match &*event {
            Event::Status(update) => self.status.report(update.status),
            Event::Message(_) => self.messages.ingest(Arc::clone(&event)),
            // A match event about this conversation carries its status.
            Event::Match(update) if update.id.as_str() == self.match_id.as_str() => {
                self.status.report(update.status)
            }
            Event::Match(_) | Event::Like(_) => {
                debug!(
                    conversation = %self.match_id,
                    kind = %event.kind(),
                    "event kind not shown in a conversation"
                );
                false
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: ConversationSnapshot) -> bool {
        let ConversationSnapshot { meta, messages } = snapshot;
        if let Some(meta) = meta.as_ref().filter(|meta| meta.id != self.match_id) {
            warn!(
                conversation = %self.match_id,
                snapshot = %meta.id,
                "snapshot for another conversation discarded"
            );
            return false;
        }

        let (status_changed, meta_changed) = match meta {
            Some(meta) => {
                let status_changed = self.status.report(meta.status);
                let meta_changed = self.meta.as_ref() != Some(&meta);
                if meta_changed {
                    self.meta = Some(meta);
                }
                (status_changed, meta_changed)
            }
            None => (false, false),
        };

        let own: Vec<Arc<Event>> = messages
            .into_iter()
            .filter(|message| !self.is_foreign(message.match_id.as_ref()))
            .map(|message| Arc::new(Event::Message(message)))
            .collect();
        let messages_changed = self.messages.merge_fetched(own);

        status_changed || meta_changed || messages_changed
    }

    fn view(&self, context: ViewContext) -> ConversationView {
        ConversationView {
            match_id: self.match_id.clone(),
            messages: self.messages.to_vec(),
            meta: self.meta.clone(),
            status: self.status(),
            connection: context.connection,
            last_event_at: context.last_event_at,
            version: context.version,
        }
    }
}
