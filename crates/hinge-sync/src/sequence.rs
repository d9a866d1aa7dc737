//! Ordered, deduplicated, optionally bounded event sequence.
//!
//! Entries are `Arc<Event>`: the same allocation a channel fanned out, so an
//! entry that survives an update is pointer-equal to its previous self and
//! renderers can diff by identity.
//!
//! Two orders exist:
//!
//! - **Newest first, bounded** (activity feed). Pushed events go to the
//!   head and overflow is evicted from the tail. Fetched events are placed
//!   by timestamp and only fill free capacity.
//! - **Oldest first, unbounded** (conversation transcript). Every insert
//!   lands after the last entry whose timestamp is not later than its own,
//!   so in-order delivery appends and a late arrival slots into place.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hinge_types::{Event, EventId};
use tracing::debug;

/// Ordering and bound of a [`MergedSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOrder {
    /// Head is the most recent insertion; at most `capacity` entries.
    NewestFirst {
        /// Maximum number of entries kept.
        capacity: usize,
    },
    /// Ascending by timestamp, arrival order for ties; unbounded.
    OldestFirst,
}

/// The merged view of pushed and fetched events.
#[derive(Debug, Clone)]
pub struct MergedSequence {
    order: SequenceOrder,
    entries: VecDeque<Arc<Event>>,
    ids: HashSet<EventId>,
}

impl MergedSequence {
    /// An empty feed-style sequence holding at most `capacity` entries.
    pub fn newest_first(capacity: usize) -> Self {
        Self::new(SequenceOrder::NewestFirst {
            capacity: capacity.max(1),
        })
    }

    /// An empty transcript-style sequence.
    pub fn oldest_first() -> Self {
        Self::new(SequenceOrder::OldestFirst)
    }

    fn new(order: SequenceOrder) -> Self {
        Self {
            order,
            entries: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// Insert a pushed event. Returns `false` for a duplicate.
    ///
    /// An event evicted immediately by the capacity bound still counts as a
    /// change only if something else moved.
    pub fn ingest(&mut self, event: Arc<Event>) -> bool {
        if self.ids.contains(event.id()) {
            debug!(id = %event.id(), "duplicate event ignored");
            return false;
        }
        self.ids.insert(event.id().clone());
        match self.order {
            SequenceOrder::NewestFirst { .. } => self.entries.push_front(event),
            SequenceOrder::OldestFirst => {
                let at = self.ascending_slot(event.timestamp());
                self.entries.insert(at, event);
            }
        }
        self.evict();
        true
    }

    /// Merge events read from a snapshot. Returns whether the sequence changed.
    ///
    /// Fetched events are placed by their own timestamp, never blindly at
    /// the head. Entries already present are left exactly where they are,
    /// and a full feed is never made to give one up: fetched events only
    /// take free capacity.
    pub fn merge_fetched<I>(&mut self, events: I) -> bool
    where
        I: IntoIterator<Item = Arc<Event>>,
    {
        let mut fetched: HashSet<EventId> = HashSet::new();
        for event in events {
            if !self.ids.insert(event.id().clone()) {
                continue;
            }
            let at = match self.order {
                SequenceOrder::NewestFirst { .. } => self.descending_slot(event.timestamp()),
                SequenceOrder::OldestFirst => self.ascending_slot(event.timestamp()),
            };
            fetched.insert(event.id().clone());
            self.entries.insert(at, event);
        }
        self.evict_fetched(&mut fetched);
        !fetched.is_empty()
    }

    /// Drop tail entries beyond the capacity bound.
    fn evict(&mut self) {
        let SequenceOrder::NewestFirst { capacity } = self.order else {
            return;
        };
        while self.entries.len() > capacity {
            if let Some(evicted) = self.entries.pop_back() {
                self.ids.remove(evicted.id());
                debug!(id = %evicted.id(), "evicted oldest entry");
            }
        }
    }

    /// Drop the oldest of the just-fetched entries until the bound holds.
    fn evict_fetched(&mut self, fetched: &mut HashSet<EventId>) {
        let SequenceOrder::NewestFirst { capacity } = self.order else {
            return;
        };
        while self.entries.len() > capacity {
            let Some(at) = self
                .entries
                .iter()
                .rposition(|e| fetched.contains(e.id()))
            else {
                break;
            };
            if let Some(evicted) = self.entries.remove(at) {
                fetched.remove(evicted.id());
                self.ids.remove(evicted.id());
                debug!(id = %evicted.id(), "fetched entry does not fit");
            }
        }
    }

    /// Slot after the last timestamped entry not later than `ts`.
    ///
    /// Untimestamped events append. Untimestamped entries are skipped when
    /// placing a timestamped one.
    fn ascending_slot(&self, ts: Option<DateTime<Utc>>) -> usize {
        let Some(ts) = ts else {
            return self.entries.len();
        };
        self.entries
            .iter()
            .rposition(|e| e.timestamp().is_some_and(|t| t <= ts))
            .map_or(0, |i| i.saturating_add(1))
    }

    /// Slot before the first entry strictly older than `ts`.
    fn descending_slot(&self, ts: Option<DateTime<Utc>>) -> usize {
        let Some(ts) = ts else {
            return self.entries.len();
        };
        self.entries
            .iter()
            .position(|e| e.timestamp().is_some_and(|t| t < ts))
            .unwrap_or(self.entries.len())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an event with `id` is present.
    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    /// Entries in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.entries.iter()
    }

    /// Shallow copy of the entries (pointer copies only).
    pub fn to_vec(&self) -> Vec<Arc<Event>> {
        self.entries.iter().cloned().collect()
    }

    /// Ordering and bound.
    pub const fn order(&self) -> SequenceOrder {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use hinge_types::{LikeEvent, MessageEvent};

    use super::*;

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(secs, 0).single()
    }

    fn like(id: &str, secs: i64) -> Arc<Event> {
        Arc::new(Event::Like(LikeEvent {
            id: EventId::from(id),
            timestamp: at(secs),
            sender_id: None,
            receiver_id: None,
            sender_name: None,
            receiver_name: None,
            status: None,
        }))
    }

    fn message(id: &str, ts: Option<DateTime<Utc>>) -> Arc<Event> {
        Arc::new(Event::Message(MessageEvent {
            id: EventId::from(id),
            timestamp: ts,
            match_id: None,
            agent_id: None,
            agent_name: None,
            content: String::from("hello"),
        }))
    }

    fn ids(seq: &MergedSequence) -> Vec<String> {
        seq.iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn duplicate_ingest_is_a_no_op() {
        let mut feed = MergedSequence::newest_first(50);
        assert!(feed.ingest(like("a", 1)));
        assert!(!feed.ingest(like("a", 1)));
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn feed_keeps_the_fifty_most_recent_insertions() {
        let mut feed = MergedSequence::newest_first(50);
        for i in 0..60 {
            feed.ingest(like(&format!("e{i}"), i));
        }
        assert_eq!(feed.len(), 50);
        let expected: Vec<String> = (10..60).rev().map(|i| format!("e{i}")).collect();
        assert_eq!(ids(&feed), expected);
        assert!(!feed.contains(&EventId::from("e9")));
        // An evicted id may come back as a fresh insertion.
        assert!(feed.ingest(like("e9", 9)));
    }

    #[test]
    fn pushed_feed_events_go_to_the_head_regardless_of_timestamp() {
        let mut feed = MergedSequence::newest_first(10);
        feed.ingest(like("new", 100));
        feed.ingest(like("late", 5));
        assert_eq!(ids(&feed), vec!["late", "new"]);
    }

    #[test]
    fn fetched_feed_events_are_placed_by_timestamp() {
        let mut feed = MergedSequence::newest_first(10);
        feed.ingest(like("t10", 10));
        feed.ingest(like("t30", 30));
        let changed = feed.merge_fetched(vec![like("t20", 20), like("t30", 30), like("t40", 40)]);
        assert!(changed);
        assert_eq!(ids(&feed), vec!["t40", "t30", "t20", "t10"]);
    }

    #[test]
    fn fetched_events_that_fall_off_the_tail_are_not_a_change() {
        let mut feed = MergedSequence::newest_first(2);
        feed.ingest(like("t10", 10));
        feed.ingest(like("t20", 20));
        assert!(!feed.merge_fetched(vec![like("t1", 1)]));
        assert_eq!(ids(&feed), vec!["t20", "t10"]);
        assert!(!feed.merge_fetched(vec![like("t20", 20)]));
    }

    #[test]
    fn snapshot_into_a_full_feed_keeps_every_pushed_entry() {
        let mut feed = MergedSequence::newest_first(3);
        feed.ingest(like("p1", 1));
        feed.ingest(like("p2", 2));
        feed.ingest(like("p3", 3));
        let before = feed.to_vec();

        assert!(!feed.merge_fetched(vec![like("s1", 100)]));
        assert_eq!(ids(&feed), vec!["p3", "p2", "p1"]);
        assert!(
            before
                .iter()
                .zip(feed.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b))
        );
        // A row that did not fit can arrive again later.
        assert!(!feed.contains(&EventId::from("s1")));
    }

    #[test]
    fn snapshot_fills_only_the_free_capacity() {
        let mut feed = MergedSequence::newest_first(3);
        feed.ingest(like("p1", 10));
        assert!(feed.merge_fetched(vec![like("s3", 30), like("s2", 20), like("s0", 5)]));
        assert_eq!(ids(&feed), vec!["s3", "s2", "p1"]);
    }

    #[test]
    fn transcript_orders_by_time_despite_jitter() {
        let mut chat = MergedSequence::oldest_first();
        chat.ingest(message("m2", at(2)));
        chat.ingest(message("m1", at(1)));
        chat.ingest(message("m3", at(3)));
        assert_eq!(ids(&chat), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn transcript_ties_keep_arrival_order_and_untimestamped_append() {
        let mut chat = MergedSequence::oldest_first();
        chat.ingest(message("a", at(5)));
        chat.ingest(message("b", at(5)));
        chat.ingest(message("x", None));
        chat.ingest(message("c", at(4)));
        assert_eq!(ids(&chat), vec!["c", "a", "b", "x"]);
    }

    #[test]
    fn untimestamped_entry_does_not_pin_later_arrivals() {
        let mut chat = MergedSequence::oldest_first();
        chat.ingest(message("a", at(5)));
        chat.ingest(message("x", None));
        chat.ingest(message("c", at(3)));
        chat.ingest(message("d", at(4)));
        chat.merge_fetched(vec![message("b", at(2))]);
        assert_eq!(ids(&chat), vec!["b", "c", "d", "a", "x"]);
    }

    #[test]
    fn late_duplicate_in_transcript_is_a_no_op() {
        let mut chat = MergedSequence::oldest_first();
        chat.ingest(message("m1", at(1)));
        chat.ingest(message("m2", at(2)));
        assert!(!chat.ingest(message("m1", at(1))));
        assert!(!chat.merge_fetched(vec![message("m1", at(1)), message("m2", at(2))]));
        assert_eq!(ids(&chat), vec!["m1", "m2"]);
    }

    #[test]
    fn surviving_entries_keep_their_identity() {
        let mut feed = MergedSequence::newest_first(3);
        feed.ingest(like("a", 1));
        feed.ingest(like("b", 2));
        let before = feed.to_vec();
        feed.ingest(like("c", 3));
        feed.ingest(like("d", 4));
        let after = feed.to_vec();
        // "b" survived and is the very same allocation.
        let b_before = before.iter().find(|e| e.id().as_str() == "b");
        let b_after = after.iter().find(|e| e.id().as_str() == "b");
        assert!(matches!((b_before, b_after), (Some(x), Some(y)) if Arc::ptr_eq(x, y)));
    }
}
