//! Conversation status: authoritative when the server says so, derived otherwise.

use hinge_types::{ConversationStatus, MatchStatus, StatusSource};
use serde::Serialize;
use tracing::debug;

/// The status a view shows, with where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExposedStatus {
    /// Label to render.
    pub status: ConversationStatus,
    /// Whether the server reported it or it was computed locally.
    pub source: StatusSource,
}

/// Status implied by message volume alone.
pub const fn derive_status(message_count: usize, heating_threshold: usize) -> ConversationStatus {
    if message_count == 0 {
        ConversationStatus::Waiting
    } else if message_count > heating_threshold {
        ConversationStatus::HeatingUp
    } else {
        ConversationStatus::Active
    }
}

/// Combine the last authoritative status with the derived one.
///
/// Only terminal statuses override the derivation.
pub const fn expose(
    authoritative: MatchStatus,
    message_count: usize,
    heating_threshold: usize,
) -> ExposedStatus {
    match authoritative {
        MatchStatus::Ghosted => ExposedStatus {
            status: ConversationStatus::Ghosted,
            source: StatusSource::Authoritative,
        },
        MatchStatus::Unmatched => ExposedStatus {
            status: ConversationStatus::Unmatched,
            source: StatusSource::Authoritative,
        },
        MatchStatus::Pending
        | MatchStatus::Active
        | MatchStatus::Committed
        | MatchStatus::Unknown => ExposedStatus {
            status: derive_status(message_count, heating_threshold),
            source: StatusSource::Derived,
        },
    }
}

/// Last authoritative status reported for one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTracker {
    current: MatchStatus,
    sticky_terminal: bool,
}

impl StatusTracker {
    /// Nothing reported yet.
    pub const fn new(sticky_terminal: bool) -> Self {
        Self {
            current: MatchStatus::Unknown,
            sticky_terminal,
        }
    }

    /// The last accepted status.
    pub const fn current(&self) -> MatchStatus {
        self.current
    }

    /// Record a reported status; returns whether it changed.
    ///
    /// `Unknown` carries no information and is ignored. With sticky
    /// terminals, a non-terminal report cannot revert `ghosted` or
    /// `unmatched`; another terminal status still replaces it.
    pub fn report(&mut self, reported: MatchStatus) -> bool {
        if reported == self.current || reported == MatchStatus::Unknown {
            return false;
        }
        if self.sticky_terminal && self.current.is_terminal() && !reported.is_terminal() {
            debug!(
                current = %self.current,
                reported = %reported,
                "ignoring non-terminal status after terminal"
            );
            return false;
        }
        self.current = reported;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_follows_message_volume() {
        assert_eq!(derive_status(0, 10), ConversationStatus::Waiting);
        assert_eq!(derive_status(1, 10), ConversationStatus::Active);
        assert_eq!(derive_status(10, 10), ConversationStatus::Active);
        assert_eq!(derive_status(11, 10), ConversationStatus::HeatingUp);
    }

    #[test]
    fn terminal_status_overrides_derivation() {
        let exposed = expose(MatchStatus::Ghosted, 3, 10);
        assert_eq!(exposed.status, ConversationStatus::Ghosted);
        assert_eq!(exposed.source, StatusSource::Authoritative);

        let exposed = expose(MatchStatus::Unmatched, 11, 10);
        assert_eq!(exposed.status, ConversationStatus::Unmatched);

        let exposed = expose(MatchStatus::Active, 11, 10);
        assert_eq!(exposed.status, ConversationStatus::HeatingUp);
        assert_eq!(exposed.source, StatusSource::Derived);
    }

    #[test]
    fn sticky_terminal_survives_stale_reports() {
        let mut tracker = StatusTracker::new(true);
        assert!(tracker.report(MatchStatus::Active));
        assert!(tracker.report(MatchStatus::Ghosted));
        assert!(!tracker.report(MatchStatus::Active));
        assert_eq!(tracker.current(), MatchStatus::Ghosted);
        assert!(tracker.report(MatchStatus::Unmatched));
        assert!(!tracker.report(MatchStatus::Unmatched));
    }

    #[test]
    fn latest_wins_without_stickiness() {
        let mut tracker = StatusTracker::new(false);
        tracker.report(MatchStatus::Ghosted);
        assert!(tracker.report(MatchStatus::Active));
        assert_eq!(tracker.current(), MatchStatus::Active);
    }

    #[test]
    fn missing_status_never_reverts_a_terminal() {
        let mut tracker = StatusTracker::new(false);
        assert!(tracker.report(MatchStatus::Unmatched));
        assert!(!tracker.report(MatchStatus::Unknown));
        assert_eq!(tracker.current(), MatchStatus::Unmatched);
    }
}
