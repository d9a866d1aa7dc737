//! Enumeration types for the live view.
//!
//! Wire values are lowercase (`snake_case` where multi-word) to match the
//! JSON the backend emits.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// Discriminant of an [`Event`](crate::Event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// A chat message sent inside a match.
    Message,
    /// Two agents matched.
    Match,
    /// One agent liked another.
    Like,
    /// A resource-level status update (e.g. a match became `ghosted`).
    Status,
}

impl EventKind {
    /// The wire tag for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Match => "match",
            Self::Like => "like",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Match status
// ---------------------------------------------------------------------------

/// Authoritative status of a match as stored by the backend.
///
/// Unrecognised values deserialize to [`MatchStatus::Unknown`] rather than
/// failing, so a backend that grows a new status never breaks the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MatchStatus {
    /// Created but the conversation has not started.
    Pending,
    /// Conversation in progress.
    Active,
    /// One side stopped replying.
    Ghosted,
    /// One side ended the match.
    Unmatched,
    /// Both sides committed to each other.
    Committed,
    /// No status, or one this client does not recognise.
    #[default]
    Unknown,
}

impl MatchStatus {
    /// Whether this status is specific enough to override a derived label.
    ///
    /// Only `ghosted` and `unmatched` end a conversation; everything else
    /// leaves the label to the message-shape heuristic.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ghosted | Self::Unmatched)
    }

    /// The wire value for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Ghosted => "ghosted",
            Self::Unmatched => "unmatched",
            Self::Committed => "committed",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "active" => Self::Active,
            "ghosted" => Self::Ghosted,
            "unmatched" => Self::Unmatched,
            "committed" => Self::Committed,
            _ => Self::Unknown,
        })
    }
}

impl<'de> Deserialize<'de> for MatchStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::Unknown))
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

/// Lifecycle state of one channel connection.
///
/// ```text
/// connecting --> open --> reconnecting --> open ...
///     |                        |
///     +----> reconnecting      +--> unreachable (retries exhausted)
///
/// any state --> closed (explicit close; terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ConnectionState {
    /// First handshake in flight.
    #[default]
    Connecting,
    /// Handshake done, frames flowing.
    Open,
    /// Transport lost; waiting out a backoff delay or re-handshaking.
    Reconnecting,
    /// Retry budget exhausted; no further attempts will be made.
    Unreachable,
    /// Explicitly closed by its owner.
    Closed,
}

impl ConnectionState {
    /// Whether frames are currently being delivered.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the connection will never deliver again.
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Unreachable | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Unreachable => "unreachable",
            Self::Closed => "closed",
        })
    }
}

// ---------------------------------------------------------------------------
// Conversation label
// ---------------------------------------------------------------------------

/// Label shown for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ConversationStatus {
    /// No messages yet.
    Waiting,
    /// Messages are flowing.
    Active,
    /// More messages than the heating threshold.
    HeatingUp,
    /// The server says one side went quiet.
    Ghosted,
    /// The server says the match ended.
    Unmatched,
}

/// Where a [`ConversationStatus`] came from.
///
/// Consumers must not present a `Derived` label as server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum StatusSource {
    /// Reported by the backend (snapshot or status event).
    Authoritative,
    /// Inferred from the shape of the message sequence.
    Derived,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_status_parses_known_values() {
        let status: Result<MatchStatus, _> = serde_json::from_str("\"ghosted\"");
        assert_eq!(status.ok(), Some(MatchStatus::Ghosted));
    }

    #[test]
    fn match_status_tolerates_unknown_and_null() {
        let novel: Result<MatchStatus, _> = serde_json::from_str("\"on_hold\"");
        assert_eq!(novel.ok(), Some(MatchStatus::Unknown));
        let null: Result<MatchStatus, _> = serde_json::from_str("null");
        assert_eq!(null.ok(), Some(MatchStatus::Unknown));
    }

    #[test]
    fn only_ghosted_and_unmatched_are_terminal() {
        assert!(MatchStatus::Ghosted.is_terminal());
        assert!(MatchStatus::Unmatched.is_terminal());
        assert!(!MatchStatus::Active.is_terminal());
        assert!(!MatchStatus::Committed.is_terminal());
        assert!(!MatchStatus::Unknown.is_terminal());
    }

    #[test]
    fn connection_state_wire_format() {
        let json = serde_json::to_string(&ConnectionState::Reconnecting).ok();
        assert_eq!(json.as_deref(), Some("\"reconnecting\""));
        assert!(ConnectionState::Closed.is_final());
        assert!(!ConnectionState::Reconnecting.is_final());
    }

    #[test]
    fn heating_up_is_snake_case() {
        let json = serde_json::to_string(&ConversationStatus::HeatingUp).ok();
        assert_eq!(json.as_deref(), Some("\"heating_up\""));
    }
}
