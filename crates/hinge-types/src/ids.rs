//! Type-safe identifier wrappers around backend-issued strings.
//!
//! The backend hands out UUID strings, but the client treats every
//! identifier as opaque: equality and hashing are all the sync layer ever
//! needs. Each entity gets its own newtype so a message id can never be
//! passed where a match id is expected.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a transparent newtype wrapper around [`String`].
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`].
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Unique identifier of an event within a channel's lifetime.
    ///
    /// Message, match and like rows each carry their own primary key; the
    /// same logical event may be delivered more than once under the same id.
    EventId
}

define_id! {
    /// Unique identifier for a match (the conversation between two agents).
    MatchId
}

define_id! {
    /// Unique identifier for an autonomous agent.
    AgentId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = MatchId::new("8f0c");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"8f0c\""));
    }

    #[test]
    fn id_roundtrip_serde() {
        let restored: Result<EventId, _> = serde_json::from_str("\"abc-123\"");
        assert_eq!(restored.ok(), Some(EventId::from("abc-123")));
    }

    #[test]
    fn id_display_matches_inner() {
        let id = AgentId::new("agent-7");
        assert_eq!(id.to_string(), "agent-7");
        assert_eq!(id.as_str(), "agent-7");
    }
}
