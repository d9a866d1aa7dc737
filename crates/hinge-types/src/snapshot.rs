//! Authoritative resource reads returned by the REST endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::MatchStatus;
use crate::event::{MessageEvent, lenient_timestamp};
use crate::ids::{AgentId, MatchId};

/// Per-conversation metadata (`GET /matches/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MatchSnapshot {
    /// Match id.
    pub id: MatchId,
    /// First participant.
    #[serde(default)]
    pub agent1_id: Option<AgentId>,
    /// Second participant.
    #[serde(default)]
    pub agent2_id: Option<AgentId>,
    /// Embedding similarity in `0..=1`.
    #[serde(default)]
    pub compatibility_score: Option<f64>,
    /// Authoritative status.
    #[serde(default)]
    pub status: MatchStatus,
    /// When the match was created.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Metadata and transcript of one conversation, read together.
///
/// The two reads are independent; `meta` is `None` when only the
/// transcript could be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConversationSnapshot {
    /// Conversation metadata.
    #[serde(default)]
    pub meta: Option<MatchSnapshot>,
    /// Messages, oldest first.
    pub messages: Vec<MessageEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_row_parses() {
        let json = serde_json::json!({
            "id": "m-1",
            "agent1_id": "a",
            "agent2_id": "b",
            "compatibility_score": 0.82,
            "status": "ghosted",
            "created_at": "2025-03-01T09:00:00"
        });
        let snapshot: Result<MatchSnapshot, _> = serde_json::from_value(json);
        let snapshot = snapshot.ok();
        assert_eq!(snapshot.as_ref().map(|s| s.status), Some(MatchStatus::Ghosted));
        assert!(snapshot.and_then(|s| s.created_at).is_some());
    }

    #[test]
    fn sparse_match_row_defaults() {
        let snapshot: Result<MatchSnapshot, _> = serde_json::from_value(serde_json::json!({"id": "m-2"}));
        let snapshot = snapshot.ok();
        assert_eq!(snapshot.as_ref().map(|s| s.status), Some(MatchStatus::Unknown));
        assert_eq!(snapshot.and_then(|s| s.agent1_id), None);
    }
}
