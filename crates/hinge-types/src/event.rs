//! The [`Event`] union delivered by live channels and activity snapshots.
//!
//! Events are internally tagged by `type`. Field names follow the backend
//! rows; aliases cover the places where the activity list and the raw
//! message rows disagree (`timestamp` vs `created_at`, `agent_id` vs
//! `sender_agent_id`).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use crate::enums::{EventKind, MatchStatus};
use crate::ids::{AgentId, EventId, MatchId};

/// A single observable happening in the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Event {
    /// A chat message inside a match.
    Message(MessageEvent),
    /// Two agents matched.
    Match(MatchEvent),
    /// One agent liked another.
    Like(LikeEvent),
    /// A match changed status.
    Status(StatusEvent),
}

impl Event {
    /// The event's stable identifier.
    pub const fn id(&self) -> &EventId {
        match self {
            Self::Message(e) => &e.id,
            Self::Match(e) => &e.id,
            Self::Like(e) => &e.id,
            Self::Status(e) => &e.id,
        }
    }

    /// When the event happened, if the backend said.
    pub const fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Message(e) => e.timestamp,
            Self::Match(e) => e.timestamp,
            Self::Like(e) => e.timestamp,
            Self::Status(e) => e.timestamp,
        }
    }

    /// The event's discriminant.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Match(_) => EventKind::Match,
            Self::Like(_) => EventKind::Like,
            Self::Status(_) => EventKind::Status,
        }
    }

    /// The conversation this event belongs to, when it names one.
    ///
    /// A `match` event is its own conversation.
    pub const fn match_id(&self) -> Option<&MatchId> {
        match self {
            Self::Message(e) => e.match_id.as_ref(),
            Self::Status(e) => e.match_id.as_ref(),
            Self::Match(_) | Self::Like(_) => None,
        }
    }
}

/// Payload of a `message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MessageEvent {
    /// Message row id.
    pub id: EventId,
    /// When the message was sent.
    #[serde(default, alias = "created_at", deserialize_with = "lenient_timestamp")]
    #[ts(type = "string | null")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Conversation the message belongs to.
    #[serde(default)]
    pub match_id: Option<MatchId>,
    /// Sending agent.
    #[serde(default, alias = "sender_agent_id", alias = "sender_id")]
    pub agent_id: Option<AgentId>,
    /// Sending agent's display name (activity list only).
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Message body.
    #[serde(default)]
    pub content: String,
}

/// Payload of a `match` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MatchEvent {
    /// Match row id.
    pub id: EventId,
    /// When the match was created.
    #[serde(default, alias = "created_at", deserialize_with = "lenient_timestamp")]
    #[ts(type = "string | null")]
    pub timestamp: Option<DateTime<Utc>>,
    /// First participant.
    #[serde(default)]
    pub agent1_id: Option<AgentId>,
    /// Second participant.
    #[serde(default)]
    pub agent2_id: Option<AgentId>,
    /// First participant's display name.
    #[serde(default)]
    pub agent1_name: Option<String>,
    /// Second participant's display name.
    #[serde(default)]
    pub agent2_name: Option<String>,
    /// Embedding similarity in `0..=1`.
    #[serde(default)]
    pub compatibility_score: Option<f64>,
    /// Status at the time the event was produced.
    #[serde(default)]
    pub status: MatchStatus,
}

/// Payload of a `like` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LikeEvent {
    /// Like row id.
    pub id: EventId,
    /// When the like was sent.
    #[serde(default, alias = "created_at", deserialize_with = "lenient_timestamp")]
    #[ts(type = "string | null")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Agent who liked.
    #[serde(default)]
    pub sender_id: Option<AgentId>,
    /// Agent who was liked.
    #[serde(default)]
    pub receiver_id: Option<AgentId>,
    /// Liker's display name.
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Likee's display name.
    #[serde(default)]
    pub receiver_name: Option<String>,
    /// Free-form like status (`pending`, `matched`, ...).
    #[serde(default)]
    pub status: Option<String>,
}

/// Payload of a `status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StatusEvent {
    /// Event id (distinct from the match id).
    pub id: EventId,
    /// When the status changed.
    #[serde(default, alias = "created_at", deserialize_with = "lenient_timestamp")]
    #[ts(type = "string | null")]
    pub timestamp: Option<DateTime<Utc>>,
    /// The match whose status changed.
    #[serde(default)]
    pub match_id: Option<MatchId>,
    /// New status.
    #[serde(default)]
    pub status: MatchStatus,
}

/// Accept RFC 3339 timestamps, and naive ISO-8601 timestamps read as UTC.
///
/// `null` and a missing field both become `None`. Anything else that does
/// not parse is an error, which makes the whole frame malformed.
pub fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map_or(Ok(None), |s| {
        parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}")))
    })
}

/// Parse a timestamp the way [`lenient_timestamp`] does.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
