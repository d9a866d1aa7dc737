//! Channel addressing and the inbound frame envelope.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::event::Event;
use crate::ids::MatchId;

/// Prefix of per-conversation channel names.
const MATCH_PREFIX: &str = "match_";

/// A named stream of events a consumer subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    /// The global activity feed (`feed`).
    Feed,
    /// One conversation (`match_<id>`).
    Match(MatchId),
}

impl Topic {
    /// Channel name as it appears in the subscription address.
    pub fn channel_name(&self) -> String {
        match self {
            Self::Feed => String::from("feed"),
            Self::Match(id) => format!("{MATCH_PREFIX}{id}"),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feed => f.write_str("feed"),
            Self::Match(id) => write!(f, "{MATCH_PREFIX}{id}"),
        }
    }
}

/// Error returned when a channel name is neither `feed` nor `match_<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic(pub String);

impl fmt::Display for UnknownTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown topic: {}", self.0)
    }
}

impl std::error::Error for UnknownTopic {}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "feed" {
            return Ok(Self::Feed);
        }
        match s.strip_prefix(MATCH_PREFIX) {
            Some(id) if !id.is_empty() => Ok(Self::Match(MatchId::from(id))),
            _ => Err(UnknownTopic(s.to_owned())),
        }
    }
}

/// Envelope of every pushed frame: `{ "type": ..., "data": {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Frame {
    /// Publisher-side event type.
    #[serde(rename = "type")]
    pub frame_type: String,
    /// The event body.
    pub data: Value,
}

impl Frame {
    /// Wrap an event the way the backend publishes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn from_event(event: &Event) -> Result<Self, serde_json::Error> {
        Ok(Self {
            frame_type: event.kind().as_str().to_owned(),
            data: serde_json::to_value(event)?,
        })
    }

    /// Parse a raw text frame into an [`Event`].
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a frame or its body is not an event.
    pub fn parse_event(text: &str) -> Result<Event, serde_json::Error> {
        let frame: Self = serde_json::from_str(text)?;
        frame.into_event()
    }

    /// Convert the frame body into an [`Event`].
    ///
    /// When the body has no `type` of its own, the frame's `type` is used
    /// as the event kind.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not an object or does not describe an
    /// event.
    pub fn into_event(self) -> Result<Event, serde_json::Error> {
        let Value::Object(mut body) = self.data else {
            return Err(serde::de::Error::custom("frame data is not an object"));
        };
        if !body.contains_key("type") {
            body.insert(String::from("type"), Value::String(self.frame_type));
        }
        serde_json::from_value(Value::Object(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::EventKind;

    #[test]
    fn topic_names_roundtrip() {
        let topic = Topic::Match(MatchId::from("42"));
        assert_eq!(topic.channel_name(), "match_42");
        assert_eq!("match_42".parse::<Topic>().ok(), Some(topic));
        assert_eq!("feed".parse::<Topic>().ok(), Some(Topic::Feed));
    }

    #[test]
    fn bad_topic_names_are_rejected() {
        assert!("match_".parse::<Topic>().is_err());
        assert!("chat".parse::<Topic>().is_err());
    }

    #[test]
    fn frame_type_is_folded_into_untyped_body() {
        let text = r#"{"type":"message","data":{"id":"m1","match_id":"x","content":"hi"}}"#;
        let event = Frame::parse_event(text).ok();
        assert_eq!(event.map(|e| e.kind()), Some(EventKind::Message));
    }

    #[test]
    fn body_type_wins_over_frame_type() {
        let text = r#"{"type":"activity","data":{"type":"like","id":"l1"}}"#;
        let event = Frame::parse_event(text).ok();
        assert_eq!(event.map(|e| e.kind()), Some(EventKind::Like));
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(Frame::parse_event("not json").is_err());
        assert!(Frame::parse_event(r#"{"type":"message"}"#).is_err());
        assert!(Frame::parse_event(r#"{"type":"message","data":[1,2]}"#).is_err());
        assert!(Frame::parse_event(r#"{"type":"message","data":{"content":"no id"}}"#).is_err());
    }
}
