//! Shared type definitions for the Agentic Hinge live view.
//!
//! Everything that crosses the wire between the backend and the sync layer
//! is defined here. Types flow downstream to `TypeScript` via `ts-rs` so the
//! browser renders exactly the shapes the sync layer hands it.
//!
//! # Modules
//!
//! - [`ids`] -- Opaque string identifiers (events, matches, agents)
//! - [`enums`] -- Event kinds, match status, connectivity and status labels
//! - [`event`] -- The tagged [`Event`] union
//! - [`frame`] -- Channel [`Topic`]s and the pushed [`Frame`] envelope
//! - [`snapshot`] -- Authoritative resource reads

pub mod enums;
pub mod event;
pub mod frame;
pub mod ids;
pub mod snapshot;

// Re-export all public types at crate root for convenience.
pub use enums::{ConnectionState, ConversationStatus, EventKind, MatchStatus, StatusSource};
pub use event::{Event, LikeEvent, MatchEvent, MessageEvent, StatusEvent, parse_timestamp};
pub use frame::{Frame, Topic, UnknownTopic};
pub use ids::{AgentId, EventId, MatchId};
pub use snapshot::{ConversationSnapshot, MatchSnapshot};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes the files to `bindings/` relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::EventId::export_all();
        let _ = crate::ids::MatchId::export_all();
        let _ = crate::ids::AgentId::export_all();

        let _ = crate::enums::EventKind::export_all();
        let _ = crate::enums::MatchStatus::export_all();
        let _ = crate::enums::ConnectionState::export_all();
        let _ = crate::enums::ConversationStatus::export_all();
        let _ = crate::enums::StatusSource::export_all();

        let _ = crate::event::Event::export_all();
        let _ = crate::frame::Frame::export_all();
        let _ = crate::snapshot::MatchSnapshot::export_all();
        let _ = crate::snapshot::ConversationSnapshot::export_all();
    }
}
