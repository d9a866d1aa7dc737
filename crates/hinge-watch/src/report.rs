//! Log lines for view changes.

use hinge_sync::{ConversationView, FeedView, ViewSubscription};
use hinge_types::Event;
use tracing::info;

/// Log every feed view until the session goes away.
pub async fn follow_feed(mut views: ViewSubscription<FeedView>) {
    while let Some(view) = views.changed().await {
        let newest = view.entries.first().map(|event| summarize(event));
        info!(
            version = view.version,
            entries = view.entries.len(),
            connection = %view.connection.state,
            attempt = view.connection.attempt,
            newest = newest.as_deref().unwrap_or("-"),
            "feed updated"
        );
    }
}

/// Log every view of one conversation until the session goes away.
pub async fn follow_conversation(mut views: ViewSubscription<ConversationView>) {
    while let Some(view) = views.changed().await {
        let latest = view.messages.last().map(|event| summarize(event));
        info!(
            conversation = %view.match_id,
            version = view.version,
            messages = view.messages.len(),
            status = ?view.status.status,
            source = ?view.status.source,
            connection = %view.connection.state,
            latest = latest.as_deref().unwrap_or("-"),
            "conversation updated"
        );
    }
}

/// One-line human summary of an event.
pub fn summarize(event: &Event) -> String {
    fn name(value: Option<&str>) -> &str {
        value.unwrap_or("someone")
    }

    match event {
        Event::Message(m) => format!("{}: {}", name(m.agent_name.as_deref()), m.content),
        Event::Match(m) => format!(
            "{} matched with {}",
            name(m.agent1_name.as_deref()),
            name(m.agent2_name.as_deref())
        ),
        Event::Like(l) => format!(
            "{} liked {}",
            name(l.sender_name.as_deref()),
            name(l.receiver_name.as_deref())
        ),
        Event::Status(s) => match &s.match_id {
            Some(id) => format!("match {id} is now {}", s.status),
            None => format!("status is now {}", s.status),
        },
    }
}
