//! Headless watcher for the Agentic Hinge live view.
//!
//! Follows the global activity feed and any conversations named in
//! `HINGE_MATCH_IDS`, logging each view the sync layer publishes, until
//! Ctrl-C.
//!
//! # Configuration
//!
//! - `HINGE_CONFIG` -- path to a YAML config file (default
//!   `hinge-config.yaml` if present, built-in defaults otherwise)
//! - `HINGE_MATCH_IDS` -- comma-separated conversation ids to follow
//! - `HINGE_API_URL` / `HINGE_WS_URL` -- backend address overrides
//! - `RUST_LOG` -- log filter (default `info`)

mod report;

use std::path::PathBuf;

use anyhow::Context as _;
use hinge_sync::{ChannelPool, LiveConversation, LiveFeed, SnapshotClient, SyncConfig};
use hinge_types::MatchId;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Config file read when `HINGE_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "hinge-config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("hinge-watch starting");

    let config = load_config()?;
    info!(
        api_url = config.endpoints.api_url,
        ws_url = config.endpoints.ws_url,
        feed_capacity = config.feed.capacity,
        max_attempts = config.backoff.max_attempts,
        "configuration loaded"
    );

    let client = SnapshotClient::new(&config)?;
    match client.conversations().await {
        Ok(conversations) => {
            info!(count = conversations.len(), "conversations available");
            for conversation in &conversations {
                info!(
                    conversation = %conversation.id,
                    status = %conversation.status,
                    score = ?conversation.compatibility_score,
                    "conversation"
                );
            }
        }
        Err(e) => warn!(error = %e, "could not list conversations"),
    }

    let pool = ChannelPool::new(config);
    let mut feed = LiveFeed::start(&pool, client.clone());
    let mut followers = vec![tokio::spawn(report::follow_feed(feed.subscribe()))];

    let match_ids = parse_match_ids(&std::env::var("HINGE_MATCH_IDS").unwrap_or_default());
    let mut conversations: Vec<LiveConversation> = Vec::with_capacity(match_ids.len());
    for match_id in match_ids {
        let conversation = LiveConversation::start(&pool, client.clone(), match_id);
        followers.push(tokio::spawn(report::follow_conversation(
            conversation.subscribe(),
        )));
        conversations.push(conversation);
    }
    info!(topics = pool.active_topics().len(), "watching; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down");
    feed.close();
    for conversation in &mut conversations {
        conversation.close();
    }
    for follower in followers {
        follower.abort();
    }
    Ok(())
}

/// Load configuration from `HINGE_CONFIG`, the default file, or defaults.
fn load_config() -> anyhow::Result<SyncConfig> {
    let explicit = std::env::var_os("HINGE_CONFIG").map(PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if explicit.is_some() || path.exists() {
        SyncConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))
    } else {
        info!("config file not found, using defaults");
        Ok(SyncConfig::from_env()?)
    }
}

/// Split a comma-separated id list, ignoring blanks and repeats.
fn parse_match_ids(raw: &str) -> Vec<MatchId> {
    let mut ids: Vec<MatchId> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        let id = MatchId::from(id);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_ids_are_trimmed_and_deduplicated() {
        let ids = parse_match_ids(" m1, m2 ,,m1 ");
        assert_eq!(ids, vec![MatchId::from("m1"), MatchId::from("m2")]);
    }

    #[test]
    fn empty_list_follows_nothing() {
        assert!(parse_match_ids("").is_empty());
        assert!(parse_match_ids(" , ").is_empty());
    }
}
