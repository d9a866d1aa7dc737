//! Configuration loading and typed config structures for the sync layer.
//!
//! Configuration lives in an optional YAML file (`hinge-config.yaml` by
//! convention). Every section has defaults matching the behaviour of the
//! web client, so an empty file -- or no file at all -- yields a working
//! setup against a local backend.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SyncError;

/// Top-level sync configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SyncConfig {
    /// Backend addresses.
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Channel connection settings.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Reconnect backoff policy.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Global activity feed settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Single-conversation settings.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Snapshot fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl SyncConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for the endpoints:
    /// - `HINGE_API_URL` overrides `endpoints.api_url`
    /// - `HINGE_WS_URL` overrides `endpoints.ws_url`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the file cannot be read,
    /// [`SyncError::Yaml`] if it is not valid YAML, or
    /// [`SyncError::Config`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, SyncError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Yaml`] if the string is not valid YAML, or
    /// [`SyncError::Config`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, SyncError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config
            .endpoints
            .apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus env overrides, for running without a config file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if an override is unusable.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::parse("")
    }

    /// Reject values the sync layer cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.feed.capacity == 0 {
            return Err(SyncError::Config("feed.capacity must be at least 1".to_owned()));
        }
        if self.feed.poll_interval_ms == 0 || self.conversation.poll_interval_ms == 0 {
            return Err(SyncError::Config("poll intervals must be non-zero".to_owned()));
        }
        if self.channel.event_buffer == 0 {
            return Err(SyncError::Config("channel.event_buffer must be at least 1".to_owned()));
        }
        if self.backoff.multiplier < 1 {
            return Err(SyncError::Config("backoff.multiplier must be at least 1".to_owned()));
        }
        if self.backoff.max_delay_ms < self.backoff.initial_delay_ms {
            return Err(SyncError::Config(
                "backoff.max_delay_ms must not be below backoff.initial_delay_ms".to_owned(),
            ));
        }
        for (name, url) in [
            ("endpoints.api_url", &self.endpoints.api_url),
            ("endpoints.ws_url", &self.endpoints.ws_url),
        ] {
            if url.trim().is_empty() {
                return Err(SyncError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Backend addresses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointsConfig {
    /// REST base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// WebSocket base URL; the topic name is appended as a path segment.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: default_ws_url(),
        }
    }
}

impl EndpointsConfig {
    /// Apply `HINGE_API_URL` / `HINGE_WS_URL` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("HINGE_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(url) = lookup("HINGE_WS_URL").filter(|v| !v.trim().is_empty()) {
            self.ws_url = url;
        }
    }
}

fn default_api_url() -> String {
    String::from("http://localhost:8000")
}

fn default_ws_url() -> String {
    String::from("ws://localhost:8000/ws")
}

/// Channel connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    /// Upper bound on one handshake, in milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Events buffered per connection before slow consumers start lagging.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ChannelConfig {
    /// Handshake timeout as a [`Duration`].
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

const fn default_handshake_timeout_ms() -> u64 {
    10_000
}

const fn default_event_buffer() -> usize {
    256
}

/// Reconnect backoff policy.
///
/// Delay for attempt `n` (zero-based) is
/// `min(initial_delay_ms * multiplier^n, max_delay_ms)`, optionally
/// jittered down to a uniform value in `[0, delay]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Ceiling on any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Consecutive failures, counting the first handshake, before giving
    /// up (0 = never give up).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Apply full jitter to each delay.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
            jitter: true,
        }
    }
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> u32 {
    2
}

const fn default_max_attempts() -> u32 {
    12
}

const fn default_true() -> bool {
    true
}

/// Global activity feed settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FeedConfig {
    /// Maximum entries kept; the oldest are evicted first.
    #[serde(default = "default_feed_capacity")]
    pub capacity: usize,
    /// Activity list refresh interval, in milliseconds.
    #[serde(default = "default_feed_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: default_feed_capacity(),
            poll_interval_ms: default_feed_poll_interval_ms(),
        }
    }
}

impl FeedConfig {
    /// Poll interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

const fn default_feed_capacity() -> usize {
    50
}

const fn default_feed_poll_interval_ms() -> u64 {
    30_000
}

/// Single-conversation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ConversationConfig {
    /// Metadata + transcript refresh interval, in milliseconds.
    #[serde(default = "default_conversation_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Message count above which a conversation is "heating up".
    #[serde(default = "default_heating_threshold")]
    pub heating_threshold: usize,
    /// Keep `ghosted`/`unmatched` once seen, even if a later snapshot
    /// reports a non-terminal status.
    #[serde(default = "default_true")]
    pub sticky_terminal_status: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_conversation_poll_interval_ms(),
            heating_threshold: default_heating_threshold(),
            sticky_terminal_status: true,
        }
    }
}

impl ConversationConfig {
    /// Poll interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

const fn default_conversation_poll_interval_ms() -> u64 {
    10_000
}

const fn default_heating_threshold() -> usize {
    10
}

/// Snapshot fetch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl FetchConfig {
    /// Request timeout as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

const fn default_fetch_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = SyncConfig::parse("");
        assert!(config.is_ok());
        let config = config.unwrap_or_default();
        assert_eq!(config.feed.capacity, 50);
        assert_eq!(config.conversation.poll_interval_ms, 10_000);
        assert_eq!(config.conversation.heating_threshold, 10);
        assert!(config.conversation.sticky_terminal_status);
        assert_eq!(config.backoff.max_attempts, 12);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "feed:\n  capacity: 20\nbackoff:\n  max_attempts: 3\n  jitter: false\n";
        let config = SyncConfig::parse(yaml).unwrap_or_default();
        assert_eq!(config.feed.capacity, 20);
        assert_eq!(config.feed.poll_interval_ms, 30_000);
        assert_eq!(config.backoff.max_attempts, 3);
        assert!(!config.backoff.jitter);
        assert_eq!(config.backoff.initial_delay_ms, 500);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = SyncConfig::parse("feed: [unclosed");
        assert!(matches!(result, Err(SyncError::Yaml { .. })));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = SyncConfig::parse("feed:\n  capacity: 0\n");
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn inverted_backoff_bounds_are_rejected() {
        let result = SyncConfig::parse("backoff:\n  initial_delay_ms: 5000\n  max_delay_ms: 10\n");
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn env_overrides_replace_endpoints() {
        let mut endpoints = EndpointsConfig::default();
        endpoints.apply_overrides(|key| match key {
            "HINGE_API_URL" => Some("http://api.internal:9000".to_owned()),
            "HINGE_WS_URL" => Some("   ".to_owned()),
            _ => None,
        });
        assert_eq!(endpoints.api_url, "http://api.internal:9000");
        assert_eq!(endpoints.ws_url, "ws://localhost:8000/ws");
    }
}
