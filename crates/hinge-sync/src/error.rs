//! Error types for the sync layer.
//!
//! None of these ever reach a view consumer. Transport and fetch failures
//! are logged and folded into connectivity state or a retained snapshot;
//! parse failures drop the offending frame. The `Result`s exist for
//! construction, configuration, and the internal plumbing between tasks.

/// Errors that can occur inside the sync layer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Handshake failure, handshake timeout, or a dropped connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be turned into an event.
    #[error("parse error: {0}")]
    Parse(String),

    /// A snapshot pull failed (timeout, non-success status, bad body).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Failed to read a configuration file.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Fetch(format!("request timed out: {e}"))
        } else {
            Self::Fetch(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
