//! Error types for the chat widget.

use thiserror::Error;

/// Text shown when a turn fails for any reason other than a decodable service error.
pub const TECHNICAL_DIFFICULTIES: &str =
    "I apologize, but I'm experiencing technical difficulties. Please try again in a moment.";

/// Text shown when the server-side clear of a session fails.
pub const CLEAR_FAILED: &str = "Failed to clear chat history. Please try again.";

/// Errors that can occur while talking to the assistant service or the host.
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP request failed (unreachable, timed out, connection reset).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a decodable `error` field.
    #[error("{0}")]
    Service(String),

    /// Non-success status without a decodable error payload.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// A success response whose body did not match the protocol.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// `SQLite` storage error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Regex error.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The widget was configured or mounted incorrectly.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ChatError {
    /// Check if this error came from the network rather than the service.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::HttpStatus(_) | Self::MalformedResponse(_) | Self::Json(_)
        )
    }

    /// Text to show in the transcript for a failed turn.
    ///
    /// Service errors are shown verbatim; everything else collapses to the
    /// generic technical-difficulty message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Service(text) if !text.trim().is_empty() => text.clone(),
            _ => TECHNICAL_DIFFICULTIES.to_string(),
        }
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
