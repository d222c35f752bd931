//! Configuration for the chat widget.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{ChatError, ChatResult};

/// Environment variable overriding the assistant service base URL.
const BASE_URL_ENV: &str = "JOBBOARD_CHAT_BASE_URL";
/// Environment variable overriding the storage file path.
const STORAGE_ENV: &str = "JOBBOARD_CHAT_STORAGE";
/// Environment variable overriding the transcript cap.
const CAP_ENV: &str = "JOBBOARD_CHAT_CAP";

/// Maximum number of transcript entries kept on screen.
pub const DEFAULT_TRANSCRIPT_CAP: usize = 50;

/// Storage key holding the session identifier.
pub const DEFAULT_SESSION_KEY: &str = "jobboard_chatbot_session_id";

/// When the one-time history bootstrap runs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPolicy {
    /// Load history as soon as the host starts the widget.
    #[default]
    OnMount,
    /// Load history the first time the widget is opened.
    OnFirstOpen,
}

/// Configuration for the chat widget and its assistant client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the assistant service.
    pub base_url: String,
    /// Path of the send-turn endpoint.
    pub turn_path: String,
    /// Path of the history endpoint.
    pub history_path: String,
    /// Path of the clear-session endpoint.
    pub clear_path: String,
    /// Request timeout.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Maximum number of transcript entries.
    pub transcript_cap: usize,
    /// Storage key for the session identifier.
    pub session_key: String,
    /// Header carrying the anti-forgery token.
    pub csrf_header: String,
    /// Cookie the anti-forgery token is read from.
    pub csrf_cookie: String,
    /// History bootstrap policy.
    pub bootstrap: BootstrapPolicy,
    /// Path of the `SQLite` file used by durable storage.
    pub storage_path: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            turn_path: "/chat-turn".to_string(),
            history_path: "/chat-history".to_string(),
            clear_path: "/chat-clear".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            transcript_cap: DEFAULT_TRANSCRIPT_CAP,
            session_key: DEFAULT_SESSION_KEY.to_string(),
            csrf_header: "X-CSRFToken".to_string(),
            csrf_cookie: "csrftoken".to_string(),
            bootstrap: BootstrapPolicy::OnMount,
            storage_path: PathBuf::from("jobboard_chat.sqlite3"),
        }
    }
}

impl ChatConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from defaults overlaid with `JOBBOARD_CHAT_*` variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        if let Ok(path) = std::env::var(STORAGE_ENV) {
            config.storage_path = PathBuf::from(path);
        }
        if let Some(cap) = std::env::var(CAP_ENV).ok().and_then(|v| v.parse().ok()) {
            config.transcript_cap = cap;
        }
        config
    }

    /// Set the assistant service base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the transcript cap.
    #[must_use]
    pub const fn with_transcript_cap(mut self, cap: usize) -> Self {
        self.transcript_cap = cap;
        self
    }

    /// Set the history bootstrap policy.
    #[must_use]
    pub const fn with_bootstrap(mut self, policy: BootstrapPolicy) -> Self {
        self.bootstrap = policy;
        self
    }

    /// Set the storage key for the session identifier.
    #[must_use]
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }

    /// Parse the base URL.
    ///
    /// # Errors
    /// Returns an error if the base URL is not a valid absolute URL.
    pub fn base(&self) -> ChatResult<Url> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// Resolve an endpoint path under the base URL, keeping any path prefix
    /// the base carries (`https://host/chatbot/api` + `/chat-turn` gives
    /// `https://host/chatbot/api/chat-turn`).
    ///
    /// # Errors
    /// Returns an error if the base URL or the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> ChatResult<Url> {
        let mut base = self.base()?;
        if !base.path().ends_with('/') {
            let prefixed = format!("{}/", base.path());
            base.set_path(&prefixed);
        }
        Ok(base.join(path.trim_start_matches('/'))?)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        if self.transcript_cap == 0 {
            return Err(ChatError::Configuration(
                "transcript_cap must be > 0".to_string(),
            ));
        }

        if self.session_key.trim().is_empty() {
            return Err(ChatError::Configuration(
                "session_key must not be empty".to_string(),
            ));
        }

        for (name, path) in [
            ("turn_path", &self.turn_path),
            ("history_path", &self.history_path),
            ("clear_path", &self.clear_path),
        ] {
            if !path.starts_with('/') {
                return Err(ChatError::Configuration(format!(
                    "{name} must start with '/'"
                )));
            }
        }

        self.base()
            .map_err(|e| ChatError::Configuration(format!("base_url: {e}")))?;

        Ok(())
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
