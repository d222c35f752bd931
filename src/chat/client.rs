//! Assistant service protocol: send a turn, fetch history, clear a session.
//!
//! `HttpAssistantClient` speaks JSON over HTTP. Failures never escape as
//! panics: turns and clears resolve to `ChatError`, history degrades to an
//! empty list.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use reqwest::StatusCode;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::config::ChatConfig;
use super::csrf::{CookieTokenSource, CsrfResolver, FormFieldTokenSource, MetaTagTokenSource};
use super::error::{ChatError, ChatResult};
use super::types::{Message, SessionId};

/// Boxed, single-threaded future returned by assistant operations.
pub type ServiceFuture<'a, T> = LocalBoxFuture<'a, T>;

/// Successful outcome of one turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    /// Assistant text.
    pub reply: String,
    /// Session identifier returned by the service, if any.
    pub session_id: Option<SessionId>,
}

/// Request/response contract with the assistant service.
pub trait AssistantService {
    /// Send one user message.
    ///
    /// Resolves to the reply, or to the error the controller renders as an
    /// error turn.
    fn send_turn(
        &self,
        message: String,
        session_id: Option<SessionId>,
    ) -> ServiceFuture<'_, ChatResult<TurnReply>>;

    /// Load the stored conversation. Best-effort: any failure yields an empty list.
    fn fetch_history(&self, session_id: Option<SessionId>) -> ServiceFuture<'_, Vec<Message>>;

    /// Deactivate the server-side session.
    fn clear_session(&self, session_id: Option<SessionId>) -> ServiceFuture<'_, ChatResult<()>>;
}

// Wire structures

/// Body of `POST` send-turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnRequest {
    /// The user's message.
    pub message: String,
    /// Current session, serialized as `null` when absent.
    pub session_id: Option<String>,
}

/// Body of a send-turn response (success or failure).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TurnResponse {
    /// Assistant text.
    #[serde(default)]
    pub response: Option<String>,
    /// Session to use for the next turn.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Failure description.
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of a history response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Stored entries, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// One stored history entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who produced the entry.
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    /// Entry text.
    pub content: String,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Author of a history entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    /// The user.
    User,
    /// The assistant.
    Bot,
    /// Service-internal prompt, never shown.
    System,
    /// Anything newer than this client understands.
    #[serde(other)]
    Unknown,
}

/// Body of `POST` clear-session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClearRequest {
    /// Session to deactivate.
    pub session_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Tokens the host page exposes outside the cookie jar.
#[derive(Clone, Debug, Default)]
pub struct PageTokens {
    /// Token from `<meta name="csrf-token">`.
    pub meta: Option<String>,
    /// Token from the `csrfmiddlewaretoken` form field.
    pub form_field: Option<String>,
}

/// JSON-over-HTTP assistant client.
pub struct HttpAssistantClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    turn_url: Url,
    history_url: Url,
    clear_url: Url,
    csrf_header: String,
    csrf: CsrfResolver,
}

impl HttpAssistantClient {
    /// Create a client whose token chain is cookie, then `tokens.meta`, then
    /// `tokens.form_field`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: &ChatConfig, tokens: PageTokens) -> ChatResult<Self> {
        let jar = Arc::new(Jar::default());
        let csrf = CsrfResolver::new()
            .with_source(CookieTokenSource::new(
                jar.clone(),
                config.base()?,
                config.csrf_cookie.clone(),
            ))
            .with_source(MetaTagTokenSource(tokens.meta))
            .with_source(FormFieldTokenSource(tokens.form_field));
        Self::from_parts(config, jar, csrf)
    }

    /// Create a client from an existing cookie jar and token chain.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn from_parts(
        config: &ChatConfig,
        jar: Arc<Jar>,
        csrf: CsrfResolver,
    ) -> ChatResult<Self> {
        config.validate()?;
        let client = Self::build_client(config, jar.clone())?;

        Ok(Self {
            client,
            jar,
            turn_url: config.endpoint(&config.turn_path)?,
            history_url: config.endpoint(&config.history_path)?,
            clear_url: config.endpoint(&config.clear_path)?,
            csrf_header: config.csrf_header.clone(),
            csrf,
        })
    }

    /// Build an HTTP client with JSON defaults and the shared cookie jar.
    fn build_client(config: &ChatConfig, jar: Arc<Jar>) -> ChatResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .cookie_provider(jar)
            .gzip(true)
            .build()?)
    }

    /// Cookie jar shared with the token chain.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    fn post<T: Serialize>(&self, url: &Url, body: &T) -> reqwest::RequestBuilder {
        self.client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(self.csrf_header.as_str(), self.csrf.resolve())
            .json(body)
    }

    /// Send a turn and decode the reply.
    ///
    /// # Errors
    /// `Service` for a decodable `error` field, `HttpStatus` for any other
    /// non-success status, `Transport`/`MalformedResponse` otherwise.
    pub async fn post_turn(
        &self,
        message: &str,
        session_id: Option<&SessionId>,
    ) -> ChatResult<TurnReply> {
        let body = TurnRequest {
            message: message.to_string(),
            session_id: session_id.map(|id| id.as_str().to_string()),
        };
        debug!(
            has_session = session_id.is_some(),
            "Sending chat turn ({} chars)",
            message.chars().count()
        );

        let response = self.post(&self.turn_url, &body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await.unwrap_or_default();
            return Err(decode_error(status, &bytes));
        }

        let body: TurnResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(ChatError::Service(error));
        }
        let reply = body
            .response
            .ok_or_else(|| ChatError::MalformedResponse("missing `response` field".to_string()))?;

        Ok(TurnReply {
            reply,
            session_id: body
                .session_id
                .filter(|id| !id.is_empty())
                .map(SessionId::new),
        })
    }

    /// Load history for `session_id`, or nothing on any failure.
    pub async fn load_history(&self, session_id: Option<&SessionId>) -> Vec<Message> {
        let Some(session_id) = session_id else {
            return Vec::new();
        };
        match self.try_load_history(session_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Could not load chat history: {e}");
                Vec::new()
            }
        }
    }

    async fn try_load_history(&self, session_id: &SessionId) -> ChatResult<Vec<Message>> {
        let mut url = self.history_url.clone();
        url.query_pairs_mut()
            .append_pair("session_id", session_id.as_str());

        let response = self
            .client
            .get(url)
            .header(self.csrf_header.as_str(), self.csrf.resolve())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::HttpStatus(status.as_u16()));
        }

        let body: HistoryResponse = response.json().await?;
        Ok(history_messages(body.history))
    }

    /// Deactivate the server-side session. No request is made without one.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub async fn post_clear(&self, session_id: Option<&SessionId>) -> ChatResult<()> {
        let Some(session_id) = session_id else {
            return Ok(());
        };
        let body = ClearRequest {
            session_id: session_id.as_str().to_string(),
        };

        let response = self.post(&self.clear_url, &body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await.unwrap_or_default();
            let err = decode_error(status, &bytes);
            warn!("Clearing chat session failed: {err}");
            return Err(err);
        }
        Ok(())
    }
}

impl AssistantService for HttpAssistantClient {
    fn send_turn(
        &self,
        message: String,
        session_id: Option<SessionId>,
    ) -> ServiceFuture<'_, ChatResult<TurnReply>> {
        async move { self.post_turn(&message, session_id.as_ref()).await }.boxed_local()
    }

    fn fetch_history(&self, session_id: Option<SessionId>) -> ServiceFuture<'_, Vec<Message>> {
        async move { self.load_history(session_id.as_ref()).await }.boxed_local()
    }

    fn clear_session(&self, session_id: Option<SessionId>) -> ServiceFuture<'_, ChatResult<()>> {
        async move { self.post_clear(session_id.as_ref()).await }.boxed_local()
    }
}

/// Turn a non-success body into `Service` when it carries an `error` field.
fn decode_error(status: StatusCode, body: &[u8]) -> ChatError {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|e| !e.trim().is_empty())
        .map_or(ChatError::HttpStatus(status.as_u16()), ChatError::Service)
}

/// Convert wire entries to messages, dropping system and unknown entries.
#[must_use]
pub fn history_messages(entries: Vec<HistoryEntry>) -> Vec<Message> {
    let fetched_at = Utc::now();
    entries
        .into_iter()
        .filter_map(|entry| {
            let message = match entry.kind {
                HistoryKind::User => Message::user(entry.content),
                HistoryKind::Bot => Message::assistant(entry.content),
                HistoryKind::System | HistoryKind::Unknown => return None,
            };
            let timestamp = entry
                .timestamp
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map_or(fetched_at, |ts| ts.with_timezone(&Utc));
            Some(message.at(timestamp))
        })
        .collect()
}
