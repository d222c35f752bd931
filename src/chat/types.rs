//! Core data model: session identifiers, messages and page context.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token correlating client turns with server-side conversation state.
///
/// The client never inspects its shape; it only stores and echoes it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of one rendered transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Create a new random identifier.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Typed by the person using the widget.
    User,
    /// Produced by the assistant service (or by the widget on its behalf).
    Assistant,
}

impl Role {
    /// Stable string form, matching the wire names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "bot",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a message is a regular reply or a surfaced failure.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Regular content.
    #[default]
    Normal,
    /// A failure rendered as a turn.
    Error,
}

/// One immutable transcript message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier used by the host to address the rendered node.
    pub id: MessageId,
    /// Raw, unformatted text.
    pub text: String,
    /// Author.
    pub role: Role,
    /// Normal or error.
    pub kind: MessageKind,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(text: impl Into<String>, role: Role, kind: MessageKind) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            role,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::build(text, Role::User, MessageKind::Normal)
    }

    /// Build an assistant reply.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::build(text, Role::Assistant, MessageKind::Normal)
    }

    /// Build an assistant-role error turn.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::build(text, Role::Assistant, MessageKind::Error)
    }

    /// Override the creation time (used for history entries).
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Role of an authenticated user of the job board.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Posts jobs and reviews applications.
    Company,
    /// Searches and applies to jobs.
    Applicant,
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "company" => Ok(Self::Company),
            "applicant" => Ok(Self::Applicant),
            _ => Err(value.to_string()),
        }
    }
}

/// What the host page knows about the current visitor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    /// Whether the visitor is logged in.
    pub authenticated: bool,
    /// Role of the logged-in user, if known.
    pub role: Option<UserRole>,
}

impl PageContext {
    /// Context for an anonymous visitor.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            authenticated: false,
            role: None,
        }
    }

    /// Context for a logged-in user with the given role.
    #[must_use]
    pub const fn authenticated(role: Option<UserRole>) -> Self {
        Self {
            authenticated: true,
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = Message::user("hello");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.kind, MessageKind::Normal);

        let err = Message::error("boom");
        assert_eq!(err.role, Role::Assistant);
        assert_eq!(err.kind, MessageKind::Error);
        assert_ne!(user.id, err.id);
    }

    #[test]
    fn test_session_id_is_transparent() {
        let id = SessionId::from("abc");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"abc\"");
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn test_user_role_parse() {
        assert_eq!("company".parse::<UserRole>(), Ok(UserRole::Company));
        assert_eq!("applicant".parse::<UserRole>(), Ok(UserRole::Applicant));
        assert!("admin".parse::<UserRole>().is_err());
    }
}
