//! Embeddable assistant chat widget for the job board.
//!
//! This module provides the client half of the conversation:
//! - Session persistence in durable local storage
//! - Safe formatting of assistant markdown
//! - A capped transcript with a role-aware welcome entry
//! - A JSON-over-HTTP assistant client with anti-forgery tokens
//! - The open/close/send/clear state machine

pub mod analytics;
pub mod client;
pub mod config;
pub mod controller;
pub mod csrf;
pub mod error;
pub mod format;
pub mod storage;
pub mod transcript;
pub mod types;
pub mod view;

pub use analytics::{AnalyticsEvent, AnalyticsSink, NoopAnalytics, TracingAnalytics};
pub use client::{AssistantService, HttpAssistantClient, PageTokens, TurnReply};
pub use config::{BootstrapPolicy, ChatConfig};
pub use controller::{
    ChatWidget, ChatWidgetBuilder, ClearOutcome, Key, RejectReason, SendOutcome, WidgetPhase,
};
pub use error::{ChatError, ChatResult};
pub use format::{MessageFormatter, escape};
pub use storage::{KeyValueStorage, MemoryStorage, SessionStore, SqliteStorage};
pub use transcript::{RenderedEntry, TranscriptRenderer};
pub use types::{Message, MessageId, MessageKind, PageContext, Role, SessionId, UserRole};
pub use view::{ConfirmPrompt, PageContextProvider, TranscriptView, WidgetView};
