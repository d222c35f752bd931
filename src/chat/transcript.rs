//! Transcript rendering, welcome synthesis and eviction.

use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::format::MessageFormatter;
use super::types::{Message, MessageId, MessageKind, PageContext, Role, UserRole};
use super::view::TranscriptView;

/// One message as drawn on the transcript surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEntry {
    /// Identifier of the source message.
    pub id: MessageId,
    /// Author.
    pub role: Role,
    /// Normal or error.
    pub kind: MessageKind,
    /// Whether this is the synthesized welcome entry.
    pub welcome: bool,
    /// Raw text, for hosts that cannot display markup.
    pub text: String,
    /// Safe markup.
    pub markup: String,
    /// Creation time of the source message.
    pub timestamp: DateTime<Utc>,
}

impl RenderedEntry {
    /// Class list used by web hosts (`message bot error`, `message bot welcome`...).
    #[must_use]
    pub fn css_class(&self) -> String {
        let mut class = format!("message {}", self.role.as_str());
        if self.kind == MessageKind::Error {
            class.push_str(" error");
        }
        if self.welcome {
            class.push_str(" welcome");
        }
        class
    }
}

/// Welcome text for the given visitor, in the assistant markdown subset.
#[must_use]
pub fn welcome_text(context: &PageContext) -> String {
    let bullets: [&str; 4] = match (context.authenticated, context.role) {
        (true, Some(UserRole::Company)) => [
            "Managing your job postings",
            "Viewing applications",
            "Company profile optimization",
            "Understanding our platform features",
        ],
        (true, _) => [
            "Finding relevant jobs",
            "Application tips and guidance",
            "Profile optimization",
            "Understanding job requirements",
        ],
        (false, _) => [
            "Finding and browsing jobs",
            "Understanding our platform",
            "Registration and getting started",
            "General platform questions",
        ],
    };

    let mut text =
        String::from("**👋 Hi there!**\nI'm your JobBoard assistant. I can help you with:\n\n");
    for bullet in bullets {
        text.push_str("• ");
        text.push_str(bullet);
        text.push('\n');
    }
    text.push_str("\nHow can I help you today?");
    text
}

/// Ordered, append-only view of the conversation with a size cap.
pub struct TranscriptRenderer {
    entries: VecDeque<RenderedEntry>,
    cap: usize,
    formatter: MessageFormatter,
    view: Rc<dyn TranscriptView>,
}

impl TranscriptRenderer {
    /// Create an empty renderer drawing on `view`.
    #[must_use]
    pub fn new(view: Rc<dyn TranscriptView>, formatter: MessageFormatter, cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
            formatter,
            view,
        }
    }

    fn render(&self, message: Message, welcome: bool) -> RenderedEntry {
        let markup = match message.role {
            Role::User => self.formatter.format_user_text(&message.text),
            Role::Assistant => self.formatter.format_assistant_text(&message.text),
        };
        RenderedEntry {
            id: message.id,
            role: message.role,
            kind: message.kind,
            welcome,
            text: message.text,
            markup,
            timestamp: message.timestamp,
        }
    }

    fn push(&mut self, entry: RenderedEntry) {
        self.view.append(&entry);
        self.entries.push_back(entry);
        self.view.scroll_to_bottom();
        self.evict();
    }

    /// Draw one message, scroll to it and enforce the cap.
    pub fn append(&mut self, message: Message) {
        let entry = self.render(message, false);
        self.push(entry);
    }

    /// Replace the whole transcript; an empty history yields the welcome entry.
    pub fn reset(&mut self, messages: Vec<Message>, context: &PageContext) {
        if messages.is_empty() {
            self.reset_welcome(context);
            return;
        }
        self.entries.clear();
        self.view.clear();
        for message in messages {
            self.append(message);
        }
    }

    /// Replace the whole transcript with the welcome entry for `context`.
    pub fn reset_welcome(&mut self, context: &PageContext) {
        self.entries.clear();
        self.view.clear();
        let entry = self.render(Message::assistant(welcome_text(context)), true);
        self.push(entry);
    }

    /// Drop the oldest non-welcome entries until the cap holds.
    fn evict(&mut self) {
        while self.entries.len() > self.cap {
            let Some(index) = self.entries.iter().position(|e| !e.welcome) else {
                break;
            };
            if let Some(removed) = self.entries.remove(index) {
                debug!("Evicting transcript entry {}", removed.id);
                self.view.remove(removed.id);
            }
        }
    }

    /// Scroll the surface to the newest entry.
    pub fn scroll_to_bottom(&self) {
        self.view.scroll_to_bottom();
    }

    /// Whether the transcript shows nothing but the welcome entry.
    #[must_use]
    pub fn only_welcome(&self) -> bool {
        self.entries.len() == 1 && self.entries.iter().all(|e| e.welcome)
    }

    /// Number of entries currently shown.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is shown.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in display order.
    pub fn entries(&self) -> impl Iterator<Item = &RenderedEntry> {
        self.entries.iter()
    }

    /// Most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&RenderedEntry> {
        self.entries.back()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn cap(&self) -> usize {
        self.cap
    }
}
