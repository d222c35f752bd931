//! Fire-and-forget analytics for widget actions.
//!
//! The controller calls the sink after an action has already taken effect and
//! never looks at the outcome.

use tracing::info;

/// Widget action worth recording.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnalyticsEvent {
    /// The widget was opened.
    Opened,
    /// The widget was closed.
    Closed,
    /// A turn was sent.
    MessageSent {
        /// Length of the trimmed message, in characters.
        message_length: usize,
    },
    /// The conversation was cleared.
    ChatCleared,
}

impl AnalyticsEvent {
    /// Event name as reported to analytics backends.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Opened => "chatbot_opened",
            Self::Closed => "chatbot_closed",
            Self::MessageSent { .. } => "message_sent",
            Self::ChatCleared => "chat_cleared",
        }
    }

    /// Category shared by every chat event.
    #[must_use]
    pub const fn category() -> &'static str {
        "chatbot"
    }
}

/// Receiver of analytics events.
pub trait AnalyticsSink {
    /// Record one event. Must not block or fail visibly.
    fn track(&self, event: &AnalyticsEvent);
}

/// Sink that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn track(&self, _event: &AnalyticsEvent) {}
}

/// Sink that writes events to the `tracing` log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn track(&self, event: &AnalyticsEvent) {
        match event {
            AnalyticsEvent::MessageSent { message_length } => info!(
                category = AnalyticsEvent::category(),
                message_length,
                "Chatbot event: {}",
                event.name()
            ),
            _ => info!(
                category = AnalyticsEvent::category(),
                "Chatbot event: {}",
                event.name()
            ),
        }
    }
}
