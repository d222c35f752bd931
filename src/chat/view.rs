//! Mount points the host page supplies to the widget.
//!
//! Every method takes `&self`: hosts are single-threaded and keep whatever
//! interior state they need.

use super::transcript::RenderedEntry;
use super::types::{MessageId, PageContext};

/// Widget chrome: the panel, toggle button, input box and typing indicator.
pub trait WidgetView {
    /// Show or hide the chat panel.
    fn set_visible(&self, visible: bool);
    /// Update the toggle button's accessible label.
    fn set_toggle_label(&self, label: &str);
    /// Enable or disable the input and send button.
    fn set_input_enabled(&self, enabled: bool);
    /// Give the send button its "active" look when there is something to send.
    fn set_send_active(&self, active: bool);
    /// Replace the text in the input box.
    fn set_input_text(&self, text: &str);
    /// Move focus to the input box.
    fn focus_input(&self);
    /// Show or hide the typing indicator.
    fn set_typing_visible(&self, visible: bool);
}

/// The surface the transcript is drawn on.
pub trait TranscriptView {
    /// Draw one entry after the current last one.
    fn append(&self, entry: &RenderedEntry);
    /// Remove a previously drawn entry.
    fn remove(&self, id: MessageId);
    /// Remove every entry.
    fn clear(&self);
    /// Scroll so the newest entry is visible.
    fn scroll_to_bottom(&self);
}

/// Blocking yes/no question asked before destructive actions.
pub trait ConfirmPrompt {
    /// Return `true` when the user accepts.
    fn confirm(&self, question: &str) -> bool;
}

/// Supplier of authentication state and role, read when a welcome is synthesized.
pub trait PageContextProvider {
    /// Current page context.
    fn page_context(&self) -> PageContext;
}

impl PageContextProvider for PageContext {
    fn page_context(&self) -> PageContext {
        self.clone()
    }
}
