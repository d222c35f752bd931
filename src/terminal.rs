//! Plain-text host for the chat widget: renders the transcript as lines and
//! asks confirmations on stdin.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io::{BufRead, Write};

use tracing::debug;

use crate::chat::transcript::RenderedEntry;
use crate::chat::types::{MessageId, MessageKind, Role};
use crate::chat::view::{ConfirmPrompt, TranscriptView, WidgetView};

/// One line typed at the terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/open`
    Open,
    /// `/close`
    Close,
    /// `/clear`
    Clear,
    /// `/quit` or `/exit`
    Quit,
    /// Anything else, sent as a turn.
    Message(&'a str),
}

impl<'a> Command<'a> {
    /// Interpret a raw input line.
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        match line.trim() {
            "/open" => Self::Open,
            "/close" => Self::Close,
            "/clear" => Self::Clear,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Message(line),
        }
    }
}

/// Writes widget chrome changes and transcript entries as text lines.
pub struct TerminalView<W: Write> {
    out: RefCell<W>,
    visible: Cell<bool>,
    typing: Cell<bool>,
}

impl<W: Write> TerminalView<W> {
    /// Render onto `out`.
    pub const fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
            visible: Cell::new(false),
            typing: Cell::new(false),
        }
    }

    fn line(&self, args: fmt::Arguments<'_>) {
        let mut out = self.out.borrow_mut();
        if let Err(e) = out.write_fmt(args).and_then(|()| out.write_all(b"\n")) {
            debug!("Terminal write failed: {e}");
        }
    }

    /// Print an informational line outside the transcript.
    pub fn notice(&self, text: &str) {
        self.line(format_args!("  ({text})"));
    }

    /// Print the input prompt without a newline.
    pub fn prompt(&self) {
        let mut out = self.out.borrow_mut();
        if let Err(e) = out.write_all(b"> ").and_then(|()| out.flush()) {
            debug!("Terminal write failed: {e}");
        }
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

fn speaker(entry: &RenderedEntry) -> &'static str {
    match (entry.role, entry.kind) {
        (Role::User, _) => "you",
        (Role::Assistant, MessageKind::Error) => "error",
        (Role::Assistant, MessageKind::Normal) => "assistant",
    }
}

impl<W: Write> WidgetView for TerminalView<W> {
    fn set_visible(&self, visible: bool) {
        if self.visible.replace(visible) != visible {
            self.notice(if visible { "assistant open" } else { "assistant closed" });
        }
    }

    fn set_toggle_label(&self, label: &str) {
        debug!("Toggle label: {label}");
    }

    fn set_input_enabled(&self, _enabled: bool) {}

    fn set_send_active(&self, _active: bool) {}

    fn set_input_text(&self, _text: &str) {}

    fn focus_input(&self) {}

    fn set_typing_visible(&self, visible: bool) {
        if !self.typing.replace(visible) && visible {
            self.notice("assistant is typing...");
        }
    }
}

impl<W: Write> TranscriptView for TerminalView<W> {
    fn append(&self, entry: &RenderedEntry) {
        for (i, text) in entry.text.lines().enumerate() {
            if i == 0 {
                self.line(format_args!("[{}] {text}", speaker(entry)));
            } else {
                self.line(format_args!("    {text}"));
            }
        }
    }

    fn remove(&self, _id: MessageId) {}

    fn clear(&self) {
        self.line(format_args!(""));
    }

    fn scroll_to_bottom(&self) {}
}

/// Asks `[y/N]` questions on stdout and reads the answer from stdin.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdinConfirm;

impl ConfirmPrompt for StdinConfirm {
    fn confirm(&self, question: &str) -> bool {
        let mut stdout = std::io::stdout();
        if write!(stdout, "{question} [y/N] ")
            .and_then(|()| stdout.flush())
            .is_err()
        {
            return false;
        }
        read_answer(&mut std::io::stdin().lock())
    }
}

/// Read one line and accept `y` or `yes` (any case). Anything else declines.
pub fn read_answer(input: &mut impl BufRead) -> bool {
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}
