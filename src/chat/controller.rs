//! Chat session controller: the `Closed` / `Open-Idle` / `Open-Sending` state
//! machine and every user-facing action.
//!
//! The widget is single-threaded. All state lives in `Cell`/`RefCell` and is
//! never borrowed across a suspension point, so actions may interleave at the
//! network calls but each handler runs to completion between them.

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::analytics::{AnalyticsEvent, AnalyticsSink, NoopAnalytics};
use super::client::AssistantService;
use super::config::{BootstrapPolicy, ChatConfig};
use super::error::{CLEAR_FAILED, ChatError, ChatResult};
use super::format::MessageFormatter;
use super::storage::{KeyValueStorage, SessionStore};
use super::transcript::TranscriptRenderer;
use super::types::{Message, PageContext, SessionId};
use super::view::{ConfirmPrompt, PageContextProvider, TranscriptView, WidgetView};

/// Toggle label while the panel is open.
pub const CLOSE_LABEL: &str = "Close AI Assistant";
/// Toggle label while the panel is closed.
pub const OPEN_LABEL: &str = "Open AI Assistant";
/// Question asked before clearing the conversation.
pub const CLEAR_CONFIRMATION: &str =
    "Are you sure you want to clear the chat history? This action cannot be undone.";

/// Widget state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WidgetPhase {
    /// Panel hidden.
    Closed,
    /// Panel shown, ready to send.
    OpenIdle,
    /// Panel shown, one turn in flight.
    OpenSending,
}

/// Why a send was not admitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectReason {
    /// Input was empty after trimming.
    EmptyInput,
    /// Another turn is in flight.
    Busy,
    /// The widget is closed.
    Closed,
}

/// Result of a send action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    /// An assistant turn was appended.
    Replied,
    /// An error turn was appended.
    Failed,
    /// Nothing happened.
    Rejected(RejectReason),
}

/// Result of a clear-chat action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClearOutcome {
    /// The user declined the confirmation.
    Cancelled,
    /// Local and server state were cleared.
    Cleared,
    /// Local state was cleared, the server clear failed.
    ClearedWithError,
}

/// Keys the widget reacts to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Key {
    /// Return key, with or without Shift held.
    Enter {
        /// Whether Shift was held.
        shift: bool,
    },
    /// Escape key.
    Escape,
    /// Anything else.
    Other,
}

/// Builder collecting the host capabilities a widget needs.
#[derive(Default)]
pub struct ChatWidgetBuilder {
    config: ChatConfig,
    widget_view: Option<Rc<dyn WidgetView>>,
    transcript_view: Option<Rc<dyn TranscriptView>>,
    confirm: Option<Rc<dyn ConfirmPrompt>>,
    storage: Option<Rc<dyn KeyValueStorage>>,
    service: Option<Rc<dyn AssistantService>>,
    context: Option<Rc<dyn PageContextProvider>>,
    analytics: Option<Rc<dyn AnalyticsSink>>,
}

impl ChatWidgetBuilder {
    /// Start a builder with `config`.
    #[must_use]
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Panel chrome (required).
    #[must_use]
    pub fn widget_view(mut self, view: Rc<dyn WidgetView>) -> Self {
        self.widget_view = Some(view);
        self
    }

    /// Transcript surface (required).
    #[must_use]
    pub fn transcript_view(mut self, view: Rc<dyn TranscriptView>) -> Self {
        self.transcript_view = Some(view);
        self
    }

    /// Confirmation prompt for destructive actions (required).
    #[must_use]
    pub fn confirm_prompt(mut self, prompt: Rc<dyn ConfirmPrompt>) -> Self {
        self.confirm = Some(prompt);
        self
    }

    /// Durable storage for the session identifier (required).
    #[must_use]
    pub fn storage(mut self, storage: Rc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Assistant service (required).
    #[must_use]
    pub fn service(mut self, service: Rc<dyn AssistantService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Page context supplier. Defaults to an anonymous visitor.
    #[must_use]
    pub fn page_context(mut self, context: Rc<dyn PageContextProvider>) -> Self {
        self.context = Some(context);
        self
    }

    /// Analytics sink. Defaults to [`NoopAnalytics`].
    #[must_use]
    pub fn analytics(mut self, sink: Rc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(sink);
        self
    }

    /// Mount the widget: validate, draw the closed chrome and the welcome entry.
    ///
    /// # Errors
    /// `Configuration` if the config is invalid or a required mount point is
    /// missing.
    pub fn build(self) -> ChatResult<ChatWidget> {
        self.config.validate()?;

        let widget = required(self.widget_view, "widget view")?;
        let transcript_view = required(self.transcript_view, "transcript view")?;
        let confirm = required(self.confirm, "confirm prompt")?;
        let storage = required(self.storage, "storage")?;
        let service = required(self.service, "assistant service")?;
        let context: Rc<dyn PageContextProvider> = match self.context {
            Some(context) => context,
            None => Rc::new(PageContext::anonymous()),
        };
        let analytics: Rc<dyn AnalyticsSink> = match self.analytics {
            Some(sink) => sink,
            None => Rc::new(NoopAnalytics),
        };

        let mut transcript = TranscriptRenderer::new(
            transcript_view,
            MessageFormatter::new()?,
            self.config.transcript_cap,
        );
        transcript.reset_welcome(&context.page_context());

        widget.set_visible(false);
        widget.set_toggle_label(OPEN_LABEL);
        widget.set_input_enabled(true);
        widget.set_send_active(false);
        widget.set_typing_visible(false);

        let session = SessionStore::new(storage, self.config.session_key.clone());
        info!(base_url = %self.config.base_url, "Chat widget mounted");

        Ok(ChatWidget {
            config: self.config,
            widget,
            transcript: RefCell::new(transcript),
            confirm,
            session,
            service,
            context,
            analytics,
            phase: Cell::new(WidgetPhase::Closed),
            draft: RefCell::new(String::new()),
            bootstrapped: Cell::new(false),
            send_epoch: Cell::new(0),
            session_epoch: Cell::new(0),
        })
    }
}

fn required<T: ?Sized>(slot: Option<Rc<T>>, name: &str) -> ChatResult<Rc<T>> {
    slot.ok_or_else(|| ChatError::Configuration(format!("missing mount point: {name}")))
}

/// A mounted chat widget.
pub struct ChatWidget {
    config: ChatConfig,
    widget: Rc<dyn WidgetView>,
    transcript: RefCell<TranscriptRenderer>,
    confirm: Rc<dyn ConfirmPrompt>,
    session: SessionStore,
    service: Rc<dyn AssistantService>,
    context: Rc<dyn PageContextProvider>,
    analytics: Rc<dyn AnalyticsSink>,
    phase: Cell<WidgetPhase>,
    draft: RefCell<String>,
    bootstrapped: Cell<bool>,
    send_epoch: Cell<u64>,
    session_epoch: Cell<u64>,
}

/// Restores `Open-Idle` when a send settles or its future is dropped.
struct SendGuard<'a> {
    widget: &'a ChatWidget,
    epoch: u64,
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.widget.finish_send(self.epoch);
    }
}

impl ChatWidget {
    /// Start a builder.
    #[must_use]
    pub fn builder(config: ChatConfig) -> ChatWidgetBuilder {
        ChatWidgetBuilder::new(config)
    }

    /// Run the mount-time history bootstrap when the policy asks for it.
    pub async fn start(&self) {
        if self.config.bootstrap == BootstrapPolicy::OnMount {
            self.bootstrap().await;
        }
    }

    /// Load history once per widget lifetime.
    async fn bootstrap(&self) {
        if self.bootstrapped.replace(true) {
            return;
        }
        let Some(session_id) = self.current_session() else {
            debug!("No stored chat session, keeping welcome");
            return;
        };
        let session_epoch = self.session_epoch.get();

        let history = self.service.fetch_history(Some(session_id)).await;

        if self.session_epoch.get() != session_epoch {
            debug!("Chat cleared while history was loading, discarding it");
            return;
        }
        let context = self.context.page_context();
        let mut transcript = self.transcript.borrow_mut();
        if !history.is_empty() {
            debug!("Restoring {} history entries", history.len());
            transcript.reset(history, &context);
        } else if transcript.only_welcome() {
            transcript.reset_welcome(&context);
        }
    }

    /// Show the panel. Triggers the bootstrap on first open when configured.
    pub async fn open(&self) {
        if self.phase.get() != WidgetPhase::Closed {
            return;
        }
        self.phase.set(WidgetPhase::OpenIdle);
        self.widget.set_visible(true);
        self.widget.set_toggle_label(CLOSE_LABEL);
        self.widget.set_input_enabled(true);
        self.widget.focus_input();
        self.analytics.track(&AnalyticsEvent::Opened);

        if self.config.bootstrap == BootstrapPolicy::OnFirstOpen {
            self.bootstrap().await;
        }
    }

    /// Hide the panel. An in-flight send keeps running but no longer holds
    /// the input.
    pub fn close(&self) {
        if self.phase.get() == WidgetPhase::Closed {
            return;
        }
        self.phase.set(WidgetPhase::Closed);
        self.widget.set_visible(false);
        self.widget.set_toggle_label(OPEN_LABEL);
        self.widget.set_typing_visible(false);
        self.widget.set_input_enabled(true);
        self.analytics.track(&AnalyticsEvent::Closed);
    }

    /// Open when closed, close when open.
    pub async fn toggle(&self) {
        if self.is_open() {
            self.close();
        } else {
            self.open().await;
        }
    }

    /// Open and pre-fill the draft.
    pub async fn open_with_message(&self, text: &str) {
        self.open().await;
        if !text.is_empty() {
            self.widget.set_input_text(text);
            self.set_input(text);
        }
    }

    /// Record the draft as typed by the user.
    pub fn set_input(&self, text: &str) {
        text.clone_into(&mut self.draft.borrow_mut());
        self.widget.set_send_active(!text.trim().is_empty());
    }

    /// Send the current draft, clearing it once the send is admitted.
    pub async fn send_input(&self) -> SendOutcome {
        let draft = self.draft.borrow().clone();
        let (message, guard) = match self.admit(&draft) {
            Ok(admitted) => admitted,
            Err(reason) => return SendOutcome::Rejected(reason),
        };
        self.draft.borrow_mut().clear();
        self.widget.set_input_text("");
        self.widget.set_send_active(false);
        self.dispatch(message, guard).await
    }

    /// Send `text` as one turn.
    pub async fn send(&self, text: &str) -> SendOutcome {
        match self.admit(text) {
            Ok((message, guard)) => self.dispatch(message, guard).await,
            Err(reason) => SendOutcome::Rejected(reason),
        }
    }

    /// React to a key press. Returns the send outcome when Enter sent the draft.
    pub async fn handle_key(&self, key: Key) -> Option<SendOutcome> {
        match key {
            Key::Enter { shift: false } => Some(self.send_input().await),
            Key::Escape => {
                self.close();
                None
            }
            Key::Enter { shift: true } | Key::Other => None,
        }
    }

    /// Ask for confirmation, then clear local state and the server session.
    pub async fn clear_chat(&self) -> ClearOutcome {
        if !self.confirm.confirm(CLEAR_CONFIRMATION) {
            return ClearOutcome::Cancelled;
        }
        let session_id = self.current_session();
        self.session_epoch.set(self.session_epoch.get() + 1);
        if let Err(e) = self.session.clear() {
            warn!("Failed to remove stored chat session: {e}");
        }
        self.transcript
            .borrow_mut()
            .reset_welcome(&self.context.page_context());

        let result = self.service.clear_session(session_id).await;
        self.analytics.track(&AnalyticsEvent::ChatCleared);

        match result {
            Ok(()) => {
                info!("Chat history cleared");
                ClearOutcome::Cleared
            }
            Err(e) => {
                warn!("Server-side chat clear failed: {e}");
                self.transcript.borrow_mut().append(Message::error(CLEAR_FAILED));
                ClearOutcome::ClearedWithError
            }
        }
    }

    /// Admission control: trim, reject empty/busy/closed, enter `Open-Sending`.
    fn admit(&self, text: &str) -> Result<(String, SendGuard<'_>), RejectReason> {
        let message = text.trim();
        if message.is_empty() {
            return Err(RejectReason::EmptyInput);
        }
        match self.phase.get() {
            WidgetPhase::Closed => return Err(RejectReason::Closed),
            WidgetPhase::OpenSending => return Err(RejectReason::Busy),
            WidgetPhase::OpenIdle => {}
        }

        let epoch = self.send_epoch.get() + 1;
        self.send_epoch.set(epoch);
        self.phase.set(WidgetPhase::OpenSending);
        self.widget.set_input_enabled(false);

        Ok((message.to_string(), SendGuard { widget: self, epoch }))
    }

    async fn dispatch(&self, message: String, guard: SendGuard<'_>) -> SendOutcome {
        let message_length = message.chars().count();
        let session_epoch = self.session_epoch.get();

        self.transcript
            .borrow_mut()
            .append(Message::user(message.as_str()));
        self.set_typing(true);

        let session_id = self.current_session();
        let result = self.service.send_turn(message, session_id).await;

        if self.is_current_send(guard.epoch) {
            self.set_typing(false);
        }

        let outcome = match result {
            Ok(turn) => {
                self.transcript
                    .borrow_mut()
                    .append(Message::assistant(turn.reply));
                if let Some(session_id) = turn.session_id {
                    self.persist_session(&session_id, session_epoch);
                }
                SendOutcome::Replied
            }
            Err(e) => {
                warn!("Chat turn failed: {e}");
                self.transcript
                    .borrow_mut()
                    .append(Message::error(e.user_message()));
                SendOutcome::Failed
            }
        };

        self.analytics
            .track(&AnalyticsEvent::MessageSent { message_length });
        drop(guard);
        outcome
    }

    fn persist_session(&self, session_id: &SessionId, issued_at: u64) {
        if self.session_epoch.get() != issued_at {
            debug!("Chat cleared during the turn, dropping returned session id");
            return;
        }
        if let Err(e) = self.session.set(session_id) {
            warn!("Failed to persist chat session: {e}");
        }
    }

    fn finish_send(&self, epoch: u64) {
        if !self.is_current_send(epoch) {
            return;
        }
        self.set_typing(false);
        self.widget.set_input_enabled(true);
        if self.phase.get() == WidgetPhase::OpenSending {
            self.phase.set(WidgetPhase::OpenIdle);
            self.widget.focus_input();
        }
    }

    fn is_current_send(&self, epoch: u64) -> bool {
        self.send_epoch.get() == epoch
    }

    fn set_typing(&self, visible: bool) {
        self.widget.set_typing_visible(visible);
        if visible {
            self.transcript.borrow().scroll_to_bottom();
        }
    }

    fn current_session(&self) -> Option<SessionId> {
        self.session.get().unwrap_or_else(|e| {
            warn!("Failed to read stored chat session: {e}");
            None
        })
    }

    /// Current state.
    #[must_use]
    pub fn phase(&self) -> WidgetPhase {
        self.phase.get()
    }

    /// Whether the panel is shown.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase.get() != WidgetPhase::Closed
    }

    /// Current draft.
    #[must_use]
    pub fn draft(&self) -> String {
        self.draft.borrow().clone()
    }

    /// Stored session identifier.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.current_session()
    }

    /// Read access to the transcript. Do not hold it across an `.await`.
    pub fn transcript(&self) -> Ref<'_, TranscriptRenderer> {
        self.transcript.borrow()
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &ChatConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use futures::FutureExt;

    use super::*;
    use crate::chat::client::{ServiceFuture, TurnReply};
    use crate::chat::error::TECHNICAL_DIFFICULTIES;
    use crate::chat::storage::MemoryStorage;
    use crate::chat::transcript::RenderedEntry;
    use crate::chat::types::{MessageId, MessageKind, Role, UserRole};

    #[derive(Default)]
    struct ScriptedService {
        replies: RefCell<VecDeque<ChatResult<TurnReply>>>,
        history: RefCell<Vec<Message>>,
        clear_fails: Cell<bool>,
        sent: RefCell<Vec<(String, Option<SessionId>)>>,
        history_calls: Cell<usize>,
        cleared: RefCell<Vec<Option<SessionId>>>,
    }

    impl ScriptedService {
        fn reply(&self, text: &str, session: Option<&str>) {
            self.replies.borrow_mut().push_back(Ok(TurnReply {
                reply: text.to_string(),
                session_id: session.map(SessionId::from),
            }));
        }

        fn fail(&self, error: ChatError) {
            self.replies.borrow_mut().push_back(Err(error));
        }
    }

    impl AssistantService for ScriptedService {
        fn send_turn(
            &self,
            message: String,
            session_id: Option<SessionId>,
        ) -> ServiceFuture<'_, ChatResult<TurnReply>> {
            async move {
                self.sent.borrow_mut().push((message, session_id));
                tokio::task::yield_now().await;
                self.replies
                    .borrow_mut()
                    .pop_front()
                    .unwrap_or_else(|| Err(ChatError::HttpStatus(503)))
            }
            .boxed_local()
        }

        fn fetch_history(&self, _session_id: Option<SessionId>) -> ServiceFuture<'_, Vec<Message>> {
            async move {
                self.history_calls.set(self.history_calls.get() + 1);
                tokio::task::yield_now().await;
                self.history.borrow().clone()
            }
            .boxed_local()
        }

        fn clear_session(
            &self,
            session_id: Option<SessionId>,
        ) -> ServiceFuture<'_, ChatResult<()>> {
            async move {
                self.cleared.borrow_mut().push(session_id);
                tokio::task::yield_now().await;
                if self.clear_fails.get() {
                    Err(ChatError::HttpStatus(500))
                } else {
                    Ok(())
                }
            }
            .boxed_local()
        }
    }

    #[derive(Default)]
    struct Host {
        visible: Cell<bool>,
        label: RefCell<String>,
        input_enabled: Cell<bool>,
        send_active: Cell<bool>,
        input_text: RefCell<String>,
        focused: Cell<usize>,
        typing: Cell<bool>,
        scrolls: Cell<usize>,
        drawn: RefCell<Vec<RenderedEntry>>,
        accept: Cell<bool>,
    }

    impl WidgetView for Host {
        fn set_visible(&self, visible: bool) {
            self.visible.set(visible);
        }
        fn set_toggle_label(&self, label: &str) {
            label.clone_into(&mut self.label.borrow_mut());
        }
        fn set_input_enabled(&self, enabled: bool) {
            self.input_enabled.set(enabled);
        }
        fn set_send_active(&self, active: bool) {
            self.send_active.set(active);
        }
        fn set_input_text(&self, text: &str) {
            text.clone_into(&mut self.input_text.borrow_mut());
        }
        fn focus_input(&self) {
            self.focused.set(self.focused.get() + 1);
        }
        fn set_typing_visible(&self, visible: bool) {
            self.typing.set(visible);
        }
    }

    impl TranscriptView for Host {
        fn append(&self, entry: &RenderedEntry) {
            self.drawn.borrow_mut().push(entry.clone());
        }
        fn remove(&self, id: MessageId) {
            self.drawn.borrow_mut().retain(|e| e.id != id);
        }
        fn clear(&self) {
            self.drawn.borrow_mut().clear();
        }
        fn scroll_to_bottom(&self) {
            self.scrolls.set(self.scrolls.get() + 1);
        }
    }

    impl ConfirmPrompt for Host {
        fn confirm(&self, _question: &str) -> bool {
            self.accept.get()
        }
    }

    #[derive(Default)]
    struct RecordingAnalytics {
        events: RefCell<Vec<AnalyticsEvent>>,
    }

    impl AnalyticsSink for RecordingAnalytics {
        fn track(&self, event: &AnalyticsEvent) {
            self.events.borrow_mut().push(*event);
        }
    }

    struct Fixture {
        widget: ChatWidget,
        host: Rc<Host>,
        service: Rc<ScriptedService>,
        storage: Rc<MemoryStorage>,
        analytics: Rc<RecordingAnalytics>,
    }

    fn fixture_with(
        config: ChatConfig,
        context: PageContext,
        session: Option<&str>,
    ) -> ChatResult<Fixture> {
        let host = Rc::new(Host::default());
        host.accept.set(true);
        let service = Rc::new(ScriptedService::default());
        let storage = Rc::new(MemoryStorage::new());
        if let Some(session) = session {
            storage.set_item(&config.session_key, session)?;
        }
        let analytics = Rc::new(RecordingAnalytics::default());

        let widget = ChatWidget::builder(config)
            .widget_view(host.clone())
            .transcript_view(host.clone())
            .confirm_prompt(host.clone())
            .storage(storage.clone())
            .service(service.clone())
            .page_context(Rc::new(context))
            .analytics(analytics.clone())
            .build()?;

        Ok(Fixture {
            widget,
            host,
            service,
            storage,
            analytics,
        })
    }

    fn fixture() -> ChatResult<Fixture> {
        fixture_with(ChatConfig::default(), PageContext::anonymous(), None)
    }

    fn texts(widget: &ChatWidget) -> Vec<(Role, MessageKind, String)> {
        widget
            .transcript()
            .entries()
            .filter(|e| !e.welcome)
            .map(|e| (e.role, e.kind, e.text.clone()))
            .collect()
    }

    #[test]
    fn test_build_fails_on_missing_mount_point() {
        let result = ChatWidget::builder(ChatConfig::default())
            .widget_view(Rc::new(Host::default()))
            .build();
        assert!(matches!(
            result.err(),
            Some(ChatError::Configuration(msg)) if msg.starts_with("missing mount point")
        ));
    }

    #[test]
    fn test_mount_shows_welcome_while_closed() -> ChatResult<()> {
        let f = fixture()?;
        assert_eq!(f.widget.phase(), WidgetPhase::Closed);
        assert!(!f.host.visible.get());
        assert_eq!(*f.host.label.borrow(), OPEN_LABEL);
        assert!(f.widget.transcript().only_welcome());
        assert_eq!(f.host.drawn.borrow().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_open_close_toggle() -> ChatResult<()> {
        let f = fixture()?;

        f.widget.toggle().await;
        assert_eq!(f.widget.phase(), WidgetPhase::OpenIdle);
        assert!(f.host.visible.get());
        assert_eq!(*f.host.label.borrow(), CLOSE_LABEL);
        assert_eq!(f.host.focused.get(), 1);

        f.widget.toggle().await;
        assert_eq!(f.widget.phase(), WidgetPhase::Closed);
        assert_eq!(*f.host.label.borrow(), OPEN_LABEL);

        f.widget.close();
        assert_eq!(
            *f.analytics.events.borrow(),
            vec![AnalyticsEvent::Opened, AnalyticsEvent::Closed]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_send_persists_session_and_appends_reply() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.open().await;
        f.service.reply("hi", Some("abc"));

        let outcome = f.widget.send("  hello  ").await;

        assert_eq!(outcome, SendOutcome::Replied);
        assert_eq!(f.widget.session_id(), Some(SessionId::from("abc")));
        assert_eq!(
            texts(&f.widget),
            vec![
                (Role::User, MessageKind::Normal, "hello".to_string()),
                (Role::Assistant, MessageKind::Normal, "hi".to_string()),
            ]
        );
        assert_eq!(f.widget.phase(), WidgetPhase::OpenIdle);
        assert!(f.host.input_enabled.get());
        assert!(!f.host.typing.get());
        assert!(f
            .analytics
            .events
            .borrow()
            .contains(&AnalyticsEvent::MessageSent { message_length: 5 }));

        f.service.reply("again", Some("def"));
        f.widget.send("next").await;
        assert_eq!(
            f.service.sent.borrow().last().map(|(_, s)| s.clone()),
            Some(Some(SessionId::from("abc")))
        );
        assert_eq!(f.widget.session_id(), Some(SessionId::from("def")));
        Ok(())
    }

    #[tokio::test]
    async fn test_send_rejections() -> ChatResult<()> {
        let f = fixture()?;
        assert_eq!(
            f.widget.send("hello").await,
            SendOutcome::Rejected(RejectReason::Closed)
        );

        f.widget.open().await;
        assert_eq!(
            f.widget.send("   \n").await,
            SendOutcome::Rejected(RejectReason::EmptyInput)
        );
        assert!(f.service.sent.borrow().is_empty());
        assert!(texts(&f.widget).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_send_while_sending_is_rejected() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.open().await;
        f.service.reply("one", None);
        f.service.reply("two", None);

        let (first, second) = tokio::join!(f.widget.send("a"), f.widget.send("b"));

        assert_eq!(first, SendOutcome::Replied);
        assert_eq!(second, SendOutcome::Rejected(RejectReason::Busy));
        assert_eq!(f.service.sent.borrow().len(), 1);
        let user_turns = texts(&f.widget)
            .iter()
            .filter(|(role, _, _)| *role == Role::User)
            .count();
        assert_eq!(user_turns, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_failure_renders_fallback_error() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.open().await;
        f.service.fail(ChatError::HttpStatus(502));

        let outcome = f.widget.send("hello").await;

        assert_eq!(outcome, SendOutcome::Failed);
        assert_eq!(
            texts(&f.widget),
            vec![
                (Role::User, MessageKind::Normal, "hello".to_string()),
                (Role::Assistant, MessageKind::Error, TECHNICAL_DIFFICULTIES.to_string()),
            ]
        );
        assert_eq!(f.widget.phase(), WidgetPhase::OpenIdle);
        assert!(f.host.input_enabled.get());
        assert!(!f.host.typing.get());
        assert_eq!(f.widget.session_id(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_service_error_shown_verbatim() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.open().await;
        f.service.fail(ChatError::Service("Message is required".to_string()));

        f.widget.send("x").await;
        assert_eq!(
            f.widget.transcript().last().map(|e| (e.kind, e.text.clone())),
            Some((MessageKind::Error, "Message is required".to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_typing_indicator_during_send() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.open().await;
        f.service.reply("ok", None);

        let observe = async {
            (f.host.typing.get(), f.host.input_enabled.get(), f.widget.phase())
        };
        let (_, during) = tokio::join!(f.widget.send("hello"), observe);

        assert_eq!(during, (true, false, WidgetPhase::OpenSending));
        assert!(!f.host.typing.get());
        Ok(())
    }

    #[tokio::test]
    async fn test_bootstrap_company_welcome_on_empty_history() -> ChatResult<()> {
        let f = fixture_with(
            ChatConfig::default(),
            PageContext::authenticated(Some(UserRole::Company)),
            Some("abc"),
        )?;

        f.widget.start().await;
        f.widget.start().await;

        assert_eq!(f.service.history_calls.get(), 1);
        let transcript = f.widget.transcript();
        let welcome = transcript.last();
        assert!(welcome.is_some_and(|e| e.welcome));
        assert!(welcome.is_some_and(|e| e.text.contains("Managing your job postings")));
        assert!(welcome.is_some_and(|e| !e.text.contains("Finding and browsing jobs")));
        Ok(())
    }

    #[tokio::test]
    async fn test_bootstrap_replaces_welcome_with_history() -> ChatResult<()> {
        let f = fixture_with(ChatConfig::default(), PageContext::anonymous(), Some("abc"))?;
        *f.service.history.borrow_mut() = vec![Message::user("q"), Message::assistant("a")];

        f.widget.start().await;

        assert_eq!(f.widget.transcript().len(), 2);
        assert!(f.widget.transcript().entries().all(|e| !e.welcome));
        Ok(())
    }

    #[tokio::test]
    async fn test_bootstrap_without_session_skips_fetch() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.start().await;
        assert_eq!(f.service.history_calls.get(), 0);
        assert!(f.widget.transcript().only_welcome());
        Ok(())
    }

    #[tokio::test]
    async fn test_bootstrap_on_first_open() -> ChatResult<()> {
        let config = ChatConfig::default().with_bootstrap(BootstrapPolicy::OnFirstOpen);
        let f = fixture_with(config, PageContext::anonymous(), Some("abc"))?;

        f.widget.start().await;
        assert_eq!(f.service.history_calls.get(), 0);

        f.widget.open().await;
        f.widget.close();
        f.widget.open().await;
        assert_eq!(f.service.history_calls.get(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_chat_resets_even_when_server_fails() -> ChatResult<()> {
        let f = fixture_with(ChatConfig::default(), PageContext::anonymous(), Some("abc"))?;
        f.widget.open().await;
        f.service.reply("hi", None);
        f.widget.send("hello").await;
        f.service.clear_fails.set(true);

        let outcome = f.widget.clear_chat().await;

        assert_eq!(outcome, ClearOutcome::ClearedWithError);
        assert_eq!(f.widget.session_id(), None);
        assert!(!f.storage.contains(&f.widget.config().session_key));
        assert_eq!(*f.service.cleared.borrow(), vec![Some(SessionId::from("abc"))]);

        let transcript = f.widget.transcript();
        assert_eq!(transcript.len(), 2);
        assert!(transcript.entries().next().is_some_and(|e| e.welcome));
        assert_eq!(
            transcript.last().map(|e| (e.kind, e.text.clone())),
            Some((MessageKind::Error, CLEAR_FAILED.to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_chat_success_and_cancel() -> ChatResult<()> {
        let f = fixture_with(ChatConfig::default(), PageContext::anonymous(), Some("abc"))?;
        f.widget.open().await;

        f.host.accept.set(false);
        assert_eq!(f.widget.clear_chat().await, ClearOutcome::Cancelled);
        assert_eq!(f.widget.session_id(), Some(SessionId::from("abc")));
        assert!(f.service.cleared.borrow().is_empty());

        f.host.accept.set(true);
        assert_eq!(f.widget.clear_chat().await, ClearOutcome::Cleared);
        assert_eq!(f.widget.session_id(), None);
        assert!(f.widget.transcript().only_welcome());
        assert!(f.analytics.events.borrow().contains(&AnalyticsEvent::ChatCleared));
        Ok(())
    }

    #[tokio::test]
    async fn test_session_id_returned_after_clear_is_dropped() -> ChatResult<()> {
        let f = fixture_with(ChatConfig::default(), PageContext::anonymous(), Some("abc"))?;
        f.widget.open().await;
        f.service.reply("late", Some("abc"));

        let (sent, cleared) = tokio::join!(f.widget.send("hello"), f.widget.clear_chat());

        assert_eq!(sent, SendOutcome::Replied);
        assert_eq!(cleared, ClearOutcome::Cleared);
        assert_eq!(f.widget.session_id(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_send_restores_idle() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.open().await;

        let mut send = Box::pin(f.widget.send("hello"));
        assert!(futures::poll!(send.as_mut()).is_pending());
        assert_eq!(f.widget.phase(), WidgetPhase::OpenSending);
        assert!(!f.host.input_enabled.get());
        assert!(f.host.typing.get());

        drop(send);

        assert_eq!(f.widget.phase(), WidgetPhase::OpenIdle);
        assert!(f.host.input_enabled.get());
        assert!(!f.host.typing.get());
        f.service.reply("back", None);
        assert_eq!(f.widget.send("again").await, SendOutcome::Replied);
        Ok(())
    }

    #[tokio::test]
    async fn test_history_settling_after_clear_is_discarded() -> ChatResult<()> {
        let f = fixture_with(ChatConfig::default(), PageContext::anonymous(), Some("abc"))?;
        *f.service.history.borrow_mut() = vec![Message::user("q"), Message::assistant("a")];

        let ((), cleared) = tokio::join!(f.widget.start(), f.widget.clear_chat());

        assert_eq!(cleared, ClearOutcome::Cleared);
        assert_eq!(f.service.history_calls.get(), 1);
        assert!(f.widget.transcript().only_welcome());
        assert_eq!(f.widget.session_id(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_close_while_sending_releases_input() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.open().await;
        f.service.reply("late reply", None);

        let close = async {
            f.widget.close();
            (f.host.input_enabled.get(), f.host.typing.get())
        };
        let (outcome, during) = tokio::join!(f.widget.send("hello"), close);

        assert_eq!(during, (true, false));
        assert_eq!(outcome, SendOutcome::Replied);
        assert_eq!(f.widget.phase(), WidgetPhase::Closed);
        assert!(f.host.input_enabled.get());
        assert_eq!(
            f.widget.transcript().last().map(|e| e.text.clone()).as_deref(),
            Some("late reply")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_send_does_not_unlock_newer_send() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.open().await;
        f.service.reply("first", None);
        f.service.reply("second", None);

        let reopen_and_send = async {
            f.widget.close();
            f.widget.open().await;
            f.widget.send("b").await
        };
        let (first, second) = tokio::join!(f.widget.send("a"), reopen_and_send);

        assert_eq!(first, SendOutcome::Replied);
        assert_eq!(second, SendOutcome::Replied);
        assert_eq!(f.service.sent.borrow().len(), 2);
        assert_eq!(f.widget.phase(), WidgetPhase::OpenIdle);
        assert!(f.host.input_enabled.get());
        Ok(())
    }

    #[tokio::test]
    async fn test_keyboard_and_draft() -> ChatResult<()> {
        let f = fixture()?;
        f.widget.open_with_message("Tell me about jobs").await;
        assert_eq!(f.widget.draft(), "Tell me about jobs");
        assert_eq!(*f.host.input_text.borrow(), "Tell me about jobs");
        assert!(f.host.send_active.get());

        assert_eq!(f.widget.handle_key(Key::Enter { shift: true }).await, None);
        assert!(f.service.sent.borrow().is_empty());

        f.service.reply("sure", None);
        assert_eq!(
            f.widget.handle_key(Key::Enter { shift: false }).await,
            Some(SendOutcome::Replied)
        );
        assert_eq!(f.widget.draft(), "");
        assert_eq!(*f.host.input_text.borrow(), "");
        assert!(!f.host.send_active.get());

        f.widget.set_input("   ");
        assert!(!f.host.send_active.get());

        assert_eq!(f.widget.handle_key(Key::Escape).await, None);
        assert_eq!(f.widget.phase(), WidgetPhase::Closed);
        Ok(())
    }
}
