//! Startup helpers for the terminal chat host.
//!
//! Reads lines from stdin and drives one widget against the configured
//! assistant service.

use std::process::ExitCode;
use std::rc::Rc;

use anyhow::Context;

use crate::chat::{
    ChatConfig, ChatWidget, HttpAssistantClient, PageContext, PageTokens, RejectReason,
    SendOutcome, SqliteStorage, TracingAnalytics, UserRole,
};
use crate::terminal::{Command, StdinConfirm, TerminalView};

/// Run the terminal chat (used by the `jobboard-chat` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` when the user quits, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting JobBoard chat v{}", env!("CARGO_PKG_VERSION"));

    let config = ChatConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        return ExitCode::from(1);
    }
    tracing::info!("Assistant endpoint: {}", config.base_url);

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(chat_loop(config)) {
        tracing::error!("Chat error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Page context from `JOBBOARD_CHAT_AUTHENTICATED` and `JOBBOARD_CHAT_ROLE`.
#[must_use]
pub fn page_context_from_env() -> PageContext {
    page_context_from(
        std::env::var("JOBBOARD_CHAT_AUTHENTICATED").ok().as_deref(),
        std::env::var("JOBBOARD_CHAT_ROLE").ok().as_deref(),
    )
}

/// Build a page context from raw flag and role values.
///
/// Unknown roles are treated as absent.
#[must_use]
pub fn page_context_from(authenticated: Option<&str>, role: Option<&str>) -> PageContext {
    let authenticated = authenticated.is_some_and(|v| {
        matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    });
    if !authenticated {
        return PageContext::anonymous();
    }
    PageContext::authenticated(role.and_then(|r| r.trim().parse::<UserRole>().ok()))
}

async fn chat_loop(config: ChatConfig) -> anyhow::Result<()> {
    let storage = Rc::new(
        SqliteStorage::open(&config.storage_path).with_context(|| {
            format!("opening session storage {}", config.storage_path.display())
        })?,
    );
    let tokens = PageTokens {
        meta: std::env::var("JOBBOARD_CHAT_CSRF_TOKEN").ok(),
        form_field: None,
    };
    let client = Rc::new(
        HttpAssistantClient::new(&config, tokens).context("creating assistant client")?,
    );
    let view = Rc::new(TerminalView::new(std::io::stdout()));

    let widget = ChatWidget::builder(config)
        .widget_view(view.clone())
        .transcript_view(view.clone())
        .confirm_prompt(Rc::new(StdinConfirm))
        .storage(storage)
        .service(client)
        .page_context(Rc::new(page_context_from_env()))
        .analytics(Rc::new(TracingAnalytics))
        .build()
        .context("mounting chat widget")?;

    widget.start().await;
    widget.open().await;
    view.notice("type /clear, /close, /open or /quit");

    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        view.prompt();
        line.clear();
        if stdin.read_line(&mut line).context("reading stdin")? == 0 {
            break;
        }
        match Command::parse(&line) {
            Command::Quit => break,
            Command::Open => widget.open().await,
            Command::Close => widget.close(),
            Command::Clear => {
                widget.clear_chat().await;
            }
            Command::Message(text) => {
                widget.set_input(text);
                if widget.send_input().await == SendOutcome::Rejected(RejectReason::Closed) {
                    view.notice("assistant is closed, type /open first");
                }
            }
        }
    }

    widget.close();
    Ok(())
}
