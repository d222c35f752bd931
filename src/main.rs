//! Binary entrypoint that launches the terminal chat.

use std::process::ExitCode;

use jobboard_chat::start_terminal_chat;

/// Start the chat loop against the configured assistant service.
fn main() -> ExitCode {
    start_terminal_chat::run()
}
