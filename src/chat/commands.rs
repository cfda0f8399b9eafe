//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the backend.

use crate::types::{Persona, TOP_UP_PACKAGES};

/// A parsed chat command.
///
/// These commands control the chat session and are never sent as a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Start a new, not-yet-created conversation.
    New,

    /// Change the model.
    Model(String),

    /// List models, optionally filtered.
    Models(Option<String>),

    /// Set the persona, or list personas when `None`.
    Persona(Option<Persona>),

    /// Show the token usage meter.
    Usage,

    /// Buy tokens for the current conversation.
    TopUp(f64),

    /// List the token packages on offer.
    TopUpPackages,

    /// List saved conversations.
    Conversations,

    /// Open a saved conversation.
    Open(String),

    /// Delete a saved conversation.
    Delete(String),

    /// Remove every message from the current conversation.
    Clear,

    /// Search the prompt library.
    Prompts(Option<String>),

    /// Prefill the next input with a prompt template.
    Prompt(String),

    /// Save the transcript to a specific file immediately.
    SaveTranscript(String),

    /// Set the auto-save transcript path.
    TranscriptPath(String),

    /// Clear the auto-save transcript path.
    ClearTranscriptPath,

    /// Display session statistics.
    Stats,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a message.
///
/// # Examples
///
/// ```
/// # use byteforge::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model openai/gpt-4o").is_some());
/// assert!(parse_command("Explain recursion").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "new" => ChatCommand::New,
        "model" => match argument {
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model id".to_string()),
        },
        "models" => ChatCommand::Models(argument.map(str::to_string)),
        "persona" => match argument {
            Some(arg) => match arg.parse::<Persona>() {
                Ok(persona) => ChatCommand::Persona(Some(persona)),
                Err(err) => ChatCommand::Invalid(err),
            },
            None => ChatCommand::Persona(None),
        },
        "usage" | "balance" => ChatCommand::Usage,
        "topup" => match argument {
            Some(arg) => match parse_amount(arg) {
                Ok(amount) => ChatCommand::TopUp(amount),
                Err(err) => ChatCommand::Invalid(format!("/topup {err}")),
            },
            None => ChatCommand::TopUpPackages,
        },
        "conversations" | "history" => ChatCommand::Conversations,
        "open" => required(argument, ChatCommand::Open, "/open requires a conversation id"),
        "delete" => required(
            argument,
            ChatCommand::Delete,
            "/delete requires a conversation id",
        ),
        "clear" => ChatCommand::Clear,
        "prompts" => ChatCommand::Prompts(argument.map(str::to_string)),
        "prompt" => required(argument, ChatCommand::Prompt, "/prompt requires a slug"),
        "save" => required(argument, ChatCommand::SaveTranscript, "/save requires a file path"),
        "transcript" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("clear") => ChatCommand::ClearTranscriptPath,
            Some(arg) => ChatCommand::TranscriptPath(arg.to_string()),
            None => ChatCommand::Invalid("/transcript requires a file path".to_string()),
        },
        "stats" | "status" => ChatCommand::Stats,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn required<F>(argument: Option<&str>, constructor: F, message: &str) -> ChatCommand
where
    F: Fn(String) -> ChatCommand,
{
    match argument {
        Some(arg) => constructor(arg.to_string()),
        None => ChatCommand::Invalid(message.to_string()),
    }
}

fn parse_amount(value: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .trim_start_matches('$')
        .parse()
        .map_err(|_| "expects a positive amount".to_string())?;
    if parsed.is_finite() && parsed > 0.0 {
        Ok(parsed)
    } else {
        Err("expects a positive amount".to_string())
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /new                   Start a new conversation
  /model <id>            Change the model (e.g., /model openai/gpt-4o)
  /models [filter]       List available models
  /persona [name]        Set the persona (no argument lists them)
  /usage                 Show token usage for this conversation
  /topup [amount]        Buy tokens ($1 = 1000 tokens; no argument lists packages)
  /conversations         List saved conversations
  /open <id>             Open a saved conversation
  /delete <id>           Delete a saved conversation
  /clear                 Remove all messages from this conversation
  /prompts [query]       Search the prompt library
  /prompt <slug>         Start the next message from a prompt template
  /save <file>           Save the current transcript immediately
  /transcript <file>     Enable auto-saving transcripts (or 'clear')
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl+C while a response streams to cancel it."#
}

/// Returns the token packages, one per line, as `/topup` shows them.
pub fn top_up_packages_text() -> String {
    let mut text = String::from("Token packages:");
    for (amount, tokens) in TOP_UP_PACKAGES {
        text.push_str(&format!("\n  /topup {amount:<4} ${amount} for {tokens} tokens"));
    }
    text
}
