//! Interactive chat client for the ByteForge backend.
//!
//! # Usage
//!
//! ```bash
//! # Uses BYTEFORGE_API_URL and BYTEFORGE_ACCESS_TOKEN
//! byteforge-chat
//!
//! # Pick a model and persona
//! byteforge-chat --model anthropic/claude-3.5-sonnet --persona developer
//!
//! # Read settings from a file, without colors
//! byteforge-chat --config byteforge.yaml --no-color
//! ```
//!
//! Set `BYTEFORGE_LOG=debug` to see request and stream diagnostics on stderr.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use byteforge::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, format_usage,
    help_text, parse_command, top_up_packages_text,
};
use byteforge::{ByteForge, ConversationId, Persona, TurnOutcome, tokens_for_amount};

const LOG_ENV: &str = "BYTEFORGE_LOG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("byteforge-chat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    let use_color = config.use_color;

    let mut session = ChatSession::connect(config)?;
    let model_count = session.refresh_models().await;
    tracing::debug!(model_count, "model catalog loaded");

    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C cancels whichever turn is current.
    let cancel = Arc::new(Mutex::new(CancellationToken::new()));
    let cancel_handler = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        if let Ok(token) = cancel_handler.lock() {
            token.cancel();
        }
    })?;

    println!(
        "ByteForge Chat (model: {}, persona: {})",
        describe_model(&session),
        session.persona().display_name()
    );
    println!("Type /help for commands, /quit to exit\n");

    let mut prefill: Option<String> = None;
    loop {
        let readline = match prefill.take() {
            Some(initial) => rl.readline_with_initial("You: ", (&initial, "")),
            None => rl.readline("You: "),
        };

        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        if let Some(command) = parse_command(line) {
            if matches!(command, ChatCommand::Quit) {
                println!("Goodbye!");
                break;
            }
            if let Some(initial) =
                handle_command(command, &mut session, &mut renderer, use_color).await
            {
                prefill = Some(initial);
            }
            continue;
        }

        let token = {
            let fresh = CancellationToken::new();
            match cancel.lock() {
                Ok(mut current) => *current = fresh.clone(),
                Err(_) => tracing::warn!("cancellation handle poisoned"),
            }
            fresh
        };

        println!("Assistant:");
        let outcome = session.send_streaming(line, &mut renderer, &token).await;
        if outcome.keeps_input() {
            prefill = Some(line.to_string());
        }
        match outcome {
            TurnOutcome::Refused(refusal) => renderer.print_error(&refusal.to_string()),
            TurnOutcome::PaymentRequired { .. } => {
                renderer.print_info(&format_usage(session.state().usage(), use_color));
                renderer.print_info("Use /topup <amount> to buy more tokens.");
                renderer.print_info(&top_up_packages_text());
            }
            TurnOutcome::Completed { .. }
            | TurnOutcome::Failed { .. }
            | TurnOutcome::Cancelled { .. } => {}
        }
    }

    Ok(())
}

/// Runs one slash command.  Returns text to prefill the next prompt with.
async fn handle_command(
    command: ChatCommand,
    session: &mut ChatSession<ByteForge>,
    renderer: &mut PlainTextRenderer,
    use_color: bool,
) -> Option<String> {
    match command {
        ChatCommand::New => {
            session.new_conversation();
            renderer.print_info("Started a new conversation.");
        }
        ChatCommand::Model(id) => match session.set_model(&id) {
            Ok(model) => {
                let message = format!("Model changed to: {} ({})", model.name, model.id);
                renderer.print_info(&message);
            }
            Err(err) => renderer.print_error(err.message()),
        },
        ChatCommand::Models(filter) => {
            let current = session.model().map(|m| m.id.clone());
            let models = session.models(filter.as_deref());
            if models.is_empty() {
                renderer.print_info("No models match.");
            }
            for model in models {
                let marker = if current.as_deref() == Some(model.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                let featured = if model.is_featured() { " [featured]" } else { "" };
                println!("  {marker} {:<40} {}{featured}", model.id, model.name);
            }
        }
        ChatCommand::Persona(Some(persona)) => {
            session.set_persona(persona);
            renderer.print_info(&format!("Persona set to: {}", persona.display_name()));
        }
        ChatCommand::Persona(None) => {
            for persona in Persona::ALL {
                let marker = if persona == session.persona() { "*" } else { " " };
                println!("  {marker} {:<10} {}", persona.id(), persona.display_name());
            }
        }
        ChatCommand::Usage => match session.refresh_usage().await {
            Ok(usage) => renderer.print_info(&format_usage(&usage, use_color)),
            Err(err) => renderer.print_error(&err.notice()),
        },
        ChatCommand::TopUp(amount) => match session.top_up(amount).await {
            Ok(response) => {
                let message = response.message.unwrap_or_else(|| {
                    format!("Added {} tokens.", tokens_for_amount(amount))
                });
                renderer.print_info(&message);
                renderer.print_info(&format_usage(session.state().usage(), use_color));
            }
            Err(err) => renderer.print_error(err.message()),
        },
        ChatCommand::TopUpPackages => renderer.print_info(&top_up_packages_text()),
        ChatCommand::Conversations => match session.list_conversations().await {
            Ok(conversations) if conversations.is_empty() => {
                renderer.print_info("No saved conversations.");
            }
            Ok(conversations) => {
                for conversation in conversations {
                    let title = conversation.title.as_deref().unwrap_or("(untitled)");
                    let count = conversation
                        .message_count
                        .map(|n| format!(" ({n} messages)"))
                        .unwrap_or_default();
                    println!("  {:<8} {title}{count}", conversation.id);
                }
            }
            Err(err) => renderer.print_error(&err.notice()),
        },
        ChatCommand::Open(id) => {
            match session.open_conversation(&ConversationId::new(id)).await {
                Ok(()) => print_transcript(session, renderer),
                Err(err) => renderer.print_error(err.message()),
            }
        }
        ChatCommand::Delete(id) => {
            match session.delete_conversation(&ConversationId::new(id)).await {
                Ok(()) => renderer.print_info("Conversation deleted."),
                Err(err) => renderer.print_error(err.message()),
            }
        }
        ChatCommand::Clear => match session.clear_conversation().await {
            Ok(()) => renderer.print_info("Conversation cleared."),
            Err(err) => renderer.print_error(err.message()),
        },
        ChatCommand::Prompts(query) => {
            match session.search_prompts(query.as_deref().unwrap_or("")).await {
                Ok(prompts) if prompts.is_empty() => renderer.print_info("No prompts match."),
                Ok(prompts) => {
                    for prompt in prompts {
                        println!("  {:<24} {}", prompt.slug, prompt.title);
                    }
                }
                Err(err) => renderer.print_error(&err.notice()),
            }
        }
        ChatCommand::Prompt(slug) => match session.find_prompt(&slug).await {
            Ok(Some(prompt)) => return Some(prompt.content),
            Ok(None) => renderer.print_error(&format!("No prompt named {slug}")),
            Err(err) => renderer.print_error(&err.notice()),
        },
        ChatCommand::SaveTranscript(path) => match session.save_transcript_to(&path) {
            Ok(()) => renderer.print_info(&format!("Transcript saved to {path}")),
            Err(err) => renderer.print_error(&format!("Failed to save transcript: {err}")),
        },
        ChatCommand::TranscriptPath(path) => {
            session.set_transcript_path(Some(PathBuf::from(&path)));
            renderer.print_info(&format!("Transcript auto-save set to {path}"));
        }
        ChatCommand::ClearTranscriptPath => {
            session.set_transcript_path(None);
            renderer.print_info("Transcript auto-save disabled.");
        }
        ChatCommand::Stats => print_stats(session, use_color),
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {line}");
            }
        }
        ChatCommand::Invalid(message) => renderer.print_error(&message),
        ChatCommand::Quit => {}
    }
    None
}

fn describe_model(session: &ChatSession<ByteForge>) -> String {
    session
        .model()
        .map(|m| m.id.clone())
        .unwrap_or_else(|| "(none)".to_string())
}

fn print_transcript(session: &ChatSession<ByteForge>, renderer: &mut PlainTextRenderer) {
    let state = session.state();
    let title = state.title().unwrap_or("(untitled)");
    renderer.print_info(&format!("Opened: {title}"));
    for message in state.messages() {
        let speaker = match message.role {
            byteforge::MessageRole::User => "You",
            byteforge::MessageRole::Assistant => "Assistant",
        };
        renderer.print_message(speaker, &message.content);
    }
}

fn print_stats(session: &ChatSession<ByteForge>, use_color: bool) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!(
        "      Model: {}",
        stats.model.as_deref().unwrap_or("(none)")
    );
    println!("      Persona: {}", stats.persona.display_name());
    match stats.conversation_id {
        Some(ref id) => println!(
            "      Conversation: {id} {}",
            stats.title.as_deref().unwrap_or("(untitled)")
        ),
        None => println!("      Conversation: (new)"),
    }
    println!("      Messages: {}", stats.message_count);
    println!("      Last turn: {}", stats.phase);
    println!("      Usage: {}", format_usage(&stats.usage, use_color));
    println!(
        "      Turns: {} completed, {} failed, {} cancelled, {} refused",
        stats.turns_completed, stats.turns_failed, stats.turns_cancelled, stats.turns_refused
    );
    match stats.transcript_path {
        Some(ref path) => println!("      Transcript file: {}", path.display()),
        None => println!("      Transcript file: (disabled)"),
    }
}
