//! Interactive chat application module.
//!
//! This module provides a streaming REPL chat interface built on top of the
//! byteforge client library. It supports:
//!
//! - Streaming responses with real-time token display
//! - Cancelling a response mid-stream
//! - Slash commands for models, personas, conversations, usage and top-ups
//! - Configuration from the command line, a YAML file and the environment
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Turn driver and backend-backed session operations
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer, format_usage};
pub use commands::{ChatCommand, help_text, parse_command, top_up_packages_text};
pub use config::{ChatArgs, ChatConfig, ChatFileConfig};
pub use session::{
    ChatSession, GENERATION_FAILED_NOTICE, STREAM_ENDED_NOTICE, SessionStats,
};
