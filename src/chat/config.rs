//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, an optional YAML
//! settings file, and the resolved [`ChatConfig`].  Command-line values win
//! over the file; anything left unset falls back to the environment (base URL
//! and access token) and then to built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Persona;

/// Command-line arguments for the byteforge-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model id (default: first featured model)", "MODEL")]
    pub model: Option<String>,

    /// Persona to start with.
    #[arrrg(optional, "Persona: general, developer, creative, analyst", "PERSONA")]
    pub persona: Option<String>,

    /// Backend API base URL.
    #[arrrg(optional, "API base URL (default: $BYTEFORGE_API_URL)", "URL")]
    pub base_url: Option<String>,

    /// YAML settings file.
    #[arrrg(optional, "Path to a YAML settings file", "FILE")]
    pub config: Option<String>,

    /// Transcript auto-save path.
    #[arrrg(optional, "Save the transcript here after every turn", "FILE")]
    pub transcript: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Settings read from a YAML file.
///
/// ```yaml
/// base_url: https://chat.example.com/api/
/// model: anthropic/claude-3.5-sonnet
/// persona: developer
/// color: false
/// timeout_secs: 60
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatFileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Bearer token.  Prefer BYTEFORGE_ACCESS_TOKEN over storing it on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<Persona>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<PathBuf>,

    /// Timeout for non-streaming requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ChatFileConfig {
    /// Reads and parses a settings file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read {}", path.display()), err)
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after merging the
/// command line, the settings file and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Backend base URL; `None` defers to BYTEFORGE_API_URL.
    pub base_url: Option<String>,

    /// Bearer token; `None` defers to BYTEFORGE_ACCESS_TOKEN.
    pub access_token: Option<String>,

    /// Preferred model id; `None` picks the catalog default.
    pub model: Option<String>,

    /// Persona sent with every turn.
    pub persona: Persona,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Path to persist transcripts automatically after each completed turn.
    pub transcript_path: Option<PathBuf>,

    /// Timeout for non-streaming requests; `None` uses the client default.
    pub timeout: Option<Duration>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults: catalog-default model, general persona, color enabled, no
    /// transcript.
    pub fn new() -> Self {
        Self {
            base_url: None,
            access_token: None,
            model: None,
            persona: Persona::default(),
            use_color: true,
            transcript_path: None,
            timeout: None,
        }
    }

    /// Sets the backend base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Sets the preferred model id.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the transcript auto-save path.
    pub fn with_transcript_path(mut self, path: Option<PathBuf>) -> Self {
        self.transcript_path = path;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Layers a settings file over this configuration.
    pub fn merge_file(mut self, file: ChatFileConfig) -> Self {
        if file.base_url.is_some() {
            self.base_url = file.base_url;
        }
        if file.access_token.is_some() {
            self.access_token = file.access_token;
        }
        if file.model.is_some() {
            self.model = file.model;
        }
        if let Some(persona) = file.persona {
            self.persona = persona;
        }
        if let Some(color) = file.color {
            self.use_color = color;
        }
        if file.transcript.is_some() {
            self.transcript_path = file.transcript;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Some(Duration::from_secs(secs));
        }
        self
    }

    /// Layers command-line arguments over this configuration.
    pub fn merge_args(mut self, args: ChatArgs) -> Result<Self> {
        if let Some(persona) = args.persona {
            self.persona = persona
                .parse()
                .map_err(|err: String| Error::validation(err, Some("persona".to_string())))?;
        }
        if args.model.is_some() {
            self.model = args.model;
        }
        if args.base_url.is_some() {
            self.base_url = args.base_url;
        }
        if let Some(path) = args.transcript {
            self.transcript_path = Some(PathBuf::from(path));
        }
        if args.no_color {
            self.use_color = false;
        }
        Ok(self)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    /// Resolves the full configuration, reading `--config` if given.
    fn try_from(mut args: ChatArgs) -> Result<Self> {
        let mut config = ChatConfig::new();
        if let Some(path) = args.config.take() {
            config = config.merge_file(ChatFileConfig::from_file(path)?);
        }
        config.merge_args(args)
    }
}
