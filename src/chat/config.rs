//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::fmt;
use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::chat::commands::parse_temperature;
use crate::chat::storage::default_storage_dir;
use crate::fence::TagMode;
use crate::types::{Model, default_model_cycle};

/// Command-line arguments for the gpterm tool.
///
/// Free arguments that are left over after parsing form a single question.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to start with.
    #[arrrg(optional, "Model to start with (default: gpt-3.5-turbo-16k)", "MODEL")]
    pub model: Option<String>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature between 0 and 2", "TEMP")]
    pub temperature: Option<String>,

    /// Directory holding saved chats and roles.yaml.
    #[arrrg(optional, "Directory for saved chats (default: per-OS data dir)", "DIR")]
    pub storage: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint.
    #[arrrg(optional, "Base URL of the API (default: https://api.openai.com/v1/)", "URL")]
    pub base_url: Option<String>,

    /// Name of a stored chat to resume.
    #[arrrg(optional, "Resume a stored chat by name", "NAME")]
    pub resume: Option<String>,

    /// File that receives a JSON-lines log of all API traffic.
    #[arrrg(optional, "Append a JSON-lines traffic log to FILE", "FILE")]
    pub log: Option<String>,

    /// List stored chats and exit.
    #[arrrg(flag, "List stored chats, oldest first, and exit")]
    pub list: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Only accept a language tag delivered as one whole fragment.
    #[arrrg(flag, "Recognize language tags only when they arrive as a whole fragment")]
    pub legacy_tags: bool,
}

/// Errors that turn [`ChatArgs`] into a usage error.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatArgsError {
    /// The temperature did not parse or was out of range.
    InvalidTemperature(String),
}

impl fmt::Display for ChatArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatArgsError::InvalidTemperature(value) => {
                write!(f, "invalid --temperature {value:?}: expected a value between 0 and 2")
            }
        }
    }
}

impl std::error::Error for ChatArgsError {}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Models that `!model` cycles through; never empty.
    models: Vec<Model>,

    /// Index of the active model in `models`.
    model_index: usize,

    /// Optional sampling temperature; `None` uses the endpoint default.
    pub temperature: Option<f32>,

    /// Directory holding saved chats and roles.yaml.
    pub storage_dir: PathBuf,

    /// Base URL of the endpoint, if not the default.
    pub base_url: Option<String>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// How the scanner recognizes language tags.
    pub tag_mode: TagMode,

    /// Path of the JSON-lines traffic log, if any.
    pub log_path: Option<PathBuf>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Models: gpt-3.5-turbo-16k, gpt-4, gpt-3.5-turbo (starting with the first)
    /// - Temperature: endpoint default
    /// - Storage: the per-OS data directory
    /// - Color: enabled
    /// - Tags: line mode
    pub fn new() -> Self {
        Self {
            models: default_model_cycle(),
            model_index: 0,
            temperature: None,
            storage_dir: default_storage_dir().unwrap_or_else(|| PathBuf::from(".gpterm")),
            base_url: None,
            use_color: true,
            tag_mode: TagMode::Line,
            log_path: None,
        }
    }

    /// The model requests currently go to.
    pub fn model(&self) -> &Model {
        &self.models[self.model_index]
    }

    /// Models that `!model` cycles through, in order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Switches to the next model in the cycle and returns it.
    pub fn cycle_model(&mut self) -> &Model {
        self.model_index = (self.model_index + 1) % self.models.len();
        self.model()
    }

    /// Starts with `model`, adding it to the cycle when it is not there yet.
    pub fn with_model(mut self, model: Model) -> Self {
        match self.models.iter().position(|m| *m == model) {
            Some(index) => self.model_index = index,
            None => {
                self.models.insert(0, model);
                self.model_index = 0;
            }
        }
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the storage directory.
    pub fn with_storage_dir(mut self, dir: PathBuf) -> Self {
        self.storage_dir = dir;
        self
    }

    /// Sets the endpoint base URL.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets how language tags are recognized.
    pub fn with_tag_mode(mut self, tag_mode: TagMode) -> Self {
        self.tag_mode = tag_mode;
        self
    }

    /// Sets the traffic log path.
    pub fn with_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<&ChatArgs> for ChatConfig {
    type Error = ChatArgsError;

    fn try_from(args: &ChatArgs) -> Result<Self, Self::Error> {
        let temperature = match &args.temperature {
            Some(value) => Some(
                parse_temperature(value)
                    .map_err(|_| ChatArgsError::InvalidTemperature(value.clone()))?,
            ),
            None => None,
        };

        let mut config = ChatConfig::new()
            .with_temperature(temperature)
            .with_base_url(args.base_url.clone())
            .with_log_path(args.log.as_ref().map(PathBuf::from));
        if let Some(model) = &args.model {
            config = config.with_model(Model::from(model.as_str()));
        }
        if let Some(storage) = &args.storage {
            config = config.with_storage_dir(PathBuf::from(storage));
        }
        if args.no_color {
            config = config.without_color();
        }
        if args.legacy_tags {
            config = config.with_tag_mode(TagMode::WholeFragment);
        }
        Ok(config)
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = ChatArgsError;

    fn try_from(args: ChatArgs) -> Result<Self, Self::Error> {
        ChatConfig::try_from(&args)
    }
}
