//! `!` command parsing for the chat application.
//!
//! Lines that start with `!` control the session and are never sent to the
//! model.

use crate::blocks::BlockId;

/// Line that ends multi-line input started with `!multi`.
pub const MULTI_LINE_END: &str = "!end";

/// Completion candidates offered for a line starting with `!`.
///
/// Commands that take an argument carry a trailing space.
pub const COMMAND_COMPLETIONS: &[&str] = &[
    "!quit",
    "!kill",
    "!role",
    "!model",
    "!tokens",
    "!copy ",
    "!temperature ",
    "!multi",
    "!history",
    "!help",
];

const MAX_TEMPERATURE: f32 = 2.0;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Save the conversation and exit.
    Quit,

    /// Exit without saving.
    Kill,

    /// Switch to the next role.
    Role,

    /// Switch to the next model.
    Model,

    /// Print an estimate of the conversation's token count.
    Tokens,

    /// Copy a captured code block to the clipboard.
    Copy(BlockId),

    /// Set the sampling temperature.
    Temperature(f32),

    /// Go back to the endpoint's default temperature.
    ClearTemperature,

    /// Read a multi-line message.
    Multi,

    /// Print the conversation so far.
    History,

    /// Display help information.
    Help,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for `!` commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent to the model.
///
/// # Examples
///
/// ```
/// # use gpterm::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("!quit"), Some(ChatCommand::Quit));
/// assert!(parse_command("!copy 2").is_some());
/// assert!(parse_command("How do I reverse a list?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('!')?;

    let (command, argument) = match rest.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, Some(argument.trim()).filter(|s| !s.is_empty())),
        None => (rest, None),
    };

    let result = match command.to_lowercase().as_str() {
        "quit" | "q" => ChatCommand::Quit,
        "kill" => ChatCommand::Kill,
        "role" => ChatCommand::Role,
        "model" => ChatCommand::Model,
        "tokens" => ChatCommand::Tokens,
        "copy" => match argument {
            Some(arg) => match arg.parse::<BlockId>() {
                Ok(id) => ChatCommand::Copy(id),
                Err(_) => ChatCommand::Invalid("Invalid identifier".to_string()),
            },
            None => ChatCommand::Invalid("!copy requires a code block identifier".to_string()),
        },
        "temperature" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("clear") => ChatCommand::ClearTemperature,
            Some(arg) => match parse_temperature(arg) {
                Ok(value) => ChatCommand::Temperature(value),
                Err(err) => ChatCommand::Invalid(format!("!temperature {err}")),
            },
            None => ChatCommand::Invalid("!temperature requires a value".to_string()),
        },
        "multi" => ChatCommand::Multi,
        "history" => ChatCommand::History,
        "help" | "?" => ChatCommand::Help,
        _ => ChatCommand::Invalid(format!("Unknown command: !{command}")),
    };

    Some(result)
}

/// Parses a sampling temperature between 0 and 2.
pub fn parse_temperature(value: &str) -> Result<f32, String> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| format!("expects a value between 0 and {MAX_TEMPERATURE}"))?;
    if parsed.is_finite() && (0.0..=MAX_TEMPERATURE).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!("expects a value between 0 and {MAX_TEMPERATURE}"))
    }
}

/// Returns the commands that complete `line`.
pub fn complete_command(line: &str) -> Vec<&'static str> {
    if !line.starts_with('!') {
        return Vec::new();
    }
    COMMAND_COMPLETIONS
        .iter()
        .copied()
        .filter(|command| command.starts_with(line))
        .collect()
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Chat commands:
  !quit or !q            End the chat and save it
  !kill                  End the chat without saving
  !role                  Cycle through roles
  !model                 Cycle through models
  !tokens                Rudimentary token count
  !history               Print the conversation so far
  !copy <id>             Copy code block <id> to the clipboard
  !temperature <v>       Set temperature 0.0-2.0 (use 'clear' to reset)
  !multi                 Multi-line input; finish with '!end' or Ctrl-D
  !help                  Show this help message"#
}
