//! Chat application module for interactive conversations.
//!
//! This module provides the streaming REPL behind the `gpterm` binary. It
//! supports:
//!
//! - Streaming replies with code blocks highlighted as they are typed
//! - `!` commands for session control and copying code blocks
//! - Roles, model cycling and temperature control
//! - Saving, listing and resuming chats
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: conversation state, code blocks and API interaction
//! - [`commands`]: `!` command parsing and completion
//! - [`storage`]: saved chats on disk
//! - [`roles`]: built-in and user-defined system prompts
//! - [`clipboard`]: where `!copy` puts text

pub mod clipboard;
pub mod commands;
pub mod config;
pub mod roles;
pub mod session;
pub mod storage;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use clipboard::{Clipboard, MemoryClipboard, SystemClipboard};
pub use commands::{
    COMMAND_COMPLETIONS, ChatCommand, MULTI_LINE_END, complete_command, help_text, parse_command,
};
pub use config::{ChatArgs, ChatArgsError, ChatConfig};
pub use roles::{RoleDefinition, builtin_roles, load_roles, system_description};
pub use session::{ChatSession, estimate_tokens};
pub use storage::{
    default_storage_dir, list_sessions, load_messages, sanitize_title, save_messages, write_messages,
};
