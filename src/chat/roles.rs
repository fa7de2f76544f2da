//! Roles are named system prompts that `!role` cycles through.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File in the storage directory holding extra roles.
pub const ROLES_FILE: &str = "roles.yaml";

/// A named system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Name shown when switching to the role.
    pub name: String,
    /// System message sent to the model.
    pub prompt: String,
}

impl RoleDefinition {
    /// Creates a role.
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

/// The two roles every session starts with, describing `system`.
pub fn builtin_roles(system: &str) -> Vec<RoleDefinition> {
    vec![
        RoleDefinition::new(
            "CLI Role",
            format!(
                "You are a command line tool running on {system}. \
                 Succinct replies are better than long-winded explanations."
            ),
        ),
        RoleDefinition::new(
            "Chat Role",
            format!(
                "You are a helpful and entertaining assistant running on the system {system}. \
                 You should not let the user know that something is out of the scope of your \
                 abilities but rather converse in a flowing way without mentioning that you \
                 are an AI."
            ),
        ),
    ]
}

/// A human-readable name for the host operating system.
pub fn system_description() -> String {
    match std::env::consts::OS {
        "linux" => fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|contents| pretty_name(&contents))
            .unwrap_or_else(|| "Linux".to_string()),
        "macos" => "macOS".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    }
}

fn pretty_name(os_release: &str) -> Option<String> {
    os_release.lines().find_map(|line| {
        let value = line.strip_prefix("PRETTY_NAME=")?;
        let value = value.trim().trim_matches('"').trim_matches('\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Built-in roles followed by those in `roles.yaml` under `storage_dir`.
///
/// `roles.yaml` is a list of `name`/`prompt` mappings; a missing file adds
/// nothing.
pub fn load_roles(storage_dir: &Path, system: &str) -> Result<Vec<RoleDefinition>> {
    let mut roles = builtin_roles(system);
    let path = storage_dir.join(ROLES_FILE);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(roles),
        Err(err) => return Err(Error::io("failed to read roles.yaml", err)),
    };
    let extra: Option<Vec<RoleDefinition>> = serde_yaml::from_str(&contents)?;
    roles.extend(extra.unwrap_or_default());
    Ok(roles)
}
