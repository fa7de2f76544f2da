//! Saved chats on disk.
//!
//! A saved chat is a JSON array of `{"role", "content"}` objects stored in a
//! file named after the chat's title and the time it was saved.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use time::OffsetDateTime;
use time::macros::format_description;

use crate::error::{Error, Result};
use crate::types::ChatMessage;

const APP_DIR: &str = "gpterm";
const MAX_TITLE_CHARS: usize = 50;
const FALLBACK_TITLE: &str = "chat";

/// The per-OS directory saved chats live in, if a home directory is known.
pub fn default_storage_dir() -> Option<PathBuf> {
    let home = std::env::var("USERPROFILE")
        .or_else(|_| std::env::var("HOME"))
        .ok()
        .filter(|home| !home.is_empty())?;
    Some(storage_dir_for(std::env::consts::OS, Path::new(&home)))
}

/// The storage directory below `home` on the operating system `os`.
pub fn storage_dir_for(os: &str, home: &Path) -> PathBuf {
    let data_dir = match os {
        "windows" => home.join("AppData").join("Local"),
        "macos" => home.join("Library").join("Application Support"),
        _ => home.join(".local").join("share"),
    };
    data_dir.join(APP_DIR)
}

/// Names of the chats saved in `dir`, oldest first by modification time.
///
/// A missing directory has no chats.
pub fn list_sessions(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::io("failed to read storage directory", err)),
    };

    let mut sessions: Vec<(SystemTime, String)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::io("failed to read storage directory", err))?;
        let metadata = entry
            .metadata()
            .map_err(|err| Error::io("failed to stat saved chat", err))?;
        if !metadata.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == super::roles::ROLES_FILE {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        sessions.push((modified, name));
    }
    sessions.sort();
    Ok(sessions.into_iter().map(|(_, name)| name).collect())
}

/// Reads a saved chat.
pub fn load_messages(path: &Path) -> Result<Vec<ChatMessage>> {
    let file = File::open(path).map_err(|err| Error::io("failed to open saved chat", err))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|err| Error::serialization("failed to parse saved chat", Some(Box::new(err))))
}

/// Writes a chat to `path`, creating the parent directory if needed.
pub fn save_messages(path: &Path, messages: &[ChatMessage]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|err| Error::io("failed to create storage directory", err))?;
    }
    let file = File::create(path).map_err(|err| Error::io("failed to create saved chat", err))?;
    write_messages(file, messages)
}

/// Serializes a chat to `sink`; the chat is only written once this returns `Ok`.
pub fn write_messages<W: Write>(sink: W, messages: &[ChatMessage]) -> Result<()> {
    let mut writer = BufWriter::new(sink);
    serde_json::to_writer(&mut writer, messages)
        .map_err(|err| Error::serialization("failed to serialize chat", Some(Box::new(err))))?;
    writer
        .flush()
        .map_err(|err| Error::io("failed to write saved chat", err))
}

/// Reduces a model-suggested title to a safe file name.
///
/// Whitespace becomes `_`; anything other than letters, digits and `_` is
/// dropped; the result is at most 50 characters.
pub fn sanitize_title(raw: &str) -> String {
    let mut title = String::new();
    for c in raw.trim().chars() {
        if title.chars().count() >= MAX_TITLE_CHARS {
            break;
        }
        if c.is_whitespace() {
            if !title.is_empty() && !title.ends_with('_') {
                title.push('_');
            }
        } else if c.is_alphanumeric() || c == '_' {
            title.push(c);
        }
    }
    let title = title.trim_end_matches('_');
    if title.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        title.to_string()
    }
}

/// The file name of a chat titled `title` saved at `saved_at`.
pub fn session_file_name(title: &str, saved_at: OffsetDateTime) -> String {
    let format = format_description!("[hour]-[minute]_[day]-[month]-[year repr:last_two]");
    let stamp = saved_at
        .format(&format)
        .unwrap_or_else(|_| saved_at.unix_timestamp().to_string());
    format!("{}-{stamp}", sanitize_title(title))
}

/// The current local time, or UTC when the offset is unknown.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
