//! Clipboard access for `!copy`.

use crate::error::{Error, Result};

/// Somewhere `!copy` can put text.
pub trait Clipboard {
    /// Replaces the clipboard contents with `text`.
    fn copy(&mut self, text: &str) -> Result<()>;
}

/// The desktop clipboard.
///
/// The handle is opened on first use and kept open afterwards; on X11 the
/// copied text only stays available while it is alive.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    /// Creates a clipboard that connects on first use.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for SystemClipboard {
    fn copy(&mut self, text: &str) -> Result<()> {
        let clipboard = match &mut self.inner {
            Some(clipboard) => clipboard,
            None => {
                let clipboard = arboard::Clipboard::new()
                    .map_err(|e| Error::clipboard(format!("clipboard unavailable: {e}")))?;
                self.inner.insert(clipboard)
            }
        };
        clipboard
            .set_text(text.to_string())
            .map_err(|e| Error::clipboard(format!("failed to copy: {e}")))
    }
}

/// A clipboard that keeps everything copied to it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryClipboard {
    /// Every copied text, oldest first.
    pub copies: Vec<String>,
}

impl Clipboard for MemoryClipboard {
    fn copy(&mut self, text: &str) -> Result<()> {
        self.copies.push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_clipboard_records() {
        let mut clipboard = MemoryClipboard::default();
        clipboard.copy("ls -la").unwrap();
        clipboard.copy("pwd").unwrap();
        assert_eq!(clipboard.copies, vec!["ls -la", "pwd"]);
    }
}
