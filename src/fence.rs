//! Streaming detection of triple-backtick code fences.
//!
//! [`FenceScanner`] consumes a reply as it arrives, one fragment at a time,
//! and turns it into [`RenderInstruction`]s.  With the default
//! [`TagMode::Line`], fragment boundaries carry no meaning: a fence, a
//! language tag or code may be split anywhere.  Output
//! trails the input by at most three characters, the length of the fence
//! delimiter.
//!
//! ```
//! use gpterm::{BlockId, BlockStore, FenceScanner, RenderInstruction};
//!
//! let mut store = BlockStore::new();
//! let mut scanner = FenceScanner::new();
//! let mut out: Vec<_> = scanner.ingest("``", &mut store).collect();
//! out.extend(scanner.ingest("`rust\nfn main() {}\n```", &mut store));
//! out.extend(scanner.finish(&mut store));
//!
//! assert_eq!(out[0], RenderInstruction::LanguageTag("rust".to_string()));
//! assert_eq!(out.last(), Some(&RenderInstruction::BlockClosed(BlockId::FIRST)));
//! assert_eq!(store.get(BlockId::FIRST), Some("fn main() {}\n"));
//! ```

use std::collections::VecDeque;
use std::collections::vec_deque::Drain;
use std::str::Chars;

use crate::blocks::{BlockId, BlockStore};
use crate::observability::{SCANNER_BLOCKS_CLOSED, SCANNER_LANGUAGE_TAGS};

const FENCE: char = '`';
const FENCE_LEN: usize = 3;

/// Longest first line after an opening fence that is still considered a
/// possible language tag, surrounding whitespace included.
const MAX_TAG_CANDIDATE: usize = 16;

/// Language names recognized directly after an opening fence.
pub const KNOWN_LANGUAGE_TAGS: &[&str] = &[
    "arduino",
    "bash",
    "c",
    "cpp",
    "csharp",
    "css",
    "diff",
    "go",
    "graphql",
    "java",
    "javascript",
    "json",
    "kotlin",
    "latex",
    "less",
    "lua",
    "makefile",
    "markdown",
    "matlab",
    "mathematica",
    "nginx",
    "objectivec",
    "perl",
    "pgsql",
    "php-template",
    "php",
    "plaintext",
    "python-repl",
    "python",
    "r",
    "ruby",
    "rust",
    "scss",
    "shell",
    "sql",
    "swift",
    "typescript",
    "vbnet",
    "wasm",
    "xml",
    "yaml",
];

/// Returns true if `tag` is exactly one of [`KNOWN_LANGUAGE_TAGS`].
pub fn is_known_language_tag(tag: &str) -> bool {
    KNOWN_LANGUAGE_TAGS.contains(&tag)
}

/// One unit of styled output produced by the scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderInstruction {
    /// A character outside any code fence.
    Prose(char),
    /// A character inside a code fence.
    CodeChar(char),
    /// The language named right after an opening fence.
    LanguageTag(String),
    /// A fence closed and its contents were stored under this identifier.
    BlockClosed(BlockId),
}

/// How the language tag after an opening fence is recognized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TagMode {
    /// The first line after the fence is a tag when, trimmed, it names a
    /// known language.  Independent of how the reply was fragmented.
    #[default]
    Line,
    /// Only a whole fragment that arrives right after the fence and, trimmed,
    /// names a known language is a tag.  A tag split across fragments is
    /// rendered as code.  This reproduces transcripts captured by older
    /// releases.
    WholeFragment,
}

/// Streaming state machine separating prose from fenced code.
///
/// A scanner lives for exactly one reply.  Feed it with [`ingest`] and close
/// it with [`finish`]; start the next reply with a new scanner.
///
/// [`ingest`]: FenceScanner::ingest
/// [`finish`]: FenceScanner::finish
#[derive(Debug, Default)]
pub struct FenceScanner {
    mode: TagMode,
    in_code_block: bool,
    language_tag_resolved: bool,
    lookahead: VecDeque<char>,
    code: String,
    tag_candidate: String,
    outbox: VecDeque<RenderInstruction>,
}

impl FenceScanner {
    /// Creates a scanner using [`TagMode::Line`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scanner with the given tag recognition mode.
    pub fn with_tag_mode(mode: TagMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Returns true while an opened fence has not been closed.
    pub fn in_code_block(&self) -> bool {
        self.in_code_block
    }

    /// Text accumulated for the currently open block.
    pub fn pending_code(&self) -> &str {
        &self.code
    }

    /// Absorbs one fragment of the reply.
    ///
    /// The returned iterator yields instructions as characters are consumed.
    /// Dropping it early still absorbs the whole fragment; instructions not
    /// yet yielded are produced by the next call to `ingest` or `finish`.
    pub fn ingest<'a>(&'a mut self, fragment: &'a str, store: &'a mut BlockStore) -> Ingest<'a> {
        let mut chars = fragment.chars();
        if self.mode == TagMode::WholeFragment && self.awaiting_tag() {
            let tag = fragment.trim();
            if is_known_language_tag(tag) {
                self.accept_tag(tag.to_string());
                chars = "".chars();
            }
        }
        Ingest {
            scanner: self,
            store,
            chars,
        }
    }

    /// Ends the reply, flushing whatever is still held back.
    ///
    /// An unterminated fence stays open and nothing is stored for it.
    pub fn finish(&mut self, store: &mut BlockStore) -> Drain<'_, RenderInstruction> {
        if !self.tag_candidate.is_empty() {
            let tag = self.tag_candidate.trim();
            if is_known_language_tag(tag) {
                let tag = tag.to_string();
                self.tag_candidate.clear();
                self.accept_tag(tag);
            } else {
                self.reject_tag_candidate(store);
            }
        }
        while let Some(c) = self.lookahead.pop_front() {
            self.emit(c);
        }
        self.outbox.drain(..)
    }

    fn awaiting_tag(&self) -> bool {
        self.in_code_block && !self.language_tag_resolved
    }

    fn push_char(&mut self, c: char, store: &mut BlockStore) {
        if self.awaiting_tag() {
            match self.mode {
                TagMode::Line => {
                    self.offer_tag_char(c, store);
                    return;
                }
                TagMode::WholeFragment => self.language_tag_resolved = true,
            }
        }
        self.advance(c, store);
    }

    fn offer_tag_char(&mut self, c: char, store: &mut BlockStore) {
        if c == '\n' {
            let tag = self.tag_candidate.trim();
            if is_known_language_tag(tag) {
                let tag = tag.to_string();
                self.tag_candidate.clear();
                self.accept_tag(tag);
            } else {
                self.reject_tag_candidate(store);
                self.advance(c, store);
            }
            return;
        }
        self.tag_candidate.push(c);
        if !could_become_tag(&self.tag_candidate) {
            self.reject_tag_candidate(store);
        }
    }

    fn accept_tag(&mut self, tag: String) {
        SCANNER_LANGUAGE_TAGS.click();
        self.language_tag_resolved = true;
        self.outbox.push_back(RenderInstruction::LanguageTag(tag));
    }

    /// The first line is ordinary code after all: run it through the fence
    /// logic character by character.
    fn reject_tag_candidate(&mut self, store: &mut BlockStore) {
        self.language_tag_resolved = true;
        let pending = std::mem::take(&mut self.tag_candidate);
        for c in pending.chars() {
            self.advance(c, store);
        }
    }

    fn advance(&mut self, c: char, store: &mut BlockStore) {
        self.lookahead.push_back(c);
        if self.in_code_block {
            self.code.push(c);
        }
        if self.lookahead_ends_with_fence() {
            while self.lookahead.len() > FENCE_LEN {
                if let Some(c) = self.lookahead.pop_front() {
                    self.emit(c);
                }
            }
            self.lookahead.clear();
            self.toggle(store);
        } else if self.lookahead.len() > FENCE_LEN
            && let Some(c) = self.lookahead.pop_front()
        {
            self.emit(c);
        }
    }

    fn lookahead_ends_with_fence(&self) -> bool {
        self.lookahead.len() >= FENCE_LEN
            && self.lookahead.iter().rev().take(FENCE_LEN).all(|c| *c == FENCE)
    }

    fn toggle(&mut self, store: &mut BlockStore) {
        if self.in_code_block {
            for _ in 0..FENCE_LEN {
                self.code.pop();
            }
            let id = store.push(std::mem::take(&mut self.code));
            SCANNER_BLOCKS_CLOSED.click();
            self.outbox.push_back(RenderInstruction::BlockClosed(id));
        }
        self.in_code_block = !self.in_code_block;
        self.language_tag_resolved = false;
    }

    fn emit(&mut self, c: char) {
        let instruction = if self.in_code_block {
            RenderInstruction::CodeChar(c)
        } else {
            RenderInstruction::Prose(c)
        };
        self.outbox.push_back(instruction);
    }
}

/// Can `candidate`, the start of the first line after a fence, still turn
/// into a known language tag once the line ends?
fn could_become_tag(candidate: &str) -> bool {
    if candidate.chars().count() > MAX_TAG_CANDIDATE {
        return false;
    }
    let trimmed = candidate.trim_start();
    let word = trimmed.trim_end();
    if word.len() != trimmed.len() {
        return is_known_language_tag(word);
    }
    KNOWN_LANGUAGE_TAGS.iter().any(|tag| tag.starts_with(word))
}

/// Lazy instruction sequence returned by [`FenceScanner::ingest`].
pub struct Ingest<'a> {
    scanner: &'a mut FenceScanner,
    store: &'a mut BlockStore,
    chars: Chars<'a>,
}

impl Iterator for Ingest<'_> {
    type Item = RenderInstruction;

    fn next(&mut self) -> Option<RenderInstruction> {
        loop {
            if let Some(instruction) = self.scanner.outbox.pop_front() {
                return Some(instruction);
            }
            let c = self.chars.next()?;
            self.scanner.push_char(c, self.store);
        }
    }
}

impl Drop for Ingest<'_> {
    fn drop(&mut self) {
        for c in self.chars.by_ref() {
            self.scanner.push_char(c, self.store);
        }
    }
}
