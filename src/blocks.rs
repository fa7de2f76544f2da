//! Storage for code blocks captured from model replies.
//!
//! Every fenced block that closes during a reply is stored under a
//! [`BlockId`].  Identifiers start at 1, grow by one per block and are never
//! reused for the lifetime of a session, so the `!copy N` marker printed next
//! to a block keeps pointing at the same text.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a captured code block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(u64);

impl BlockId {
    /// The identifier of the first block of a session.
    pub const FIRST: BlockId = BlockId(1);

    /// Creates an identifier.  Returns `None` for zero.
    pub fn new(id: u64) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    /// Returns the numeric value of the identifier.
    pub fn get(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BlockId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .ok()
            .and_then(BlockId::new)
            .ok_or_else(|| format!("invalid block identifier: {s}"))
    }
}

/// Append-only mapping from [`BlockId`] to the text of a closed code block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockStore {
    blocks: BTreeMap<BlockId, String>,
}

impl BlockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `text` under `id`.
    ///
    /// Existing entries are never overwritten; returns `false` when `id` is
    /// already taken.
    pub fn put(&mut self, id: BlockId, text: String) -> bool {
        if self.blocks.contains_key(&id) {
            return false;
        }
        self.blocks.insert(id, text);
        true
    }

    /// Stores `text` under the next free identifier and returns it.
    pub fn push(&mut self, text: String) -> BlockId {
        let id = self.next_id();
        self.blocks.insert(id, text);
        id
    }

    /// Looks up a block by identifier.
    pub fn get(&self, id: BlockId) -> Option<&str> {
        self.blocks.get(&id).map(String::as_str)
    }

    /// The identifier the next stored block will receive.
    pub fn next_id(&self) -> BlockId {
        self.blocks
            .last_key_value()
            .map(|(id, _)| id.next())
            .unwrap_or(BlockId::FIRST)
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true when no block has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterates the blocks in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &str)> {
        self.blocks.iter().map(|(id, text)| (*id, text.as_str()))
    }
}
