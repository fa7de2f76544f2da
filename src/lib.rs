// Public modules
pub mod blocks;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod fence;
pub mod observability;
pub mod render;
pub mod sse;
pub mod types;

// Re-exports
pub use blocks::{BlockId, BlockStore};
pub use client::{ChatBackend, FragmentStream, OpenAi};
pub use client_logger::{ClientLogger, JsonLinesLogger};
pub use error::{Error, Result};
pub use fence::{
    FenceScanner, Ingest, KNOWN_LANGUAGE_TAGS, RenderInstruction, TagMode, is_known_language_tag,
};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer, render_instruction};
pub use types::*;
