// Public modules
pub mod completion;
pub mod message;
pub mod model;
pub mod request;

// Re-exports
pub use completion::{ChatCompletion, ChatCompletionChunk, ChunkChoice, CompletionChoice, Delta};
pub use message::{ChatMessage, Role};
pub use model::{KnownModel, Model, default_model_cycle};
pub use request::ChatRequest;
