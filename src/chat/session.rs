//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which manages conversation
//! state, the code blocks captured from replies, and streaming API
//! interactions.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use tokio::time::MissedTickBehavior;

use crate::blocks::{BlockId, BlockStore};
use crate::chat::clipboard::Clipboard;
use crate::chat::config::ChatConfig;
use crate::chat::roles::{RoleDefinition, builtin_roles, system_description};
use crate::chat::storage::{load_messages, now, save_messages, session_file_name};
use crate::client::ChatBackend;
use crate::error::{Error, Result};
use crate::fence::{FenceScanner, TagMode};
use crate::render::{Renderer, render_instruction};
use crate::types::{ChatMessage, ChatRequest, Model, Role};

const TITLE_REQUEST: &str = "Thank you. This chat has now concluded. Please reply with a specific \
    title for this entire conversation that uses a maximum of 4 words; shorter and more precise \
    is better. No other text apart from these words should be included, as your reply will be \
    saved directly as the title of the chat. As this will be a filename, spaces should be \
    replaced with underscores and only letters, numbers and underscores are allowed.";

const INTERRUPT_POLL: Duration = Duration::from_millis(100);

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\b|\S").expect("token pattern is valid"));

/// A chat session that manages conversation state and API interactions.
///
/// The first message is always the system message of the active role.
/// Code blocks of every assistant reply in the history are held in a
/// [`BlockStore`], numbered in the order their fences closed.
pub struct ChatSession<B: ChatBackend> {
    backend: B,
    config: ChatConfig,
    roles: Vec<RoleDefinition>,
    role_index: usize,
    messages: Vec<ChatMessage>,
    blocks: BlockStore,
    session_path: Option<PathBuf>,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Creates a new chat session.
    ///
    /// With no `roles`, the built-in roles for this host are used.
    pub fn new(backend: B, config: ChatConfig, roles: Vec<RoleDefinition>) -> Self {
        Self::from_messages(backend, config, roles, Vec::new())
    }

    /// Creates a session continuing `messages`.
    ///
    /// The block store is rebuilt by scanning every assistant message with
    /// [`TagMode::Line`], the only mode that does not depend on how a reply
    /// was fragmented.  Identifiers shown while those replies streamed stay
    /// valid in either mode.  Under [`TagMode::WholeFragment`] a block whose
    /// tag line arrived split across fragments was shown with that line as
    /// code; after resuming the block holds the code without it.
    pub fn from_messages(
        backend: B,
        config: ChatConfig,
        roles: Vec<RoleDefinition>,
        mut messages: Vec<ChatMessage>,
    ) -> Self {
        let roles = if roles.is_empty() {
            builtin_roles(&system_description())
        } else {
            roles
        };
        if messages.first().map(|m| m.role) != Some(Role::System) {
            messages.insert(0, ChatMessage::system(roles[0].prompt.clone()));
        }

        let mut blocks = BlockStore::new();
        for message in messages.iter().filter(|m| m.role == Role::Assistant) {
            let mut scanner = FenceScanner::with_tag_mode(TagMode::Line);
            scanner.ingest(&message.content, &mut blocks).for_each(drop);
            scanner.finish(&mut blocks).for_each(drop);
        }

        Self {
            backend,
            config,
            roles,
            role_index: 0,
            messages,
            blocks,
            session_path: None,
        }
    }

    /// Loads the saved chat at `path`; saving writes back to the same file.
    pub fn resume(
        backend: B,
        config: ChatConfig,
        roles: Vec<RoleDefinition>,
        path: PathBuf,
    ) -> Result<Self> {
        let messages = load_messages(&path)?;
        let mut session = Self::from_messages(backend, config, roles, messages);
        session.session_path = Some(path);
        Ok(session)
    }

    /// Sends a user message and streams the response.
    ///
    /// This method:
    /// 1. Adds the user message to history
    /// 2. Sends a streaming request to the API
    /// 3. Scans each fragment and renders every instruction as it is produced
    /// 4. Adds the complete assistant response to history
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or the renderer asks for an
    /// interrupt.  The history and block store are then left as they were.
    pub async fn send_streaming(&mut self, user_input: &str, renderer: &mut dyn Renderer) -> Result<()> {
        let previous_len = self.messages.len();
        self.messages.push(ChatMessage::user(user_input));

        let request = ChatRequest::new(self.model().clone(), self.messages.clone())
            .with_temperature(self.config.temperature)
            .streaming();
        let mut blocks = self.blocks.clone();

        match self.stream_reply(request, &mut blocks, renderer).await {
            Ok(reply) => {
                self.messages.push(ChatMessage::assistant(reply));
                self.blocks = blocks;
                Ok(())
            }
            Err(err) => {
                self.messages.truncate(previous_len);
                Err(err)
            }
        }
    }

    async fn stream_reply(
        &self,
        request: ChatRequest,
        blocks: &mut BlockStore,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        let mut fragments = self.backend.stream(request).await?;
        let mut scanner = FenceScanner::with_tag_mode(self.config.tag_mode);
        let mut reply = String::new();

        let mut poll = tokio::time::interval(INTERRUPT_POLL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        renderer.start_response();
        loop {
            let next = tokio::select! {
                next = fragments.next() => next,
                _ = poll.tick() => {
                    if renderer.should_interrupt() {
                        renderer.print_interrupted();
                        return Err(Error::abort("reply interrupted"));
                    }
                    continue;
                }
            };
            let Some(fragment) = next else {
                break;
            };
            if renderer.should_interrupt() {
                renderer.print_interrupted();
                return Err(Error::abort("reply interrupted"));
            }
            let fragment = fragment?;
            reply.push_str(&fragment);
            for instruction in scanner.ingest(&fragment, blocks) {
                render_instruction(renderer, &instruction);
            }
        }
        for instruction in scanner.finish(blocks) {
            render_instruction(renderer, &instruction);
        }
        renderer.finish_response();
        Ok(reply)
    }

    /// The conversation so far, starting with the system message.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Code blocks captured so far.
    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    /// Returns the text of block `id`.
    pub fn block(&self, id: BlockId) -> Result<&str> {
        self.blocks.get(id).ok_or_else(|| {
            Error::not_found(
                "Invalid identifier",
                Some("code block".to_string()),
                Some(id.to_string()),
            )
        })
    }

    /// Copies block `id` to `clipboard`.
    pub fn copy_block(&self, id: BlockId, clipboard: &mut dyn Clipboard) -> Result<()> {
        clipboard.copy(self.block(id)?)
    }

    /// Returns the current model.
    pub fn model(&self) -> &Model {
        self.config.model()
    }

    /// Switches to the next model and returns it.
    pub fn cycle_model(&mut self) -> &Model {
        self.config.cycle_model()
    }

    /// Returns the active role.
    pub fn role(&self) -> &RoleDefinition {
        &self.roles[self.role_index]
    }

    /// Switches to the next role, rewriting the system message, and returns it.
    pub fn cycle_role(&mut self) -> &RoleDefinition {
        self.role_index = (self.role_index + 1) % self.roles.len();
        let prompt = self.roles[self.role_index].prompt.clone();
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.content = prompt,
            _ => self.messages.insert(0, ChatMessage::system(prompt)),
        }
        self.role()
    }

    /// Returns the sampling temperature, if set.
    pub fn temperature(&self) -> Option<f32> {
        self.config.temperature
    }

    /// Sets or clears the sampling temperature.
    pub fn set_temperature(&mut self, temperature: Option<f32>) {
        self.config.temperature = temperature;
    }

    /// Rough token count of the conversation.
    ///
    /// Counts words and single punctuation marks of every `role content`
    /// pair; words longer than nine characters count twice.
    pub fn estimated_tokens(&self) -> usize {
        let text = self
            .messages
            .iter()
            .map(|m| format!("{} {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join(" ");
        estimate_tokens(&text)
    }

    /// The file this session saves to, once known.
    pub fn session_path(&self) -> Option<&Path> {
        self.session_path.as_deref()
    }

    /// Asks the model for a short title for the conversation.
    pub async fn request_title(&self) -> Result<String> {
        let mut messages = self.messages.clone();
        messages.push(ChatMessage::user(TITLE_REQUEST));
        let request = ChatRequest::new(self.model().clone(), messages);
        self.backend.complete(request).await
    }

    /// Saves the conversation and returns where it went.
    ///
    /// A resumed or already saved session overwrites its file.  Otherwise
    /// the model names the chat and a new file is created in the storage
    /// directory.
    pub async fn save(&mut self) -> Result<PathBuf> {
        let path = match &self.session_path {
            Some(path) => path.clone(),
            None => {
                let title = self.request_title().await?;
                self.config
                    .storage_dir
                    .join(session_file_name(&title, now()))
            }
        };
        self.save_to(&path)?;
        self.session_path = Some(path.clone());
        Ok(path)
    }

    /// Writes the conversation to `path`.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_messages(path.as_ref(), &self.messages)
    }
}

/// Rough token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    TOKEN_PATTERN
        .find_iter(text)
        .map(|token| if token.as_str().chars().count() > 9 { 2 } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures::stream;

    use super::*;
    use crate::chat::clipboard::MemoryClipboard;
    use crate::client::FragmentStream;
    use crate::types::KnownModel;

    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<FragmentStream>>,
        requests: Mutex<Vec<ChatRequest>>,
        title: String,
    }

    impl ScriptedBackend {
        fn fragments(fragments: &[&str]) -> Vec<Result<String>> {
            fragments.iter().map(|f| Ok(f.to_string())).collect()
        }

        fn with_reply(self, fragments: &[&str]) -> Self {
            let reply = Self::fragments(fragments);
            self.replies.lock().unwrap().push_back(Box::pin(stream::iter(reply)));
            self
        }

        fn with_failure(self, fragments: &[&str]) -> Self {
            let mut reply = Self::fragments(fragments);
            reply.push(Err(Error::streaming("connection reset", None)));
            self.replies.lock().unwrap().push_back(Box::pin(stream::iter(reply)));
            self
        }

        /// Sends `fragments`, then never another.
        fn with_stall(self, fragments: &[&str]) -> Self {
            let reply = stream::iter(Self::fragments(fragments)).chain(stream::pending());
            self.replies.lock().unwrap().push_back(Box::pin(reply));
            self
        }
    }

    #[async_trait::async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, request: ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            Ok(self.title.clone())
        }

        async fn stream(&self, request: ChatRequest) -> Result<FragmentStream> {
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::connection("no scripted reply", None))?;
            Ok(reply)
        }
    }

    #[derive(Default)]
    struct Recorder {
        instructions: Vec<String>,
        interrupt_once_printing: bool,
    }

    impl Renderer for Recorder {
        fn print_prose(&mut self, text: &str) {
            self.instructions.push(text.to_string());
        }

        fn print_code(&mut self, text: &str) {
            self.instructions.push(format!("`{text}"));
        }

        fn print_language_tag(&mut self, tag: &str) {
            self.instructions.push(format!("[{tag}]"));
        }

        fn print_block_closed(&mut self, id: BlockId) {
            self.instructions.push(format!("#{id}"));
        }

        fn print_error(&mut self, _: &str) {}

        fn print_info(&mut self, _: &str) {}

        fn finish_response(&mut self) {
            self.instructions.push("<end>".to_string());
        }

        fn print_interrupted(&mut self) {
            self.instructions.push("<interrupted>".to_string());
        }

        fn should_interrupt(&self) -> bool {
            self.interrupt_once_printing && !self.instructions.is_empty()
        }
    }

    fn config() -> ChatConfig {
        ChatConfig::new().with_storage_dir(PathBuf::from("/nonexistent"))
    }

    fn roles() -> Vec<RoleDefinition> {
        builtin_roles("TestOS")
    }

    #[test]
    fn new_session_has_system_message() {
        let session = ChatSession::new(ScriptedBackend::default(), config(), roles());
        assert_eq!(session.message_count(), 1);
        assert_eq!(session.messages()[0].role, Role::System);
        assert!(session.messages()[0].content.contains("TestOS"));
        assert_eq!(session.role().name, "CLI Role");
        assert!(session.blocks().is_empty());
    }

    #[tokio::test]
    async fn streaming_reply_is_rendered_and_stored() {
        let backend = ScriptedBackend::default().with_reply(&["Run:\n``", "`bash\nls\n`", "``"]);
        let mut session = ChatSession::new(backend, config(), roles());
        let mut renderer = Recorder::default();

        session.send_streaming("list files", &mut renderer).await.unwrap();

        assert_eq!(session.message_count(), 3);
        assert_eq!(session.messages()[1], ChatMessage::user("list files"));
        assert_eq!(
            session.messages()[2],
            ChatMessage::assistant("Run:\n```bash\nls\n```")
        );
        assert_eq!(session.block(BlockId::FIRST).unwrap(), "ls\n");
        assert_eq!(
            renderer.instructions.concat(),
            "Run:\n[bash]`l`s`\n#1<end>"
        );

        let requests = session.backend.requests.lock().unwrap();
        assert!(requests[0].stream);
        assert_eq!(requests[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn failed_stream_rolls_back() {
        let backend = ScriptedBackend::default()
            .with_failure(&["```\nhalf a block```", " and then"])
            .with_reply(&["fine"]);
        let mut session = ChatSession::new(backend, config(), roles());
        let mut renderer = Recorder::default();

        let err = session.send_streaming("first", &mut renderer).await.unwrap_err();
        assert!(matches!(err, Error::Streaming { .. }));
        assert_eq!(session.message_count(), 1);
        assert!(session.blocks().is_empty());

        session.send_streaming("second", &mut renderer).await.unwrap();
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.messages()[1].content, "second");
    }

    #[tokio::test]
    async fn interrupt_aborts_exchange() {
        let backend = ScriptedBackend::default().with_reply(&["Hello there", " and more"]);
        let mut session = ChatSession::new(backend, config(), roles());
        let mut renderer = Recorder {
            interrupt_once_printing: true,
            ..Recorder::default()
        };

        let err = session.send_streaming("hi", &mut renderer).await.unwrap_err();
        assert!(err.is_abort());
        assert_eq!(session.message_count(), 1);
        assert_eq!(renderer.instructions.last().unwrap(), "<interrupted>");
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_reaches_stalled_stream() {
        let backend = ScriptedBackend::default().with_stall(&["Thinking"]);
        let mut session = ChatSession::new(backend, config(), roles());
        let mut renderer = Recorder {
            interrupt_once_printing: true,
            ..Recorder::default()
        };

        let err = session.send_streaming("hi", &mut renderer).await.unwrap_err();
        assert!(err.is_abort());
        assert_eq!(session.message_count(), 1);
        assert_eq!(renderer.instructions.concat(), "Think<interrupted>");
    }

    #[test]
    fn block_lookup_miss() {
        let session = ChatSession::new(ScriptedBackend::default(), config(), roles());
        let err = session.block(BlockId::new(4).unwrap()).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Invalid identifier"));

        let mut clipboard = MemoryClipboard::default();
        assert!(session.copy_block(BlockId::FIRST, &mut clipboard).is_err());
        assert!(clipboard.copies.is_empty());
    }

    #[test]
    fn resumed_history_rebuilds_blocks() {
        let messages = vec![
            ChatMessage::system("old prompt"),
            ChatMessage::user("two blocks please"),
            ChatMessage::assistant("```python\nprint(1)\n```\nand\n```\necho hi\n```"),
            ChatMessage::user("the ``` in my question is not a block"),
            ChatMessage::assistant("```rust\nfn main() {}\n```"),
        ];
        let session =
            ChatSession::from_messages(ScriptedBackend::default(), config(), roles(), messages);
        assert_eq!(session.messages()[0].content, "old prompt");
        assert_eq!(session.blocks().len(), 3);
        assert_eq!(session.block(BlockId::new(1).unwrap()).unwrap(), "print(1)\n");
        assert_eq!(session.block(BlockId::new(2).unwrap()).unwrap(), "\necho hi\n");
        assert_eq!(session.block(BlockId::new(3).unwrap()).unwrap(), "fn main() {}\n");
        assert_eq!(session.blocks().next_id(), BlockId::new(4).unwrap());

        let mut clipboard = MemoryClipboard::default();
        session
            .copy_block(BlockId::new(3).unwrap(), &mut clipboard)
            .unwrap();
        assert_eq!(clipboard.copies, vec!["fn main() {}\n"]);
    }

    #[tokio::test]
    async fn legacy_tags_resume_with_live_block_text() {
        let backend = ScriptedBackend::default()
            .with_reply(&["```", "python\n", "x = 1\n```"])
            .with_reply(&["```", "py", "thon\ny = 2\n```"]);
        let legacy = config().with_tag_mode(TagMode::WholeFragment);
        let mut session = ChatSession::new(backend, legacy.clone(), roles());
        let mut renderer = Recorder::default();
        session.send_streaming("one", &mut renderer).await.unwrap();
        session.send_streaming("two", &mut renderer).await.unwrap();
        assert_eq!(session.block(BlockId::new(1).unwrap()).unwrap(), "x = 1\n");
        assert_eq!(session.block(BlockId::new(2).unwrap()).unwrap(), "python\ny = 2\n");

        let resumed = ChatSession::from_messages(
            ScriptedBackend::default(),
            legacy,
            roles(),
            session.messages().to_vec(),
        );
        assert_eq!(resumed.blocks().len(), session.blocks().len());
        assert_eq!(resumed.block(BlockId::new(1).unwrap()).unwrap(), "x = 1\n");
        assert_eq!(resumed.block(BlockId::new(2).unwrap()).unwrap(), "y = 2\n");
    }

    #[test]
    fn cycles_wrap() {
        let mut session = ChatSession::new(ScriptedBackend::default(), config(), roles());
        assert_eq!(session.model(), &Model::Known(KnownModel::Gpt35Turbo16k));
        assert_eq!(session.cycle_model(), &Model::Known(KnownModel::Gpt4));
        assert_eq!(session.cycle_model(), &Model::Known(KnownModel::Gpt35Turbo));
        assert_eq!(session.cycle_model(), &Model::Known(KnownModel::Gpt35Turbo16k));

        assert_eq!(session.cycle_role().name, "Chat Role");
        assert!(session.messages()[0].content.starts_with("You are a helpful"));
        assert_eq!(session.cycle_role().name, "CLI Role");
        assert!(session.messages()[0].content.starts_with("You are a command line tool"));
        assert_eq!(session.message_count(), 1);
    }

    #[tokio::test]
    async fn temperature_is_sent() {
        let backend = ScriptedBackend::default().with_reply(&["a"]).with_reply(&["b"]);
        let mut session = ChatSession::new(backend, config(), roles());
        let mut renderer = Recorder::default();

        session.set_temperature(Some(0.2));
        session.send_streaming("one", &mut renderer).await.unwrap();
        session.set_temperature(None);
        session.send_streaming("two", &mut renderer).await.unwrap();

        let requests = session.backend.requests.lock().unwrap();
        assert_eq!(requests[0].temperature, Some(0.2));
        assert_eq!(requests[1].temperature, None);
    }

    #[test]
    fn token_estimate() {
        assert_eq!(estimate_tokens("user hello world"), 3);
        assert_eq!(estimate_tokens("user extraordinary!"), 4);
        assert_eq!(estimate_tokens(""), 0);

        let session = ChatSession::from_messages(
            ScriptedBackend::default(),
            config(),
            roles(),
            vec![ChatMessage::system("Be brief."), ChatMessage::user("Hi")],
        );
        // "system Be brief . user Hi"
        assert_eq!(session.estimated_tokens(), 6);
    }

    #[tokio::test]
    async fn save_names_file_from_title_then_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend {
            title: "Listing Files!".to_string(),
            ..ScriptedBackend::default()
        }
        .with_reply(&["Use ls."])
        .with_reply(&["Use ls -a."]);
        let mut session = ChatSession::new(
            backend,
            ChatConfig::new().with_storage_dir(dir.path().to_path_buf()),
            roles(),
        );
        let mut renderer = Recorder::default();
        session.send_streaming("how?", &mut renderer).await.unwrap();

        let path = session.save().await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Listing_Files-"), "{name}");
        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(load_messages(&path).unwrap(), session.messages());

        session.send_streaming("hidden too?", &mut renderer).await.unwrap();
        assert_eq!(session.save().await.unwrap(), path);
        assert_eq!(load_messages(&path).unwrap().len(), 5);

        let requests = session.backend.requests.lock().unwrap();
        let title_requests = requests.iter().filter(|r| !r.stream).count();
        assert_eq!(title_requests, 1);
        let title_request = requests.iter().find(|r| !r.stream).unwrap();
        assert!(title_request.messages.last().unwrap().content.contains("maximum of 4 words"));
    }
}
