//! Integration tests for the gpterm library.
//! The live test requires an API key in the environment to run.

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::{StreamExt, stream};

    use gpterm::chat::{ChatConfig, ChatSession, MemoryClipboard, builtin_roles};
    use gpterm::{
        BlockId, BlockStore, ChatBackend, ChatMessage, ChatRequest, Error, FenceScanner,
        FragmentStream, KnownModel, Model, OpenAi, RenderInstruction, Renderer, Result, TagMode,
    };

    use RenderInstruction::{BlockClosed, CodeChar, LanguageTag, Prose};

    fn scan(fragments: &[&str], mode: TagMode) -> (Vec<RenderInstruction>, BlockStore, bool) {
        let mut store = BlockStore::new();
        let mut scanner = FenceScanner::with_tag_mode(mode);
        let mut out = Vec::new();
        for fragment in fragments {
            out.extend(scanner.ingest(fragment, &mut store));
        }
        out.extend(scanner.finish(&mut store));
        (out, store, scanner.in_code_block())
    }

    fn prose(text: &str) -> Vec<RenderInstruction> {
        text.chars().map(Prose).collect()
    }

    fn code(text: &str) -> Vec<RenderInstruction> {
        text.chars().map(CodeChar).collect()
    }

    fn python_scenario() -> Vec<RenderInstruction> {
        let mut expected = prose("Here:\n");
        expected.push(LanguageTag("python".to_string()));
        expected.extend(code("print(1)\n"));
        expected.push(BlockClosed(BlockId::FIRST));
        expected.extend(prose("\nDone"));
        expected
    }

    #[test]
    fn test_single_fragment_scenario() {
        let (out, store, open) = scan(&["Here:\n```python\nprint(1)\n```\nDone"], TagMode::Line);
        assert_eq!(out, python_scenario());
        assert_eq!(store.get(BlockId::FIRST), Some("print(1)\n"));
        assert!(!open);
    }

    #[test]
    fn test_split_fragment_scenario() {
        let (out, store, _) = scan(
            &["Here:\n``", "`python\nprint(1)\n```\n", "Done"],
            TagMode::Line,
        );
        assert_eq!(out, python_scenario());
        assert_eq!(store.get(BlockId::FIRST), Some("print(1)\n"));
    }

    #[test]
    fn test_unterminated_fence() {
        let (out, store, open) = scan(&["abc ``` def"], TagMode::Line);
        let mut expected = prose("abc ");
        expected.extend(code(" def"));
        assert_eq!(out, expected);
        assert!(store.is_empty());
        assert!(open);
    }

    #[test]
    fn test_unknown_tag_is_code() {
        let (out, _, _) = scan(&["```", "notalanguage\n"], TagMode::Line);
        assert_eq!(out, code("notalanguage\n"));
        let (out, _, _) = scan(&["```", "notalanguage\n"], TagMode::WholeFragment);
        assert_eq!(out, code("notalanguage\n"));
    }

    #[test]
    fn test_bare_fence_is_silent() {
        let mut store = BlockStore::new();
        let mut scanner = FenceScanner::new();
        assert_eq!(scanner.ingest("```", &mut store).count(), 0);
        assert!(scanner.in_code_block());
        assert_eq!(scanner.finish(&mut store).count(), 0);
    }

    #[test]
    fn test_fragmentation_invariance() {
        let texts = [
            "Here:\n```python\nprint(1)\n```\nDone",
            "Two ``ticks`` and ```rust\nfn main() {}\n``` then ```\nplain\n```",
            "no fences at all, just prose",
            "```bash\necho \"``\"\n```",
            "café ```json\n{\"π\": 3.14}\n``` ünïcödé",
            "``````",
            "abc ``` def",
        ];
        for text in texts {
            let whole = scan(&[text], TagMode::Line);

            let chars: Vec<String> = text.chars().map(String::from).collect();
            let chars: Vec<&str> = chars.iter().map(String::as_str).collect();
            assert_eq!(scan(&chars, TagMode::Line), whole, "char split of {text:?}");

            for at in text.char_indices().map(|(i, _)| i) {
                let (head, tail) = text.split_at(at);
                assert_eq!(
                    scan(&[head, tail], TagMode::Line),
                    whole,
                    "split of {text:?} at {at}"
                );
            }
        }
    }

    #[test]
    fn test_round_trip_block_contents() {
        let blocks = ["let x = 1;\n", "SELECT *\nFROM t;\n", "a ` b `` c\n"];
        let mut reply = String::new();
        for block in blocks {
            reply.push_str("prose\n```\n");
            reply.push_str(block);
            reply.push_str("```\n");
        }
        let (_, store, _) = scan(&[&reply], TagMode::Line);
        assert_eq!(store.len(), 3);
        for (i, block) in blocks.iter().enumerate() {
            let id = BlockId::new(i as u64 + 1).unwrap();
            assert_eq!(store.get(id), Some(format!("\n{block}").as_str()));
        }
    }

    struct ScriptedBackend {
        replies: Mutex<Vec<Vec<&'static str>>>,
    }

    #[async_trait::async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, _: ChatRequest) -> Result<String> {
            Ok("Scripted Chat".to_string())
        }

        async fn stream(&self, _: ChatRequest) -> Result<FragmentStream> {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(Error::service_unavailable("script exhausted", None));
            }
            let reply: Vec<Result<String>> =
                replies.remove(0).into_iter().map(|f| Ok(f.to_string())).collect();
            Ok(Box::pin(stream::iter(reply)))
        }
    }

    #[derive(Default)]
    struct Transcript {
        text: String,
    }

    impl Renderer for Transcript {
        fn print_prose(&mut self, text: &str) {
            self.text.push_str(text);
        }

        fn print_code(&mut self, text: &str) {
            self.text.push_str(text);
        }

        fn print_language_tag(&mut self, tag: &str) {
            self.text.push_str(&format!("<{tag}>"));
        }

        fn print_block_closed(&mut self, id: BlockId) {
            self.text.push_str(&format!("<!copy {id}>"));
        }

        fn print_error(&mut self, _: &str) {}

        fn print_info(&mut self, _: &str) {}

        fn finish_response(&mut self) {
            self.text.push('\n');
        }
    }

    #[test]
    fn test_session_numbers_blocks_across_replies() {
        let backend = ScriptedBackend {
            replies: Mutex::new(vec![
                vec!["First:\n```shell", "\nls\n``", "`"],
                vec!["Second:\n```\npwd\n```"],
            ]),
        };
        let config = ChatConfig::new().with_storage_dir(std::env::temp_dir());
        let mut session = ChatSession::new(backend, config, builtin_roles("TestOS"));
        let mut renderer = Transcript::default();

        tokio_test::block_on(async {
            session.send_streaming("one", &mut renderer).await.unwrap();
            session.send_streaming("two", &mut renderer).await.unwrap();
            let err = session.send_streaming("three", &mut renderer).await.unwrap_err();
            assert!(err.is_retryable());
        });

        assert_eq!(
            renderer.text,
            "First:\n<shell>ls\n<!copy 1>\nSecond:\n\npwd\n<!copy 2>\n"
        );
        assert_eq!(session.message_count(), 5);

        let mut clipboard = MemoryClipboard::default();
        session
            .copy_block(BlockId::new(2).unwrap(), &mut clipboard)
            .unwrap();
        assert_eq!(clipboard.copies, vec!["\npwd\n"]);

        let resumed = ChatSession::from_messages(
            ScriptedBackend {
                replies: Mutex::new(Vec::new()),
            },
            ChatConfig::new(),
            builtin_roles("TestOS"),
            session.messages().to_vec(),
        );
        assert_eq!(resumed.blocks(), session.blocks());
    }

    fn sse_chunk(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    /// Serves one request with `body` as an event stream, then closes.
    async fn serve_once(body: String) -> OpenAi {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        OpenAi::with_options(
            Some("sk-local".to_string()),
            Some(format!("http://{addr}/v1")),
            None,
        )
        .unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest::new(
            Model::Known(KnownModel::Gpt35Turbo),
            vec![ChatMessage::user("hi")],
        )
    }

    #[tokio::test]
    async fn test_client_stream_ends_at_done() {
        let body = format!("{}{}data: [DONE]\n\n", sse_chunk("Hello"), sse_chunk(", world"));
        let client = serve_once(body).await;
        let fragments: Vec<Result<String>> = client.stream(request()).await.unwrap().collect().await;
        let fragments: Vec<String> = fragments.into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(fragments, vec!["Hello", ", world"]);
    }

    #[tokio::test]
    async fn test_client_stream_cut_before_done_fails() {
        let body = format!("{}{}", sse_chunk("```\nrm -rf /tmp/x"), sse_chunk("\n```"));
        let client = serve_once(body).await;
        let fragments: Vec<Result<String>> = client.stream(request()).await.unwrap().collect().await;
        assert_eq!(fragments.len(), 3);
        assert!(matches!(fragments[2], Err(Error::Streaming { .. })));
    }

    #[tokio::test]
    async fn test_client_stream_error_event_fails() {
        let body = format!(
            "{}data: {{\"error\":{{\"type\":\"server_error\",\"message\":\"overloaded\"}}}}\n\n",
            sse_chunk("par")
        );
        let client = serve_once(body).await;
        let fragments: Vec<Result<String>> = client.stream(request()).await.unwrap().collect().await;
        assert_eq!(fragments.len(), 2);
        assert!(fragments[1].as_ref().unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_cut_stream_leaves_session_unchanged() {
        let body = format!("{}{}", sse_chunk("```\nrm -rf /tmp/x"), sse_chunk("\n```"));
        let client = serve_once(body).await;
        let config = ChatConfig::new().with_storage_dir(std::env::temp_dir());
        let mut session = ChatSession::new(client, config, builtin_roles("TestOS"));
        let mut renderer = Transcript::default();

        let err = session.send_streaming("clean up", &mut renderer).await.unwrap_err();
        assert!(matches!(err, Error::Streaming { .. }));
        assert_eq!(session.message_count(), 1);
        assert!(session.blocks().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_response() {
        // This test requires GPTERM_API_KEY or OPENAI_API_KEY to be set
        let Ok(client) = OpenAi::new(None) else {
            eprintln!("Skipping test: no API key set");
            return;
        };

        let request = ChatRequest::new(
            Model::Known(KnownModel::Gpt35Turbo),
            vec![ChatMessage::user("Reply with a bash code block that prints hi.")],
        );
        let mut fragments = client.stream(request).await.expect("Stream request should succeed");

        let mut store = BlockStore::new();
        let mut scanner = FenceScanner::new();
        let mut reply = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment.expect("fragment");
            reply.push_str(&fragment);
            scanner.ingest(&fragment, &mut store).for_each(drop);
        }
        scanner.finish(&mut store).for_each(drop);
        assert!(!reply.is_empty());
    }
}
