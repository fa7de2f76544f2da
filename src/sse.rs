//! Server-Sent Events (SSE) processing for streamed replies.
//!
//! The chat-completions endpoint streams one `data:` line per event, each a
//! JSON [`ChatCompletionChunk`], and ends the stream with `data: [DONE]`.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A chunk of the reply.
    Chunk(ChatCompletionChunk),
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Error { error: ErrorBody },
    Chunk(ChatCompletionChunk),
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Events may be split across byte chunks anywhere, including inside a
/// multi-byte character.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, mut finished)| async move {
            loop {
                if let Some((event, rest)) = take_event(&buffer) {
                    buffer = rest;
                    match event {
                        Some(event) => return Some((event, (stream, buffer, finished))),
                        None => continue,
                    }
                }
                if finished {
                    return None;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, finished))),
                    None => {
                        // Terminate a trailing event that lacks its blank line.
                        finished = true;
                        if buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                            buffer.extend_from_slice(b"\n\n");
                        } else {
                            return None;
                        }
                    }
                }
            }
        },
    )
}

/// Split the first complete event off `buffer`.
///
/// Returns `None` when no complete event is buffered yet, and `Some((None,
/// rest))` for events that carry no data (comments, keep-alives).
fn take_event(buffer: &[u8]) -> Option<(Option<Result<SseEvent>>, Vec<u8>)> {
    let (end, delimiter_len) = find_event_end(buffer)?;
    let rest = buffer[end + delimiter_len..].to_vec();
    let text = match std::str::from_utf8(&buffer[..end]) {
        Ok(text) => text,
        Err(e) => return Some((Some(Err(e.into())), rest)),
    };
    Some((parse_event(text), rest))
}

fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|at| (at, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|at| (at, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_event(text: &str) -> Option<Result<SseEvent>> {
    let mut data: Option<String> = None;
    for line in text.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match &mut data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }
    let data = data?;
    if data.trim() == "[DONE]" {
        return Some(Ok(SseEvent::Done));
    }
    Some(match serde_json::from_str::<Payload>(&data) {
        Ok(Payload::Chunk(chunk)) => Ok(SseEvent::Chunk(chunk)),
        Ok(Payload::Error { error }) => Err(Error::api(
            500,
            error.error_type.or(Some("stream_error".to_string())),
            error.message.unwrap_or(data),
        )),
        Err(e) => Err(Error::serialization(
            format!("Malformed SSE event: {e}"),
            Some(Box::new(e)),
        )),
    })
}
