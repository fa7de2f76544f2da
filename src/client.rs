use std::env;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::Stream;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_BYTES,
    STREAM_DURATION, STREAM_ERRORS, STREAM_FRAGMENTS,
};
use crate::sse::{SseEvent, process_sse};
use crate::types::{ChatCompletion, ChatRequest};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const API_KEY_VARIABLES: [&str; 2] = ["GPTERM_API_KEY", "OPENAI_API_KEY"];

/// Text fragments of a streamed reply, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// The transport a chat session talks to.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends `request` and waits for the whole reply.
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    /// Sends `request` and returns the reply as it is generated.
    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream>;
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl std::fmt::Debug for OpenAi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAi")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl OpenAi {
    /// Create a new client.
    ///
    /// The API key can be provided directly or read from the `GPTERM_API_KEY`
    /// or `OPENAI_API_KEY` environment variables, in that order.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with a custom endpoint and timeout.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => API_KEY_VARIABLES
                .iter()
                .find_map(|name| env::var(name).ok().filter(|key| !key.is_empty()))
                .ok_or_else(|| {
                    Error::authentication(
                        "API key not provided and neither GPTERM_API_KEY nor OPENAI_API_KEY is set",
                    )
                })?,
        };

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
            logger: None,
        })
    }

    /// Installs a logger that sees every request and reply.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The endpoint requests are posted to.
    pub fn endpoint(&self) -> Result<Url> {
        Ok(self.base_url.join("chat/completions")?)
    }

    fn headers(&self, accept: &'static str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key contains invalid characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    async fn post(&self, request: &ChatRequest, accept: &'static str) -> Result<Response> {
        if let Some(logger) = &self.logger {
            logger.log_request(request);
        }
        CLIENT_REQUESTS.click();
        let started = Instant::now();
        let result = self
            .client
            .post(self.endpoint()?)
            .headers(self.headers(accept)?)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            });
        CLIENT_REQUEST_DURATION.add(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                CLIENT_REQUEST_ERRORS.click();
                return Err(Self::process_error_response(response).await);
            }
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                return Err(err);
            }
        };
        Ok(response)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
        let error_param = detail.as_ref().and_then(|e| e.param.clone());
        let error_message = detail
            .and_then(|e| e.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message, Some("model or endpoint".to_string()), None),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }
}

#[async_trait::async_trait]
impl ChatBackend for OpenAi {
    async fn complete(&self, mut request: ChatRequest) -> Result<String> {
        request.stream = false;
        let response = self.post(&request, "application/json").await?;
        let completion = response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })?;
        let reply = completion
            .content()
            .ok_or_else(|| Error::serialization("response carried no choices", None))?
            .to_string();
        if let Some(logger) = &self.logger {
            logger.log_reply(&reply);
        }
        Ok(reply)
    }

    async fn stream(&self, mut request: ChatRequest) -> Result<FragmentStream> {
        request.stream = true;
        let response = self.post(&request, "text/event-stream").await?;
        Ok(reply_fragments(
            process_sse(response.bytes_stream()),
            self.logger.clone(),
        ))
    }
}

/// Turns decoded events into reply fragments.
///
/// A reply is complete only at `[DONE]`.  A stream that ends without it, or
/// that fails, yields one error and then ends.
fn reply_fragments<E>(events: E, logger: Option<Arc<dyn ClientLogger>>) -> FragmentStream
where
    E: Stream<Item = Result<SseEvent>> + Send + 'static,
{
    let state = (Box::pin(events), String::new(), logger, Instant::now(), false);
    let fragments = stream::unfold(
        state,
        |(mut events, mut reply, logger, started, finished)| async move {
            if finished {
                return None;
            }
            loop {
                match events.next().await {
                    Some(Ok(SseEvent::Chunk(chunk))) => {
                        let Some(content) = chunk.content() else {
                            continue;
                        };
                        let content = content.to_string();
                        STREAM_FRAGMENTS.click();
                        STREAM_BYTES.count(content.len() as u64);
                        if let Some(logger) = &logger {
                            logger.log_fragment(&content);
                        }
                        reply.push_str(&content);
                        return Some((Ok(content), (events, reply, logger, started, false)));
                    }
                    Some(Ok(SseEvent::Done)) => {
                        STREAM_DURATION.add(started.elapsed().as_secs_f64());
                        if let Some(logger) = &logger {
                            logger.log_reply(&reply);
                        }
                        return None;
                    }
                    Some(Err(err)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(err), (events, reply, logger, started, true)));
                    }
                    None => {
                        STREAM_ERRORS.click();
                        let err = Error::streaming("stream ended before [DONE]", None);
                        return Some((Err(err), (events, reply, logger, started, true)));
                    }
                }
            }
        },
    );
    Box::pin(fragments)
}
