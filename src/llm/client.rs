//! OpenAI-compatible chat-completion client

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::sse::{self, SseBuffer};
use super::{ChatBackend, ChatRequest, DeltaStream};
use crate::memory::Utterance;
use crate::{Error, Result};

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [Utterance],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Chat-completion client for `/chat/completions` endpoints
pub struct ChatClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl ChatClient {
    /// Create a new client
    ///
    /// `timeout` bounds a whole non-streaming call, the wait for a stream to
    /// start, and every gap between streamed chunks.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config("chat completion API key required".to_string()));
        }

        let client = reqwest::Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into(),
            model: model.into(),
            timeout,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, request: &ChatRequest, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = CompletionBody {
            model: &self.model,
            messages: &request.turns,
            stream,
            max_tokens: request.max_tokens,
        };

        self.client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        tracing::debug!(model = %self.model, turns = request.turns.len(), "chat completion");

        let response = self
            .request(request, false)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(from_reqwest)?;
        let response = ensure_success(response).await?;

        let body: CompletionResponse = response.json().await.map_err(from_reqwest)?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!(reply_len = text.len(), "chat completion finished");
        Ok(text)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream> {
        tracing::debug!(
            model = %self.model,
            turns = request.turns.len(),
            "streaming chat completion"
        );

        let response = tokio::time::timeout(self.timeout, self.request(request, true).send())
            .await
            .map_err(|_| Error::Timeout("chat completion stream did not start".to_string()))?
            .map_err(from_reqwest)?;
        let response = ensure_success(response).await?;

        Ok(decode_deltas(response.bytes_stream(), self.timeout))
    }
}

/// Turn a raw SSE body into a stream of content deltas
///
/// Ends at `data: [DONE]` or when the body ends. A gap longer than
/// `idle_timeout` between body chunks yields a single `Timeout` error.
pub fn decode_deltas<S, B, E>(body: S, idle_timeout: Duration) -> DeltaStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        sse: SseBuffer::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(delta) = state.pending.pop_front() {
                return Some((Ok(delta), state));
            }
            if state.done {
                return None;
            }

            match tokio::time::timeout(idle_timeout, state.body.next()).await {
                Err(_) => {
                    let stalled = Error::Timeout("chat completion stream stalled".to_string());
                    return Some((state.fail(stalled), state));
                }
                Ok(Some(Err(e))) => {
                    return Some((state.fail(e.into()), state));
                }
                Ok(Some(Ok(chunk))) => {
                    state.sse.push_chunk(chunk.as_ref());
                    while let Some(block) = state.sse.next_event_block() {
                        if let Err(e) = state.absorb(&block) {
                            return Some((state.fail(e), state));
                        }
                    }
                }
                Ok(None) => {
                    state.done = true;
                    if let Some(block) = state.sse.take_remainder()
                        && let Err(e) = state.absorb(&block)
                    {
                        return Some((state.fail(e), state));
                    }
                }
            }
        }
    })
    .boxed()
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    sse: SseBuffer,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> DecodeState<S> {
    fn absorb(&mut self, block: &str) -> Result<()> {
        for data in sse::data_lines(block) {
            if data == "[DONE]" {
                self.done = true;
                break;
            }

            let chunk: StreamChunk = serde_json::from_str(data)?;
            if let Some(error) = chunk.error {
                return Err(Error::Backend(format!("stream error: {error}")));
            }

            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default();
            if !content.is_empty() {
                self.pending.push_back(content);
            }
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Result<String> {
        self.done = true;
        self.pending.clear();
        Err(error)
    }
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, "chat completion API error");
    Err(Error::Backend(format!("chat completion error {status}: {body}")))
}
