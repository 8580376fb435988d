//! Chat-completion collaborator
//!
//! The session and the compactor talk to the model only through
//! [`ChatBackend`]; [`ChatClient`] is the OpenAI-compatible implementation.

mod client;
pub mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;
use crate::memory::Utterance;

pub use client::{ChatClient, decode_deltas};

/// Lazily produced reply fragments, in generation order
pub type DeltaStream = BoxStream<'static, Result<String>>;

/// An ordered list of turns sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub turns: Vec<Utterance>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    #[must_use]
    pub const fn new(turns: Vec<Utterance>) -> Self {
        Self {
            turns,
            max_tokens: None,
        }
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Chat-completion backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Single non-streaming completion, returning the full reply text
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or times out
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Streaming completion
    ///
    /// Each item is the next text delta. The stream is pulled one delta at a
    /// time, so the consumer controls pacing.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be started; failures after that
    /// surface as `Err` items in the stream
    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream>;
}
