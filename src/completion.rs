//! Provider-agnostic completion types and the `CompletionBackend` seam.
//!
//! The runner and the judge only see this trait, so tests drive them with a
//! scripted backend while production uses `AnthropicClient`.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::CompletionError;

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
  pub prompt: String,
  pub system_prompt: Option<String>,
  pub max_tokens: u32,
}

impl CompletionRequest {
  /// Blank system prompts are dropped; the provider treats them as absent anyway.
  pub fn new(prompt: impl Into<String>, system_prompt: Option<&str>, max_tokens: u32) -> Self {
    Self {
      prompt: prompt.into(),
      system_prompt: system_prompt
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string),
      max_tokens,
    }
  }
}

/// One item of a completion stream. `StreamEnd` and `StreamError` are terminal:
/// the stream yields nothing after them.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
  TextDelta(String),
  StreamEnd,
  StreamError(CompletionError),
}

pub type EventStream = BoxStream<'static, StreamEvent>;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
  /// Open a streaming completion. Fails before any event on a non-success status.
  async fn stream_completion(&self, request: &CompletionRequest) -> Result<EventStream, CompletionError>;

  /// Single-shot completion returning the reply text.
  async fn complete(&self, request: &CompletionRequest, timeout: Duration) -> Result<String, CompletionError>;
}
