//! Test doubles shared by the unit tests of several modules.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use wiremock::MockServer;

use crate::anthropic::AnthropicClient;
use crate::completion::{CompletionBackend, CompletionRequest, EventStream, StreamEvent};
use crate::config::ProviderConfig;
use crate::error::CompletionError;

/// Anthropic-shaped SSE body carrying `deltas`, optionally closed by `message_stop`.
pub fn sse_body(deltas: &[&str], stop: bool) -> String {
  let mut out = String::from(
    "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n\
     event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n\
     event: ping\ndata: {\"type\": \"ping\"}\n\n",
  );
  for d in deltas {
    let env = serde_json::json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": d}});
    out.push_str(&format!("event: content_block_delta\ndata: {env}\n\n"));
  }
  if stop {
    out.push_str("event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n");
    out.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
  }
  out
}

pub fn provider_config(base_url: &str) -> ProviderConfig {
  let base_url = base_url.to_string();
  ProviderConfig::from_lookup(move |k| match k {
    "ANTHROPIC_API_KEY" => Some("sk-test".into()),
    "ANTHROPIC_BASE_URL" => Some(base_url.clone()),
    _ => None,
  })
  .unwrap()
}

pub fn client_for(server: &MockServer) -> AnthropicClient {
  AnthropicClient::new(Arc::new(provider_config(&server.uri()))).unwrap()
}

/// Events for a stream that delivers `deltas` and then ends normally.
pub fn deltas_then_end(deltas: &[&str]) -> EventStream {
  let mut events: Vec<StreamEvent> = deltas.iter().map(|d| StreamEvent::TextDelta(d.to_string())).collect();
  events.push(StreamEvent::StreamEnd);
  stream::iter(events).boxed()
}

/// In-process backend answering from queues filled by the test.
#[derive(Default)]
pub struct ScriptedBackend {
  streams: Mutex<VecDeque<Result<EventStream, CompletionError>>>,
  replies: Mutex<VecDeque<Result<String, CompletionError>>>,
  pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn push_stream(&self, s: Result<EventStream, CompletionError>) {
    self.streams.lock().unwrap().push_back(s);
  }

  pub fn push_reply(&self, r: Result<String, CompletionError>) {
    self.replies.lock().unwrap().push_back(r);
  }

  pub fn request_count(&self) -> usize {
    self.requests.lock().unwrap().len()
  }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
  async fn stream_completion(&self, request: &CompletionRequest) -> Result<EventStream, CompletionError> {
    self.requests.lock().unwrap().push(request.clone());
    self.streams
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| Err(CompletionError::Transport("no scripted stream".into())))
  }

  async fn complete(&self, request: &CompletionRequest, _timeout: Duration) -> Result<String, CompletionError> {
    self.requests.lock().unwrap().push(request.clone());
    self.replies
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| Err(CompletionError::Transport("no scripted reply".into())))
  }
}
