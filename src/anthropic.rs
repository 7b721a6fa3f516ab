//! Minimal Anthropic Messages API client for our use-cases.
//!
//! Two calls:
//! - streaming (`stream: true`), consumed either as raw `data: ` lines (proxied
//!   by `/api/chat`) or as typed `StreamEvent`s (consumed by the runner);
//! - single-shot (`stream: false`), used by the judge.
//!
//! Calls are instrumented and log model names, statuses and sizes (not contents).
//! NOTE: We never log the API key.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::completion::{CompletionBackend, CompletionRequest, EventStream, StreamEvent};
use crate::config::ProviderConfig;
use crate::error::{CompletionError, ConfigError};
use crate::sse::{decode_line, LineEvent, LineSplitter, DATA_PREFIX};
use crate::util::trunc_for_log;

pub type LineStream = BoxStream<'static, Result<String, CompletionError>>;

#[derive(Clone)]
pub struct AnthropicClient {
  client: reqwest::Client,
  cfg: Arc<ProviderConfig>,
}

impl AnthropicClient {
  pub fn new(cfg: Arc<ProviderConfig>) -> Result<Self, ConfigError> {
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
    Ok(Self { client, cfg })
  }

  fn post(&self, body: &MessagesRequest<'_>) -> reqwest::RequestBuilder {
    let url = format!("{}/messages", self.cfg.base_url);
    self.client.post(url)
      .header(USER_AGENT, "promptcraft-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-api-key", &self.cfg.api_key)
      .header("anthropic-version", &self.cfg.api_version)
      .json(body)
  }

  fn body<'a>(&'a self, req: &'a CompletionRequest, stream: bool) -> MessagesRequest<'a> {
    MessagesRequest {
      model: &self.cfg.model,
      max_tokens: req.max_tokens,
      messages: vec![MessageReq { role: "user", content: &req.prompt }],
      system: req.system_prompt.as_deref(),
      temperature: self.cfg.temperature,
      stream,
    }
  }

  /// Open a streaming completion and return its `data: ` lines, in order.
  /// A non-success status fails here, before any line is produced.
  #[instrument(level = "info", skip(self, req), fields(model = %self.cfg.model, prompt_len = req.prompt.len(), has_system = req.system_prompt.is_some()))]
  pub async fn stream_lines(&self, req: &CompletionRequest) -> Result<LineStream, CompletionError> {
    let res = self.post(&self.body(req, true))
      .timeout(self.cfg.http_timeout)
      .send()
      .await?;
    let res = ensure_success(res).await?;
    debug!(target: "promptcraft", status = res.status().as_u16(), "Upstream stream opened");
    Ok(data_lines(res.bytes_stream()))
  }
}

#[async_trait]
impl CompletionBackend for AnthropicClient {
  async fn stream_completion(&self, request: &CompletionRequest) -> Result<EventStream, CompletionError> {
    let lines = self.stream_lines(request).await?;
    Ok(into_events(lines))
  }

  #[instrument(level = "info", skip(self, request), fields(model = %self.cfg.model, prompt_len = request.prompt.len(), timeout_ms = timeout.as_millis() as u64))]
  async fn complete(&self, request: &CompletionRequest, timeout: Duration) -> Result<String, CompletionError> {
    let start = std::time::Instant::now();
    let res = self.post(&self.body(request, false))
      .timeout(timeout)
      .send()
      .await?;
    let res = ensure_success(res).await?;

    let body: MessagesResponse = res.json().await.map_err(|e| CompletionError::Decode(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(input_tokens = ?usage.input_tokens, output_tokens = ?usage.output_tokens, elapsed = ?start.elapsed(), "Anthropic usage");
    }
    let text: String = body.content.into_iter()
      .filter(|b| b.kind == "text")
      .filter_map(|b| b.text)
      .collect();
    Ok(text)
  }
}

async fn ensure_success(res: reqwest::Response) -> Result<reqwest::Response, CompletionError> {
  if res.status().is_success() {
    return Ok(res);
  }
  let status = res.status().as_u16();
  let body = res.text().await.unwrap_or_default();
  error!(target: "promptcraft", status, body = %trunc_for_log(&body, 300), "Upstream returned an error status");
  let body = extract_anthropic_error(&body).unwrap_or(body);
  Err(CompletionError::Upstream { status, body })
}

struct LineState<S> {
  bytes: std::pin::Pin<Box<S>>,
  splitter: LineSplitter,
  pending: VecDeque<String>,
  done: bool,
}

/// Re-frame a byte stream into its `data: ` lines. Other lines are dropped.
/// The byte stream (and so the connection) is owned by the returned stream and
/// released when it ends or is dropped.
pub fn data_lines<S, B, E>(bytes: S) -> LineStream
where
  S: Stream<Item = Result<B, E>> + Send + 'static,
  B: AsRef<[u8]> + Send + 'static,
  E: Into<CompletionError> + Send + 'static,
{
  let state = LineState {
    bytes: Box::pin(bytes),
    splitter: LineSplitter::new(),
    pending: VecDeque::new(),
    done: false,
  };
  stream::unfold(state, |mut st| async move {
    loop {
      if let Some(line) = st.pending.pop_front() {
        if line.starts_with(DATA_PREFIX) {
          return Some((Ok(line), st));
        }
        continue;
      }
      if st.done {
        return None;
      }
      match st.bytes.next().await {
        Some(Ok(chunk)) => {
          let lines = st.splitter.push(chunk.as_ref());
          st.pending.extend(lines);
        }
        Some(Err(e)) => {
          st.done = true;
          return Some((Err(e.into()), st));
        }
        None => {
          st.done = true;
          st.pending.extend(st.splitter.finish());
        }
      }
    }
  })
  .boxed()
}

/// Decode `data: ` lines into `StreamEvent`s, ending after the first terminal event.
/// EOF without `message_stop` is reported as `Truncated`.
pub fn into_events(lines: LineStream) -> EventStream {
  stream::unfold(Some(lines), |lines| async move {
    let mut lines = lines?;
    loop {
      let terminal = match lines.next().await {
        None => StreamEvent::StreamError(CompletionError::Truncated),
        Some(Err(e)) => {
          warn!(target: "promptcraft", error = %e, "Upstream stream failed");
          StreamEvent::StreamError(e)
        }
        Some(Ok(line)) => match decode_line(&line) {
          LineEvent::Delta(text) => return Some((StreamEvent::TextDelta(text), Some(lines))),
          LineEvent::Stop => StreamEvent::StreamEnd,
          LineEvent::Failed(msg) => StreamEvent::StreamError(CompletionError::Provider(msg)),
          LineEvent::Malformed(err) => {
            warn!(target: "promptcraft", error = %err, line = %trunc_for_log(&line, 120), "Skipping malformed stream line");
            continue;
          }
          LineEvent::NotData | LineEvent::Ignored => continue,
        },
      };
      // `lines` is dropped here, releasing the response body.
      return Some((terminal, None));
    }
  })
  .boxed()
}

// --- Messages DTOs ---

#[derive(Serialize)]
struct MessagesRequest<'a> {
  model: &'a str,
  max_tokens: u32,
  messages: Vec<MessageReq<'a>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  stream: bool,
}
#[derive(Serialize)]
struct MessageReq<'a> { role: &'a str, content: &'a str }

#[derive(Deserialize)]
struct MessagesResponse {
  #[serde(default)] content: Vec<ContentBlock>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")] kind: String,
  #[serde(default)] text: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] input_tokens: Option<u32>,
  #[serde(default)] output_tokens: Option<u32>,
}

/// Try to extract a clean error message from an Anthropic error body.
fn extract_anthropic_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
