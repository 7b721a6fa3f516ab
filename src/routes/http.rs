//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs sizes and basic result info.

use std::sync::Arc;

use axum::{
  body::Body,
  extract::{rejection::JsonRejection, State},
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use futures::StreamExt;
use tracing::{error, info, instrument, warn};

use crate::completion::CompletionRequest;
use crate::domain::Verdict;
use crate::protocol::*;
use crate::state::AppState;

pub const REASON_MISSING_RUBRIC: &str = "missing evaluation prompt";
pub const REASON_BAD_REQUEST: &str = "invalid request body";

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_levels(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(levels_out(&state.levels))
}

fn chat_failure() -> Response {
  let out = ErrorOut { error: "An error occurred".into() };
  (StatusCode::INTERNAL_SERVER_ERROR, Json(out)).into_response()
}

/// Proxy a streaming completion. Upstream `data: ` lines are forwarded as-is,
/// one SSE event each. Any failure before the first line is a 500.
#[instrument(level = "info", skip(state, body))]
pub async fn http_post_chat(
  State(state): State<Arc<AppState>>,
  body: Result<Json<ChatIn>, JsonRejection>,
) -> Response {
  let body = match body {
    Ok(Json(b)) => b,
    Err(e) => {
      warn!(target: "promptcraft", error = %e, "Rejected chat body");
      return chat_failure();
    }
  };
  let request = CompletionRequest::new(body.prompt, body.system_prompt.as_deref(), state.provider.max_tokens);
  let lines = match state.anthropic.stream_lines(&request).await {
    Ok(lines) => lines,
    Err(e) => {
      error!(target: "promptcraft", error = %e, "Chat stream could not be opened");
      return chat_failure();
    }
  };
  info!(target: "promptcraft", prompt_len = request.prompt.len(), has_system = request.system_prompt.is_some(), "Chat stream opened");

  let framed = lines.map(|line| {
    if let Err(e) = &line {
      warn!(target: "promptcraft", error = %e, "Chat stream interrupted");
    }
    line.map(|l| format!("{l}\n\n"))
  });

  (
    [(header::CONTENT_TYPE, "text/event-stream"), (header::CACHE_CONTROL, "no-cache")],
    Body::from_stream(framed),
  )
    .into_response()
}

/// Judge a response against a rubric. Always 200; problems become a failing verdict.
#[instrument(level = "info", skip(state, body))]
pub async fn http_post_evaluate(
  State(state): State<Arc<AppState>>,
  body: Result<Json<EvaluateIn>, JsonRejection>,
) -> Json<Verdict> {
  let body = match body {
    Ok(Json(b)) => b,
    Err(e) => {
      warn!(target: "challenge", error = %e, "Rejected evaluate body");
      return Json(Verdict::fail(REASON_BAD_REQUEST));
    }
  };
  if body.evaluation_prompt.trim().is_empty() {
    return Json(Verdict::fail(REASON_MISSING_RUBRIC));
  }

  let verdict = state.judge(&body.evaluation_prompt).validate(&body.response).await;
  info!(target: "challenge", is_correct = verdict.is_correct, response_len = body.response.len(), "HTTP evaluate judged");
  Json(verdict)
}
