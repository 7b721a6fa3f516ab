//! Orchestration of one challenge submission:
//! `Idle → Streaming → Validating → Settled(Correct | Incorrect | Errored)`.
//!
//! Every slot (a challenge within one player session) carries a generation
//! counter. Starting a submission bumps it; an older submission that sees a
//! newer generation stops forwarding updates, drops its stream (releasing the
//! transport) and returns `RunOutcome::Superseded` instead of a result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::assembler::{Assembled, StreamAssembler};
use crate::completion::{CompletionBackend, CompletionRequest};
use crate::domain::ChallengeResult;
use crate::validation::ValidationStrategy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Streaming,
  Validating,
  Settled,
}

/// Live progress of a submission. `Text` is the whole buffer so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunUpdate<'a> {
  Phase(Phase),
  Text(&'a str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
  /// `generation` is the slot generation the result belongs to; callers
  /// re-check it with `is_current` before applying the result.
  Settled { result: ChallengeResult, generation: u64 },
  /// A newer submission (or an abandon) took over the slot; discard.
  Superseded,
}

struct SlotTicket {
  generation: u64,
  rx: watch::Receiver<u64>,
}

impl SlotTicket {
  fn is_current(&self) -> bool {
    *self.rx.borrow() == self.generation
  }

  /// Resolves once the slot moves past this ticket's generation.
  fn superseded(&self) -> impl Future<Output = ()> + Send + 'static {
    let mut rx = self.rx.clone();
    let generation = self.generation;
    async move {
      let _ = rx.wait_for(|g| *g != generation).await;
    }
  }
}

pub struct ChallengeRunner {
  backend: Arc<dyn CompletionBackend>,
  max_tokens: u32,
  slots: Mutex<HashMap<String, watch::Sender<u64>>>,
}

impl ChallengeRunner {
  pub fn new(backend: Arc<dyn CompletionBackend>, max_tokens: u32) -> Self {
    Self { backend, max_tokens, slots: Mutex::new(HashMap::new()) }
  }

  async fn begin(&self, slot: &str) -> SlotTicket {
    let mut slots = self.slots.lock().await;
    let tx = slots.entry(slot.to_string()).or_insert_with(|| watch::channel(0).0);
    tx.send_modify(|g| *g += 1);
    let generation = *tx.borrow();
    let rx = tx.subscribe();
    SlotTicket { generation, rx }
  }

  /// Whether `generation` is still the latest submission on `slot`.
  pub async fn is_current(&self, slot: &str, generation: u64) -> bool {
    let slots = self.slots.lock().await;
    let current = slots.get(slot).is_some_and(|tx| *tx.borrow() == generation);
    current
  }

  /// Supersede whatever is in flight on `slot` without starting anything new.
  pub async fn abandon(&self, slot: &str) {
    if let Some(tx) = self.slots.lock().await.get(slot) {
      tx.send_modify(|g| *g += 1);
      debug!(target: "challenge", %slot, generation = *tx.borrow(), "Slot abandoned");
    }
  }

  pub async fn abandon_all(&self) {
    for tx in self.slots.lock().await.values() {
      tx.send_modify(|g| *g += 1);
    }
  }

  /// Run one submission. Never fails: transport and validation problems are
  /// folded into the `ChallengeResult`. `on_update` is only called while this
  /// submission is still the current one for `slot`.
  #[instrument(level = "info", skip(self, prompt, system_prompt, strategy, on_update), fields(%slot, prompt_len = prompt.len(), strategy = strategy.kind()))]
  pub async fn run<F>(
    &self,
    slot: &str,
    prompt: &str,
    system_prompt: Option<&str>,
    strategy: &ValidationStrategy,
    mut on_update: F,
  ) -> RunOutcome
  where
    F: FnMut(RunUpdate<'_>) + Send,
  {
    let ticket = self.begin(slot).await;
    let generation = ticket.generation;
    let mut emit = |update: RunUpdate<'_>| {
      if ticket.is_current() {
        on_update(update);
      }
    };

    emit(RunUpdate::Phase(Phase::Streaming));
    let request = CompletionRequest::new(prompt, system_prompt, self.max_tokens);
    let opened = tokio::select! {
      biased;
      _ = ticket.superseded() => None,
      r = self.backend.stream_completion(&request) => Some(r),
    };

    let result = match opened {
      None => {
        debug!(target: "challenge", %slot, generation, "Superseded before the stream opened");
        return RunOutcome::Superseded;
      }
      Some(Err(e)) => {
        warn!(target: "challenge", %slot, generation, error = %e, "Completion request failed");
        ChallengeResult::errored(String::new(), e.to_string())
      }
      Some(Ok(events)) => {
        let assembled = StreamAssembler::new()
          .accumulate(events.take_until(ticket.superseded()), |snapshot| emit(RunUpdate::Text(snapshot)))
          .await;
        if !ticket.is_current() {
          debug!(target: "challenge", %slot, generation, "Superseded while streaming");
          return RunOutcome::Superseded;
        }
        match assembled {
          Assembled::Incomplete { partial, cause } => {
            warn!(target: "challenge", %slot, generation, error = %cause, partial_len = partial.len(), "Stream did not complete; skipping validation");
            ChallengeResult::errored(partial, cause.to_string())
          }
          Assembled::Complete(text) => {
            emit(RunUpdate::Phase(Phase::Validating));
            let verdict = tokio::select! {
              biased;
              _ = ticket.superseded() => None,
              v = strategy.validate(&text) => Some(v),
            };
            let Some(verdict) = verdict else {
              debug!(target: "challenge", %slot, generation, "Superseded while validating");
              return RunOutcome::Superseded;
            };
            ChallengeResult::validated(text, verdict)
          }
        }
      }
    };

    if !ticket.is_current() {
      return RunOutcome::Superseded;
    }
    emit(RunUpdate::Phase(Phase::Settled));
    info!(target: "challenge", %slot, generation, outcome = ?result.outcome, text_len = result.full_text.len(), "Submission settled");
    RunOutcome::Settled { result, generation }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::completion::StreamEvent;
  use crate::domain::{Outcome, ValidationSpec};
  use crate::error::CompletionError;
  use crate::testing::{deltas_then_end, ScriptedBackend};
  use crate::validation::{JudgeSettings, JudgeValidator, PatternValidator, REASON_EVALUATION_FAILED};
  use futures::channel::mpsc;
  use futures::stream;
  use std::time::Duration;

  fn pattern(p: &str) -> ValidationStrategy {
    ValidationStrategy::Pattern(PatternValidator::regex(p).unwrap())
  }

  fn judge(backend: Arc<ScriptedBackend>, rubric: &str) -> ValidationStrategy {
    let settings = Arc::new(JudgeSettings {
      template: crate::config::Prompts::default().judge_template,
      max_tokens: 200,
      timeout: Duration::from_secs(5),
    });
    ValidationStrategy::Judge(JudgeValidator::new(backend, settings, rubric))
  }

  fn describe(u: RunUpdate<'_>) -> String {
    match u {
      RunUpdate::Phase(p) => format!("phase:{p:?}"),
      RunUpdate::Text(t) => format!("text:{t}"),
    }
  }

  fn settled(outcome: RunOutcome) -> ChallengeResult {
    match outcome {
      RunOutcome::Settled { result, .. } => result,
      RunOutcome::Superseded => panic!("unexpected supersession"),
    }
  }

  async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
      if cond() {
        return;
      }
      tokio::task::yield_now().await;
    }
    panic!("condition never became true");
  }

  #[tokio::test]
  async fn counting_to_three_passes_the_pattern() {
    let backend = ScriptedBackend::new();
    backend.push_stream(Ok(deltas_then_end(&["1", ", 2", ", 3"])));
    let runner = ChallengeRunner::new(backend.clone(), 300);

    let mut updates = Vec::new();
    let out = runner
      .run("counting-to-three", "Please respond to this message.", None, &pattern("1.*2.*3"), |u| updates.push(describe(u)))
      .await;

    let result = settled(out);
    assert!(result.is_correct);
    assert_eq!(result.full_text, "1, 2, 3");
    assert_eq!(result.outcome, Outcome::Correct);
    assert_eq!(
      updates,
      vec![
        "phase:Streaming",
        "text:1",
        "text:1, 2",
        "text:1, 2, 3",
        "phase:Validating",
        "phase:Settled",
      ]
    );

    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests[0].prompt, "Please respond to this message.");
    assert_eq!(requests[0].system_prompt, None);
    assert_eq!(requests[0].max_tokens, 300);
  }

  #[tokio::test]
  async fn judge_verdict_becomes_the_result() {
    let backend = ScriptedBackend::new();
    backend.push_stream(Ok(deltas_then_end(&["Michael", " Jordan."])));
    backend.push_reply(Ok(
      "<function_call>{\"name\":\"validate_response\",\"parameters\":{\"is_correct\":false,\"reason\":\"trailing period\"}}</function_call>".into(),
    ));
    let runner = ChallengeRunner::new(backend.clone(), 300);
    let strategy = judge(backend.clone(), "Only the name, no punctuation.");

    let result = settled(runner.run("one-player-only", "Who is the best?", None, &strategy, |_| {}).await);
    assert_eq!(result.full_text, "Michael Jordan.");
    assert!(!result.is_correct);
    assert_eq!(result.failure_reason.as_deref(), Some("trailing period"));
    assert_eq!(result.outcome, Outcome::Incorrect);
  }

  #[tokio::test]
  async fn disconnect_mid_stream_errors_without_validating() {
    let backend = ScriptedBackend::new();
    backend.push_stream(Ok(stream::iter(vec![
      StreamEvent::TextDelta("1".into()),
      StreamEvent::TextDelta(", 2".into()),
      StreamEvent::StreamError(CompletionError::Transport("connection reset".into())),
    ])
    .boxed()));
    let runner = ChallengeRunner::new(backend.clone(), 300);

    let mut updates = Vec::new();
    // "1" would match the partial text if it were ever validated.
    let result = settled(runner.run("count", "count", None, &pattern("1"), |u| updates.push(describe(u))).await);

    assert!(!result.is_correct);
    assert_eq!(result.outcome, Outcome::Errored);
    assert_eq!(result.full_text, "1, 2");
    assert!(result.failure_reason.unwrap().contains("connection reset"));
    assert!(!updates.contains(&"phase:Validating".to_string()));
  }

  #[tokio::test]
  async fn upstream_error_short_circuits() {
    let backend = ScriptedBackend::new();
    backend.push_stream(Err(CompletionError::Upstream { status: 500, body: "boom".into() }));
    let runner = ChallengeRunner::new(backend.clone(), 300);
    let strategy = judge(backend.clone(), "anything");

    let result = settled(runner.run("slot", "p", Some("sys"), &strategy, |_| {}).await);
    assert_eq!(result.outcome, Outcome::Errored);
    assert_eq!(result.full_text, "");
    assert!(result.failure_reason.unwrap().contains("500"));
    assert_eq!(backend.request_count(), 1, "judge must not be called");
  }

  #[tokio::test]
  async fn unreachable_judge_is_evaluation_failed() {
    let backend = ScriptedBackend::new();
    backend.push_stream(Ok(deltas_then_end(&["Michael Jordan"])));
    backend.push_reply(Err(CompletionError::Upstream { status: 503, body: "unavailable".into() }));
    let runner = ChallengeRunner::new(backend.clone(), 300);
    let strategy = judge(backend.clone(), "Only the name.");

    let result = settled(runner.run("slot", "p", None, &strategy, |_| {}).await);
    assert!(!result.is_correct);
    assert_eq!(result.failure_reason.as_deref(), Some(REASON_EVALUATION_FAILED));
  }

  #[tokio::test]
  async fn second_submission_supersedes_the_first() {
    let backend = ScriptedBackend::new();
    let (tx_a, rx_a) = mpsc::unbounded::<StreamEvent>();
    backend.push_stream(Ok(rx_a.boxed()));
    backend.push_stream(Ok(deltas_then_end(&["1, 2, 3"])));
    let runner = Arc::new(ChallengeRunner::new(backend.clone(), 300));
    let strategy = Arc::new(pattern("1.*2.*3"));

    let seen_a = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let task_a = tokio::spawn({
      let (runner, strategy, seen) = (runner.clone(), strategy.clone(), seen_a.clone());
      async move {
        runner
          .run("slot", "A", None, &strategy, move |u| {
            if let RunUpdate::Text(t) = u {
              seen.lock().unwrap().push(t.to_string());
            }
          })
          .await
      }
    });

    tx_a.unbounded_send(StreamEvent::TextDelta("stale".into())).unwrap();
    wait_until(|| !seen_a.lock().unwrap().is_empty()).await;

    let b = settled(runner.run("slot", "B", None, &strategy, |_| {}).await);
    assert!(b.is_correct);
    assert_eq!(b.full_text, "1, 2, 3");

    let _ = tx_a.unbounded_send(StreamEvent::TextDelta(" 1, 2, 3".into()));
    let _ = tx_a.unbounded_send(StreamEvent::StreamEnd);
    assert_eq!(task_a.await.unwrap(), RunOutcome::Superseded);
    assert_eq!(*seen_a.lock().unwrap(), vec!["stale".to_string()]);
    assert!(tx_a.is_closed(), "superseded stream must be released");
  }

  #[tokio::test]
  async fn abandon_releases_the_stream_and_slots_are_independent() {
    let backend = ScriptedBackend::new();
    let (tx_x, rx_x) = mpsc::unbounded::<StreamEvent>();
    backend.push_stream(Ok(rx_x.boxed()));
    backend.push_stream(Ok(deltas_then_end(&["moo"])));
    let runner = Arc::new(ChallengeRunner::new(backend.clone(), 300));
    let strategy = Arc::new(pattern("(?i)moo"));

    let task_x = tokio::spawn({
      let (runner, strategy) = (runner.clone(), strategy.clone());
      async move { runner.run("x", "A", None, &strategy, |_| {}).await }
    });
    wait_until(|| backend.request_count() == 1).await;

    // Another slot settles while "x" is still streaming.
    let y = settled(runner.run("y", "B", None, &strategy, |_| {}).await);
    assert!(y.is_correct);
    assert!(!tx_x.is_closed());

    runner.abandon("x").await;
    assert_eq!(task_x.await.unwrap(), RunOutcome::Superseded);
    assert!(tx_x.is_closed());
  }

  #[tokio::test]
  async fn settled_generation_goes_stale_after_abandon() {
    let backend = ScriptedBackend::new();
    backend.push_stream(Ok(deltas_then_end(&["moo"])));
    let runner = ChallengeRunner::new(backend, 300);

    let RunOutcome::Settled { generation, .. } = runner.run("x", "A", None, &pattern("moo"), |_| {}).await else {
      panic!("expected a settled run");
    };
    assert!(runner.is_current("x", generation).await);
    assert!(!runner.is_current("y", generation).await);

    runner.abandon_all().await;
    assert!(!runner.is_current("x", generation).await);
  }

  #[tokio::test]
  async fn strategy_from_spec_runs_end_to_end() {
    let backend = ScriptedBackend::new();
    backend.push_stream(Ok(deltas_then_end(&["¡Hola! ", "Estoy bien."])));
    let runner = ChallengeRunner::new(backend.clone(), 300);
    let spec = ValidationSpec::Pattern { pattern: "Hola".into(), literal: true };
    let settings = Arc::new(JudgeSettings {
      template: String::new(),
      max_tokens: 1,
      timeout: Duration::from_secs(1),
    });
    let strategy = ValidationStrategy::from_spec(&spec, backend.clone(), settings).unwrap();
    let result = settled(runner.run("spanish-output", "Hello", Some("Answer in Spanish."), &strategy, |_| {}).await);
    assert!(result.is_correct);
    assert_eq!(backend.requests.lock().unwrap()[0].system_prompt.as_deref(), Some("Answer in Spanish."));
  }
}
