//! Domain models: level catalogue, validation configuration and submission results.

use serde::{Deserialize, Serialize};

/// A group of challenges that must all be passed before the next level unlocks.
#[derive(Clone, Debug, Deserialize)]
pub struct Level {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub challenges: Vec<Challenge>,
}

/// Static challenge definition, as supplied by TOML or the built-in seeds.
#[derive(Clone, Debug, Deserialize)]
pub struct Challenge {
  pub id: String,
  pub question: String,
  pub task: String,
  #[serde(default)]
  pub initial_prompt: String,
  #[serde(default)]
  pub initial_system_prompt: Option<String>,
  #[serde(default)]
  pub hint: Option<String>,
  #[serde(default)]
  pub system_prompt_placeholder: Option<String>,
  #[serde(default)]
  pub user_prompt_placeholder: Option<String>,
  #[serde(default)]
  pub is_immutable_user_prompt: bool,
  #[serde(default)]
  pub xml_tags: Vec<String>,
  pub validation: ValidationSpec,
}

/// How a challenge's answer is checked. Compiled into a `ValidationStrategy`
/// once at startup.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationSpec {
  /// Regex (default) or, with `literal = true`, a plain substring.
  Pattern {
    pattern: String,
    #[serde(default)]
    literal: bool,
  },
  /// Second LLM call grading the answer against a rubric.
  Llm { evaluation_prompt: String },
}

impl ValidationSpec {
  pub fn kind(&self) -> &'static str {
    match self {
      ValidationSpec::Pattern { .. } => "pattern",
      ValidationSpec::Llm { .. } => "llm",
    }
  }
}

/// Outcome of one validation, before it is folded into a `ChallengeResult`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
  pub is_correct: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

impl Verdict {
  #[cfg(test)]
  pub fn pass() -> Self {
    Self { is_correct: true, reason: None }
  }

  pub fn fail(reason: impl Into<String>) -> Self {
    Self { is_correct: false, reason: Some(reason.into()) }
  }
}

/// Terminal state of a submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Correct,
  Incorrect,
  /// Upstream or stream failure; validation never ran.
  Errored,
}

/// Result of one submission. Only built through the constructors below so that
/// `is_correct` always agrees with `outcome`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeResult {
  /// Final text for Correct/Incorrect; whatever arrived before the failure for Errored.
  pub full_text: String,
  pub is_correct: bool,
  pub failure_reason: Option<String>,
  pub outcome: Outcome,
}

impl ChallengeResult {
  pub fn validated(full_text: String, verdict: Verdict) -> Self {
    let outcome = if verdict.is_correct { Outcome::Correct } else { Outcome::Incorrect };
    Self {
      full_text,
      is_correct: verdict.is_correct,
      failure_reason: verdict.reason,
      outcome,
    }
  }

  pub fn errored(partial_text: String, reason: impl Into<String>) -> Self {
    Self {
      full_text: partial_text,
      is_correct: false,
      failure_reason: Some(reason.into()),
      outcome: Outcome::Errored,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn outcome_follows_the_verdict() {
    let ok = ChallengeResult::validated("1, 2, 3".into(), Verdict::pass());
    assert!(ok.is_correct);
    assert_eq!(ok.outcome, Outcome::Correct);

    let bad = ChallengeResult::validated("x".into(), Verdict::fail("nope"));
    assert!(!bad.is_correct);
    assert_eq!(bad.outcome, Outcome::Incorrect);
    assert_eq!(bad.failure_reason.as_deref(), Some("nope"));

    let err = ChallengeResult::errored("1, 2".into(), "stream ended before completion");
    assert!(!err.is_correct);
    assert_eq!(err.outcome, Outcome::Errored);
  }

  #[test]
  fn verdict_serializes_camel_case_without_empty_reason() {
    let v = serde_json::to_value(Verdict::pass()).unwrap();
    assert_eq!(v, serde_json::json!({ "isCorrect": true }));
    let v = serde_json::to_value(Verdict::fail("trailing period")).unwrap();
    assert_eq!(v, serde_json::json!({ "isCorrect": false, "reason": "trailing period" }));
  }
}
