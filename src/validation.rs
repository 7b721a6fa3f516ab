//! Answer validation strategies.
//!
//! `ValidationStrategy` is a tagged variant picked per challenge at startup:
//!   - `Pattern`: pure regex / substring check, no I/O.
//!   - `Judge`: asks the completion provider to grade the answer against a rubric
//!     and parses a `<function_call>` verdict block out of its reply.
//!
//! Both always produce a `Verdict`; the judge fails closed on every error.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::completion::{CompletionBackend, CompletionRequest};
use crate::config::{Prompts, ProviderConfig};
use crate::domain::{ValidationSpec, Verdict};
use crate::error::ConfigError;
use crate::util::{fill_template, trunc_for_log};

pub const REASON_NO_RESULT: &str = "no validation result found";
pub const REASON_EVALUATION_FAILED: &str = "evaluation failed";

#[derive(Clone, Debug)]
enum Matcher {
  Regex(Regex),
  Literal(String),
}

#[derive(Clone, Debug)]
pub struct PatternValidator {
  matcher: Matcher,
}

impl PatternValidator {
  /// Compile `pattern`. Flags such as `(?i)` belong in the pattern itself.
  pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
    let re = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern { pattern: pattern.to_string(), source })?;
    Ok(Self { matcher: Matcher::Regex(re) })
  }

  pub fn literal(needle: impl Into<String>) -> Self {
    Self { matcher: Matcher::Literal(needle.into()) }
  }

  pub fn matches(&self, text: &str) -> bool {
    match &self.matcher {
      Matcher::Regex(re) => re.is_match(text),
      Matcher::Literal(needle) => text.contains(needle.as_str()),
    }
  }

  pub fn validate(&self, text: &str) -> Verdict {
    let is_correct = self.matches(text);
    debug!(target: "challenge", is_correct, text_len = text.len(), "Pattern validation");
    Verdict { is_correct, reason: None }
  }
}

/// Judge call parameters, shared by every judge validator of the process.
#[derive(Clone, Debug)]
pub struct JudgeSettings {
  pub template: String,
  pub max_tokens: u32,
  pub timeout: Duration,
}

impl JudgeSettings {
  pub fn new(prompts: &Prompts, provider: &ProviderConfig) -> Self {
    Self {
      template: prompts.judge_template.clone(),
      max_tokens: provider.judge_max_tokens,
      timeout: provider.judge_timeout,
    }
  }
}

#[derive(Clone)]
pub struct JudgeValidator {
  backend: Arc<dyn CompletionBackend>,
  settings: Arc<JudgeSettings>,
  rubric: String,
}

impl JudgeValidator {
  pub fn new(backend: Arc<dyn CompletionBackend>, settings: Arc<JudgeSettings>, rubric: impl Into<String>) -> Self {
    Self { backend, settings, rubric: rubric.into() }
  }

  fn evaluation_prompt(&self, text: &str) -> String {
    fill_template(&self.settings.template, &[("response", text.trim()), ("criteria", &self.rubric)])
  }

  #[instrument(level = "info", skip(self, text), fields(text_len = text.len(), rubric_len = self.rubric.len()))]
  pub async fn validate(&self, text: &str) -> Verdict {
    let request = CompletionRequest::new(self.evaluation_prompt(text), None, self.settings.max_tokens);
    match self.backend.complete(&request, self.settings.timeout).await {
      Ok(reply) => {
        debug!(target: "challenge", reply = %trunc_for_log(&reply, 400), "Raw judge reply");
        parse_verdict(&reply)
      }
      Err(e) => {
        error!(target: "challenge", error = %e, "Judge evaluation request failed");
        Verdict::fail(REASON_EVALUATION_FAILED)
      }
    }
  }
}

fn function_call_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?s)<function_call>(.*?)</function_call>").expect("static regex"))
}

/// Extract the verdict from a judge reply. The last `<function_call>` block
/// wins; anything but a literal `"is_correct": true` is a failure.
pub fn parse_verdict(reply: &str) -> Verdict {
  let Some(block) = function_call_re()
    .captures_iter(reply)
    .last()
    .and_then(|c| c.get(1))
  else {
    warn!(target: "challenge", "No function call found in judge reply");
    return Verdict::fail(REASON_NO_RESULT);
  };

  let call: Value = match serde_json::from_str(block.as_str().trim()) {
    Ok(v) => v,
    Err(e) => {
      warn!(target: "challenge", error = %e, "Judge function call is not valid JSON");
      return Verdict::fail(REASON_NO_RESULT);
    }
  };
  let Some(params) = call.get("parameters").filter(|p| p.is_object()) else {
    warn!(target: "challenge", "Judge function call has no parameters");
    return Verdict::fail(REASON_NO_RESULT);
  };

  let is_correct = params.get("is_correct") == Some(&Value::Bool(true));
  let reason = params
    .get("reason")
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|r| !r.is_empty())
    .map(str::to_string);
  Verdict { is_correct, reason }
}

/// Per-challenge validation strategy.
#[derive(Clone)]
pub enum ValidationStrategy {
  Pattern(PatternValidator),
  Judge(JudgeValidator),
}

impl ValidationStrategy {
  /// Compile a strategy from configuration. Malformed patterns and empty
  /// rubrics are configuration errors.
  pub fn from_spec(
    spec: &ValidationSpec,
    backend: Arc<dyn CompletionBackend>,
    settings: Arc<JudgeSettings>,
  ) -> Result<Self, ConfigError> {
    match spec {
      ValidationSpec::Pattern { pattern, literal: true } => Ok(Self::Pattern(PatternValidator::literal(pattern.clone()))),
      ValidationSpec::Pattern { pattern, literal: false } => Ok(Self::Pattern(PatternValidator::regex(pattern)?)),
      ValidationSpec::Llm { evaluation_prompt } if evaluation_prompt.trim().is_empty() => Err(ConfigError::InvalidValue {
        key: "evaluation_prompt",
        value: evaluation_prompt.clone(),
      }),
      ValidationSpec::Llm { evaluation_prompt } => {
        Ok(Self::Judge(JudgeValidator::new(backend, settings, evaluation_prompt.clone())))
      }
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      ValidationStrategy::Pattern(_) => "pattern",
      ValidationStrategy::Judge(_) => "llm",
    }
  }

  pub async fn validate(&self, text: &str) -> Verdict {
    match self {
      ValidationStrategy::Pattern(p) => p.validate(text),
      ValidationStrategy::Judge(j) => j.validate(text).await,
    }
  }
}
