//! Error taxonomy.
//!
//! `ConfigError` is the only fatal kind: it aborts startup (missing credential,
//! unreadable game config) or strategy construction (malformed pattern).
//! `CompletionError` covers everything the upstream provider can do to a single
//! request; the runner and validators turn it into a failed verdict.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("{0} is not set")]
  MissingCredential(&'static str),

  #[error("invalid value for {key}: {value:?}")]
  InvalidValue { key: &'static str, value: String },

  #[error("invalid validation pattern {pattern:?}: {source}")]
  InvalidPattern {
    pattern: String,
    #[source]
    source: regex::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("duplicate challenge id {0:?}")]
  DuplicateChallenge(String),

  #[error("failed to build HTTP client: {0}")]
  HttpClient(String),
}

/// Failure of one upstream completion call. Cheap to clone so it can travel
/// inside `StreamEvent`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
  #[error("transport error: {0}")]
  Transport(String),

  #[error("upstream HTTP {status}: {body}")]
  Upstream { status: u16, body: String },

  #[error("stream ended before completion")]
  Truncated,

  #[error("provider error: {0}")]
  Provider(String),

  #[error("decode error: {0}")]
  Decode(String),
}

impl From<reqwest::Error> for CompletionError {
  fn from(e: reqwest::Error) -> Self {
    CompletionError::Transport(e.to_string())
  }
}
