//! Process-wide configuration.
//!
//! - `ProviderConfig`: upstream credential + model parameters, read once from the
//!   environment at startup and shared read-only (`Arc<ProviderConfig>`).
//! - `GameConfig`: optional TOML file (GAME_CONFIG_PATH) with a level catalogue
//!   and prompt overrides. See `GameConfig` and `Prompts` for the schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::domain::Level;
use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

#[derive(Clone, Debug)]
pub struct ProviderConfig {
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub api_version: String,
  pub temperature: Option<f32>,
  /// Token budget of a gameplay completion.
  pub max_tokens: u32,
  /// Token budget of a judge evaluation.
  pub judge_max_tokens: u32,
  pub judge_timeout: Duration,
  /// Upper bound for a whole gameplay stream.
  pub http_timeout: Duration,
}

impl ProviderConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|k| std::env::var(k).ok())
  }

  /// Build from an arbitrary key lookup. `from_env` is the production wrapper.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let api_key = lookup("ANTHROPIC_API_KEY")
      .filter(|k| !k.trim().is_empty())
      .ok_or(ConfigError::MissingCredential("ANTHROPIC_API_KEY"))?;

    let base_url = lookup("ANTHROPIC_BASE_URL")
      .unwrap_or_else(|| DEFAULT_BASE_URL.into())
      .trim_end_matches('/')
      .to_string();
    let model = lookup("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
    let api_version = lookup("ANTHROPIC_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.into());

    let temperature = parse_opt::<f32>(&lookup, "ANTHROPIC_TEMPERATURE")?;
    let max_tokens = parse_opt::<u32>(&lookup, "COMPLETION_MAX_TOKENS")?.unwrap_or(300);
    let judge_max_tokens = parse_opt::<u32>(&lookup, "JUDGE_MAX_TOKENS")?.unwrap_or(200);
    let judge_timeout = Duration::from_secs(parse_opt::<u64>(&lookup, "JUDGE_TIMEOUT_SECS")?.unwrap_or(20));
    let http_timeout = Duration::from_secs(parse_opt::<u64>(&lookup, "HTTP_TIMEOUT_SECS")?.unwrap_or(120));

    Ok(Self {
      api_key,
      base_url,
      model,
      api_version,
      temperature,
      max_tokens,
      judge_max_tokens,
      judge_timeout,
      http_timeout,
    })
  }
}

fn parse_opt<T: std::str::FromStr>(
  lookup: &impl Fn(&str) -> Option<String>,
  key: &'static str,
) -> Result<Option<T>, ConfigError> {
  match lookup(key) {
    None => Ok(None),
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GameConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub levels: Vec<Level>,
}

/// Prompts used by the judge. `{response}` and `{criteria}` are substituted.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub judge_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self { judge_template: DEFAULT_JUDGE_TEMPLATE.trim().into() }
  }
}

const DEFAULT_JUDGE_TEMPLATE: &str = r#"
You are a validator for responses in a prompt engineering game. You have access to a validation function:

<function_call>
{
  "name": "validate_response",
  "parameters": {
    "is_correct": "boolean - whether the response meets ALL criteria",
    "reason": "string - explanation of why the response is incorrect (if applicable)"
  }
}
</function_call>

Response to evaluate: "{response}"

Evaluation criteria:
{criteria}

Analyze the response strictly against the criteria and call the validation function with your assessment.
Any deviation from the criteria should result in is_correct being false.
Include a clear reason if the response is incorrect.
"#;

/// Load `GameConfig` from GAME_CONFIG_PATH. Unset means "use built-in seeds";
/// a file that is set but unreadable is a startup error.
pub fn load_game_config_from_env() -> Result<Option<GameConfig>, ConfigError> {
  let Some(path) = std::env::var("GAME_CONFIG_PATH").ok() else {
    return Ok(None);
  };
  let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
  let cfg = parse_game_config(&raw).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
  info!(target: "promptcraft", %path, levels = cfg.levels.len(), "Loaded game config (TOML)");
  Ok(Some(cfg))
}

pub fn parse_game_config(raw: &str) -> Result<GameConfig, toml::de::Error> {
  toml::from_str::<GameConfig>(raw)
}
