//! Application state: provider client, level catalogue and compiled strategies.
//!
//! Everything here is built once at startup and read-only afterwards. Per-player
//! mutable state (runner slots, lives) lives in the WebSocket session instead.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::anthropic::AnthropicClient;
use crate::completion::CompletionBackend;
use crate::config::{load_game_config_from_env, GameConfig, ProviderConfig};
use crate::domain::Level;
use crate::error::ConfigError;
use crate::seeds::seed_levels;
use crate::validation::{JudgeSettings, JudgeValidator, ValidationStrategy};

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<ProviderConfig>,
    /// Concrete client, needed for raw line proxying (`/api/chat`).
    pub anthropic: AnthropicClient,
    pub backend: Arc<dyn CompletionBackend>,
    pub judge_settings: Arc<JudgeSettings>,
    pub levels: Arc<Vec<Level>>,
    pub strategies: Arc<HashMap<String, ValidationStrategy>>,
}

impl AppState {
    /// Build state from env. Any configuration problem is returned before the
    /// server starts listening.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = ProviderConfig::from_env()?;
        let game = load_game_config_from_env()?;
        Self::build(provider, game)
    }

    pub fn build(provider: ProviderConfig, game: Option<GameConfig>) -> Result<Self, ConfigError> {
        let provider = Arc::new(provider);
        let anthropic = AnthropicClient::new(provider.clone())?;
        let backend: Arc<dyn CompletionBackend> = Arc::new(anthropic.clone());

        let (prompts, levels) = match game {
            Some(cfg) if !cfg.levels.is_empty() => (cfg.prompts, cfg.levels),
            Some(cfg) => (cfg.prompts, seed_levels()),
            None => (Default::default(), seed_levels()),
        };
        let judge_settings = Arc::new(JudgeSettings::new(&prompts, &provider));

        let mut strategies = HashMap::new();
        for level in &levels {
            for ch in &level.challenges {
                let strategy =
                    ValidationStrategy::from_spec(&ch.validation, backend.clone(), judge_settings.clone())?;
                if strategies.insert(ch.id.clone(), strategy).is_some() {
                    return Err(ConfigError::DuplicateChallenge(ch.id.clone()));
                }
            }
        }

        for level in &levels {
            let judged = level.challenges.iter().filter(|c| c.validation.kind() == "llm").count();
            info!(target: "challenge", level = %level.id, challenges = level.challenges.len(), judged, "Startup level inventory");
        }
        info!(target: "promptcraft", base_url = %provider.base_url, model = %provider.model, api_version = %provider.api_version, "Anthropic provider configured.");

        Ok(Self {
            provider,
            anthropic,
            backend,
            judge_settings,
            levels: Arc::new(levels),
            strategies: Arc::new(strategies),
        })
    }

    pub fn strategy(&self, challenge_id: &str) -> Option<&ValidationStrategy> {
        self.strategies.get(challenge_id)
    }

    /// Ad-hoc judge for `/api/evaluate`, sharing the process-wide judge settings.
    pub fn judge(&self, rubric: &str) -> JudgeValidator {
        JudgeValidator::new(self.backend.clone(), self.judge_settings.clone(), rubric)
    }
}
