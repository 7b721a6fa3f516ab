//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Challenge, ChallengeResult, Level, Outcome};
use crate::game::GameSnapshot;
use crate::runner::Phase;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Levels,
    Submit {
        #[serde(rename = "challengeId")]
        challenge_id: String,
        prompt: String,
        #[serde(default, rename = "systemPrompt")]
        system_prompt: Option<String>,
    },
    Abandon {
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
    Reset,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Levels {
        levels: Vec<LevelOut>,
    },
    Phase {
        #[serde(rename = "challengeId")]
        challenge_id: String,
        phase: Phase,
    },
    /// Whole response text so far (not just the newest delta).
    Delta {
        #[serde(rename = "challengeId")]
        challenge_id: String,
        text: String,
    },
    Result {
        #[serde(rename = "challengeId")]
        challenge_id: String,
        #[serde(rename = "isCorrect")]
        is_correct: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        outcome: Outcome,
        text: String,
        game: GameSnapshot,
    },
    Game {
        game: GameSnapshot,
    },
    Error {
        message: String,
    },
}

impl ServerWsMessage {
    pub fn result(challenge_id: &str, r: ChallengeResult, game: GameSnapshot) -> Self {
        ServerWsMessage::Result {
            challenge_id: challenge_id.to_string(),
            is_correct: r.is_correct,
            reason: r.failure_reason,
            outcome: r.outcome,
            text: r.full_text,
            game,
        }
    }
}

/// DTO for level delivery. Validation details stay server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelOut {
    pub id: String,
    pub name: String,
    pub description: String,
    pub challenges: Vec<ChallengeOut>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOut {
    pub id: String,
    pub question: String,
    pub task: String,
    pub initial_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt_placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_prompt_placeholder: Option<String>,
    pub is_immutable_user_prompt: bool,
    pub xml_tags: Vec<String>,
    /// "pattern" or "llm".
    pub validation: &'static str,
}

pub fn to_out(c: &Challenge) -> ChallengeOut {
    ChallengeOut {
        id: c.id.clone(),
        question: c.question.clone(),
        task: c.task.clone(),
        initial_prompt: c.initial_prompt.clone(),
        initial_system_prompt: c.initial_system_prompt.clone(),
        hint: c.hint.clone(),
        system_prompt_placeholder: c.system_prompt_placeholder.clone(),
        user_prompt_placeholder: c.user_prompt_placeholder.clone(),
        is_immutable_user_prompt: c.is_immutable_user_prompt,
        xml_tags: c.xml_tags.clone(),
        validation: c.validation.kind(),
    }
}

pub fn levels_out(levels: &[Level]) -> Vec<LevelOut> {
    levels
        .iter()
        .map(|l| LevelOut {
            id: l.id.clone(),
            name: l.name.clone(),
            description: l.description.clone(),
            challenges: l.challenges.iter().map(to_out).collect(),
        })
        .collect()
}

//
// HTTP request/response DTOs
//

/// Endpoint A body.
#[derive(Debug, Deserialize)]
pub struct ChatIn {
    pub prompt: String,
    #[serde(default, rename = "systemPrompt")]
    pub system_prompt: Option<String>,
}

/// Endpoint B body.
#[derive(Debug, Deserialize)]
pub struct EvaluateIn {
    pub response: String,
    #[serde(default, rename = "evaluationPrompt")]
    pub evaluation_prompt: String,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
