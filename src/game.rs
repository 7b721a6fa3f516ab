//! Per-session game bookkeeping: lives, current level and solved challenges.
//!
//! The runner only reports results; this is what the session does with them.

use std::collections::HashSet;

use serde::Serialize;

use crate::domain::{ChallengeResult, Level, Outcome};

pub const STARTING_LIVES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
  Playing,
  Won,
  Lost,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
  pub current_level: usize,
  pub lives: u32,
  pub status: GameStatus,
  pub solved: Vec<String>,
}

/// Why a submission may not start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
  UnknownChallenge,
  LevelLocked,
  GameOver,
}

impl Rejection {
  pub fn message(&self, challenge_id: &str) -> String {
    match self {
      Rejection::UnknownChallenge => format!("Unknown challengeId: {challenge_id}"),
      Rejection::LevelLocked => format!("Challenge {challenge_id} belongs to a locked level"),
      Rejection::GameOver => "The game is over; reset to play again".into(),
    }
  }
}

#[derive(Debug)]
pub struct GameState {
  /// Challenge ids per level, in catalogue order.
  levels: Vec<Vec<String>>,
  current_level: usize,
  lives: u32,
  status: GameStatus,
  solved: HashSet<String>,
}

impl GameState {
  pub fn new(levels: &[Level]) -> Self {
    Self {
      levels: levels.iter().map(|l| l.challenges.iter().map(|c| c.id.clone()).collect()).collect(),
      current_level: 0,
      lives: STARTING_LIVES,
      status: GameStatus::Playing,
      solved: HashSet::new(),
    }
  }

  pub fn reset(&mut self) {
    self.current_level = 0;
    self.lives = STARTING_LIVES;
    self.status = GameStatus::Playing;
    self.solved.clear();
  }

  fn level_of(&self, challenge_id: &str) -> Option<usize> {
    self.levels.iter().position(|ids| ids.iter().any(|id| id == challenge_id))
  }

  /// Check that a submission for `challenge_id` may start.
  pub fn admit(&self, challenge_id: &str) -> Result<(), Rejection> {
    let level = self.level_of(challenge_id).ok_or(Rejection::UnknownChallenge)?;
    if self.status != GameStatus::Playing {
      return Err(Rejection::GameOver);
    }
    if level > self.current_level {
      return Err(Rejection::LevelLocked);
    }
    Ok(())
  }

  /// Fold a settled result into the game.
  pub fn record(&mut self, challenge_id: &str, result: &ChallengeResult) {
    if self.status != GameStatus::Playing || self.level_of(challenge_id).is_none() {
      return;
    }
    match result.outcome {
      Outcome::Correct => {
        self.solved.insert(challenge_id.to_string());
        self.advance();
      }
      Outcome::Incorrect | Outcome::Errored => {
        self.lives = self.lives.saturating_sub(1);
        if self.lives == 0 {
          self.status = GameStatus::Lost;
        }
      }
    }
  }

  fn advance(&mut self) {
    while let Some(ids) = self.levels.get(self.current_level) {
      if !ids.iter().all(|id| self.solved.contains(id)) {
        return;
      }
      if self.current_level + 1 >= self.levels.len() {
        self.status = GameStatus::Won;
        return;
      }
      self.current_level += 1;
    }
  }

  pub fn snapshot(&self) -> GameSnapshot {
    let mut solved: Vec<String> = self.solved.iter().cloned().collect();
    solved.sort();
    GameSnapshot {
      current_level: self.current_level,
      lives: self.lives,
      status: self.status,
      solved,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Challenge, ValidationSpec, Verdict};

  fn level(id: &str, challenges: &[&str]) -> Level {
    Level {
      id: id.into(),
      name: id.into(),
      description: String::new(),
      challenges: challenges
        .iter()
        .map(|c| Challenge {
          id: c.to_string(),
          question: c.to_string(),
          task: String::new(),
          initial_prompt: String::new(),
          initial_system_prompt: None,
          hint: None,
          system_prompt_placeholder: None,
          user_prompt_placeholder: None,
          is_immutable_user_prompt: false,
          xml_tags: vec![],
          validation: ValidationSpec::Pattern { pattern: "x".into(), literal: true },
        })
        .collect(),
    }
  }

  fn correct() -> ChallengeResult {
    ChallengeResult::validated("ok".into(), Verdict::pass())
  }

  fn wrong() -> ChallengeResult {
    ChallengeResult::validated("no".into(), Verdict::fail("nope"))
  }

  #[test]
  fn levels_unlock_after_every_challenge_passes() {
    let mut g = GameState::new(&[level("a", &["a1", "a2"]), level("b", &["b1"])]);
    assert_eq!(g.admit("b1"), Err(Rejection::LevelLocked));
    assert_eq!(g.admit("zz"), Err(Rejection::UnknownChallenge));

    g.record("a1", &correct());
    assert_eq!(g.snapshot().current_level, 0);
    g.record("a2", &correct());
    assert_eq!(g.snapshot().current_level, 1);
    assert_eq!(g.admit("b1"), Ok(()));
    assert_eq!(g.admit("a1"), Ok(()), "earlier levels stay playable");

    g.record("b1", &correct());
    assert_eq!(g.snapshot().status, GameStatus::Won);
    assert_eq!(g.admit("a1"), Err(Rejection::GameOver));
  }

  #[test]
  fn failures_and_errors_cost_lives() {
    let mut g = GameState::new(&[level("a", &["a1"])]);
    g.record("a1", &wrong());
    g.record("a1", &ChallengeResult::errored(String::new(), "stream ended before completion"));
    assert_eq!(g.snapshot().lives, 1);
    assert_eq!(g.snapshot().status, GameStatus::Playing);
    g.record("a1", &wrong());
    let s = g.snapshot();
    assert_eq!((s.lives, s.status), (0, GameStatus::Lost));

    g.record("a1", &wrong());
    assert_eq!(g.snapshot().lives, 0);

    g.reset();
    let s = g.snapshot();
    assert_eq!((s.lives, s.status, s.current_level), (STARTING_LIVES, GameStatus::Playing, 0));
    assert!(s.solved.is_empty());
  }

  #[test]
  fn snapshot_serializes_for_the_client() {
    let g = GameState::new(&[level("a", &["a1"])]);
    let v = serde_json::to_value(g.snapshot()).unwrap();
    assert_eq!(v, serde_json::json!({"currentLevel": 0, "lives": 3, "status": "playing", "solved": []}));
  }
}
