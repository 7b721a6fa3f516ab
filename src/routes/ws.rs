//! WebSocket game sessions.
//!
//! Each connection owns a `ChallengeRunner` (one slot per challenge) and a
//! `GameState`. Submissions run as background tasks so a newer submission, an
//! abandon or a reset can supersede them while they stream. All outbound
//! messages go through one writer task, in the order they were produced.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::domain::ChallengeResult;
use crate::game::{GameSnapshot, GameState};
use crate::protocol::{levels_out, ClientWsMessage, ServerWsMessage};
use crate::runner::{ChallengeRunner, RunOutcome, RunUpdate};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "promptcraft", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
  let (mut sink, mut stream) = socket.split();
  let (tx, mut rx) = mpsc::unbounded_channel::<ServerWsMessage>();
  let session = Session::new(state, tx);
  let session_id = session.id;
  info!(target: "promptcraft", %session_id, "WebSocket connected");

  let writer = tokio::spawn(async move {
    while let Some(msg) = rx.recv().await {
      let out = serde_json::to_string(&msg).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
      });
      if let Err(e) = sink.send(Message::Text(out)).await {
        error!(target: "promptcraft", %session_id, error = %e, "WS send error");
        break;
      }
    }
  });

  session.send(ServerWsMessage::Game { game: session.game.lock().await.snapshot() });

  while let Some(Ok(msg)) = stream.next().await {
    match msg {
      Message::Text(txt) => match serde_json::from_str::<ClientWsMessage>(&txt) {
        Ok(incoming) => {
          debug!(target: "promptcraft", %session_id, "WS received: {:?}", &incoming);
          session.handle(incoming).await;
        }
        Err(e) => session.send(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }),
      },
      Message::Close(_) => break,
      _ => {}
    }
  }

  session.runner.abandon_all().await;
  writer.abort();
  info!(target: "promptcraft", %session_id, "WebSocket disconnected");
}

/// Per-connection state. Cheap to clone into submission tasks.
struct Session {
  id: Uuid,
  state: Arc<AppState>,
  runner: Arc<ChallengeRunner>,
  game: Arc<Mutex<GameState>>,
  out: mpsc::UnboundedSender<ServerWsMessage>,
}

impl Session {
  fn new(state: Arc<AppState>, out: mpsc::UnboundedSender<ServerWsMessage>) -> Self {
    let runner = Arc::new(ChallengeRunner::new(state.backend.clone(), state.provider.max_tokens));
    let game = Arc::new(Mutex::new(GameState::new(&state.levels)));
    Self { id: Uuid::new_v4(), state, runner, game, out }
  }

  fn send(&self, msg: ServerWsMessage) {
    // The writer is gone only once the socket is closing.
    let _ = self.out.send(msg);
  }

  #[instrument(level = "info", skip(self, msg), fields(session_id = %self.id))]
  async fn handle(&self, msg: ClientWsMessage) {
    match msg {
      ClientWsMessage::Ping => self.send(ServerWsMessage::Pong),

      ClientWsMessage::Levels => self.send(ServerWsMessage::Levels { levels: levels_out(&self.state.levels) }),

      ClientWsMessage::Submit { challenge_id, prompt, system_prompt } => {
        self.submit(challenge_id, prompt, system_prompt).await;
      }

      ClientWsMessage::Abandon { challenge_id } => {
        self.runner.abandon(&challenge_id).await;
        info!(target: "challenge", id = %challenge_id, "WS submission abandoned");
      }

      ClientWsMessage::Reset => {
        self.runner.abandon_all().await;
        let snapshot = {
          let mut game = self.game.lock().await;
          game.reset();
          game.snapshot()
        };
        info!(target: "challenge", "WS game reset");
        self.send(ServerWsMessage::Game { game: snapshot });
      }
    }
  }

  async fn submit(&self, challenge_id: String, prompt: String, system_prompt: Option<String>) {
    if let Err(rejection) = self.game.lock().await.admit(&challenge_id) {
      info!(target: "challenge", id = %challenge_id, ?rejection, "WS submission rejected");
      self.send(ServerWsMessage::Error { message: rejection.message(&challenge_id) });
      return;
    }
    let Some(strategy) = self.state.strategy(&challenge_id).cloned() else {
      self.send(ServerWsMessage::Error { message: format!("Unknown challengeId: {challenge_id}") });
      return;
    };

    let runner = self.runner.clone();
    let game = self.game.clone();
    let out = self.out.clone();
    tokio::spawn(async move {
      let outcome = runner
        .run(&challenge_id, &prompt, system_prompt.as_deref(), &strategy, |update| {
          let msg = match update {
            RunUpdate::Phase(phase) => ServerWsMessage::Phase { challenge_id: challenge_id.clone(), phase },
            RunUpdate::Text(text) => ServerWsMessage::Delta { challenge_id: challenge_id.clone(), text: text.to_string() },
          };
          let _ = out.send(msg);
        })
        .await;

      match outcome {
        RunOutcome::Settled { result, generation } => {
          match commit(&runner, &game, &challenge_id, generation, &result).await {
            Some(snapshot) => {
              info!(target: "challenge", id = %challenge_id, outcome = ?result.outcome, lives = snapshot.lives, status = ?snapshot.status, "WS submission settled");
              let _ = out.send(ServerWsMessage::result(&challenge_id, result, snapshot));
            }
            None => debug!(target: "challenge", id = %challenge_id, generation, "WS result superseded before it was recorded"),
          }
        }
        RunOutcome::Superseded => debug!(target: "challenge", id = %challenge_id, "WS submission superseded"),
      }
    });
  }
}

/// Fold a settled result into the game, unless the slot moved on (newer
/// submission, abandon or reset) after the run settled. The generation is
/// checked under the game lock; `Reset` abandons slots before taking it.
async fn commit(
  runner: &ChallengeRunner,
  game: &Mutex<GameState>,
  challenge_id: &str,
  generation: u64,
  result: &ChallengeResult,
) -> Option<GameSnapshot> {
  let mut g = game.lock().await;
  if !runner.is_current(challenge_id, generation).await {
    return None;
  }
  g.record(challenge_id, result);
  Some(g.snapshot())
}
