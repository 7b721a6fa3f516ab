//! Promptcraft · prompt-engineering game backend
//!
//! - Axum HTTP + WebSocket API
//! - Anthropic Messages API for completions and for the LLM judge
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   ANTHROPIC_API_KEY     : required; startup fails without it
//!   ANTHROPIC_BASE_URL    : default "https://api.anthropic.com/v1"
//!   ANTHROPIC_MODEL       : default "claude-3-haiku-20240307"
//!   ANTHROPIC_VERSION     : default "2023-06-01"
//!   ANTHROPIC_TEMPERATURE : optional sampling temperature
//!   COMPLETION_MAX_TOKENS : default 300
//!   JUDGE_MAX_TOKENS      : default 200
//!   JUDGE_TIMEOUT_SECS    : default 20
//!   HTTP_TIMEOUT_SECS     : default 120
//!   GAME_CONFIG_PATH      : TOML with levels and the judge prompt template
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod anthropic;
mod assembler;
mod completion;
mod config;
mod domain;
mod error;
mod game;
mod protocol;
mod routes;
mod runner;
mod seeds;
mod sse;
mod state;
mod telemetry;
mod util;
mod validation;

#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Configuration problems are fatal before anything listens.
  let state = match AppState::from_env() {
    Ok(state) => Arc::new(state),
    Err(e) => {
      error!(target: "promptcraft", error = %e, "Invalid configuration");
      return Err(e.into());
    }
  };

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "promptcraft", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "promptcraft", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "promptcraft", "Shutdown signal received");
}
