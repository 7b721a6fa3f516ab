//! Tracing setup.
//!
//! - LOG_LEVEL is an EnvFilter directive string, e.g.
//!   "info,challenge=debug,promptcraft=debug,tower_http=info,axum=info".
//! - LOG_FORMAT=json switches to structured output; anything else is the
//!   human-readable formatter.
//!
//! Log targets used across the crate: `promptcraft` (server and provider),
//! `challenge` (submissions, validation, game state).

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,challenge=debug,promptcraft=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
