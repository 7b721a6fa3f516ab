//! Reassembly of streamed deltas into the final answer text.

use futures::{Stream, StreamExt};

use crate::completion::StreamEvent;
use crate::error::CompletionError;

/// What a finished stream produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Assembled {
  /// `StreamEnd` was seen: this is the answer.
  Complete(String),
  /// The stream failed or stopped early. `partial` is for display only and must
  /// never be validated.
  Incomplete { partial: String, cause: CompletionError },
}

/// Owns the text buffer of one submission.
#[derive(Debug, Default)]
pub struct StreamAssembler {
  buffer: String,
}

impl StreamAssembler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a delta verbatim and return the snapshot of the whole buffer.
  pub fn push_delta(&mut self, delta: &str) -> &str {
    self.buffer.push_str(delta);
    &self.buffer
  }

  /// Consume `events` in order, calling `on_snapshot` after every delta.
  /// Stops at the first terminal event; a stream that ends without one is
  /// treated as truncated.
  pub async fn accumulate<S, F>(mut self, events: S, mut on_snapshot: F) -> Assembled
  where
    S: Stream<Item = StreamEvent>,
    F: FnMut(&str),
  {
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
      match event {
        StreamEvent::TextDelta(delta) => on_snapshot(self.push_delta(&delta)),
        StreamEvent::StreamEnd => return Assembled::Complete(self.buffer),
        StreamEvent::StreamError(cause) => return Assembled::Incomplete { partial: self.buffer, cause },
      }
    }
    Assembled::Incomplete { partial: self.buffer, cause: CompletionError::Truncated }
  }
}
