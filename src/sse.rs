//! Line-oriented decoding of the upstream event stream.
//!
//! Two small pieces:
//! - `LineSplitter` turns arbitrary byte chunks into complete lines. Bytes are
//!   buffered until a `\n` arrives, so neither lines nor UTF-8 sequences are
//!   broken at chunk boundaries.
//! - `decode_line` is a state-free mapping from one line to a `LineEvent`.
//!   Unknown envelope types are a no-op, never an error.

use serde::Deserialize;

pub const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Default)]
pub struct LineSplitter {
  buf: Vec<u8>,
}

impl LineSplitter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Feed a chunk and return every line it completed (without `\n` / `\r\n`).
  pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
    self.buf.extend_from_slice(chunk);
    let mut lines = Vec::new();
    while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
      let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
      line.pop();
      if line.last() == Some(&b'\r') {
        line.pop();
      }
      lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    lines
  }

  /// Remaining unterminated line at end of input, if any.
  pub fn finish(&mut self) -> Option<String> {
    if self.buf.is_empty() {
      return None;
    }
    let mut line = std::mem::take(&mut self.buf);
    if line.last() == Some(&b'\r') {
      line.pop();
    }
    Some(String::from_utf8_lossy(&line).into_owned())
  }
}

/// What one line of the stream means to the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineEvent {
  /// Not a `data: ` line (event names, comments, blank separators).
  NotData,
  /// Incremental text.
  Delta(String),
  /// The provider finished the message.
  Stop,
  /// The provider reported an error inside the stream.
  Failed(String),
  /// A well-formed envelope that carries nothing for us (pings, block starts, unknown types).
  Ignored,
  /// `data: ` payload that is not valid JSON.
  Malformed(String),
}

#[derive(Deserialize)]
struct Envelope {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  delta: Option<DeltaBody>,
  #[serde(default)]
  error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct DeltaBody {
  #[serde(default)]
  text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
  #[serde(default, rename = "type")]
  kind: Option<String>,
  #[serde(default)]
  message: Option<String>,
}

pub fn decode_line(line: &str) -> LineEvent {
  let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
    return LineEvent::NotData;
  };
  let env = match serde_json::from_str::<Envelope>(payload) {
    Ok(env) => env,
    Err(e) => return LineEvent::Malformed(e.to_string()),
  };
  match env.kind.as_str() {
    "content_block_delta" => match env.delta.and_then(|d| d.text) {
      Some(text) if !text.is_empty() => LineEvent::Delta(text),
      _ => LineEvent::Ignored,
    },
    "message_stop" => LineEvent::Stop,
    "error" => {
      let msg = env
        .error
        .map(|e| match (e.kind, e.message) {
          (Some(k), Some(m)) => format!("{k}: {m}"),
          (None, Some(m)) => m,
          (Some(k), None) => k,
          (None, None) => "unknown error".into(),
        })
        .unwrap_or_else(|| "unknown error".into());
      LineEvent::Failed(msg)
    }
    _ => LineEvent::Ignored,
  }
}
