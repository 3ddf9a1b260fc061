//! Newline-delimited JSON framing for pushed job log events.

use serde::Deserialize;
use terrapin_proto::{BackendError, BackendResult, JobLogEvent};

/// Splits a byte stream into complete lines.
///
/// Bytes after the last newline are held until more data arrives or the
/// stream ends. Blank lines are dropped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            push_line(&mut lines, &line);
        }
        lines
    }

    /// Returns the trailing partial line, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let mut lines = Vec::new();
        push_line(&mut lines, &rest);
        lines.pop()
    }
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if !line.is_empty() {
        lines.push(line.to_string());
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StreamLine {
    Error { error: String },
    Event(JobLogEvent),
}

/// Parses one line of the subscription body.
///
/// A line carrying an `error` field ends the subscription with that error.
pub(crate) fn parse_line(line: &str) -> BackendResult<JobLogEvent> {
    match serde_json::from_str::<StreamLine>(line) {
        Ok(StreamLine::Event(event)) => Ok(event),
        Ok(StreamLine::Error { error }) => Err(BackendError::Subscription(error)),
        Err(e) => Err(BackendError::Decode(format!("invalid log event: {e}"))),
    }
}
