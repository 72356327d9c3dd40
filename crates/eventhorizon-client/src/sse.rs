//! Server-Sent Events framing for the turn-log stream.
//!
//! Only `event`, `data`, `id` and `retry` fields are understood. Events
//! whose type is not `log` or whose data is empty are dropped.

use std::time::Duration;

use futures::{Stream, StreamExt};

use eventhorizon_types::TurnLog;

use crate::error::{Error, Result};

pub const LOG_EVENT: &str = "log";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: String,
    pub data: String,
    pub id: Option<i64>,
    pub retry: Option<i64>,
}

/// A decoded `log` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub log: TurnLog,
    pub id: Option<i64>,
    pub retry: Option<Duration>,
}

impl TryFrom<SseEvent> for LogEvent {
    type Error = Error;

    fn try_from(event: SseEvent) -> Result<Self> {
        Ok(Self {
            log: serde_json::from_str(&event.data)?,
            id: event.id,
            retry: event
                .retry
                .and_then(|ms| u64::try_from(ms).ok())
                .map(Duration::from_millis),
        })
    }
}

/// Line-at-a-time event assembler. State resets after every blank line.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: SseEvent,
    seen_data: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line without its terminator; returns the event it completes.
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.finish();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = line.split_once(':')?;
        let value = value.trim_start_matches(' ');
        match field {
            "event" => self.pending.event_type = value.to_string(),
            "data" => {
                if self.seen_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.seen_data = true;
            }
            "id" => {
                if let Ok(id) = value.trim().parse() {
                    self.pending.id = Some(id);
                }
            }
            "retry" => {
                if let Ok(retry) = value.trim().parse() {
                    self.pending.retry = Some(retry);
                }
            }
            _ => {}
        }
        None
    }

    fn finish(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.pending);
        self.seen_data = false;
        (event.event_type == LOG_EVENT && !event.data.is_empty()).then_some(event)
    }
}

/// Pulls `log` events out of a chunked response body.
pub struct SseReader<S> {
    body: S,
    buffer: Vec<u8>,
    parser: SseParser,
    finished: bool,
}

impl<S, B, E> SseReader<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    Error: From<E>,
{
    pub fn new(body: S) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            parser: SseParser::new(),
            finished: false,
        }
    }

    /// `Ok(None)` on a clean end of input. A trailing unterminated line is discarded.
    pub async fn next_log(&mut self) -> Result<Option<LogEvent>> {
        loop {
            while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                line.pop();
                let line = String::from_utf8(line)?;
                if let Some(event) = self.parser.push_line(&line) {
                    return LogEvent::try_from(event).map(Some);
                }
            }
            if self.finished {
                return Ok(None);
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(err)) => return Err(err.into()),
                None => self.finished = true,
            }
        }
    }
}
