//! Execution engine boundary: the submit command, the event stream it
//! produces, and the value/fault types those events carry.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;

use anyhow::Result;
use futures_core::Stream;
use tokio::sync::oneshot;

/// Generic "run this source code" command handed to the engine.
#[derive(Debug, Clone)]
pub struct SubmitCode {
    pub code: String,
}

/// One (mime type, rendered text) pair attached to a display-family event.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedValue {
    pub mime_type: String,
    pub value: String,
}

impl FormattedValue {
    pub fn new(mime_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            value: value.into(),
        }
    }
}

/// Raw result object carried by a display-family event.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    #[default]
    Null,
    /// Marker for a value the user already displayed explicitly. A return
    /// value carrying it produces no execute-result message.
    AlreadyDisplayed,
    Text(String),
    Json(serde_json::Value),
}

impl RawValue {
    /// Plain-text rendition, used as the stream-output fallback when an event
    /// carries no `text/plain` formatted value.
    pub fn to_plain_text(&self) -> String {
        match self {
            RawValue::Null | RawValue::AlreadyDisplayed => String::new(),
            RawValue::Text(s) => s.clone(),
            RawValue::Json(serde_json::Value::String(s)) => s.clone(),
            RawValue::Json(v) => v.to_string(),
        }
    }
}

/// Shared body of the display-family events.
#[derive(Debug, Clone, Default)]
pub struct DisplayEvent {
    pub value_id: Option<String>,
    pub value: RawValue,
    pub formatted_values: Vec<FormattedValue>,
}

/// Fault attached to a failed command.
#[derive(Debug, Clone)]
pub enum EngineFault {
    /// The submission did not compile; only the failure message is shown.
    Compilation,
    Runtime {
        description: String,
        stack_trace: String,
    },
}

/// Terminal failure event body.
#[derive(Debug, Clone)]
pub struct CommandFailedEvent {
    pub message: String,
    pub fault: Option<EngineFault>,
}

impl CommandFailedEvent {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fault: None,
        }
    }
}

/// Console input captured through a password round trip.
///
/// `Debug` redacts the value so it cannot leak through incidental logging;
/// readers must go through [`Secret::expose`].
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(******)")
    }
}

/// One event produced by the engine while a submission runs.
///
/// The enum is closed on purpose: dispatch matches exhaustively, so an engine
/// cannot hand the handler an event kind it does not translate. Input and
/// password events carry a one-shot channel; completing it is how the
/// front-end's answer travels back to the waiting engine.
#[derive(Debug)]
pub enum ExecutionEvent {
    DisplayedValueProduced(DisplayEvent),
    DisplayedValueUpdated(DisplayEvent),
    ReturnValueProduced(DisplayEvent),
    StandardOutputValueProduced(DisplayEvent),
    StandardErrorValueProduced(DisplayEvent),
    ErrorProduced(DisplayEvent),
    InputRequested {
        prompt: String,
        reply: oneshot::Sender<String>,
    },
    PasswordRequested {
        prompt: String,
        reply: oneshot::Sender<Secret>,
    },
    CommandHandled,
    CommandFailed(CommandFailedEvent),
}

/// Ordered stream of engine events, terminating with exactly one
/// `CommandHandled` or `CommandFailed`.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ExecutionEvent>> + Send>>;

/// Boundary to the execution engine.
///
/// A cancelled or crashed run must still surface as a `CommandFailed` item
/// (or an `Err`, which the handler converts) so every request terminates.
pub trait ExecutionEngine {
    fn submit(&mut self, command: SubmitCode) -> EventStream;
}

/// Engine that replays pre-scripted event sequences, one per submission.
///
/// Used by the scenario tests; also handy for embedders exercising the wire
/// surface without a live engine.
#[derive(Debug, Default)]
pub struct ReplayEngine {
    scripts: VecDeque<Vec<ExecutionEvent>>,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&mut self, events: Vec<ExecutionEvent>) {
        self.scripts.push_back(events);
    }
}

impl ExecutionEngine for ReplayEngine {
    fn submit(&mut self, _command: SubmitCode) -> EventStream {
        let events = self.scripts.pop_front().unwrap_or_default();
        Box::pin(futures::stream::iter(
            events.into_iter().map(Ok::<_, anyhow::Error>),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("hunter2"));
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn raw_value_plain_text_fallbacks() {
        assert_eq!(RawValue::Text("hi".into()).to_plain_text(), "hi");
        assert_eq!(RawValue::Json(serde_json::json!("s")).to_plain_text(), "s");
        assert_eq!(
            RawValue::Json(serde_json::json!({"a": 1})).to_plain_text(),
            "{\"a\":1}"
        );
        assert_eq!(RawValue::Null.to_plain_text(), "");
        assert_eq!(RawValue::AlreadyDisplayed.to_plain_text(), "");
    }
}
