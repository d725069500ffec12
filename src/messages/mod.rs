//! Outgoing wire message types, the transient-ID builder, and the
//! error/traceback builder.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::engine::{CommandFailedEvent, EngineFault};

/// Mime bundle sent with display-family messages.
pub type DataBundle = serde_json::Map<String, Value>;

/// Correlation ids letting a later update message target an earlier display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transient {
    pub display_id: String,
}

impl Transient {
    /// Use the event's value id when present, otherwise mint a fresh one so
    /// the map is never empty and updates always have a key to target.
    pub fn from_value_id(value_id: Option<&str>) -> Self {
        let display_id = match value_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        Self { display_id }
    }
}

/// Echo of the submitted code, broadcast before execution begins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteInput {
    pub code: String,
    pub execution_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayData {
    pub data: DataBundle,
    pub transient: Transient,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateDisplayData {
    pub data: DataBundle,
    pub transient: Transient,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteResult {
    pub execution_count: u64,
    pub data: DataBundle,
    pub transient: Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamOutput {
    pub name: StreamName,
    pub text: String,
}

/// Error payload broadcast for a failed command and embedded in the error
/// reply. Field names follow the front-end wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorOutput {
    pub ename: String,
    pub evalue: String,
    pub traceback: Vec<String>,
}

impl ErrorOutput {
    /// Build the error payload for a failed command.
    ///
    /// Compilation faults (and failures with no fault attached) surface as a
    /// single-line traceback. Runtime faults carry the full description
    /// followed by the stack trace split into lines, empty lines dropped.
    pub fn from_failure(failure: &CommandFailedEvent) -> Self {
        let traceback = match &failure.fault {
            None | Some(EngineFault::Compilation) => vec![failure.message.clone()],
            Some(EngineFault::Runtime {
                description,
                stack_trace,
            }) => {
                let mut lines = vec![description.clone()];
                lines.extend(
                    stack_trace
                        .split(['\r', '\n'])
                        .filter(|line| !line.is_empty())
                        .map(String::from),
                );
                lines
            }
        };
        Self {
            ename: "Unhandled exception".to_string(),
            evalue: failure.message.clone(),
            traceback,
        }
    }
}

/// Point-to-point request for one line of console input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputRequest {
    pub prompt: String,
    pub password: bool,
}

/// Reply closing an execute request; exactly one is sent per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecuteReply {
    Ok {
        execution_count: u64,
    },
    Error {
        error: ErrorOutput,
        execution_count: u64,
    },
}

impl ExecuteReply {
    pub fn execution_count(&self) -> u64 {
        match self {
            ExecuteReply::Ok { execution_count }
            | ExecuteReply::Error {
                execution_count, ..
            } => *execution_count,
        }
    }
}

/// Every message the handler can hand to the transport for serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg_type", content = "content", rename_all = "snake_case")]
pub enum OutboundMessage {
    ExecuteInput(ExecuteInput),
    DisplayData(DisplayData),
    UpdateDisplayData(UpdateDisplayData),
    ExecuteResult(ExecuteResult),
    Stream(StreamOutput),
    Error(ErrorOutput),
    ExecuteReply(ExecuteReply),
    InputRequest(InputRequest),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execute_input_wire_shape() {
        let msg = OutboundMessage::ExecuteInput(ExecuteInput {
            code: "1+1".into(),
            execution_count: 1,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"msg_type": "execute_input", "content": {"code": "1+1", "execution_count": 1}})
        );
    }

    #[test]
    fn stream_wire_shape() {
        let msg = OutboundMessage::Stream(StreamOutput {
            name: StreamName::Stderr,
            text: "oops".into(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"msg_type": "stream", "content": {"name": "stderr", "text": "oops"}})
        );
    }

    #[test]
    fn input_request_wire_shape() {
        let msg = OutboundMessage::InputRequest(InputRequest {
            prompt: "Name?".into(),
            password: false,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"msg_type": "input_request", "content": {"prompt": "Name?", "password": false}})
        );
    }

    #[test]
    fn reply_wire_shapes() {
        let ok = serde_json::to_value(ExecuteReply::Ok { execution_count: 3 }).unwrap();
        assert_eq!(ok, json!({"status": "ok", "execution_count": 3}));

        let failure = CommandFailedEvent::from_message("boom");
        let err = serde_json::to_value(ExecuteReply::Error {
            error: ErrorOutput::from_failure(&failure),
            execution_count: 3,
        })
        .unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["error"]["ename"], "Unhandled exception");
        assert_eq!(err["error"]["traceback"], json!(["boom"]));
    }

    #[test]
    fn transient_prefers_event_value_id() {
        let transient = Transient::from_value_id(Some("disp-1"));
        assert_eq!(transient.display_id, "disp-1");
    }

    #[test]
    fn transient_mints_id_when_absent() {
        let a = Transient::from_value_id(None);
        let b = Transient::from_value_id(Some(""));
        assert!(!a.display_id.is_empty());
        assert!(!b.display_id.is_empty());
        assert_ne!(a.display_id, b.display_id);
    }

    #[test]
    fn compilation_fault_is_single_line() {
        let failure = CommandFailedEvent {
            message: "syntax error at line 3".into(),
            fault: Some(EngineFault::Compilation),
        };
        let error = ErrorOutput::from_failure(&failure);
        assert_eq!(error.traceback, vec!["syntax error at line 3"]);
        assert_eq!(error.ename, "Unhandled exception");
        assert_eq!(error.evalue, "syntax error at line 3");
    }

    #[test]
    fn runtime_fault_splits_stack_trace() {
        let failure = CommandFailedEvent {
            message: "boom".into(),
            fault: Some(EngineFault::Runtime {
                description: "boom".into(),
                stack_trace: "at A\r\nat B\r\n".into(),
            }),
        };
        let error = ErrorOutput::from_failure(&failure);
        assert_eq!(error.traceback, vec!["boom", "at A", "at B"]);
    }

    #[test]
    fn absent_fault_is_single_line() {
        let error = ErrorOutput::from_failure(&CommandFailedEvent::from_message("gone"));
        assert_eq!(error.traceback, vec!["gone"]);
    }
}
