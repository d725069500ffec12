//! Execute-request handler core for a notebook kernel.
//!
//! Bridges one incoming "run this code" request to an execution engine and
//! translates the engine's event stream into front-end wire messages: display
//! data, stream output, errors, execute replies, and console input round
//! trips. Transport framing, the engine itself, and value formatting are
//! collaborators behind the [`handler::Connection`], [`engine::ExecutionEngine`],
//! and [`display::ValueRenderer`] traits.

pub mod display;
pub mod engine;
pub mod handler;
pub mod messages;

pub use display::{HtmlRenderer, ValueRenderer};
pub use engine::{
    CommandFailedEvent, DisplayEvent, EngineFault, EventStream, ExecutionEngine, ExecutionEvent,
    FormattedValue, RawValue, ReplayEngine, Secret, SubmitCode,
};
pub use handler::{Connection, ExecuteHandler, ExecuteRequest, ProtocolError};
pub use messages::{
    DataBundle, DisplayData, ErrorOutput, ExecuteInput, ExecuteReply, ExecuteResult, InputRequest,
    OutboundMessage, StreamName, StreamOutput, Transient, UpdateDisplayData,
};
