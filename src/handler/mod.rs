//! Request/reply orchestration and per-event dispatch.

use anyhow::Result;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::display::{self, ValueRenderer};
use crate::engine::{
    CommandFailedEvent, ExecutionEngine, ExecutionEvent, RawValue, Secret, SubmitCode,
};
use crate::messages::{
    DisplayData, ErrorOutput, ExecuteInput, ExecuteReply, ExecuteResult, InputRequest,
    OutboundMessage, StreamName, StreamOutput, Transient, UpdateDisplayData,
};

/// One incoming "run this code" request, as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub allow_stdin: bool,
}

/// Contract violations the dispatcher can still hit at runtime.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("input requested but the request did not allow stdin")]
    StdinNotAllowed,
}

/// Outbound side of one client session.
///
/// `send` is the fire-and-forget broadcast/reply path; `request_input` is the
/// blocking round trip used for console input. No other message may be
/// interleaved on the session while a round trip is pending.
#[allow(async_fn_in_trait)]
pub trait Connection {
    fn send(&mut self, message: OutboundMessage) -> Result<()>;
    async fn request_input(&mut self, request: InputRequest) -> Result<String>;
}

enum Step {
    Continue,
    Reply(ExecuteReply),
    Abort(CommandFailedEvent),
}

/// Handles execute requests for one kernel session.
///
/// Owns the session-scoped execution counter and stdin-acceptance flag.
/// Precondition: requests are handled sequentially; one [`handle`] call must
/// complete, reply included, before the next begins.
///
/// [`handle`]: ExecuteHandler::handle
pub struct ExecuteHandler<E, R> {
    engine: E,
    renderer: R,
    execution_count: u64,
    stdin_enabled: bool,
}

impl<E: ExecutionEngine, R: ValueRenderer> ExecuteHandler<E, R> {
    pub fn new(engine: E, renderer: R) -> Self {
        Self {
            engine,
            renderer,
            execution_count: 0,
            stdin_enabled: false,
        }
    }

    /// Counter value observed by the most recent non-silent request.
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Run one execute request to completion.
    ///
    /// Emits the echo, submits the code, translates every engine event, and
    /// sends exactly one reply, which is always the last message of the
    /// request. Transport send failures propagate to the caller; engine
    /// faults become an error broadcast plus an error reply.
    pub async fn handle(
        &mut self,
        request: &ExecuteRequest,
        conn: &mut impl Connection,
    ) -> Result<()> {
        let silent = request.silent;
        if !silent {
            self.execution_count += 1;
        }
        self.stdin_enabled = request.allow_stdin;
        let execution_count = self.execution_count;
        debug!(execution_count, silent, "handling execute request");

        if !silent {
            conn.send(OutboundMessage::ExecuteInput(ExecuteInput {
                code: request.code.clone(),
                execution_count,
            }))?;
        }

        let mut events = self.engine.submit(SubmitCode {
            code: request.code.clone(),
        });

        let mut reply = None;
        while let Some(item) = events.next().await {
            // A fault in the stream itself still terminates the request.
            let event = item.unwrap_or_else(|e| {
                ExecutionEvent::CommandFailed(CommandFailedEvent::from_message(format!("{e:#}")))
            });
            match self.dispatch(event, silent, execution_count, conn).await? {
                Step::Continue => {}
                Step::Reply(r) => {
                    reply = Some(r);
                    break;
                }
                Step::Abort(failure) => {
                    reply = Some(self.fail(&failure, execution_count, conn)?);
                    break;
                }
            }
        }
        let reply = match reply {
            Some(r) => r,
            None => {
                warn!("engine stream ended without a terminal event");
                let failure =
                    CommandFailedEvent::from_message("execution ended without a terminal event");
                self.fail(&failure, execution_count, conn)?
            }
        };
        debug!(
            execution_count,
            ok = matches!(reply, ExecuteReply::Ok { .. }),
            "request complete"
        );
        conn.send(OutboundMessage::ExecuteReply(reply))
    }

    /// Broadcast the error payload and produce the matching error reply.
    fn fail(
        &self,
        failure: &CommandFailedEvent,
        execution_count: u64,
        conn: &mut impl Connection,
    ) -> Result<ExecuteReply> {
        let error = ErrorOutput::from_failure(failure);
        conn.send(OutboundMessage::Error(error.clone()))?;
        Ok(ExecuteReply::Error {
            error,
            execution_count,
        })
    }

    /// Translate one engine event into zero-or-one outgoing message.
    async fn dispatch(
        &self,
        event: ExecutionEvent,
        silent: bool,
        execution_count: u64,
        conn: &mut impl Connection,
    ) -> Result<Step> {
        match event {
            ExecutionEvent::DisplayedValueProduced(ev) => {
                if !silent {
                    let transient = Transient::from_value_id(ev.value_id.as_deref());
                    let data =
                        display::data_bundle(&ev.formatted_values, &ev.value, &self.renderer);
                    conn.send(OutboundMessage::DisplayData(DisplayData { data, transient }))?;
                }
                Ok(Step::Continue)
            }
            ExecutionEvent::DisplayedValueUpdated(ev) => {
                if !silent {
                    let transient = Transient::from_value_id(ev.value_id.as_deref());
                    let data =
                        display::data_bundle(&ev.formatted_values, &ev.value, &self.renderer);
                    conn.send(OutboundMessage::UpdateDisplayData(UpdateDisplayData {
                        data,
                        transient,
                    }))?;
                }
                Ok(Step::Continue)
            }
            ExecutionEvent::ReturnValueProduced(ev) => {
                // A value the user displayed explicitly is not echoed again.
                if !silent && !matches!(ev.value, RawValue::AlreadyDisplayed) {
                    let transient = Transient::from_value_id(ev.value_id.as_deref());
                    let data =
                        display::data_bundle(&ev.formatted_values, &ev.value, &self.renderer);
                    conn.send(OutboundMessage::ExecuteResult(ExecuteResult {
                        execution_count,
                        data,
                        transient,
                    }))?;
                }
                Ok(Step::Continue)
            }
            ExecutionEvent::StandardOutputValueProduced(ev) => {
                if !silent {
                    let text =
                        display::plain_text_or(&ev.formatted_values, &ev.value.to_plain_text());
                    conn.send(OutboundMessage::Stream(StreamOutput {
                        name: StreamName::Stdout,
                        text,
                    }))?;
                }
                Ok(Step::Continue)
            }
            ExecutionEvent::StandardErrorValueProduced(ev) | ExecutionEvent::ErrorProduced(ev) => {
                if !silent {
                    let text =
                        display::plain_text_or(&ev.formatted_values, &ev.value.to_plain_text());
                    conn.send(OutboundMessage::Stream(StreamOutput {
                        name: StreamName::Stderr,
                        text,
                    }))?;
                }
                Ok(Step::Continue)
            }
            ExecutionEvent::InputRequested { prompt, reply } => {
                if !self.stdin_enabled {
                    warn!("input requested but stdin is not allowed");
                    return Ok(Step::Abort(CommandFailedEvent::from_message(
                        ProtocolError::StdinNotAllowed.to_string(),
                    )));
                }
                let answer = conn
                    .request_input(InputRequest {
                        prompt,
                        password: false,
                    })
                    .await?;
                // The engine may have gone away; its terminal event will tell.
                let _ = reply.send(answer);
                Ok(Step::Continue)
            }
            ExecutionEvent::PasswordRequested { prompt, reply } => {
                if !self.stdin_enabled {
                    warn!("password requested but stdin is not allowed");
                    return Ok(Step::Abort(CommandFailedEvent::from_message(
                        ProtocolError::StdinNotAllowed.to_string(),
                    )));
                }
                let answer = conn
                    .request_input(InputRequest {
                        prompt,
                        password: true,
                    })
                    .await?;
                let _ = reply.send(Secret::new(answer));
                Ok(Step::Continue)
            }
            ExecutionEvent::CommandHandled => Ok(Step::Reply(ExecuteReply::Ok { execution_count })),
            ExecutionEvent::CommandFailed(failure) => Ok(Step::Abort(failure)),
        }
    }
}
