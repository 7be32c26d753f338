//! Frame execution: the reasoning loop of one worker call.

use std::sync::Arc;
use std::time::Instant;

use futures::future::{try_join_all, BoxFuture};
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use super::context::RuntimeContext;
use super::error::{RuntimeError, RuntimeResult};
use super::frame::{CallFrame, CallPath, FrameState};
use super::model::Message;
use crate::digest::compute_digest;
use crate::events::RuntimeEvent;
use crate::obs;
use crate::resolver::table::SymbolTable;

/// Result of a completed call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    pub call_id: Uuid,
    pub worker: String,
    pub depth: usize,
    pub output: Value,
    pub iterations: usize,
    pub tool_calls: usize,
}

/// A linked table plus the context to run it in.
#[derive(Debug, Clone)]
pub struct Runtime {
    table: Arc<SymbolTable>,
    ctx: RuntimeContext,
}

/// Run `entry` with `input` as the root call (depth 0).
pub async fn execute(
    table: Arc<SymbolTable>,
    entry: &str,
    input: Value,
    ctx: &RuntimeContext,
) -> RuntimeResult<CallOutcome> {
    Runtime::new(table, ctx.clone()).run(entry, input).await
}

fn render_input(input: &Value) -> String {
    match input {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

impl Runtime {
    pub fn new(table: Arc<SymbolTable>, ctx: RuntimeContext) -> Self {
        Self { table, ctx }
    }

    pub fn table(&self) -> &Arc<SymbolTable> {
        &self.table
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub async fn run(&self, entry: &str, input: Value) -> RuntimeResult<CallOutcome> {
        self.call(entry.to_string(), input, CallPath::root()).await
    }

    /// Run `worker` as a child of `parent`. Boxed because calls nest
    /// through worker tools.
    pub(crate) fn call(
        &self,
        worker: String,
        input: Value,
        parent: CallPath,
    ) -> BoxFuture<'_, RuntimeResult<CallOutcome>> {
        Box::pin(async move {
            let settings = self.ctx.settings();
            let resolved = self
                .table
                .worker(&worker)
                .ok_or_else(|| RuntimeError::UnresolvedSymbol {
                    name: worker.clone(),
                    available: self.table.worker_names(),
                })?;
            let digest = compute_digest(&input);
            let mut frame = CallFrame::new(resolved, &parent, digest.clone());

            if frame.depth > settings.max_depth {
                frame.transition(FrameState::DepthExceeded)?;
                let err = RuntimeError::DepthExceeded {
                    worker: worker.clone(),
                    depth: frame.depth,
                    max_depth: settings.max_depth,
                    chain: parent.chain_to(&worker),
                };
                obs::emit_call_refused(&worker, frame.depth, &err);
                return Err(err);
            }
            if settings.cycle_guard {
                if let Some(ancestor_depth) = parent.find_repeat(&worker, &digest) {
                    frame.transition(FrameState::Failed)?;
                    let err = RuntimeError::CycleGuardTripped {
                        worker: worker.clone(),
                        depth: frame.depth,
                        ancestor_depth,
                        chain: parent.chain_to(&worker),
                    };
                    obs::emit_call_refused(&worker, frame.depth, &err);
                    return Err(err);
                }
            }

            frame.transition(FrameState::Running)?;
            obs::emit_call_started(&frame.call_id, &worker, frame.depth);
            self.ctx.sink().emit(&RuntimeEvent::CallStarted {
                call_id: frame.call_id,
                parent_id: frame.parent_id,
                worker: worker.clone(),
                depth: frame.depth,
            });

            let started = Instant::now();
            let span = obs::call_span(&frame.call_id, &worker, frame.depth);
            let result = self.drive(&mut frame, &input).instrument(span).await;

            let status = match &result {
                Ok(_) => {
                    frame.transition(FrameState::Completed)?;
                    "completed"
                }
                Err(e) => {
                    frame.transition(FrameState::Failed)?;
                    e.status()
                }
            };
            let duration_ms = started.elapsed().as_millis() as u64;
            obs::emit_call_finished(&frame.call_id, &worker, status, duration_ms);
            self.ctx.sink().emit(&RuntimeEvent::CallFinished {
                call_id: frame.call_id,
                worker: worker.clone(),
                depth: frame.depth,
                status: status.to_string(),
                duration_ms,
            });

            let output = result?;
            Ok(CallOutcome {
                call_id: frame.call_id,
                worker,
                depth: frame.depth,
                output,
                iterations: frame.local.iterations,
                tool_calls: frame.local.tool_calls,
            })
        })
    }

    /// The reasoning loop: infer, dispatch proposed tool calls, feed the
    /// results back, until the model answers without tool calls.
    async fn drive(&self, frame: &mut CallFrame<'_>, input: &Value) -> RuntimeResult<Value> {
        let settings = self.ctx.settings();
        let worker = frame.worker;
        let depth = frame.depth;
        let mut cancel = self.ctx.cancel().clone();
        let cancelled = || RuntimeError::Cancelled {
            worker: worker.name().to_string(),
            depth,
        };

        if !worker.spec.instructions.is_empty() {
            frame.local.messages.push(Message::System {
                content: worker.spec.instructions.clone(),
            });
        }
        frame.local.messages.push(Message::User {
            content: render_input(input),
        });

        for _ in 0..settings.max_iterations {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            frame.local.iterations += 1;

            let turn = tokio::select! {
                turn = self.ctx.model().infer(worker.name(), &frame.local.messages, worker.tool_schemas()) => {
                    turn.map_err(|source| RuntimeError::Model {
                        worker: worker.name().to_string(),
                        source,
                    })?
                }
                _ = cancel.cancelled() => return Err(cancelled()),
            };

            if turn.tool_calls.is_empty() {
                return Ok(Value::String(turn.text.unwrap_or_default()));
            }

            let mut calls = turn.tool_calls;
            for (i, call) in calls.iter_mut().enumerate() {
                if call.id.is_empty() {
                    call.id = format!("call_{}_{}", frame.local.iterations, i + 1);
                }
            }
            frame.local.messages.push(Message::Assistant {
                content: turn.text,
                tool_calls: calls.clone(),
            });

            let replies = {
                let shared: &CallFrame<'_> = &*frame;
                if turn.parallel && calls.len() > 1 {
                    try_join_all(calls.iter().map(|c| self.dispatch(shared, c))).await?
                } else {
                    let mut replies = Vec::with_capacity(calls.len());
                    for c in &calls {
                        replies.push(self.dispatch(shared, c).await?);
                    }
                    replies
                }
            };

            for (call, reply) in calls.into_iter().zip(replies) {
                frame.local.tool_calls += 1;
                frame.local.messages.push(Message::Tool {
                    call_id: call.id,
                    name: call.name,
                    content: reply.content,
                    is_error: reply.is_error,
                });
            }
        }

        Err(RuntimeError::IterationLimit {
            worker: worker.name().to_string(),
            max_iterations: settings.max_iterations,
        })
    }
}
