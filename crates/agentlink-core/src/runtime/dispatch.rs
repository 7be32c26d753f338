//! Tool dispatch for one proposed call: lookup, approval, sandbox, then
//! execution under the tool timeout.
//!
//! Refusals (unknown tool, denial, block, approval timeout, sandbox
//! violation, tool failure) come back as a [`ToolReply`] with `is_error`
//! set so the worker can adapt. Only [`RuntimeError`]s unwind.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::error::{RuntimeError, RuntimeResult};
use super::executor::Runtime;
use super::frame::{CallFrame, CallPath};
use super::model::ToolCallRequest;
use crate::approval::error::ApprovalError;
use crate::approval::policy::{ApprovalCall, PolicyVerdict};
use crate::approval::redact::redact_args;
use crate::approval::request::ApprovalRequest;
use crate::events::RuntimeEvent;
use crate::obs;
use crate::resolver::table::BindingKind;
use crate::sandbox::access::unsandboxed_resource_ref;
use crate::sandbox::error::SandboxError;
use crate::toolset::{ToolContext, ToolError, WorkerInvoker};

/// What a worker sees for one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    pub content: Value,
    pub is_error: bool,
}

impl ToolReply {
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            content: json!({"error": message.to_string()}),
            is_error: true,
        }
    }

    fn summary(&self) -> String {
        let text = match &self.content {
            Value::Object(map) if self.is_error => map
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.content.to_string()),
            other => other.to_string(),
        };
        if text.chars().count() > 200 {
            let head: String = text.chars().take(200).collect();
            format!("{head}…")
        } else {
            text
        }
    }
}

/// Runs nested workers as children of the frame that created it.
struct FrameInvoker {
    runtime: Runtime,
    parent: CallPath,
}

#[async_trait]
impl WorkerInvoker for FrameInvoker {
    async fn invoke(&self, worker: &str, input: Value) -> RuntimeResult<Value> {
        let outcome = self
            .runtime
            .call(worker.to_string(), input, self.parent.clone())
            .await?;
        Ok(outcome.output)
    }
}

impl Runtime {
    pub(crate) async fn dispatch(
        &self,
        frame: &CallFrame<'_>,
        call: &ToolCallRequest,
    ) -> RuntimeResult<ToolReply> {
        let settings = self.context().settings();
        let worker = frame.worker_name();
        let tool = call.name.as_str();

        let Some(active) = frame.worker.lookup(tool) else {
            let reason = format!(
                "unknown tool '{tool}'; available tools: {}",
                frame.worker.tool_names().join(", ")
            );
            return Ok(self.refuse(frame, call, reason));
        };
        let toolset = &active.instance;

        let access = match toolset.resource_access(tool, &call.args) {
            Ok(access) => access,
            Err(e) => return Ok(self.refuse(frame, call, e)),
        };
        let resource = access.as_ref().and_then(|a| match frame.sandbox() {
            Some(sandbox) => sandbox.resource_ref(a),
            None => unsandboxed_resource_ref(a),
        });

        let mut subjects = vec![tool.to_string(), format!("{}.{tool}", active.name)];
        subjects.extend(toolset.subjects(tool, &call.args));
        let approval_call = ApprovalCall {
            toolset: active.name.clone(),
            tool_name: tool.to_string(),
            args: call.args.clone(),
            subjects,
            segments: toolset.command_segments(tool, &call.args),
            resource,
            classification: toolset.check_approval(tool, &call.args),
            pre_approved: toolset.pre_approved(tool),
            description: toolset.describe_call(tool, &call.args),
        };

        match self.context().broker().evaluate(
            &approval_call,
            &frame.worker.spec.rules,
            settings.approval_mode,
        ) {
            PolicyVerdict::Allowed { .. } => {}
            PolicyVerdict::Blocked { reason } => {
                let err = ApprovalError::Blocked {
                    tool: tool.to_string(),
                    reason,
                };
                return Ok(self.refuse(frame, call, err));
            }
            PolicyVerdict::Denied { reason } => {
                let err = ApprovalError::Denied {
                    tool: tool.to_string(),
                    reason,
                };
                return Ok(self.refuse(frame, call, err));
            }
            PolicyVerdict::RequiresApproval { reason } => {
                let request = ApprovalRequest::new(
                    &active.name,
                    tool,
                    format!("{} ({reason})", approval_call.description),
                    &call.args,
                    settings.approval_timeout_secs,
                    Utc::now(),
                );
                frame.enter_approval()?;
                let decision = self
                    .context()
                    .broker()
                    .request_approval(request, self.context().cancel())
                    .await;
                frame.leave_approval()?;
                match decision {
                    Ok(d) if d.approved => {}
                    Ok(d) => {
                        let err = ApprovalError::Denied {
                            tool: tool.to_string(),
                            reason: d.note.unwrap_or_else(|| "denied by approver".into()),
                        };
                        return Ok(self.refuse(frame, call, err));
                    }
                    Err(ApprovalError::Cancelled { .. }) => {
                        return Err(RuntimeError::Cancelled {
                            worker: worker.to_string(),
                            depth: frame.depth,
                        })
                    }
                    Err(e) => return Ok(self.refuse(frame, call, e)),
                }
            }
        }

        // Sandbox validation runs after approval, on every call.
        let grant = match access {
            None => None,
            Some(access) => match frame.sandbox() {
                None => {
                    let err = SandboxError::NoSandbox {
                        worker: worker.to_string(),
                        tool: tool.to_string(),
                    };
                    return Ok(self.refuse(frame, call, err));
                }
                Some(sandbox) => match sandbox.authorize(&access) {
                    Ok(grant) => Some(grant),
                    Err(e) => return Ok(self.refuse(frame, call, e)),
                },
            },
        };

        obs::emit_tool_dispatched(worker, &active.name, tool);
        self.context().sink().emit(&RuntimeEvent::ToolCalled {
            call_id: frame.call_id,
            worker: worker.to_string(),
            toolset: active.name.clone(),
            tool: tool.to_string(),
            args: redact_args(&call.args).value,
        });

        let invoker = Arc::new(FrameInvoker {
            runtime: self.clone(),
            parent: frame.path.clone(),
        });
        let ctx = ToolContext::new(frame.call_id, worker, frame.depth, self.context().cancel().clone())
            .with_grant(grant)
            .with_invoker(invoker);

        let mut cancel = self.context().cancel().clone();
        let run = toolset.call_tool(tool, call.args.clone(), &ctx);
        // Nested workers run their own frames and approvals; only leaf tools
        // are held to the tool timeout.
        let result = if active.kind == BindingKind::WorkerRef {
            tokio::select! {
                r = run => Ok(r),
                _ = cancel.cancelled() => Err(()),
            }
        } else {
            tokio::select! {
                r = tokio::time::timeout(settings.tool_timeout(), run) => match r {
                    Ok(r) => Ok(r),
                    Err(_) => Ok(Err(ToolError::Failed(format!(
                        "{tool} timed out after {} ms",
                        settings.tool_timeout_ms
                    )))),
                },
                _ = cancel.cancelled() => Err(()),
            }
        };

        let reply = match result {
            Err(()) => {
                return Err(RuntimeError::Cancelled {
                    worker: worker.to_string(),
                    depth: frame.depth,
                })
            }
            Ok(Ok(value)) => ToolReply::ok(value),
            Ok(Err(ToolError::Runtime(e))) => return Err(*e),
            Ok(Err(e)) => ToolReply::error(e),
        };
        self.emit_result(frame, call, &reply);
        Ok(reply)
    }

    fn refuse(
        &self,
        frame: &CallFrame<'_>,
        call: &ToolCallRequest,
        reason: impl std::fmt::Display,
    ) -> ToolReply {
        obs::emit_tool_refused(frame.worker_name(), &call.name, &reason);
        let reply = ToolReply::error(reason);
        self.emit_result(frame, call, &reply);
        reply
    }

    fn emit_result(&self, frame: &CallFrame<'_>, call: &ToolCallRequest, reply: &ToolReply) {
        self.context().sink().emit(&RuntimeEvent::ToolResult {
            call_id: frame.call_id,
            worker: frame.worker_name().to_string(),
            tool: call.name.clone(),
            ok: !reply.is_error,
            summary: reply.summary(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_summary() {
        assert_eq!(ToolReply::error("nope").summary(), "nope");
        assert_eq!(ToolReply::ok(json!({"a": 1})).summary(), r#"{"a":1}"#);
        let long = ToolReply::ok(Value::String("x".repeat(300)));
        assert!(long.summary().ends_with('…'));
    }
}
