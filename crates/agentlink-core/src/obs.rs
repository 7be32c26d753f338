//! Structured observability hooks for call, tool and approval lifecycle events.
//!
//! This module provides:
//! - Call-scoped tracing spans via [`call_span`]
//! - Emission functions for key lifecycle events
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`). Set
//! `--json-logs` on the CLI for newline-delimited JSON.

use tracing::{debug, info, warn};
use uuid::Uuid;

/// Call-scoped span carrying `call_id`, `worker` and `depth`.
///
/// ```ignore
/// runtime.drive(frame).instrument(call_span(&call_id, "summarize", 1)).await
/// ```
pub fn call_span(call_id: &Uuid, worker: &str, depth: usize) -> tracing::Span {
    tracing::info_span!("agentlink.call", call_id = %call_id, worker = %worker, depth = depth)
}

/// Emit event: a call frame started.
pub fn emit_call_started(call_id: &Uuid, worker: &str, depth: usize) {
    info!(event = "call.started", call_id = %call_id, worker = %worker, depth = depth);
}

/// Emit event: a call frame finished with its terminal state.
pub fn emit_call_finished(call_id: &Uuid, worker: &str, status: &str, duration_ms: u64) {
    info!(
        event = "call.finished",
        call_id = %call_id,
        worker = %worker,
        status = %status,
        duration_ms = duration_ms,
    );
}

/// Emit event: a call was refused before its frame ran (depth or cycle guard).
pub fn emit_call_refused(worker: &str, depth: usize, reason: &dyn std::fmt::Display) {
    warn!(event = "call.refused", worker = %worker, depth = depth, reason = %reason);
}

/// Emit event: a tool invocation is about to run.
pub fn emit_tool_dispatched(worker: &str, toolset: &str, tool: &str) {
    debug!(event = "tool.dispatched", worker = %worker, toolset = %toolset, tool = %tool);
}

/// Emit event: a tool invocation was refused before running.
pub fn emit_tool_refused(worker: &str, tool: &str, reason: &dyn std::fmt::Display) {
    info!(event = "tool.refused", worker = %worker, tool = %tool, reason = %reason);
}

pub fn emit_approval_requested(approval_id: &Uuid, tool: &str, timeout_secs: u64) {
    info!(
        event = "approval.requested",
        approval_id = %approval_id,
        tool = %tool,
        timeout_secs = timeout_secs,
    );
}

pub fn emit_approval_resolved(approval_id: &Uuid, outcome: &str) {
    info!(event = "approval.resolved", approval_id = %approval_id, outcome = %outcome);
}

/// Emit event: a response arrived for an id that is already settled or unknown.
pub fn emit_duplicate_response(approval_id: &Uuid, state: &str) {
    warn!(
        event = "approval.response_discarded",
        approval_id = %approval_id,
        state = %state,
        "discarding response for settled approval",
    );
}

/// Emit event: a tool name is shadowed by an earlier toolset in a worker.
pub fn emit_tool_shadowed(worker: &str, tool: &str, winner: &str, shadowed: &str) {
    warn!(
        event = "link.tool_shadowed",
        worker = %worker,
        tool = %tool,
        winner = %winner,
        shadowed = %shadowed,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_span_create() {
        let span = call_span(&Uuid::new_v4(), "main", 0);
        let _entered = span.enter();
        emit_call_started(&Uuid::new_v4(), "main", 0);
    }
}
