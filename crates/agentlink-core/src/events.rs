//! Read-only progress events emitted by the runtime and the approval broker.
//!
//! Sinks observe; they never influence control flow.

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::approval::request::ApprovalRequestedEvent;

/// Events in wire order of emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum RuntimeEvent {
    #[serde(rename = "call.started")]
    CallStarted {
        call_id: Uuid,
        parent_id: Option<Uuid>,
        worker: String,
        depth: usize,
    },
    #[serde(rename = "call.finished")]
    CallFinished {
        call_id: Uuid,
        worker: String,
        depth: usize,
        status: String,
        duration_ms: u64,
    },
    #[serde(rename = "tool.called")]
    ToolCalled {
        call_id: Uuid,
        worker: String,
        toolset: String,
        tool: String,
        args: serde_json::Value,
    },
    #[serde(rename = "tool.result")]
    ToolResult {
        call_id: Uuid,
        worker: String,
        tool: String,
        ok: bool,
        summary: String,
    },
    #[serde(rename = "approval.requested")]
    ApprovalRequested(ApprovalRequestedEvent),
    #[serde(rename = "approval.resolved")]
    ApprovalResolved {
        approval_id: Uuid,
        outcome: String,
    },
}

/// Receiver of runtime events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RuntimeEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RuntimeEvent) {}
}

/// Logs every event as JSON at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &RuntimeEvent) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::debug!(target: "agentlink::events", %json),
            Err(e) => tracing::warn!(error = %e, "failed to serialize runtime event"),
        }
    }
}

/// Forwards events to an unbounded channel, e.g. for a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RuntimeEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &RuntimeEvent) {
        // A closed receiver means nobody is watching.
        let _ = self.tx.send(event.clone());
    }
}
