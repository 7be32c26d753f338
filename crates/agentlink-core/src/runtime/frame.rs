//! Call frames: one per worker invocation, never shared between calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use uuid::Uuid;

use super::error::{RuntimeError, RuntimeResult};
use super::model::Message;
use crate::resolver::table::{ActiveToolset, ResolvedWorker};
use crate::sandbox::boundary::SandboxBoundary;

/// Lifecycle of a frame.
///
/// ```text
/// CREATED -> RUNNING <-> AWAITING_APPROVAL
///    |          |              |
///    |          +-> COMPLETED  |
///    |          +-> FAILED <---+
///    +-> DEPTH_EXCEEDED
///    +-> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameState {
    Created,
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    DepthExceeded,
}

impl FrameState {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameState::Created => "CREATED",
            FrameState::Running => "RUNNING",
            FrameState::AwaitingApproval => "AWAITING_APPROVAL",
            FrameState::Completed => "COMPLETED",
            FrameState::Failed => "FAILED",
            FrameState::DepthExceeded => "DEPTH_EXCEEDED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FrameState::Completed | FrameState::Failed | FrameState::DepthExceeded
        )
    }

    pub fn can_transition_to(self, next: FrameState) -> bool {
        use FrameState::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, DepthExceeded)
                | (Created, Failed)
                | (Running, AwaitingApproval)
                | (AwaitingApproval, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (AwaitingApproval, Failed)
        )
    }
}

impl std::fmt::Display for FrameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one frame on a call chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    pub call_id: Uuid,
    pub worker: String,
    pub input_digest: String,
}

/// The chain of frames from the root to (and including) a frame, indexed
/// by depth. Each chain owns its copy; siblings never see each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallPath {
    frames: Vec<FrameSummary>,
}

impl CallPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Depth a child of this path would run at.
    pub fn child_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn last(&self) -> Option<&FrameSummary> {
        self.frames.last()
    }

    pub fn frames(&self) -> &[FrameSummary] {
        &self.frames
    }

    pub fn extended(&self, frame: FrameSummary) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame);
        Self { frames }
    }

    /// Worker names from the root, followed by `next`.
    pub fn chain_to(&self, next: &str) -> Vec<String> {
        self.frames
            .iter()
            .map(|f| f.worker.clone())
            .chain(std::iter::once(next.to_string()))
            .collect()
    }

    /// Depth of the first ancestor running `worker` on `input_digest`.
    pub fn find_repeat(&self, worker: &str, input_digest: &str) -> Option<usize> {
        self.frames
            .iter()
            .position(|f| f.worker == worker && f.input_digest == input_digest)
    }
}

/// Mutable per-call state. Created fresh for every frame.
#[derive(Debug, Default)]
pub struct LocalState {
    pub messages: Vec<Message>,
    pub iterations: usize,
    pub tool_calls: usize,
}

/// One invocation of a worker.
#[derive(Debug)]
pub struct CallFrame<'t> {
    pub call_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub depth: usize,
    pub worker: &'t ResolvedWorker,
    /// Chain from the root through this frame.
    pub path: CallPath,
    pub local: LocalState,
    state: Mutex<FrameState>,
    awaiting: AtomicUsize,
}

impl<'t> CallFrame<'t> {
    pub fn new(worker: &'t ResolvedWorker, parent: &CallPath, input_digest: String) -> Self {
        let call_id = Uuid::new_v4();
        let path = parent.extended(FrameSummary {
            call_id,
            worker: worker.name().to_string(),
            input_digest,
        });
        Self {
            call_id,
            parent_id: parent.last().map(|f| f.call_id),
            depth: parent.child_depth(),
            worker,
            path,
            local: LocalState::default(),
            state: Mutex::new(FrameState::Created),
            awaiting: AtomicUsize::new(0),
        }
    }

    pub fn worker_name(&self) -> &str {
        self.worker.name()
    }

    pub fn active_toolsets(&self) -> &[ActiveToolset] {
        self.worker.toolsets()
    }

    pub fn sandbox(&self) -> Option<&Arc<SandboxBoundary>> {
        self.worker.spec.sandbox.as_ref()
    }

    pub fn state(&self) -> FrameState {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn transition(&self, next: FrameState) -> RuntimeResult<()> {
        let mut state = self.lock();
        if !state.can_transition_to(next) {
            return Err(RuntimeError::InvalidTransition {
                worker: self.worker_name().to_string(),
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// Mark one more outstanding approval; concurrent tool calls may each
    /// wait on their own.
    pub fn enter_approval(&self) -> RuntimeResult<()> {
        if self.awaiting.fetch_add(1, Ordering::SeqCst) == 0 {
            self.transition(FrameState::AwaitingApproval)?;
        }
        Ok(())
    }

    pub fn leave_approval(&self) -> RuntimeResult<()> {
        if self.awaiting.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.transition(FrameState::Running)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::declaration::WorkerSpec;

    fn worker(name: &str) -> ResolvedWorker {
        ResolvedWorker::new(Arc::new(WorkerSpec::new(name)), Vec::new())
    }

    #[test]
    fn test_transitions() {
        use FrameState::*;
        assert!(Created.can_transition_to(Running));
        assert!(Created.can_transition_to(DepthExceeded));
        assert!(!Running.can_transition_to(DepthExceeded));
        assert!(!Completed.can_transition_to(Running));
        assert!(Completed.is_terminal());
        assert!(!AwaitingApproval.is_terminal());
    }

    #[test]
    fn test_frame_identity_and_path() {
        let root_worker = worker("a");
        let root = CallFrame::new(&root_worker, &CallPath::root(), "d0".into());
        assert_eq!(root.depth, 0);
        assert_eq!(root.parent_id, None);

        let child_worker = worker("b");
        let child = CallFrame::new(&child_worker, &root.path, "d1".into());
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_id, Some(root.call_id));
        assert_ne!(child.call_id, root.call_id);
        assert_eq!(child.path.chain_to("c"), vec!["a", "b", "c"]);
        assert_eq!(child.path.find_repeat("a", "d0"), Some(0));
        assert_eq!(child.path.find_repeat("a", "other"), None);
        // The parent's path is untouched.
        assert_eq!(root.path.frames().len(), 1);
    }

    #[test]
    fn test_nested_approvals_keep_frame_waiting() {
        let w = worker("a");
        let frame = CallFrame::new(&w, &CallPath::root(), "d".into());
        frame.transition(FrameState::Running).unwrap();
        frame.enter_approval().unwrap();
        frame.enter_approval().unwrap();
        assert_eq!(frame.state(), FrameState::AwaitingApproval);
        frame.leave_approval().unwrap();
        assert_eq!(frame.state(), FrameState::AwaitingApproval);
        frame.leave_approval().unwrap();
        assert_eq!(frame.state(), FrameState::Running);
        assert!(frame.transition(FrameState::DepthExceeded).is_err());
    }
}
