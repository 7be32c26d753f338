//! Fatal runtime errors. Each one ends the frame it occurs in and unwinds
//! every caller up to [`crate::runtime::execute`].

use super::frame::FrameState;
use super::model::ModelError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(
        "calling worker '{worker}' would reach depth {depth}, beyond max_depth {max_depth}; call chain: {}; raise runtime.max_depth or stop the recursion",
        chain.join(" -> ")
    )]
    DepthExceeded {
        worker: String,
        depth: usize,
        max_depth: usize,
        chain: Vec<String>,
    },

    #[error(
        "worker '{worker}' called with the same input as its ancestor at depth {ancestor_depth}; call chain: {}",
        chain.join(" -> ")
    )]
    CycleGuardTripped {
        worker: String,
        depth: usize,
        ancestor_depth: usize,
        chain: Vec<String>,
    },

    #[error("unresolved worker '{name}'; available workers: {}", available.join(", "))]
    UnresolvedSymbol { name: String, available: Vec<String> },

    #[error("call to worker '{worker}' at depth {depth} was cancelled")]
    Cancelled { worker: String, depth: usize },

    #[error("worker '{worker}' did not finish within {max_iterations} model turns")]
    IterationLimit { worker: String, max_iterations: usize },

    #[error("model failed for worker '{worker}': {source}")]
    Model {
        worker: String,
        #[source]
        source: ModelError,
    },

    #[error("worker '{worker}': invalid frame transition {from} -> {to}")]
    InvalidTransition {
        worker: String,
        from: FrameState,
        to: FrameState,
    },
}

impl RuntimeError {
    /// Short status label for logs and `call.finished` events.
    pub fn status(&self) -> &'static str {
        match self {
            RuntimeError::DepthExceeded { .. } => "depth_exceeded",
            RuntimeError::CycleGuardTripped { .. } => "cycle",
            RuntimeError::UnresolvedSymbol { .. } => "unresolved",
            RuntimeError::Cancelled { .. } => "cancelled",
            RuntimeError::IterationLimit { .. } => "iteration_limit",
            RuntimeError::Model { .. } => "model_error",
            RuntimeError::InvalidTransition { .. } => "internal",
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_message_names_chain_and_remedy() {
        let err = RuntimeError::DepthExceeded {
            worker: "b".into(),
            depth: 4,
            max_depth: 3,
            chain: vec!["a".into(), "b".into(), "b".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("a -> b -> b"));
        assert!(msg.contains("max_depth 3"));
        assert!(msg.contains("raise runtime.max_depth"));
        assert_eq!(err.status(), "depth_exceeded");
    }
}
