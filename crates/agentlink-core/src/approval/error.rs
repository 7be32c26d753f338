//! Error types for the approval broker.

use uuid::Uuid;

/// Approval outcomes that stop a call from proceeding.
///
/// `Denied`, `Blocked` and `Timeout` are recoverable: the runtime turns them
/// into a structured tool failure the worker can react to. `Cancelled` unwinds
/// the call chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval denied for {tool}: {reason}")]
    Denied { tool: String, reason: String },

    #[error("{tool} is blocked: {reason}")]
    Blocked { tool: String, reason: String },

    #[error("approval {approval_id} for {tool} expired after {timeout_secs}s without a response; treat as denied")]
    Timeout {
        approval_id: Uuid,
        tool: String,
        timeout_secs: u64,
    },

    #[error("approval {approval_id} for {tool} was cancelled")]
    Cancelled { approval_id: Uuid, tool: String },
}

impl ApprovalError {
    /// Whether the worker may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ApprovalError::Cancelled { .. })
    }
}

/// Result type for approval operations.
pub type ApprovalResult<T> = std::result::Result<T, ApprovalError>;
