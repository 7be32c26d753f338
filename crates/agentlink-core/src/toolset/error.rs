//! Error types for tool execution.

use std::path::PathBuf;

use crate::runtime::error::RuntimeError;
use crate::sandbox::error::SandboxError;

/// Errors raised while preparing or running a tool.
///
/// Everything except [`ToolError::Runtime`] is reported back to the worker
/// as a failed tool result. `Runtime` carries a fatal error from a nested
/// worker call and unwinds the caller.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{tool}' in toolset '{toolset}'; available tools: {}", available.join(", "))]
    UnknownTool {
        toolset: String,
        tool: String,
        available: Vec<String>,
    },

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },

    #[error("{tool} needs a sandbox grant that was not provided")]
    MissingGrant { tool: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Runtime(Box<RuntimeError>),
}

impl ToolError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::Runtime(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ToolError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<RuntimeError> for ToolError {
    fn from(e: RuntimeError) -> Self {
        ToolError::Runtime(Box::new(e))
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_lists_available() {
        let err = ToolError::UnknownTool {
            toolset: "filesystem".into(),
            tool: "rm".into(),
            available: vec!["read_file".into(), "write_file".into()],
        };
        assert!(err.to_string().contains("read_file, write_file"));
        assert!(!err.is_fatal());
    }
}
