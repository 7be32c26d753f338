//! Error types for the sandbox boundary.

use std::path::PathBuf;

/// Errors produced by sandbox boundary validation.
///
/// Every variant carries what *is* permitted so the message can be fed back
/// to the worker and acted on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("path {path} is outside the sandbox; allowed roots: {}", list_or_none(.allowed_roots))]
    PathNotInSandbox {
        path: String,
        allowed_roots: Vec<String>,
    },

    #[error("path {path} is in read-only root '{root}'; writable roots: {}", list_or_none(.writable_roots))]
    PathNotWritable {
        path: String,
        root: String,
        writable_roots: Vec<String>,
    },

    #[error("suffix of {path} is not allowed in root '{root}'; allowed suffixes: {}", list_or_none(.allowed_suffixes))]
    SuffixNotAllowed {
        path: String,
        root: String,
        allowed_suffixes: Vec<String>,
    },

    #[error("file {path} is {size} bytes, exceeding the {max_bytes} byte limit of root '{root}'")]
    FileTooLarge {
        path: String,
        root: String,
        size: u64,
        max_bytes: u64,
    },

    #[error("network access to {target} is disabled for this sandbox; only filesystem roots are available: {}", list_or_none(.allowed_roots))]
    NetworkDisabled {
        target: String,
        allowed_roots: Vec<String>,
    },

    #[error("no sandbox is declared for worker '{worker}'; declare a sandbox with at least one root to use {tool}")]
    NoSandbox { worker: String, tool: String },

    #[error("failed to resolve {path}: {reason}")]
    Resolve { path: PathBuf, reason: String },
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
