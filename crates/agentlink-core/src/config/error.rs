//! Configuration errors. All of them are fatal and surface before any call
//! executes.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported config format for {path}; use a .toml or .json file")]
    UnsupportedFormat { path: PathBuf },

    #[error("malformed sandbox root '{name}': {reason}")]
    InvalidSandboxRoot { name: String, reason: String },

    #[error("malformed capability rule '{pattern}': {reason}; expected {{pattern, resourceScope?, decision: allow|requireApproval|deny, priority?}}")]
    InvalidRule { pattern: String, reason: String },

    #[error("invalid worker declaration '{name}': {reason}")]
    InvalidWorker { name: String, reason: String },

    #[error("invalid toolset declaration '{name}': {reason}")]
    InvalidToolset { name: String, reason: String },

    #[error("invalid runtime settings: {0}")]
    InvalidRuntime(String),
}

/// Result type for configuration loading and validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
