//! Link-time errors. All of them are fatal and surface before any call runs.

use crate::config::error::ConfigError;

use super::table::BindingKind;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("duplicate symbol '{name}': already bound as {first}, redeclared as {second}")]
    DuplicateSymbol {
        name: String,
        first: BindingKind,
        second: BindingKind,
    },

    #[error("unresolved symbol '{name}' referenced by '{referenced_by}'; available: {}", available.join(", "))]
    UnresolvedSymbol {
        name: String,
        referenced_by: String,
        available: Vec<String>,
    },

    #[error("toolset '{toolset}' names unknown factory '{factory}'; available factories: {}", available.join(", "))]
    UnknownFactory {
        toolset: String,
        factory: String,
        available: Vec<String>,
    },

    #[error("factory '{factory}' failed to build toolset '{toolset}': {reason}")]
    Factory {
        toolset: String,
        factory: String,
        reason: String,
    },

    #[error("worker '{worker}' overrides unknown tool '{tool}' of toolset '{toolset}'; tools: {}", available.join(", "))]
    UnknownOverride {
        worker: String,
        toolset: String,
        tool: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for linking.
pub type LinkResult<T> = std::result::Result<T, LinkError>;
