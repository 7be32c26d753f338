//! Runtime limits and modes, shared read-only by every frame of a run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use crate::approval::policy::ApprovalMode;

pub const DEFAULT_MAX_DEPTH: usize = 5;
pub const DEFAULT_MAX_ITERATIONS: usize = 16;
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    /// Deepest allowed frame; the entry worker runs at depth 0.
    pub max_depth: usize,
    /// Model turns per frame.
    pub max_iterations: usize,
    pub approval_timeout_secs: u64,
    /// Per tool call, excluding approval waits and nested workers.
    pub tool_timeout_ms: u64,
    pub approval_mode: ApprovalMode,
    /// Refuse a call whose worker and input repeat an ancestor frame.
    pub cycle_guard: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            approval_mode: ApprovalMode::default(),
            cycle_guard: true,
        }
    }
}

impl RuntimeSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidRuntime(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.approval_timeout_secs == 0 {
            return Err(ConfigError::InvalidRuntime(
                "approval_timeout_secs must be at least 1".into(),
            ));
        }
        if self.tool_timeout_ms == 0 {
            return Err(ConfigError::InvalidRuntime(
                "tool_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = mode;
        self
    }
}
