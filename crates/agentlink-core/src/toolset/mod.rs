//! Toolsets: named groups of tools a worker can call.
//!
//! A toolset instance may be shared by many workers. Anything worker
//! specific (approval overrides, the sandbox grant, the calling frame)
//! reaches it through a [`ConfiguredToolset`] wrapper or the per-call
//! [`ToolContext`], never by mutating the instance.

pub mod configured;
pub mod error;
pub mod factory;
pub mod filesystem;
pub mod shell;
pub mod worker_ref;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::approval::policy::ToolClassification;
use crate::cancel::CancelSignal;
use crate::runtime::error::RuntimeResult;
use crate::sandbox::access::{GrantedAccess, ResourceAccess};
use crate::sandbox::boundary::ResolvedPath;

pub use configured::ConfiguredToolset;
pub use error::{ToolError, ToolResult};
pub use factory::{ToolsetCatalog, ToolsetFactory};
pub use filesystem::{FilesystemConfig, FilesystemToolset};
pub use shell::{ShellConfig, ShellToolset};
pub use worker_ref::WorkerToolset;

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// Runs a nested worker on behalf of a tool. Provided by the runtime.
#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    async fn invoke(&self, worker: &str, input: Value) -> RuntimeResult<Value>;
}

/// Per-call context handed to [`Toolset::call_tool`].
#[derive(Clone)]
pub struct ToolContext {
    pub call_id: Uuid,
    pub worker: String,
    pub depth: usize,
    pub grant: Option<GrantedAccess>,
    pub cancel: CancelSignal,
    invoker: Option<Arc<dyn WorkerInvoker>>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("call_id", &self.call_id)
            .field("worker", &self.worker)
            .field("depth", &self.depth)
            .field("grant", &self.grant)
            .finish_non_exhaustive()
    }
}

impl ToolContext {
    pub fn new(call_id: Uuid, worker: impl Into<String>, depth: usize, cancel: CancelSignal) -> Self {
        Self {
            call_id,
            worker: worker.into(),
            depth,
            grant: None,
            cancel,
            invoker: None,
        }
    }

    pub fn with_grant(mut self, grant: Option<GrantedAccess>) -> Self {
        self.grant = grant;
        self
    }

    pub fn with_invoker(mut self, invoker: Arc<dyn WorkerInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn invoker(&self) -> Option<&Arc<dyn WorkerInvoker>> {
        self.invoker.as_ref()
    }

    /// The validated path for `tool`, or `MissingGrant`.
    pub fn granted_path(&self, tool: &str) -> ToolResult<&ResolvedPath> {
        self.grant
            .as_ref()
            .and_then(GrantedAccess::path)
            .ok_or_else(|| ToolError::MissingGrant {
                tool: tool.to_string(),
            })
    }
}

/// A group of tools.
///
/// Methods other than `call_tool` must be cheap and side-effect free: the
/// runtime calls them before approval and sandbox checks.
#[async_trait]
pub trait Toolset: Send + Sync {
    fn tools(&self) -> Vec<ToolSchema>;

    fn has_tool(&self, name: &str) -> bool {
        self.tools().iter().any(|t| t.name == name)
    }

    /// Static danger classification of one call.
    fn check_approval(&self, _tool: &str, _args: &Value) -> ToolClassification {
        ToolClassification::NeedsApproval
    }

    fn pre_approved(&self, _tool: &str) -> bool {
        false
    }

    /// One-line description shown in approval prompts.
    fn describe_call(&self, tool: &str, args: &Value) -> String {
        format!("{tool} {args}")
    }

    /// Extra strings matched against capability rule patterns, such as a
    /// command line.
    fn subjects(&self, _tool: &str, _args: &Value) -> Vec<String> {
        Vec::new()
    }

    /// Simple commands of a compound command line. Empty unless the call
    /// runs more than a single simple command.
    fn command_segments(&self, _tool: &str, _args: &Value) -> Vec<String> {
        Vec::new()
    }

    /// The resource the call touches, validated by the sandbox after
    /// approval.
    fn resource_access(&self, _tool: &str, _args: &Value) -> ToolResult<Option<ResourceAccess>> {
        Ok(None)
    }

    async fn call_tool(&self, tool: &str, args: Value, ctx: &ToolContext) -> ToolResult<Value>;
}

/// Fetch a required string argument.
pub(crate) fn str_arg<'a>(tool: &str, args: &'a Value, key: &str) -> ToolResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgs {
            tool: tool.to_string(),
            reason: format!("missing string field '{key}'"),
        })
}

pub(crate) fn unknown_tool(toolset: &str, tool: &str, schemas: &[ToolSchema]) -> ToolError {
    ToolError::UnknownTool {
        toolset: toolset.to_string(),
        tool: tool.to_string(),
        available: schemas.iter().map(|t| t.name.clone()).collect(),
    }
}
