//! Per-worker view of a shared toolset.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{ToolContext, ToolResult, ToolSchema, Toolset};
use crate::approval::policy::{ToolApprovalOverride, ToolClassification};
use crate::sandbox::access::ResourceAccess;

/// Wraps a toolset with one worker's approval overrides. The wrapped
/// instance is shared, never modified.
#[derive(Clone)]
pub struct ConfiguredToolset {
    inner: Arc<dyn Toolset>,
    overrides: BTreeMap<String, ToolApprovalOverride>,
}

impl ConfiguredToolset {
    pub fn new(inner: Arc<dyn Toolset>, overrides: BTreeMap<String, ToolApprovalOverride>) -> Self {
        Self { inner, overrides }
    }

    pub fn inner(&self) -> &Arc<dyn Toolset> {
        &self.inner
    }

    pub fn overrides(&self) -> &BTreeMap<String, ToolApprovalOverride> {
        &self.overrides
    }
}

#[async_trait]
impl Toolset for ConfiguredToolset {
    fn tools(&self) -> Vec<ToolSchema> {
        self.inner.tools()
    }

    fn has_tool(&self, name: &str) -> bool {
        self.inner.has_tool(name)
    }

    fn check_approval(&self, tool: &str, args: &Value) -> ToolClassification {
        match self.overrides.get(tool) {
            Some(o) if o.blocked => ToolClassification::Blocked {
                reason: o
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("{tool} is blocked for this worker")),
            },
            _ => self.inner.check_approval(tool, args),
        }
    }

    fn pre_approved(&self, tool: &str) -> bool {
        self.overrides.get(tool).is_some_and(|o| o.pre_approved) || self.inner.pre_approved(tool)
    }

    fn describe_call(&self, tool: &str, args: &Value) -> String {
        self.inner.describe_call(tool, args)
    }

    fn subjects(&self, tool: &str, args: &Value) -> Vec<String> {
        self.inner.subjects(tool, args)
    }

    fn command_segments(&self, tool: &str, args: &Value) -> Vec<String> {
        self.inner.command_segments(tool, args)
    }

    fn resource_access(&self, tool: &str, args: &Value) -> ToolResult<Option<ResourceAccess>> {
        self.inner.resource_access(tool, args)
    }

    async fn call_tool(&self, tool: &str, args: Value, ctx: &ToolContext) -> ToolResult<Value> {
        self.inner.call_tool(tool, args, ctx).await
    }
}
