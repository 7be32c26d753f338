//! A worker exposed to other workers as a single tool named after it.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ToolContext, ToolError, ToolResult, ToolSchema, Toolset};
use crate::approval::policy::ToolClassification;

#[derive(Debug, Clone)]
pub struct WorkerToolset {
    worker: String,
    description: String,
}

impl WorkerToolset {
    pub fn new(worker: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            description: description.into(),
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }
}

#[async_trait]
impl Toolset for WorkerToolset {
    fn tools(&self) -> Vec<ToolSchema> {
        let description = if self.description.is_empty() {
            format!("Delegate a task to the '{}' worker.", self.worker)
        } else {
            self.description.clone()
        };
        vec![ToolSchema {
            name: self.worker.clone(),
            description,
            parameters: json!({
                "type": "object",
                "properties": {"input": {"description": "Input passed to the worker."}},
                "required": ["input"]
            }),
        }]
    }

    /// Delegation itself is safe; the callee's own tool calls are judged
    /// in its frame.
    fn check_approval(&self, _tool: &str, _args: &Value) -> ToolClassification {
        ToolClassification::Safe
    }

    fn describe_call(&self, _tool: &str, _args: &Value) -> String {
        format!("call worker '{}'", self.worker)
    }

    async fn call_tool(&self, _tool: &str, args: Value, ctx: &ToolContext) -> ToolResult<Value> {
        let invoker = ctx.invoker().ok_or_else(|| {
            ToolError::Failed(format!(
                "worker '{}' can only be called from inside a runtime",
                self.worker
            ))
        })?;
        let input = match args {
            Value::Object(mut map) if map.contains_key("input") => {
                map.remove("input").unwrap_or(Value::Null)
            }
            other => other,
        };
        Ok(invoker.invoke(&self.worker, input).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSignal;
    use crate::runtime::error::RuntimeResult;
    use crate::toolset::WorkerInvoker;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Echo;

    #[async_trait]
    impl WorkerInvoker for Echo {
        async fn invoke(&self, worker: &str, input: Value) -> RuntimeResult<Value> {
            Ok(json!({"worker": worker, "input": input}))
        }
    }

    #[tokio::test]
    async fn test_unwraps_input_and_delegates() {
        let ts = WorkerToolset::new("summarize", "");
        assert_eq!(ts.tools()[0].name, "summarize");
        let ctx = ToolContext::new(Uuid::new_v4(), "main", 0, CancelSignal::never())
            .with_invoker(Arc::new(Echo));
        let out = ts
            .call_tool("summarize", json!({"input": "text"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, json!({"worker": "summarize", "input": "text"}));
    }

    #[tokio::test]
    async fn test_requires_invoker() {
        let ts = WorkerToolset::new("summarize", "");
        let ctx = ToolContext::new(Uuid::new_v4(), "main", 0, CancelSignal::never());
        assert!(matches!(
            ts.call_tool("summarize", json!({"input": 1}), &ctx).await,
            Err(ToolError::Failed(_))
        ));
    }
}
