//! The model seam: one inference turn per call, plus a scripted model for
//! tests and offline runs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::toolset::ToolSchema;

/// A tool invocation proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Filled in by the runtime when the model leaves it empty.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            args,
        }
    }
}

/// One entry in a frame's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default)]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        call_id: String,
        name: String,
        content: Value,
        is_error: bool,
    },
}

/// What the model wants next. No tool calls means the worker is done and
/// `text` is its result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Run the tool calls concurrently.
    #[serde(default)]
    pub parallel: bool,
}

impl ModelTurn {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::default()
        }
    }

    pub fn call(name: impl Into<String>, args: Value) -> Self {
        Self::tool_calls(vec![ToolCallRequest::new(name, args)])
    }

    pub fn in_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("no scripted turns left for worker '{worker}'")]
    ScriptExhausted { worker: String },

    #[error("invalid model script: {0}")]
    InvalidScript(String),

    #[error("{0}")]
    Provider(String),
}

/// Result type for model inference.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// An LLM, or anything that plays one.
#[async_trait]
pub trait Model: Send + Sync {
    async fn infer(
        &self,
        worker: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> ModelResult<ModelTurn>;
}

/// Replays fixed turns per worker, in order.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    scripts: Mutex<HashMap<String, VecDeque<ModelTurn>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turns(self, worker: impl Into<String>, turns: impl IntoIterator<Item = ModelTurn>) -> Self {
        self.lock()
            .entry(worker.into())
            .or_default()
            .extend(turns);
        self
    }

    /// Parse `{"worker": [turn, ...], ...}`.
    pub fn from_json(script: &Value) -> ModelResult<Self> {
        let parsed: BTreeMap<String, Vec<ModelTurn>> = serde_json::from_value(script.clone())
            .map_err(|e| ModelError::InvalidScript(e.to_string()))?;
        Ok(parsed
            .into_iter()
            .fold(Self::new(), |model, (worker, turns)| model.with_turns(worker, turns)))
    }

    pub fn remaining(&self, worker: &str) -> usize {
        self.lock().get(worker).map_or(0, VecDeque::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<ModelTurn>>> {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn infer(
        &self,
        worker: &str,
        _messages: &[Message],
        _tools: &[ToolSchema],
    ) -> ModelResult<ModelTurn> {
        self.lock()
            .get_mut(worker)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| ModelError::ScriptExhausted {
                worker: worker.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_turns_pop_in_order() {
        let model = ScriptedModel::new().with_turns(
            "main",
            [ModelTurn::call("read_file", json!({"path": "a"})), ModelTurn::final_text("done")],
        );
        let first = model.infer("main", &[], &[]).await.unwrap();
        assert_eq!(first.tool_calls[0].name, "read_file");
        let second = model.infer("main", &[], &[]).await.unwrap();
        assert_eq!(second.text.as_deref(), Some("done"));
        assert!(matches!(
            model.infer("main", &[], &[]).await,
            Err(ModelError::ScriptExhausted { .. })
        ));
    }

    #[test]
    fn test_script_from_json() {
        let model = ScriptedModel::from_json(&json!({
            "main": [
                {"tool_calls": [{"name": "run", "args": {"command": "ls"}}]},
                {"text": "ok"}
            ]
        }))
        .unwrap();
        assert_eq!(model.remaining("main"), 2);
        assert!(ScriptedModel::from_json(&json!({"main": "nope"})).is_err());
    }

    #[test]
    fn test_message_wire_shape() {
        let msg = Message::Tool {
            call_id: "call_1".into(),
            name: "run".into(),
            content: json!({"exit_code": 0}),
            is_error: false,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["call_id"], "call_1");
    }
}
