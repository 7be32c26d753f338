//! Builtin `shell` toolset: one tool, `run`, executing a command line with
//! `sh -c` in the worker's first sandbox root.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{str_arg, unknown_tool, ToolContext, ToolError, ToolResult, ToolSchema, Toolset};
use crate::approval::policy::ToolClassification;
use crate::sandbox::access::{GrantedAccess, ResourceAccess};
use crate::sandbox::command::CommandLine;

pub const RUN: &str = "run";

fn default_blocked() -> Vec<String> {
    vec!["sudo".into(), "rm -rf /".into()]
}

fn default_max_output_chars() -> usize {
    16_000
}

/// Factory config for the shell toolset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellConfig {
    /// Command prefixes that are never run, whatever the rules say. Checked
    /// against every simple command of the line.
    #[serde(default = "default_blocked")]
    pub blocked: Vec<String>,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            blocked: default_blocked(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShellToolset {
    config: ShellConfig,
}

impl ShellToolset {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    fn blocked_prefix(&self, command: &str) -> Option<(&str, String)> {
        let line = CommandLine::parse(command);
        for segment in line.segments() {
            let mut candidates = vec![segment.words.join(" ")];
            candidates.extend(
                segment
                    .command_starts()
                    .into_iter()
                    .map(|i| segment.words[i..].join(" ")),
            );
            for candidate in &candidates {
                if let Some(prefix) = self
                    .config
                    .blocked
                    .iter()
                    .find(|p| starts_with_command(candidate, p))
                {
                    return Some((prefix.as_str(), segment.text.clone()));
                }
            }
        }
        None
    }

    fn clip(&self, bytes: &[u8]) -> String {
        let text = String::from_utf8_lossy(bytes);
        let count = text.chars().count();
        if count <= self.config.max_output_chars {
            return text.into_owned();
        }
        let head: String = text.chars().take(self.config.max_output_chars).collect();
        format!("{head}\n…[{} more chars]", count - self.config.max_output_chars)
    }
}

#[async_trait]
impl Toolset for ShellToolset {
    fn tools(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: RUN.into(),
            description: "Run a shell command in the sandbox and return its exit code and output.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"]
            }),
        }]
    }

    fn check_approval(&self, _tool: &str, args: &Value) -> ToolClassification {
        let command = args.get("command").and_then(Value::as_str).unwrap_or_default();
        match self.blocked_prefix(command) {
            Some((prefix, segment)) => ToolClassification::Blocked {
                reason: format!("`{segment}` starts with blocked prefix '{prefix}'"),
            },
            None => ToolClassification::NeedsApproval,
        }
    }

    fn describe_call(&self, _tool: &str, args: &Value) -> String {
        let command = args.get("command").and_then(Value::as_str).unwrap_or_default();
        format!("run `{command}`")
    }

    fn subjects(&self, _tool: &str, args: &Value) -> Vec<String> {
        args.get("command")
            .and_then(Value::as_str)
            .map(|c| vec![c.trim().to_string()])
            .unwrap_or_default()
    }

    fn command_segments(&self, _tool: &str, args: &Value) -> Vec<String> {
        let Some(command) = args.get("command").and_then(Value::as_str) else {
            return Vec::new();
        };
        let line = CommandLine::parse(command);
        if !line.is_compound() {
            return Vec::new();
        }
        line.segments()
            .iter()
            .flat_map(|s| {
                let unwrapped = s.command_words().join(" ");
                let mut out = vec![s.text.clone()];
                if unwrapped != s.text && !unwrapped.is_empty() {
                    out.push(unwrapped);
                }
                out
            })
            .collect()
    }

    fn resource_access(&self, tool: &str, args: &Value) -> ToolResult<Option<ResourceAccess>> {
        if tool != RUN {
            return Err(unknown_tool("shell", tool, &self.tools()));
        }
        Ok(Some(ResourceAccess::Command {
            command: str_arg(tool, args, "command")?.to_string(),
        }))
    }

    async fn call_tool(&self, tool: &str, args: Value, ctx: &ToolContext) -> ToolResult<Value> {
        if tool != RUN {
            return Err(unknown_tool("shell", tool, &self.tools()));
        }
        let command = str_arg(tool, &args, "command")?;
        let Some(GrantedAccess::Command { cwd, .. }) = &ctx.grant else {
            return Err(ToolError::MissingGrant { tool: tool.into() });
        };

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolError::io(cwd, e))?;

        Ok(json!({
            "exit_code": output.status.code(),
            "stdout": self.clip(&output.stdout),
            "stderr": self.clip(&output.stderr),
        }))
    }
}

fn starts_with_command(command: &str, prefix: &str) -> bool {
    let prefix = prefix.trim();
    command == prefix
        || command
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}
