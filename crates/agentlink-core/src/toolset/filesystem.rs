//! Builtin `filesystem` toolset: read, list and write files inside the
//! worker's sandbox.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{str_arg, unknown_tool, ToolContext, ToolResult, ToolSchema, Toolset};
use crate::approval::policy::ToolClassification;
use crate::sandbox::access::ResourceAccess;

pub const READ_FILE: &str = "read_file";
pub const LIST_FILES: &str = "list_files";
pub const WRITE_FILE: &str = "write_file";

fn default_max_entries() -> usize {
    500
}

/// Factory config for the filesystem toolset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemConfig {
    /// Blocks `write_file` outright.
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilesystemToolset {
    config: FilesystemConfig,
}

impl FilesystemToolset {
    pub fn new(config: FilesystemConfig) -> Self {
        Self { config }
    }
}

fn path_param(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

#[async_trait]
impl Toolset for FilesystemToolset {
    fn tools(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: READ_FILE.into(),
                description: "Read a UTF-8 text file from the sandbox.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"path": path_param("Path relative to the first sandbox root, or absolute.")},
                    "required": ["path"]
                }),
            },
            ToolSchema {
                name: LIST_FILES.into(),
                description: "List the entries of a sandbox directory.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"path": path_param("Directory to list; defaults to the first sandbox root.")}
                }),
            },
            ToolSchema {
                name: WRITE_FILE.into(),
                description: "Write a UTF-8 text file in a writable sandbox root.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": path_param("Destination path."),
                        "content": {"type": "string"}
                    },
                    "required": ["path", "content"]
                }),
            },
        ]
    }

    fn check_approval(&self, tool: &str, _args: &Value) -> ToolClassification {
        match tool {
            WRITE_FILE if self.config.read_only => ToolClassification::Blocked {
                reason: "filesystem toolset is configured read_only".into(),
            },
            WRITE_FILE => ToolClassification::NeedsApproval,
            _ => ToolClassification::Safe,
        }
    }

    fn describe_call(&self, tool: &str, args: &Value) -> String {
        let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
        match tool {
            WRITE_FILE => {
                let len = args.get("content").and_then(Value::as_str).map_or(0, str::len);
                format!("write {len} bytes to {path}")
            }
            LIST_FILES => format!("list {path}"),
            _ => format!("read {path}"),
        }
    }

    fn subjects(&self, _tool: &str, args: &Value) -> Vec<String> {
        args.get("path")
            .and_then(Value::as_str)
            .map(|p| vec![p.to_string()])
            .unwrap_or_default()
    }

    fn resource_access(&self, tool: &str, args: &Value) -> ToolResult<Option<ResourceAccess>> {
        let access = match tool {
            READ_FILE => ResourceAccess::Read {
                path: str_arg(tool, args, "path")?.to_string(),
            },
            LIST_FILES => ResourceAccess::List {
                path: args
                    .get("path")
                    .and_then(Value::as_str)
                    .unwrap_or(".")
                    .to_string(),
            },
            WRITE_FILE => ResourceAccess::Write {
                path: str_arg(tool, args, "path")?.to_string(),
                bytes: str_arg(tool, args, "content")?.len() as u64,
            },
            other => return Err(unknown_tool("filesystem", other, &self.tools())),
        };
        Ok(Some(access))
    }

    async fn call_tool(&self, tool: &str, args: Value, ctx: &ToolContext) -> ToolResult<Value> {
        let resolved = ctx.granted_path(tool)?;
        let path = &resolved.path;
        match tool {
            READ_FILE => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| super::ToolError::io(path, e))?;
                Ok(json!({"path": path.display().to_string(), "content": content}))
            }
            LIST_FILES => {
                let mut dir = tokio::fs::read_dir(path)
                    .await
                    .map_err(|e| super::ToolError::io(path, e))?;
                let mut entries = Vec::new();
                while let Some(entry) = dir
                    .next_entry()
                    .await
                    .map_err(|e| super::ToolError::io(path, e))?
                {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                        name.push('/');
                    }
                    entries.push(name);
                }
                entries.sort();
                let truncated = entries.len() > self.config.max_entries;
                entries.truncate(self.config.max_entries);
                Ok(json!({
                    "path": path.display().to_string(),
                    "entries": entries,
                    "truncated": truncated,
                }))
            }
            WRITE_FILE => {
                let content = str_arg(tool, &args, "content")?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| super::ToolError::io(parent, e))?;
                }
                tokio::fs::write(path, content)
                    .await
                    .map_err(|e| super::ToolError::io(path, e))?;
                Ok(json!({"path": path.display().to_string(), "bytes": content.len()}))
            }
            other => Err(unknown_tool("filesystem", other, &self.tools())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSignal;
    use crate::sandbox::boundary::{AccessMode, SandboxBoundary, SandboxRoot};
    use crate::sandbox::network::NetworkPolicy;
    use crate::toolset::ToolError;
    use uuid::Uuid;

    fn sandbox(dir: &std::path::Path) -> SandboxBoundary {
        SandboxBoundary::new(
            vec![SandboxRoot {
                name: "work".into(),
                path: dir.canonicalize().unwrap(),
                mode: AccessMode::ReadWrite,
                allowed_suffixes: Vec::new(),
                max_bytes: None,
            }],
            NetworkPolicy::Disabled,
        )
    }

    async fn run(fs: &FilesystemToolset, sb: &SandboxBoundary, tool: &str, args: Value) -> ToolResult<Value> {
        let access = fs.resource_access(tool, &args)?.unwrap();
        let grant = sb.authorize(&access)?;
        let ctx = ToolContext::new(Uuid::new_v4(), "main", 0, CancelSignal::never()).with_grant(Some(grant));
        fs.call_tool(tool, args, &ctx).await
    }

    #[test]
    fn test_classification() {
        let fs = FilesystemToolset::default();
        assert_eq!(fs.check_approval(READ_FILE, &json!({})), ToolClassification::Safe);
        assert_eq!(fs.check_approval(LIST_FILES, &json!({})), ToolClassification::Safe);
        assert_eq!(
            fs.check_approval(WRITE_FILE, &json!({})),
            ToolClassification::NeedsApproval
        );
        let ro = FilesystemToolset::new(FilesystemConfig {
            read_only: true,
            ..Default::default()
        });
        assert!(matches!(
            ro.check_approval(WRITE_FILE, &json!({})),
            ToolClassification::Blocked { .. }
        ));
    }

    #[tokio::test]
    async fn test_write_read_list_inside_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let sb = sandbox(dir.path());
        let fs = FilesystemToolset::default();

        let written = run(&fs, &sb, WRITE_FILE, json!({"path": "notes/a.txt", "content": "hello"}))
            .await
            .unwrap();
        assert_eq!(written["bytes"], 5);

        let read = run(&fs, &sb, READ_FILE, json!({"path": "notes/a.txt"})).await.unwrap();
        assert_eq!(read["content"], "hello");

        let listed = run(&fs, &sb, LIST_FILES, json!({})).await.unwrap();
        assert_eq!(listed["entries"], json!(["notes/"]));
    }

    #[tokio::test]
    async fn test_escape_is_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let sb = sandbox(dir.path());
        let fs = FilesystemToolset::default();
        let err = run(&fs, &sb, READ_FILE, json!({"path": "../../etc/passwd"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(_)));
    }

    #[test]
    fn test_missing_args() {
        let fs = FilesystemToolset::default();
        assert!(matches!(
            fs.resource_access(WRITE_FILE, &json!({"path": "a"})),
            Err(ToolError::InvalidArgs { .. })
        ));
    }
}
