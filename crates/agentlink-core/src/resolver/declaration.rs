//! Declared workers and toolsets, before and after validation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::approval::policy::ToolApprovalOverride;
use crate::approval::rule::{RuleDeclaration, RuleSet};
use crate::config::error::{ConfigError, ConfigResult};
use crate::sandbox::boundary::{SandboxBoundary, SandboxDeclaration};

/// A worker's reference to a toolset, optionally with per-tool approval
/// overrides. Written either as a bare name or as a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ToolsetRefRepr")]
pub struct ToolsetRef {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub approval: BTreeMap<String, ToolApprovalOverride>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolsetRefRepr {
    Name(String),
    Table {
        name: String,
        #[serde(default)]
        approval: BTreeMap<String, ToolApprovalOverride>,
    },
}

impl From<ToolsetRefRepr> for ToolsetRef {
    fn from(repr: ToolsetRefRepr) -> Self {
        match repr {
            ToolsetRefRepr::Name(name) => ToolsetRef::named(name),
            ToolsetRefRepr::Table { name, approval } => ToolsetRef { name, approval },
        }
    }
}

impl ToolsetRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            approval: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, tool: impl Into<String>, o: ToolApprovalOverride) -> Self {
        self.approval.insert(tool.into(), o);
        self
    }
}

/// Wire shape of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub toolsets: Vec<ToolsetRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxDeclaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleDeclaration>,
}

/// A toolset built by a named factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsetDeclaration {
    pub name: String,
    pub factory: String,
    #[serde(default)]
    pub config: Value,
}

/// A validated worker: sandbox and rules compiled, ready to link.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub toolsets: Vec<ToolsetRef>,
    pub sandbox: Option<Arc<SandboxBoundary>>,
    pub rules: Arc<RuleSet>,
}

pub(crate) fn validate_symbol_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".into());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!(
            "'{name}' may only contain ASCII letters, digits, '_' and '-'"
        ));
    }
    Ok(())
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: String::new(),
            toolsets: Vec::new(),
            sandbox: None,
            rules: Arc::new(RuleSet::empty()),
        }
    }

    /// Validate `decl`, resolving relative sandbox roots and rule scopes
    /// against `base_dir`.
    pub fn from_declaration(decl: &WorkerDeclaration, base_dir: &Path) -> ConfigResult<Self> {
        validate_symbol_name(&decl.name).map_err(|reason| ConfigError::InvalidWorker {
            name: decl.name.clone(),
            reason,
        })?;
        let sandbox = decl
            .sandbox
            .as_ref()
            .map(|s| SandboxBoundary::from_declaration(s, base_dir).map(Arc::new))
            .transpose()?;
        let rules = RuleSet::compile(&decl.rules, base_dir)?;
        Ok(Self {
            name: decl.name.clone(),
            description: decl.description.clone(),
            instructions: decl.instructions.clone(),
            toolsets: decl.toolsets.clone(),
            sandbox,
            rules: Arc::new(rules),
        })
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_toolset(mut self, toolset: ToolsetRef) -> Self {
        self.toolsets.push(toolset);
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxBoundary) -> Self {
        self.sandbox = Some(Arc::new(sandbox));
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Arc::new(rules);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::rule::RuleDecision;
    use serde_json::json;

    #[test]
    fn test_toolset_ref_accepts_name_or_table() {
        let refs: Vec<ToolsetRef> = serde_json::from_value(json!([
            "filesystem",
            {"name": "shell", "approval": {"run": {"pre_approved": true}}}
        ]))
        .unwrap();
        assert_eq!(refs[0], ToolsetRef::named("filesystem"));
        assert!(refs[1].approval["run"].pre_approved);
    }

    #[test]
    fn test_worker_names_are_validated() {
        let decl = WorkerDeclaration {
            name: "bad name".into(),
            description: String::new(),
            instructions: String::new(),
            toolsets: Vec::new(),
            sandbox: None,
            rules: Vec::new(),
        };
        assert!(matches!(
            WorkerSpec::from_declaration(&decl, Path::new("/")),
            Err(ConfigError::InvalidWorker { .. })
        ));
    }

    #[test]
    fn test_malformed_rule_is_a_config_error() {
        let decl = WorkerDeclaration {
            name: "main".into(),
            description: String::new(),
            instructions: String::new(),
            toolsets: Vec::new(),
            sandbox: None,
            rules: vec![RuleDeclaration {
                pattern: "  ".into(),
                resource_scope: None,
                decision: RuleDecision::Allow,
                priority: 0,
            }],
        };
        assert!(matches!(
            WorkerSpec::from_declaration(&decl, Path::new("/")),
            Err(ConfigError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_sandbox_roots_resolve_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("work")).unwrap();
        let decl: WorkerDeclaration = serde_json::from_value(json!({
            "name": "main",
            "sandbox": {"roots": {"work": {"root": "work", "mode": "rw"}}}
        }))
        .unwrap();
        let spec = WorkerSpec::from_declaration(&decl, dir.path()).unwrap();
        let sandbox = spec.sandbox.unwrap();
        assert_eq!(
            sandbox.default_root().unwrap().path,
            dir.path().canonicalize().unwrap().join("work")
        );
    }
}
