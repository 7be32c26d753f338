//! The linked symbol table.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::declaration::WorkerSpec;
use crate::toolset::{ToolSchema, Toolset};

/// How a symbol was bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Builtin,
    Factory,
    WorkerRef,
}

impl std::fmt::Display for BindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingKind::Builtin => write!(f, "builtin toolset"),
            BindingKind::Factory => write!(f, "factory toolset"),
            BindingKind::WorkerRef => write!(f, "worker"),
        }
    }
}

/// One global symbol.
#[derive(Clone)]
pub struct ToolsetBinding {
    pub name: String,
    pub kind: BindingKind,
    pub instance: Arc<dyn Toolset>,
}

impl std::fmt::Debug for ToolsetBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsetBinding")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A toolset as one worker sees it: the shared instance, or a per-worker
/// wrapper around it.
#[derive(Clone)]
pub struct ActiveToolset {
    pub name: String,
    pub kind: BindingKind,
    pub instance: Arc<dyn Toolset>,
}

impl std::fmt::Debug for ActiveToolset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveToolset")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A tool name hidden by an earlier toolset in the same worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowedTool {
    pub tool: String,
    /// Toolset whose tool is used.
    pub winner: String,
    /// Toolset whose tool is unreachable.
    pub shadowed: String,
}

/// A worker with its toolset references bound.
#[derive(Debug, Clone)]
pub struct ResolvedWorker {
    pub spec: Arc<WorkerSpec>,
    toolsets: Vec<ActiveToolset>,
    tool_index: BTreeMap<String, usize>,
    schemas: Vec<ToolSchema>,
    shadowed: Vec<ShadowedTool>,
}

impl ResolvedWorker {
    pub(crate) fn new(spec: Arc<WorkerSpec>, toolsets: Vec<ActiveToolset>) -> Self {
        let mut tool_index = BTreeMap::new();
        let mut schemas = Vec::new();
        let mut shadowed = Vec::new();
        for (idx, toolset) in toolsets.iter().enumerate() {
            for schema in toolset.instance.tools() {
                match tool_index.get(&schema.name).copied() {
                    Some(winner) => {
                        let winner: &ActiveToolset = &toolsets[winner];
                        shadowed.push(ShadowedTool {
                            tool: schema.name.clone(),
                            winner: winner.name.clone(),
                            shadowed: toolset.name.clone(),
                        });
                    }
                    None => {
                        tool_index.insert(schema.name.clone(), idx);
                        schemas.push(schema);
                    }
                }
            }
        }
        Self {
            spec,
            toolsets,
            tool_index,
            schemas,
            shadowed,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn toolsets(&self) -> &[ActiveToolset] {
        &self.toolsets
    }

    /// The toolset that answers `tool`; the first declared one wins.
    pub fn lookup(&self, tool: &str) -> Option<&ActiveToolset> {
        self.tool_index.get(tool).map(|&i| &self.toolsets[i])
    }

    /// Reachable tools in declaration order.
    pub fn tool_schemas(&self) -> &[ToolSchema] {
        &self.schemas
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.schemas.iter().map(|s| s.name.clone()).collect()
    }

    pub fn shadowed_tools(&self) -> &[ShadowedTool] {
        &self.shadowed
    }
}

/// Every symbol and every worker, fully linked. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub(crate) bindings: BTreeMap<String, ToolsetBinding>,
    pub(crate) workers: BTreeMap<String, ResolvedWorker>,
}

impl SymbolTable {
    pub fn binding(&self, name: &str) -> Option<&ToolsetBinding> {
        self.bindings.get(name)
    }

    pub fn worker(&self, name: &str) -> Option<&ResolvedWorker> {
        self.workers.get(name)
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    /// A structural summary: bindings, worker toolsets, reachable tools and
    /// shadowing. Equal inputs produce equal summaries.
    pub fn describe(&self) -> Value {
        let bindings: Vec<Value> = self
            .bindings
            .values()
            .map(|b| {
                let tools: Vec<String> = b.instance.tools().into_iter().map(|t| t.name).collect();
                json!({"name": b.name, "kind": b.kind, "tools": tools})
            })
            .collect();
        let workers: Vec<Value> = self
            .workers
            .values()
            .map(|w| {
                let toolsets: Vec<Value> = w
                    .toolsets
                    .iter()
                    .map(|t| json!({"name": t.name, "kind": t.kind}))
                    .collect();
                json!({
                    "name": w.name(),
                    "toolsets": toolsets,
                    "tools": w.tool_names(),
                    "shadowed": w.shadowed,
                    "sandboxed": w.spec.sandbox.is_some(),
                    "rules": w.spec.rules.len(),
                })
            })
            .collect();
        json!({"bindings": bindings, "workers": workers})
    }
}
