//! Two-pass linking of workers and toolsets into a [`SymbolTable`].
//!
//! Pass 1 registers every symbol (builtins, declared toolsets, workers)
//! without looking at references, so forward and self references are
//! legal. Pass 2 binds each worker's toolset references against the
//! complete table. Nothing here performs I/O beyond what a factory does,
//! and no approval policy is evaluated.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::declaration::{ToolsetDeclaration, WorkerSpec};
use super::error::{LinkError, LinkResult};
use super::table::{ActiveToolset, BindingKind, ResolvedWorker, SymbolTable, ToolsetBinding};
use crate::obs;
use crate::toolset::{ConfiguredToolset, Toolset, ToolsetCatalog, WorkerToolset};

fn register(
    bindings: &mut BTreeMap<String, ToolsetBinding>,
    name: &str,
    kind: BindingKind,
    instance: Arc<dyn Toolset>,
) -> LinkResult<()> {
    if let Some(existing) = bindings.get(name) {
        return Err(LinkError::DuplicateSymbol {
            name: name.to_string(),
            first: existing.kind,
            second: kind,
        });
    }
    bindings.insert(
        name.to_string(),
        ToolsetBinding {
            name: name.to_string(),
            kind,
            instance,
        },
    );
    Ok(())
}

/// Link `workers` and `toolsets` against `catalog`.
///
/// Deterministic: the same inputs always produce the same table.
pub fn resolve(
    workers: &[WorkerSpec],
    toolsets: &[ToolsetDeclaration],
    catalog: &ToolsetCatalog,
) -> LinkResult<SymbolTable> {
    // Pass 1: symbols.
    let mut bindings = BTreeMap::new();
    for (name, instance) in catalog.builtins() {
        register(&mut bindings, name, BindingKind::Builtin, instance.clone())?;
    }
    for decl in toolsets {
        let factory = catalog
            .factory(&decl.factory)
            .ok_or_else(|| LinkError::UnknownFactory {
                toolset: decl.name.clone(),
                factory: decl.factory.clone(),
                available: catalog.factory_names(),
            })?;
        let instance = factory
            .create(&decl.config)
            .map_err(|e| LinkError::Factory {
                toolset: decl.name.clone(),
                factory: decl.factory.clone(),
                reason: format!("{e:#}"),
            })?;
        register(&mut bindings, &decl.name, BindingKind::Factory, instance)?;
    }
    for spec in workers {
        let instance: Arc<dyn Toolset> = Arc::new(WorkerToolset::new(&spec.name, &spec.description));
        register(&mut bindings, &spec.name, BindingKind::WorkerRef, instance)?;
    }

    // Pass 2: references.
    let mut resolved = BTreeMap::new();
    for spec in workers {
        let mut active = Vec::with_capacity(spec.toolsets.len());
        for reference in &spec.toolsets {
            let binding = bindings
                .get(&reference.name)
                .ok_or_else(|| LinkError::UnresolvedSymbol {
                    name: reference.name.clone(),
                    referenced_by: spec.name.clone(),
                    available: bindings.keys().cloned().collect(),
                })?;

            let instance = if reference.approval.is_empty() {
                binding.instance.clone()
            } else {
                for tool in reference.approval.keys() {
                    if !binding.instance.has_tool(tool) {
                        return Err(LinkError::UnknownOverride {
                            worker: spec.name.clone(),
                            toolset: reference.name.clone(),
                            tool: tool.clone(),
                            available: binding.instance.tools().into_iter().map(|t| t.name).collect(),
                        });
                    }
                }
                Arc::new(ConfiguredToolset::new(
                    binding.instance.clone(),
                    reference.approval.clone(),
                )) as Arc<dyn Toolset>
            };
            active.push(ActiveToolset {
                name: binding.name.clone(),
                kind: binding.kind,
                instance,
            });
        }

        let worker = ResolvedWorker::new(Arc::new(spec.clone()), active);
        for s in worker.shadowed_tools() {
            obs::emit_tool_shadowed(&spec.name, &s.tool, &s.winner, &s.shadowed);
        }
        resolved.insert(spec.name.clone(), worker);
    }

    Ok(SymbolTable {
        bindings,
        workers: resolved,
    })
}
