//! Toolset factories and the catalog of what a project can link against.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::filesystem::{FilesystemConfig, FilesystemToolset};
use super::shell::{ShellConfig, ShellToolset};
use super::Toolset;

/// Builds a toolset instance from its declared config.
pub trait ToolsetFactory: Send + Sync {
    fn create(&self, config: &Value) -> anyhow::Result<Arc<dyn Toolset>>;
}

impl<F> ToolsetFactory for F
where
    F: Fn(&Value) -> anyhow::Result<Arc<dyn Toolset>> + Send + Sync,
{
    fn create(&self, config: &Value) -> anyhow::Result<Arc<dyn Toolset>> {
        self(config)
    }
}

fn config_or_default<T>(config: &Value) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if config.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(config.clone())?)
}

fn filesystem_factory(config: &Value) -> anyhow::Result<Arc<dyn Toolset>> {
    let config: FilesystemConfig = config_or_default(config)?;
    Ok(Arc::new(FilesystemToolset::new(config)))
}

fn shell_factory(config: &Value) -> anyhow::Result<Arc<dyn Toolset>> {
    let config: ShellConfig = config_or_default(config)?;
    Ok(Arc::new(ShellToolset::new(config)))
}

/// Ready-made toolset instances plus named factories.
///
/// Builtins are linked as shared instances under their own names.
/// Factories produce instances for declared toolsets.
#[derive(Default, Clone)]
pub struct ToolsetCatalog {
    builtins: BTreeMap<String, Arc<dyn Toolset>>,
    factories: BTreeMap<String, Arc<dyn ToolsetFactory>>,
}

impl std::fmt::Debug for ToolsetCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsetCatalog")
            .field("builtins", &self.builtins.keys().collect::<Vec<_>>())
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolsetCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `filesystem` and `shell`, both as builtins with default config and
    /// as factories.
    pub fn standard() -> Self {
        Self::empty()
            .with_builtin("filesystem", Arc::new(FilesystemToolset::default()))
            .with_builtin("shell", Arc::new(ShellToolset::default()))
            .with_factory("filesystem", filesystem_factory)
            .with_factory("shell", shell_factory)
    }

    pub fn with_builtin(mut self, name: impl Into<String>, toolset: Arc<dyn Toolset>) -> Self {
        self.builtins.insert(name.into(), toolset);
        self
    }

    pub fn with_factory(mut self, name: impl Into<String>, factory: impl ToolsetFactory + 'static) -> Self {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn builtins(&self) -> impl Iterator<Item = (&str, &Arc<dyn Toolset>)> {
        self.builtins.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn factory(&self, name: &str) -> Option<&Arc<dyn ToolsetFactory>> {
        self.factories.get(name)
    }

    pub fn factory_names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
