//! Project files: runtime settings, declared toolsets and workers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use super::settings::RuntimeSettings;
use crate::resolver::declaration::{validate_symbol_name, ToolsetDeclaration, WorkerDeclaration, WorkerSpec};
use crate::resolver::{resolve, LinkResult, SymbolTable};
use crate::toolset::ToolsetCatalog;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub toolsets: Vec<ToolsetDeclaration>,
    #[serde(default)]
    pub workers: Vec<WorkerDeclaration>,
}

/// Directory relative paths in a project file resolve against.
pub fn base_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl ProjectConfig {
    /// Load a `.toml` or `.json` project file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text, path),
            Some("json") => Self::from_json_str(&text, path),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn from_toml_str(text: &str, origin: &Path) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_json_str(text: &str, origin: &Path) -> ConfigResult<Self> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Check settings and names, compile sandboxes and rules.
    pub fn validate(&self, base_dir: &Path) -> ConfigResult<Vec<WorkerSpec>> {
        self.runtime.validate()?;
        for decl in &self.toolsets {
            validate_symbol_name(&decl.name).map_err(|reason| ConfigError::InvalidToolset {
                name: decl.name.clone(),
                reason,
            })?;
        }
        self.workers
            .iter()
            .map(|w| WorkerSpec::from_declaration(w, base_dir))
            .collect()
    }

    /// Validate, then link against `catalog`.
    pub fn link(&self, base_dir: &Path, catalog: &ToolsetCatalog) -> LinkResult<SymbolTable> {
        let specs = self.validate(base_dir)?;
        resolve(&specs, &self.toolsets, catalog)
    }
}
