//! Declared filesystem roots and network flag for one worker.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::error::{ConfigError, ConfigResult};

use super::error::{SandboxError, SandboxResult};
use super::network::NetworkPolicy;
use super::path::{anchor, canonicalize_lossy};

/// Access mode of a sandbox root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    #[serde(rename = "ro")]
    ReadOnly,
    #[serde(rename = "rw")]
    ReadWrite,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::ReadOnly => write!(f, "ro"),
            AccessMode::ReadWrite => write!(f, "rw"),
        }
    }
}

/// Wire shape of one root in a sandbox declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDeclaration {
    pub root: PathBuf,
    pub mode: AccessMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffixes: Option<Vec<String>>,
    #[serde(default, rename = "maxBytes", alias = "max_bytes", skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
}

/// Wire shape of a sandbox declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxDeclaration {
    #[serde(default)]
    pub roots: BTreeMap<String, RootDeclaration>,
    #[serde(default)]
    pub network: bool,
}

/// A validated root with its canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRoot {
    pub name: String,
    pub path: PathBuf,
    pub mode: AccessMode,
    /// Lower-cased suffixes with a leading dot. Empty means any suffix.
    pub allowed_suffixes: Vec<String>,
    pub max_bytes: Option<u64>,
}

impl SandboxRoot {
    fn describe(&self) -> String {
        format!("{} ({}, {})", self.name, self.path.display(), self.mode)
    }
}

/// A path that passed [`SandboxBoundary::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonical absolute path.
    pub path: PathBuf,
    /// Name of the single root that owns the path.
    pub root: String,
}

/// The filesystem and network boundary a worker's resource access is held to.
///
/// Validation only: nothing here touches the filesystem except to resolve
/// paths and read file metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxBoundary {
    roots: Vec<SandboxRoot>,
    network: NetworkPolicy,
}

impl SandboxBoundary {
    /// Validate a declaration. Relative roots are resolved against `base_dir`.
    ///
    /// Roots must exist and must not nest inside one another, so that every
    /// resolved path belongs to exactly one root.
    pub fn from_declaration(decl: &SandboxDeclaration, base_dir: &Path) -> ConfigResult<Self> {
        let mut roots = Vec::with_capacity(decl.roots.len());
        for (name, root) in &decl.roots {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidSandboxRoot {
                    name: name.clone(),
                    reason: "root name must not be empty".into(),
                });
            }
            let raw = if root.root.is_absolute() {
                root.root.clone()
            } else {
                base_dir.join(&root.root)
            };
            let path = raw.canonicalize().map_err(|e| ConfigError::InvalidSandboxRoot {
                name: name.clone(),
                reason: format!("{}: {e}", raw.display()),
            })?;
            if !path.is_dir() {
                return Err(ConfigError::InvalidSandboxRoot {
                    name: name.clone(),
                    reason: format!("{} is not a directory", path.display()),
                });
            }
            let allowed_suffixes = root
                .suffixes
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|s| normalize_suffix(s))
                .collect();
            roots.push(SandboxRoot {
                name: name.clone(),
                path,
                mode: root.mode,
                allowed_suffixes,
                max_bytes: root.max_bytes,
            });
        }

        for (i, a) in roots.iter().enumerate() {
            for b in roots.iter().skip(i + 1) {
                if a.path.starts_with(&b.path) || b.path.starts_with(&a.path) {
                    return Err(ConfigError::InvalidSandboxRoot {
                        name: b.name.clone(),
                        reason: format!("overlaps root '{}' ({})", a.name, a.path.display()),
                    });
                }
            }
        }

        Ok(Self {
            roots,
            network: NetworkPolicy::from_flag(decl.network),
        })
    }

    /// Build a boundary from already-validated roots.
    pub fn new(roots: Vec<SandboxRoot>, network: NetworkPolicy) -> Self {
        Self { roots, network }
    }

    pub fn roots(&self) -> &[SandboxRoot] {
        &self.roots
    }

    pub fn network(&self) -> NetworkPolicy {
        self.network
    }

    /// The root relative paths are anchored at.
    pub fn default_root(&self) -> Option<&SandboxRoot> {
        self.roots.first()
    }

    pub fn root(&self, name: &str) -> Option<&SandboxRoot> {
        self.roots.iter().find(|r| r.name == name)
    }

    /// Human-readable description of every declared root.
    pub fn describe_roots(&self) -> Vec<String> {
        self.roots.iter().map(SandboxRoot::describe).collect()
    }

    pub fn describe_writable_roots(&self) -> Vec<String> {
        self.roots
            .iter()
            .filter(|r| r.mode == AccessMode::ReadWrite)
            .map(SandboxRoot::describe)
            .collect()
    }

    /// Canonicalize `raw` (following symlinks) and find the root owning it.
    ///
    /// Relative paths are anchored at the default root.
    pub fn resolve(&self, raw: &str) -> SandboxResult<ResolvedPath> {
        let not_in_sandbox = || SandboxError::PathNotInSandbox {
            path: raw.to_string(),
            allowed_roots: self.describe_roots(),
        };

        let base = self.default_root().ok_or_else(not_in_sandbox)?;
        let candidate = anchor(&base.path, raw);
        let canonical = match canonicalize_lossy(&candidate) {
            Ok(p) => p,
            Err(_) => return Err(not_in_sandbox()),
        };

        let owner = self
            .roots
            .iter()
            .find(|r| canonical.starts_with(&r.path))
            .ok_or_else(not_in_sandbox)?;

        Ok(ResolvedPath {
            path: canonical,
            root: owner.name.clone(),
        })
    }

    /// Resolve `raw` and require its owning root to be writable.
    pub fn resolve_for_write(&self, raw: &str) -> SandboxResult<ResolvedPath> {
        let resolved = self.resolve(raw)?;
        if !self.can_write(&resolved.path) {
            return Err(SandboxError::PathNotWritable {
                path: raw.to_string(),
                root: resolved.root,
                writable_roots: self.describe_writable_roots(),
            });
        }
        Ok(resolved)
    }

    /// Whether `path` (already canonical) lies in a read-write root.
    pub fn can_write(&self, path: &Path) -> bool {
        self.roots
            .iter()
            .find(|r| path.starts_with(&r.path))
            .is_some_and(|r| r.mode == AccessMode::ReadWrite)
    }

    /// Reject the path unless its suffix is allowed by the owning root.
    pub fn check_suffix(&self, resolved: &ResolvedPath) -> SandboxResult<()> {
        let Some(root) = self.root(&resolved.root) else {
            return Ok(());
        };
        check_suffix(&resolved.path, &root.allowed_suffixes).map_err(|_| {
            SandboxError::SuffixNotAllowed {
                path: resolved.path.display().to_string(),
                root: root.name.clone(),
                allowed_suffixes: root.allowed_suffixes.clone(),
            }
        })
    }

    /// Reject an existing file larger than the owning root's limit.
    pub fn check_size(&self, resolved: &ResolvedPath) -> SandboxResult<()> {
        let Some(max_bytes) = self.root(&resolved.root).and_then(|r| r.max_bytes) else {
            return Ok(());
        };
        match std::fs::metadata(&resolved.path) {
            Ok(meta) if meta.is_file() => self.check_len(resolved, meta.len(), max_bytes),
            _ => Ok(()),
        }
    }

    /// Reject content of `len` bytes destined for `resolved`.
    pub fn check_content_size(&self, resolved: &ResolvedPath, len: u64) -> SandboxResult<()> {
        match self.root(&resolved.root).and_then(|r| r.max_bytes) {
            Some(max_bytes) => self.check_len(resolved, len, max_bytes),
            None => Ok(()),
        }
    }

    fn check_len(&self, resolved: &ResolvedPath, size: u64, max_bytes: u64) -> SandboxResult<()> {
        if size > max_bytes {
            return Err(SandboxError::FileTooLarge {
                path: resolved.path.display().to_string(),
                root: resolved.root.clone(),
                size,
                max_bytes,
            });
        }
        Ok(())
    }

    /// Reject a network access unless the sandbox enables network.
    pub fn check_network(&self, target: &str) -> SandboxResult<()> {
        if self.network.permits(target) {
            Ok(())
        } else {
            Err(SandboxError::NetworkDisabled {
                target: target.to_string(),
                allowed_roots: self.describe_roots(),
            })
        }
    }
}

/// Check `path` against `allowed` suffixes. An empty list allows everything.
///
/// The error carries only the path; [`SandboxBoundary::check_suffix`] adds the
/// owning root.
pub fn check_suffix(path: &Path, allowed: &[String]) -> SandboxResult<()> {
    if allowed.is_empty() {
        return Ok(());
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if allowed.iter().any(|s| name.ends_with(&normalize_suffix(s))) {
        Ok(())
    } else {
        Err(SandboxError::SuffixNotAllowed {
            path: path.display().to_string(),
            root: String::new(),
            allowed_suffixes: allowed.to_vec(),
        })
    }
}

fn normalize_suffix(suffix: &str) -> String {
    let lower = suffix.trim().to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary(dir: &Path, mode: AccessMode, suffixes: Option<Vec<&str>>) -> SandboxBoundary {
        std::fs::create_dir_all(dir.join("data")).unwrap();
        let mut roots = BTreeMap::new();
        roots.insert(
            "data".to_string(),
            RootDeclaration {
                root: PathBuf::from("data"),
                mode,
                suffixes: suffixes.map(|v| v.into_iter().map(String::from).collect()),
                max_bytes: Some(16),
            },
        );
        SandboxBoundary::from_declaration(
            &SandboxDeclaration {
                roots,
                network: false,
            },
            dir,
        )
        .unwrap()
    }

    #[test]
    fn test_relative_path_resolves_inside_default_root() {
        let dir = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadWrite, None);
        let resolved = sb.resolve("notes/today.md").unwrap();
        assert_eq!(resolved.root, "data");
        assert!(resolved.path.starts_with(dir.path().canonicalize().unwrap().join("data")));
    }

    #[test]
    fn test_parent_escape_is_rejected_with_roots_listed() {
        let dir = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadWrite, None);
        match sb.resolve("../secret") {
            Err(SandboxError::PathNotInSandbox { allowed_roots, .. }) => {
                assert_eq!(allowed_roots.len(), 1);
                assert!(allowed_roots[0].starts_with("data ("));
            }
            other => panic!("expected PathNotInSandbox, got {other:?}"),
        }
    }

    #[test]
    fn test_absolute_path_outside_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadWrite, None);
        assert!(matches!(
            sb.resolve("/etc/passwd"),
            Err(SandboxError::PathNotInSandbox { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadWrite, None);
        std::os::unix::fs::symlink(outside.path(), dir.path().join("data").join("link")).unwrap();
        assert!(matches!(
            sb.resolve("link/file.txt"),
            Err(SandboxError::PathNotInSandbox { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadWrite, None);
        let data = dir.path().join("data");
        std::os::unix::fs::symlink(outside.path().join("pwned.txt"), data.join("out")).unwrap();
        std::os::unix::fs::symlink("fresh.txt", data.join("in")).unwrap();

        assert!(matches!(
            sb.resolve_for_write("out"),
            Err(SandboxError::PathNotInSandbox { .. })
        ));
        let inside = sb.resolve_for_write("in").unwrap();
        assert_eq!(inside.path, data.canonicalize().unwrap().join("fresh.txt"));
    }

    #[test]
    fn test_read_only_root_rejects_write() {
        let dir = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadOnly, None);
        assert!(sb.resolve("a.txt").is_ok());
        match sb.resolve_for_write("a.txt") {
            Err(SandboxError::PathNotWritable {
                root,
                writable_roots,
                ..
            }) => {
                assert_eq!(root, "data");
                assert!(writable_roots.is_empty());
            }
            other => panic!("expected PathNotWritable, got {other:?}"),
        }
    }

    #[test]
    fn test_suffix_policy() {
        let dir = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadWrite, Some(vec!["md", ".TXT"]));
        let ok = sb.resolve("a.md").unwrap();
        assert!(sb.check_suffix(&ok).is_ok());
        let upper = sb.resolve("B.txt").unwrap();
        assert!(sb.check_suffix(&upper).is_ok());
        let bad = sb.resolve("run.sh").unwrap();
        match sb.check_suffix(&bad) {
            Err(SandboxError::SuffixNotAllowed {
                root,
                allowed_suffixes,
                ..
            }) => {
                assert_eq!(root, "data");
                assert_eq!(allowed_suffixes, vec![".md".to_string(), ".txt".to_string()]);
            }
            other => panic!("expected SuffixNotAllowed, got {other:?}"),
        }
    }

    #[test]
    fn test_size_limits() {
        let dir = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadWrite, None);
        std::fs::write(dir.path().join("data").join("big.txt"), vec![b'x'; 32]).unwrap();
        let big = sb.resolve("big.txt").unwrap();
        assert!(matches!(
            sb.check_size(&big),
            Err(SandboxError::FileTooLarge { size: 32, max_bytes: 16, .. })
        ));
        let fresh = sb.resolve("fresh.txt").unwrap();
        assert!(sb.check_size(&fresh).is_ok());
        assert!(sb.check_content_size(&fresh, 8).is_ok());
        assert!(sb.check_content_size(&fresh, 17).is_err());
    }

    #[test]
    fn test_network_flag() {
        let dir = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadWrite, None);
        assert!(matches!(
            sb.check_network("example.com"),
            Err(SandboxError::NetworkDisabled { .. })
        ));
    }

    #[test]
    fn test_overlapping_roots_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data").join("inner")).unwrap();
        let mut roots = BTreeMap::new();
        for (name, path) in [("outer", "data"), ("inner", "data/inner")] {
            roots.insert(
                name.to_string(),
                RootDeclaration {
                    root: PathBuf::from(path),
                    mode: AccessMode::ReadOnly,
                    suffixes: None,
                    max_bytes: None,
                },
            );
        }
        let err = SandboxBoundary::from_declaration(
            &SandboxDeclaration {
                roots,
                network: false,
            },
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSandboxRoot { .. }));
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut roots = BTreeMap::new();
        roots.insert(
            "gone".to_string(),
            RootDeclaration {
                root: PathBuf::from("does-not-exist"),
                mode: AccessMode::ReadWrite,
                suffixes: None,
                max_bytes: None,
            },
        );
        let err = SandboxBoundary::from_declaration(
            &SandboxDeclaration {
                roots,
                network: true,
            },
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_declaration_wire_shape() {
        let decl: SandboxDeclaration = serde_json::from_value(serde_json::json!({
            "roots": { "data": { "root": "./data", "mode": "rw", "suffixes": [".md"], "maxBytes": 1024 } },
            "network": false
        }))
        .unwrap();
        let root = &decl.roots["data"];
        assert_eq!(root.mode, AccessMode::ReadWrite);
        assert_eq!(root.max_bytes, Some(1024));
    }
}
