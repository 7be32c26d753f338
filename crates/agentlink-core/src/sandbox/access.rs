//! Resource requests made by tool calls and the access the boundary grants.

use std::path::PathBuf;

use super::boundary::{ResolvedPath, SandboxBoundary};
use super::error::{SandboxError, SandboxResult};
use super::network::network_program;
use super::path::{anchor, canonicalize_lossy};

/// A resource a tool call wants to touch, as declared by its toolset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAccess {
    Read { path: String },
    Write { path: String, bytes: u64 },
    List { path: String },
    Network { host: String },
    /// A subprocess run inside the sandbox.
    Command { command: String },
}

/// The resource as seen by capability-rule scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    Path(PathBuf),
    Network(String),
}

impl ResourceRef {
    pub fn class(&self) -> &'static str {
        match self {
            ResourceRef::Path(_) => "filesystem",
            ResourceRef::Network(_) => "network",
        }
    }
}

/// What a validated access may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantedAccess {
    Path(ResolvedPath),
    Network { host: String },
    Command { cwd: PathBuf, network: bool },
}

impl GrantedAccess {
    pub fn path(&self) -> Option<&ResolvedPath> {
        match self {
            GrantedAccess::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl SandboxBoundary {
    /// Validate `access` against this boundary.
    pub fn authorize(&self, access: &ResourceAccess) -> SandboxResult<GrantedAccess> {
        match access {
            ResourceAccess::Read { path } => {
                let resolved = self.resolve(path)?;
                self.check_suffix(&resolved)?;
                self.check_size(&resolved)?;
                Ok(GrantedAccess::Path(resolved))
            }
            ResourceAccess::Write { path, bytes } => {
                let resolved = self.resolve_for_write(path)?;
                self.check_suffix(&resolved)?;
                self.check_content_size(&resolved, *bytes)?;
                Ok(GrantedAccess::Path(resolved))
            }
            ResourceAccess::List { path } => Ok(GrantedAccess::Path(self.resolve(path)?)),
            ResourceAccess::Network { host } => {
                self.check_network(host)?;
                Ok(GrantedAccess::Network { host: host.clone() })
            }
            ResourceAccess::Command { command } => {
                if let Some(program) = network_program(command) {
                    self.check_network(program)?;
                }
                let root = self.default_root().ok_or_else(|| SandboxError::PathNotInSandbox {
                    path: ".".into(),
                    allowed_roots: Vec::new(),
                })?;
                Ok(GrantedAccess::Command {
                    cwd: root.path.clone(),
                    network: self.network().is_enabled(),
                })
            }
        }
    }

    /// Best-effort view of `access` for rule matching. Performs no
    /// enforcement; [`SandboxBoundary::authorize`] does that afterwards.
    pub fn resource_ref(&self, access: &ResourceAccess) -> Option<ResourceRef> {
        match access {
            ResourceAccess::Read { path }
            | ResourceAccess::Write { path, .. }
            | ResourceAccess::List { path } => {
                let anchored = match self.default_root() {
                    Some(root) => anchor(&root.path, path),
                    None => PathBuf::from(path),
                };
                Some(ResourceRef::Path(
                    canonicalize_lossy(&anchored).unwrap_or(anchored),
                ))
            }
            ResourceAccess::Network { host } => Some(ResourceRef::Network(host.clone())),
            ResourceAccess::Command { .. } => None,
        }
    }
}

/// [`SandboxBoundary::resource_ref`] for workers that declare no sandbox.
pub fn unsandboxed_resource_ref(access: &ResourceAccess) -> Option<ResourceRef> {
    match access {
        ResourceAccess::Read { path }
        | ResourceAccess::Write { path, .. }
        | ResourceAccess::List { path } => Some(ResourceRef::Path(PathBuf::from(path))),
        ResourceAccess::Network { host } => Some(ResourceRef::Network(host.clone())),
        ResourceAccess::Command { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::boundary::{AccessMode, SandboxRoot};
    use crate::sandbox::network::NetworkPolicy;

    fn boundary(dir: &std::path::Path, mode: AccessMode, network: bool) -> SandboxBoundary {
        SandboxBoundary::new(
            vec![SandboxRoot {
                name: "work".into(),
                path: dir.canonicalize().unwrap(),
                mode,
                allowed_suffixes: vec![".txt".into()],
                max_bytes: Some(8),
            }],
            NetworkPolicy::from_flag(network),
        )
    }

    #[test]
    fn test_write_checks_mode_suffix_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let rw = boundary(dir.path(), AccessMode::ReadWrite, false);
        assert!(rw
            .authorize(&ResourceAccess::Write {
                path: "a.txt".into(),
                bytes: 4
            })
            .is_ok());
        assert!(matches!(
            rw.authorize(&ResourceAccess::Write {
                path: "a.bin".into(),
                bytes: 4
            }),
            Err(SandboxError::SuffixNotAllowed { .. })
        ));
        assert!(matches!(
            rw.authorize(&ResourceAccess::Write {
                path: "a.txt".into(),
                bytes: 9
            }),
            Err(SandboxError::FileTooLarge { .. })
        ));

        let ro = boundary(dir.path(), AccessMode::ReadOnly, false);
        assert!(matches!(
            ro.authorize(&ResourceAccess::Write {
                path: "a.txt".into(),
                bytes: 1
            }),
            Err(SandboxError::PathNotWritable { .. })
        ));
    }

    #[test]
    fn test_command_runs_in_default_root_and_screens_network() {
        let dir = tempfile::tempdir().unwrap();
        let offline = boundary(dir.path(), AccessMode::ReadWrite, false);
        match offline
            .authorize(&ResourceAccess::Command {
                command: "ls -la".into(),
            })
            .unwrap()
        {
            GrantedAccess::Command { cwd, network } => {
                assert_eq!(cwd, dir.path().canonicalize().unwrap());
                assert!(!network);
            }
            other => panic!("expected command grant, got {other:?}"),
        }
        assert!(matches!(
            offline.authorize(&ResourceAccess::Command {
                command: "curl https://example.com".into()
            }),
            Err(SandboxError::NetworkDisabled { .. })
        ));
        match offline.authorize(&ResourceAccess::Command {
            command: "cd . && curl https://example.com".into(),
        }) {
            Err(SandboxError::NetworkDisabled { target, .. }) => assert_eq!(target, "curl"),
            other => panic!("expected NetworkDisabled, got {other:?}"),
        }
        let online = boundary(dir.path(), AccessMode::ReadWrite, true);
        assert!(online
            .authorize(&ResourceAccess::Command {
                command: "curl https://example.com".into()
            })
            .is_ok());
    }

    #[test]
    fn test_resource_ref_anchors_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sb = boundary(dir.path(), AccessMode::ReadWrite, false);
        let r = sb
            .resource_ref(&ResourceAccess::Read {
                path: "x.txt".into(),
            })
            .unwrap();
        assert_eq!(r, ResourceRef::Path(dir.path().canonicalize().unwrap().join("x.txt")));
        assert_eq!(
            sb.resource_ref(&ResourceAccess::Network {
                host: "h".into()
            }),
            Some(ResourceRef::Network("h".into()))
        );
    }
}
