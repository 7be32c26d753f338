//! Path canonicalization that tolerates not-yet-existing leaf segments.
//!
//! Writes target files that do not exist yet, so `fs::canonicalize` alone is
//! not enough. The deepest existing ancestor is canonicalized (following
//! symlinks) and the missing segments are re-appended verbatim. Missing
//! segments may not contain `..` because nothing on disk can resolve them.
//!
//! A dangling symlink is an entry that exists but whose target does not. Its
//! target is read and resolved in turn, so a write through the link is judged
//! by where it lands.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use super::error::{SandboxError, SandboxResult};

/// Symlink hops followed before giving up, matching the usual `ELOOP` limit.
const MAX_LINK_HOPS: usize = 40;

/// Canonicalize `path`, following symlinks for every existing component.
pub fn canonicalize_lossy(path: &Path) -> SandboxResult<PathBuf> {
    resolve_from(path, path, 0)
}

fn resolve_from(original: &Path, path: &Path, hops: usize) -> SandboxResult<PathBuf> {
    let fail = |reason: String| SandboxError::Resolve {
        path: original.to_path_buf(),
        reason,
    };

    if let Ok(resolved) = path.canonicalize() {
        return Ok(resolved);
    }

    let mut cursor = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        match cursor.symlink_metadata() {
            Ok(meta) if meta.file_type().is_symlink() && !cursor.exists() => {
                if hops >= MAX_LINK_HOPS {
                    return Err(fail("too many levels of symbolic links".into()));
                }
                let target = cursor.read_link().map_err(|e| fail(e.to_string()))?;
                let mut next = match cursor.parent() {
                    Some(parent) => parent.join(target),
                    None => target,
                };
                for part in missing.iter().rev() {
                    next.push(part);
                }
                return resolve_from(original, &next, hops + 1);
            }
            Ok(_) => {
                let mut resolved = cursor.canonicalize().map_err(|e| fail(e.to_string()))?;
                for part in missing.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(_) => {}
        }

        match cursor.components().next_back() {
            Some(Component::Normal(name)) => missing.push(name.to_os_string()),
            Some(Component::CurDir) => {}
            _ => return Err(fail("non-existent path segment cannot be resolved".into())),
        }

        cursor = match cursor.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => return Err(fail("no existing ancestor".into())),
        };
    }
}

/// Join `raw` onto `base` unless it is already absolute.
pub fn anchor(base: &Path, raw: &str) -> PathBuf {
    let candidate = Path::new(raw.trim());
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}
