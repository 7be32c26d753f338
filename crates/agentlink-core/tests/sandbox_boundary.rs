//! Integration tests for sandbox path and network validation.

use std::collections::BTreeMap;
use std::path::Path;

use agentlink_core::sandbox::{
    AccessMode, ResourceAccess, RootDeclaration, SandboxBoundary, SandboxDeclaration, SandboxError,
};

fn declaration(roots: &[(&str, &str, AccessMode)], network: bool) -> SandboxDeclaration {
    let roots: BTreeMap<String, RootDeclaration> = roots
        .iter()
        .map(|(name, root, mode)| {
            (
                name.to_string(),
                RootDeclaration {
                    root: root.into(),
                    mode: *mode,
                    suffixes: None,
                    max_bytes: None,
                },
            )
        })
        .collect();
    SandboxDeclaration { roots, network }
}

fn project(dir: &Path) -> SandboxBoundary {
    std::fs::create_dir_all(dir.join("data/sub")).unwrap();
    std::fs::create_dir_all(dir.join("docs")).unwrap();
    std::fs::write(dir.join("data/sub/ok.txt"), "ok").unwrap();
    std::fs::write(dir.join("secret"), "s").unwrap();
    SandboxBoundary::from_declaration(
        &declaration(
            &[("data", "data", AccessMode::ReadWrite), ("docs", "docs", AccessMode::ReadOnly)],
            false,
        ),
        dir,
    )
    .unwrap()
}

// ── Write outside the root ──

#[test]
fn write_to_parent_is_not_in_sandbox_and_lists_roots() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = project(dir.path());
    let err = sandbox
        .authorize(&ResourceAccess::Write {
            path: "../secret".into(),
            bytes: 1,
        })
        .unwrap_err();
    match &err {
        SandboxError::PathNotInSandbox {
            path,
            allowed_roots,
        } => {
            assert_eq!(path, "../secret");
            assert!(allowed_roots.iter().any(|r| r.starts_with("data (")));
        }
        other => panic!("expected PathNotInSandbox, got {other:?}"),
    }
    let data = dir.path().canonicalize().unwrap().join("data");
    assert!(err.to_string().contains(&data.display().to_string()));
}

// ── Non-escape ──

#[test]
fn resolved_paths_never_leave_the_roots() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = project(dir.path());
    #[cfg(unix)]
    std::os::unix::fs::symlink(dir.path(), dir.path().join("data/escape")).unwrap();

    let roots: Vec<_> = sandbox.roots().iter().map(|r| r.path.clone()).collect();
    let candidates = [
        "sub/ok.txt",
        "sub/new/file.txt",
        "./sub/../sub/ok.txt",
        "../secret",
        "../../../../etc/passwd",
        "/etc/passwd",
        "sub/../../secret",
        "missing/../../secret",
        "escape/secret",
        "escape",
        "escape/data/sub/ok.txt",
        "",
        ".",
    ];
    for raw in candidates {
        match sandbox.resolve(raw) {
            Ok(resolved) => assert!(
                roots.iter().any(|root| resolved.path.starts_with(root)),
                "{raw} resolved outside the sandbox: {}",
                resolved.path.display()
            ),
            Err(SandboxError::PathNotInSandbox { .. }) => {}
            Err(other) => panic!("{raw}: unexpected error {other:?}"),
        }
    }

    assert!(sandbox.resolve("../secret").is_err());
    assert!(sandbox.resolve("escape/secret").is_err());
}

#[test]
fn read_only_root_rejects_writes_and_names_writable_roots() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = project(dir.path());
    let docs = dir.path().canonicalize().unwrap().join("docs");
    let target = docs.join("a.md").display().to_string();
    let err = sandbox
        .authorize(&ResourceAccess::Write {
            path: target,
            bytes: 1,
        })
        .unwrap_err();
    match err {
        SandboxError::PathNotWritable {
            root,
            writable_roots,
            ..
        } => {
            assert_eq!(root, "docs");
            assert_eq!(writable_roots.len(), 1);
            assert!(writable_roots[0].starts_with("data ("));
        }
        other => panic!("expected PathNotWritable, got {other:?}"),
    }
}

// ── Declaration validation ──

#[test]
fn overlapping_and_missing_roots_are_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
    let nested = declaration(
        &[("outer", "a", AccessMode::ReadOnly), ("inner", "a/b", AccessMode::ReadWrite)],
        false,
    );
    assert!(SandboxBoundary::from_declaration(&nested, dir.path()).is_err());

    let missing = declaration(&[("x", "does-not-exist", AccessMode::ReadOnly)], false);
    assert!(SandboxBoundary::from_declaration(&missing, dir.path()).is_err());
}

#[test]
fn declaration_wire_shape() {
    let decl: SandboxDeclaration = serde_json::from_value(serde_json::json!({
        "roots": {"data": {"root": "./data", "mode": "rw", "suffixes": ["md", ".TXT"], "maxBytes": 1024}},
        "network": false
    }))
    .unwrap();
    let root = &decl.roots["data"];
    assert_eq!(root.mode, AccessMode::ReadWrite);
    assert_eq!(root.max_bytes, Some(1024));

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("data")).unwrap();
    let sandbox = SandboxBoundary::from_declaration(&decl, dir.path()).unwrap();
    assert_eq!(sandbox.roots()[0].allowed_suffixes, vec![".md", ".txt"]);
    assert!(matches!(
        sandbox.authorize(&ResourceAccess::Write {
            path: "notes.rs".into(),
            bytes: 1
        }),
        Err(SandboxError::SuffixNotAllowed { .. })
    ));
    assert!(sandbox
        .authorize(&ResourceAccess::Write {
            path: "notes.MD".into(),
            bytes: 1
        })
        .is_ok());
}

// ── Dangling symlinks ──

#[cfg(unix)]
#[test]
fn dangling_symlink_is_judged_by_its_target() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let sandbox = project(dir.path());
    let data = dir.path().join("data");
    let escape = outside.path().join("pwned.txt");
    std::os::unix::fs::symlink(&escape, data.join("link")).unwrap();
    std::os::unix::fs::symlink("sub/new.txt", data.join("alias")).unwrap();

    let err = sandbox
        .authorize(&ResourceAccess::Write {
            path: "link".into(),
            bytes: 1,
        })
        .unwrap_err();
    assert!(matches!(err, SandboxError::PathNotInSandbox { .. }), "{err}");
    assert!(!escape.exists());

    let granted = sandbox
        .authorize(&ResourceAccess::Write {
            path: "alias".into(),
            bytes: 1,
        })
        .unwrap();
    let path = granted.path().unwrap();
    assert_eq!(path.root, "data");
    assert_eq!(path.path, data.canonicalize().unwrap().join("sub/new.txt"));
}

// ── Network ──

#[test]
fn network_screen_covers_every_command_segment() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = project(dir.path());
    for command in [
        "cd . && curl https://example.com",
        "ls | nc example.com 80",
        "echo \"$(wget -qO- example.com)\"",
        "bash -c 'true; ssh example.com'",
    ] {
        let err = sandbox
            .authorize(&ResourceAccess::Command {
                command: command.into(),
            })
            .unwrap_err();
        assert!(
            matches!(err, SandboxError::NetworkDisabled { .. }),
            "{command}: {err}"
        );
    }
    assert!(sandbox
        .authorize(&ResourceAccess::Command {
            command: "git log --grep curl && ls".into(),
        })
        .is_ok());
}

#[test]
fn network_flag_gates_network_access() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("data")).unwrap();
    let offline = SandboxBoundary::from_declaration(
        &declaration(&[("data", "data", AccessMode::ReadWrite)], false),
        dir.path(),
    )
    .unwrap();
    let err = offline
        .authorize(&ResourceAccess::Network {
            host: "example.com".into(),
        })
        .unwrap_err();
    assert!(matches!(err, SandboxError::NetworkDisabled { .. }));
    assert!(err.to_string().contains("data ("));

    let online = SandboxBoundary::from_declaration(
        &declaration(&[("data", "data", AccessMode::ReadWrite)], true),
        dir.path(),
    )
    .unwrap();
    assert!(online
        .authorize(&ResourceAccess::Network {
            host: "example.com".into()
        })
        .is_ok());
}
