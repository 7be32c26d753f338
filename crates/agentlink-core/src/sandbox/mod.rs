//! Sandbox boundary: application-level validation of filesystem paths and
//! network access against the roots a worker declares.
//!
//! Process-level enforcement (Seatbelt, bwrap) is a separate layer owned by
//! the host. The checks here stay correct when that layer is absent.
//!
//! # Modules
//!
//! - [`boundary`]: `SandboxBoundary`, root declarations, path resolution
//! - [`access`]: `ResourceAccess` requests and the `GrantedAccess` they yield
//! - [`path`]: canonicalization tolerant of missing leaf segments
//! - [`network`]: `NetworkPolicy`, network program screening
//! - [`command`]: shell command lines split into simple commands
//! - [`error`]: `SandboxError` / `SandboxResult`

pub mod access;
pub mod boundary;
pub mod command;
pub mod error;
pub mod network;
pub mod path;

pub use access::{unsandboxed_resource_ref, GrantedAccess, ResourceAccess, ResourceRef};
pub use boundary::{
    check_suffix, AccessMode, ResolvedPath, RootDeclaration, SandboxBoundary, SandboxDeclaration,
    SandboxRoot,
};
pub use command::{CommandLine, Segment};
pub use error::{SandboxError, SandboxResult};
pub use network::NetworkPolicy;
