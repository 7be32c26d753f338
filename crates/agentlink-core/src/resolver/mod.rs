//! Toolset resolution: binds worker declarations and toolset factories into
//! a fully linked [`SymbolTable`] before anything executes.
//!
//! # Modules
//!
//! - [`declaration`]: wire shapes and validated `WorkerSpec`
//! - [`link`]: the two-pass `resolve`
//! - [`table`]: `SymbolTable`, `ResolvedWorker`, shadowing report
//! - [`error`]: `LinkError` / `LinkResult`

pub mod declaration;
pub mod error;
pub mod link;
pub mod table;

pub use declaration::{ToolsetDeclaration, ToolsetRef, WorkerDeclaration, WorkerSpec};
pub use error::{LinkError, LinkResult};
pub use link::resolve;
pub use table::{ActiveToolset, BindingKind, ResolvedWorker, ShadowedTool, SymbolTable, ToolsetBinding};
