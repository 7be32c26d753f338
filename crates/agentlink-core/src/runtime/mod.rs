//! Call runtime: executes workers as isolated call frames.
//!
//! Every invocation (root or nested) gets a fresh [`CallFrame`] with its
//! own id, depth, conversation and path. The linked [`SymbolTable`] and
//! the [`RuntimeContext`] are shared read-only.
//!
//! [`SymbolTable`]: crate::resolver::SymbolTable

pub mod context;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod frame;
pub mod model;

pub use context::RuntimeContext;
pub use dispatch::ToolReply;
pub use error::{RuntimeError, RuntimeResult};
pub use executor::{execute, CallOutcome, Runtime};
pub use frame::{CallFrame, CallPath, FrameState, FrameSummary, LocalState};
pub use model::{Message, Model, ModelError, ModelResult, ModelTurn, ScriptedModel, ToolCallRequest};
