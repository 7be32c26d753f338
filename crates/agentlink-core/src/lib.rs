//! agentlink core library.
//!
//! A runtime for trees of LLM-driven workers: toolset linking, isolated
//! call frames, human approval of effectful tool calls, and sandbox
//! validation of filesystem and network access.
//!
//! ```text
//! ProjectConfig ──validate──▶ WorkerSpec ──resolve──▶ SymbolTable
//!                                                         │
//!        RuntimeContext (settings, broker, model, sink) ──┤
//!                                                         ▼
//!                               execute(entry, input) ─▶ CallFrame tree
//! ```

pub mod approval;
pub mod cancel;
pub mod config;
pub mod digest;
pub mod events;
pub mod obs;
pub mod resolver;
pub mod runtime;
pub mod sandbox;
pub mod telemetry;
pub mod toolset;

pub use approval::{
    ApprovalBroker, ApprovalDecision, ApprovalError, ApprovalMode, ApprovalRequest,
    ApprovalState, RespondOutcome, RuleDecision, RuleDeclaration, RuleSet, ToolApprovalOverride,
    ToolClassification,
};
pub use cancel::{CancelHandle, CancelSignal};
pub use config::{base_dir_of, ConfigError, ProjectConfig, RuntimeSettings};
pub use digest::compute_digest;
pub use events::{ChannelSink, EventSink, NullSink, RuntimeEvent, TracingSink};
pub use resolver::{
    resolve, BindingKind, LinkError, ResolvedWorker, ShadowedTool, SymbolTable, ToolsetDeclaration,
    ToolsetRef, WorkerDeclaration, WorkerSpec,
};
pub use runtime::{
    execute, CallOutcome, FrameState, Model, ModelTurn, Runtime, RuntimeContext, RuntimeError,
    ScriptedModel, ToolCallRequest,
};
pub use sandbox::{AccessMode, NetworkPolicy, SandboxBoundary, SandboxDeclaration, SandboxError};
pub use toolset::{ToolContext, ToolError, ToolSchema, Toolset, ToolsetCatalog, ToolsetFactory};

/// Crate version, for `--version` output and event metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
