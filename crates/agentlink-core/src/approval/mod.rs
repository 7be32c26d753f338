//! Approval broker: capability evaluation, blocking decisions, session memory
//! and redaction for every effectful call.
//!
//! # Modules
//!
//! - [`rule`]: `CapabilityRule`, `RuleSet` (most-specific-wins)
//! - [`policy`]: evaluation order, `ToolClassification`, `ApprovalMode`
//! - [`request`]: `ApprovalRequest`, `ApprovalDecision`, event payload
//! - [`broker`]: `ApprovalBroker` suspend/resume state machine
//! - [`memory`]: session-scoped decision memory
//! - [`redact`]: preview redaction
//! - [`cache_key`]: canonical cache keys
//! - [`error`]: `ApprovalError` / `ApprovalResult`

pub mod broker;
pub mod cache_key;
pub mod error;
pub mod memory;
pub mod policy;
pub mod redact;
pub mod request;
pub mod rule;

pub use broker::{ApprovalBroker, ApprovalHandle, ApprovalState, RespondOutcome};
pub use cache_key::cache_key;
pub use error::{ApprovalError, ApprovalResult};
pub use memory::SessionMemory;
pub use policy::{
    apply_mode, evaluate_call, AllowBasis, ApprovalCall, ApprovalMode, PolicyVerdict,
    ToolApprovalOverride, ToolClassification,
};
pub use redact::{redact_args, Redacted};
pub use request::{ApprovalDecision, ApprovalRequest, ApprovalRequestedEvent, RememberScope};
pub use rule::{CapabilityRule, RuleDecision, RuleDeclaration, RuleSet};
