//! Approval evaluation for a single tool call.
//!
//! Order of evaluation:
//!
//! 1. static classification from the toolset (`Blocked` always wins)
//! 2. per-worker `pre_approved` override
//! 3. capability rules, most specific first; a deny rule matching any
//!    simple command of a compound command line denies the whole call, and
//!    allow rules never settle a compound command
//! 4. session memory by cache key
//! 5. the toolset's default (`Safe` allows, otherwise approval is required)
//!
//! A `RequiresApproval` verdict is then settled by the [`ApprovalMode`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cache_key::cache_key;
use super::memory::SessionMemory;
use super::rule::{RuleDecision, RuleMatch, RuleSet};
use crate::sandbox::access::ResourceRef;

/// A toolset's own view of how dangerous a call is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolClassification {
    /// Never runs; rules cannot downgrade this.
    Blocked { reason: String },
    /// Runs without prompting unless a rule says otherwise.
    Safe,
    /// Prompts unless a rule or the session says otherwise.
    NeedsApproval,
}

/// Per-worker approval override for one tool, carried by the reference to a
/// toolset rather than by the (possibly shared) toolset itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolApprovalOverride {
    #[serde(default)]
    pub pre_approved: bool,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// How prompts are settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Suspend and wait for `respond`.
    #[default]
    Prompt,
    /// Approve anything that would prompt.
    ApproveAll,
    /// Deny anything that would prompt.
    RejectAll,
}

/// Everything the broker needs to judge a call.
#[derive(Debug, Clone)]
pub struct ApprovalCall {
    pub toolset: String,
    pub tool_name: String,
    pub args: Value,
    /// Strings matched against rule patterns: the tool name, the qualified
    /// `toolset.tool` name and, for command tools, the command line.
    pub subjects: Vec<String>,
    /// Simple commands of a compound command line; empty otherwise.
    pub segments: Vec<String>,
    pub resource: Option<ResourceRef>,
    pub classification: ToolClassification,
    pub pre_approved: bool,
    pub description: String,
}

impl ApprovalCall {
    pub fn cache_key(&self) -> String {
        cache_key(&self.toolset, &self.tool_name, &self.args)
    }

    pub fn is_compound(&self) -> bool {
        !self.segments.is_empty()
    }

    fn segment_subjects(&self, segment: &str) -> Vec<String> {
        vec![
            self.tool_name.clone(),
            format!("{}.{}", self.toolset, self.tool_name),
            segment.to_string(),
        ]
    }
}

/// Why a call was allowed without prompting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowBasis {
    PreApproved,
    Rule { pattern: String },
    Remembered,
    Classification,
    Mode,
}

/// Outcome of evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    Allowed { basis: AllowBasis },
    Blocked { reason: String },
    Denied { reason: String },
    RequiresApproval { reason: String },
}

impl PolicyVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyVerdict::Allowed { .. })
    }
}

/// Evaluate `call` in evaluation order; does not apply the mode.
pub fn evaluate_call(call: &ApprovalCall, rules: &RuleSet, memory: &SessionMemory) -> PolicyVerdict {
    if let ToolClassification::Blocked { reason } = &call.classification {
        return PolicyVerdict::Blocked {
            reason: reason.clone(),
        };
    }

    if call.pre_approved {
        return PolicyVerdict::Allowed {
            basis: AllowBasis::PreApproved,
        };
    }

    for segment in &call.segments {
        let subjects = call.segment_subjects(segment);
        if let Some(m) = rules
            .evaluate(&subjects, call.resource.as_ref())
            .filter(|m| m.decision == RuleDecision::Deny)
        {
            return denied(&m, segment, rules);
        }
    }

    let rule = rules.evaluate(&call.subjects, call.resource.as_ref());
    match &rule {
        Some(m) if m.decision == RuleDecision::Allow && !call.is_compound() => {
            return PolicyVerdict::Allowed {
                basis: AllowBasis::Rule {
                    pattern: m.pattern.clone(),
                },
            }
        }
        Some(m) if m.decision == RuleDecision::Deny => {
            return denied(m, &call.tool_name, rules);
        }
        _ => {}
    }

    if memory
        .lookup(&call.cache_key())
        .is_some_and(|d| d.approved)
    {
        return PolicyVerdict::Allowed {
            basis: AllowBasis::Remembered,
        };
    }

    match (&rule, &call.classification) {
        (Some(m), _) if m.decision == RuleDecision::Allow => PolicyVerdict::RequiresApproval {
            reason: format!(
                "compound command; rule '{}' covers a single command",
                m.pattern
            ),
        },
        (Some(m), _) => PolicyVerdict::RequiresApproval {
            reason: format!("capability rule '{}' requires approval", m.pattern),
        },
        (None, ToolClassification::Safe) => PolicyVerdict::Allowed {
            basis: AllowBasis::Classification,
        },
        (None, _) => PolicyVerdict::RequiresApproval {
            reason: format!("{} requires approval by default", call.tool_name),
        },
    }
}

fn denied(m: &RuleMatch, target: &str, rules: &RuleSet) -> PolicyVerdict {
    let allowed: Vec<String> = rules
        .patterns()
        .into_iter()
        .filter(|p| p.ends_with("=> allow"))
        .collect();
    PolicyVerdict::Denied {
        reason: format!(
            "capability rule '{}' denies {}; rules that allow: {}",
            m.pattern,
            target,
            if allowed.is_empty() {
                "(none)".to_string()
            } else {
                allowed.join(", ")
            }
        ),
    }
}

/// Settle a `RequiresApproval` verdict without a human when the mode allows.
pub fn apply_mode(verdict: PolicyVerdict, mode: ApprovalMode) -> PolicyVerdict {
    match (verdict, mode) {
        (PolicyVerdict::RequiresApproval { .. }, ApprovalMode::ApproveAll) => {
            PolicyVerdict::Allowed {
                basis: AllowBasis::Mode,
            }
        }
        (PolicyVerdict::RequiresApproval { reason }, ApprovalMode::RejectAll) => {
            PolicyVerdict::Denied {
                reason: format!("{reason}; approval mode is reject_all"),
            }
        }
        (other, _) => other,
    }
}
