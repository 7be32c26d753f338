//! Capability rules: declarative allow / require-approval / deny policy.
//!
//! Precedence among matching rules: the most specific resource scope wins,
//! then the higher `priority`, then the earlier declaration.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::error::{ConfigError, ConfigResult};
use crate::sandbox::access::ResourceRef;
use crate::sandbox::path::canonicalize_lossy;

/// What a matching rule decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleDecision {
    Allow,
    RequireApproval,
    Deny,
}

impl std::fmt::Display for RuleDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleDecision::Allow => write!(f, "allow"),
            RuleDecision::RequireApproval => write!(f, "requireApproval"),
            RuleDecision::Deny => write!(f, "deny"),
        }
    }
}

/// Wire shape of a capability rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDeclaration {
    pub pattern: String,
    #[serde(
        default,
        rename = "resourceScope",
        alias = "resource_scope",
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_scope: Option<String>,
    pub decision: RuleDecision,
    #[serde(default)]
    pub priority: i32,
}

/// A rule's resource scope: a path prefix or a resource class
/// (`class:filesystem`, `class:network`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceScope {
    Path(PathBuf),
    Class(String),
}

impl ResourceScope {
    fn parse(raw: &str, base_dir: &Path) -> ConfigResult<Self> {
        if let Some(class) = raw.strip_prefix("class:") {
            return match class {
                "filesystem" | "network" => Ok(ResourceScope::Class(class.to_string())),
                other => Err(ConfigError::InvalidRule {
                    pattern: raw.to_string(),
                    reason: format!(
                        "unknown resource class '{other}'; known classes: filesystem, network"
                    ),
                }),
            };
        }
        let raw_path = Path::new(raw);
        let anchored = if raw_path.is_absolute() {
            raw_path.to_path_buf()
        } else {
            base_dir.join(raw_path)
        };
        let path = canonicalize_lossy(&anchored).unwrap_or(anchored);
        Ok(ResourceScope::Path(path))
    }

    fn matches(&self, resource: Option<&ResourceRef>) -> bool {
        match (self, resource) {
            (ResourceScope::Path(prefix), Some(ResourceRef::Path(p))) => p.starts_with(prefix),
            (ResourceScope::Class(class), Some(r)) => r.class() == class,
            _ => false,
        }
    }

    /// Path scopes outrank class scopes; deeper paths outrank shallower ones.
    fn specificity(&self) -> usize {
        match self {
            ResourceScope::Class(_) => 1,
            ResourceScope::Path(p) => 2 + p.components().count(),
        }
    }
}

#[derive(Debug, Clone)]
enum Pattern {
    /// Exact subject, or a whitespace-delimited prefix of it
    /// (`git status` matches `git status -s`, not `git statusx`).
    Prefix(String),
    /// `*` and `?` wildcards, anchored at both ends.
    Glob(Regex),
}

impl Pattern {
    fn compile(raw: &str) -> ConfigResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidRule {
                pattern: raw.to_string(),
                reason: "pattern must not be empty".into(),
            });
        }
        if !trimmed.contains(['*', '?']) {
            return Ok(Pattern::Prefix(trimmed.to_string()));
        }
        let mut re = String::from("^");
        for ch in trimmed.chars() {
            match ch {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                other => re.push_str(&regex::escape(&other.to_string())),
            }
        }
        re.push('$');
        Regex::new(&re)
            .map(Pattern::Glob)
            .map_err(|e| ConfigError::InvalidRule {
                pattern: raw.to_string(),
                reason: e.to_string(),
            })
    }

    fn matches(&self, subject: &str) -> bool {
        match self {
            Pattern::Prefix(p) => {
                subject == p
                    || subject
                        .strip_prefix(p.as_str())
                        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
            }
            Pattern::Glob(re) => re.is_match(subject),
        }
    }
}

/// A compiled capability rule.
#[derive(Debug, Clone)]
pub struct CapabilityRule {
    pub pattern: String,
    pub resource_scope: Option<ResourceScope>,
    pub decision: RuleDecision,
    pub priority: i32,
    matcher: Pattern,
}

impl CapabilityRule {
    /// Compile a declaration. Relative path scopes resolve against `base_dir`.
    pub fn compile(decl: &RuleDeclaration, base_dir: &Path) -> ConfigResult<Self> {
        let matcher = Pattern::compile(&decl.pattern)?;
        let resource_scope = match decl.resource_scope.as_deref() {
            Some(s) if s.trim().is_empty() => {
                return Err(ConfigError::InvalidRule {
                    pattern: decl.pattern.clone(),
                    reason: "resourceScope must not be empty when present".into(),
                })
            }
            Some(s) => Some(ResourceScope::parse(s.trim(), base_dir)?),
            None => None,
        };
        Ok(Self {
            pattern: decl.pattern.trim().to_string(),
            resource_scope,
            decision: decl.decision,
            priority: decl.priority,
            matcher,
        })
    }

    /// Whether the rule applies to any of `subjects` and to `resource`.
    pub fn matches(&self, subjects: &[String], resource: Option<&ResourceRef>) -> bool {
        if !subjects.iter().any(|s| self.matcher.matches(s)) {
            return false;
        }
        match &self.resource_scope {
            Some(scope) => scope.matches(resource),
            None => true,
        }
    }

    fn specificity(&self) -> usize {
        self.resource_scope.as_ref().map_or(0, ResourceScope::specificity)
    }
}

/// The rule that decided an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub pattern: String,
    pub decision: RuleDecision,
    pub index: usize,
}

/// An ordered list of capability rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CapabilityRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile every declaration, failing on the first malformed one.
    pub fn compile(decls: &[RuleDeclaration], base_dir: &Path) -> ConfigResult<Self> {
        let rules = decls
            .iter()
            .map(|d| CapabilityRule::compile(d, base_dir))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn with_rule(mut self, rule: CapabilityRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Patterns of every rule, for actionable error messages.
    pub fn patterns(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|r| format!("{} => {}", r.pattern, r.decision))
            .collect()
    }

    /// Pick the winning rule among those matching.
    pub fn evaluate(&self, subjects: &[String], resource: Option<&ResourceRef>) -> Option<RuleMatch> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(subjects, resource))
            .min_by(|(ia, a), (ib, b)| {
                b.specificity()
                    .cmp(&a.specificity())
                    .then(b.priority.cmp(&a.priority))
                    .then(ia.cmp(ib))
            })
            .map(|(index, r)| RuleMatch {
                pattern: r.pattern.clone(),
                decision: r.decision,
                index,
            })
    }
}
