//! Approval requests, decisions and their wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::cache_key::cache_key;
use super::redact::redact_args;

/// How long an approved decision is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RememberScope {
    Session,
}

/// A pending request for a human or automatic decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub approval_id: Uuid,
    pub tool_name: String,
    pub description: String,
    pub redacted_args: Value,
    pub redactions: Vec<String>,
    pub cache_key: String,
    pub created_at: DateTime<Utc>,
    pub timeout_seconds: u64,
}

impl ApprovalRequest {
    /// Build a request. The cache key comes from the full `args`; only the
    /// preview is redacted.
    pub fn new(
        toolset: &str,
        tool_name: &str,
        description: impl Into<String>,
        args: &Value,
        timeout_seconds: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let redacted = redact_args(args);
        Self {
            approval_id: Uuid::new_v4(),
            tool_name: tool_name.to_string(),
            description: description.into(),
            redacted_args: redacted.value,
            redactions: redacted.redactions,
            cache_key: cache_key(toolset, tool_name, args),
            created_at: now,
            timeout_seconds,
        }
    }

    /// The `approval.requested` event payload.
    pub fn to_event(&self) -> ApprovalRequestedEvent {
        ApprovalRequestedEvent {
            version: 1,
            approval_id: self.approval_id,
            tool_name: self.tool_name.clone(),
            description: self.description.clone(),
            redacted_args: self.redacted_args.clone(),
            redactions: self.redactions.clone(),
            cache_key: self.cache_key.clone(),
            timeout_seconds: self.timeout_seconds,
            created_at: self.created_at,
        }
    }
}

/// Body of the `approval.requested` event; the `type` tag is added by
/// [`crate::events::RuntimeEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequestedEvent {
    pub version: u32,
    pub approval_id: Uuid,
    pub tool_name: String,
    pub description: String,
    pub redacted_args: Value,
    pub redactions: Vec<String>,
    pub cache_key: String,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
}

/// A decision for one approval id. Also the wire shape of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub approval_id: Uuid,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<RememberScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ApprovalDecision {
    pub fn approve(approval_id: Uuid) -> Self {
        Self {
            approval_id,
            approved: true,
            remember: None,
            note: None,
        }
    }

    pub fn approve_for_session(approval_id: Uuid) -> Self {
        Self {
            remember: Some(RememberScope::Session),
            ..Self::approve(approval_id)
        }
    }

    pub fn deny(approval_id: Uuid, note: Option<String>) -> Self {
        Self {
            approval_id,
            approved: false,
            remember: None,
            note,
        }
    }

    pub fn remembers_for_session(&self) -> bool {
        self.approved && self.remember == Some(RememberScope::Session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_redacts_preview_but_keys_full_args() {
        let args = json!({"url": "https://x", "api_key": "sk-live"});
        let req = ApprovalRequest::new("http", "get", "fetch a page", &args, 30, Utc::now());
        assert_eq!(req.redacted_args["api_key"], "[REDACTED]");
        assert_eq!(req.redactions, vec!["$.api_key".to_string()]);
        assert_eq!(req.cache_key, cache_key("http", "get", &args));
    }

    #[test]
    fn test_event_wire_shape() {
        let req = ApprovalRequest::new("fs", "write_file", "write", &json!({}), 5, Utc::now());
        let json = serde_json::to_value(req.to_event()).unwrap();
        for field in [
            "version",
            "approvalId",
            "toolName",
            "description",
            "redactedArgs",
            "redactions",
            "cacheKey",
            "timeoutSeconds",
            "createdAt",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["version"], 1);
    }

    #[test]
    fn test_response_wire_shape() {
        let id = Uuid::new_v4();
        let d: ApprovalDecision = serde_json::from_value(json!({
            "approvalId": id, "approved": true, "remember": "session", "note": "ok"
        }))
        .unwrap();
        assert!(d.remembers_for_session());
        assert_eq!(d.approval_id, id);

        let minimal: ApprovalDecision =
            serde_json::from_value(json!({"approvalId": id, "approved": false})).unwrap();
        assert_eq!(minimal, ApprovalDecision::deny(id, None));
    }
}
