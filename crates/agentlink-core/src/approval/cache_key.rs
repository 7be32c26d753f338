//! Session cache keys for approval decisions.

use serde_json::{json, Value};

use crate::digest::compute_digest;

/// Key a call by toolset, tool and the *full* canonical arguments.
///
/// Must never be computed from the redacted preview.
pub fn cache_key(toolset: &str, tool: &str, args: &Value) -> String {
    compute_digest(&json!({
        "toolset": toolset,
        "tool": tool,
        "args": args,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::redact::redact_args;

    #[test]
    fn test_order_independent() {
        let a = cache_key("fs", "write_file", &json!({"path": "x", "content": "y"}));
        let b = cache_key("fs", "write_file", &json!({"content": "y", "path": "x"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_tool_and_toolset_participate() {
        let args = json!({"path": "x"});
        assert_ne!(cache_key("fs", "read_file", &args), cache_key("fs", "write_file", &args));
        assert_ne!(cache_key("fs", "read_file", &args), cache_key("fs2", "read_file", &args));
    }

    #[test]
    fn test_secrets_differ_even_when_previews_match() {
        let a = json!({"token": "one", "q": "x"});
        let b = json!({"token": "two", "q": "x"});
        assert_eq!(redact_args(&a).value, redact_args(&b).value);
        assert_ne!(cache_key("http", "get", &a), cache_key("http", "get", &b));
    }
}
