//! Session-scoped memory of approved decisions.

use std::collections::HashMap;
use std::sync::Mutex;

use super::request::ApprovalDecision;

/// Remembered decisions keyed by cache key. Lives as long as one runtime
/// session and is the only broker state that outlives a call.
#[derive(Debug, Default)]
pub struct SessionMemory {
    entries: Mutex<HashMap<String, ApprovalDecision>>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, cache_key: impl Into<String>, decision: ApprovalDecision) {
        self.lock().insert(cache_key.into(), decision);
    }

    pub fn lookup(&self, cache_key: &str) -> Option<ApprovalDecision> {
        self.lock().get(cache_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ApprovalDecision>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::request::RememberScope;
    use uuid::Uuid;

    #[test]
    fn test_remember_and_lookup() {
        let mem = SessionMemory::new();
        assert!(mem.lookup("k").is_none());
        mem.remember(
            "k",
            ApprovalDecision {
                approval_id: Uuid::new_v4(),
                approved: true,
                remember: Some(RememberScope::Session),
                note: None,
            },
        );
        assert!(mem.lookup("k").unwrap().approved);
        assert_eq!(mem.len(), 1);
        mem.clear();
        assert!(mem.is_empty());
    }
}
