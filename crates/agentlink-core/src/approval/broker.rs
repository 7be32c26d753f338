//! The approval broker: evaluates calls, suspends on prompts and applies
//! responses exactly once per approval id.
//!
//! Each request is a slot in an explicit state machine:
//!
//! ```text
//! Pending --respond--> Resolved
//!    |---timeout----> Expired
//!    `---cancel-----> Cancelled
//! ```
//!
//! Only the first transition out of `Pending` takes effect. Later responses
//! are logged and discarded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::events::{EventSink, NullSink, RuntimeEvent};
use crate::obs;

use super::error::{ApprovalError, ApprovalResult};
use super::memory::SessionMemory;
use super::policy::{apply_mode, evaluate_call, ApprovalCall, ApprovalMode, PolicyVerdict};
use super::request::{ApprovalDecision, ApprovalRequest};
use super::rule::RuleSet;

/// Terminal states are kept for this many ids so late responses can be
/// recognised and logged.
const TOMBSTONE_CAPACITY: usize = 1024;

/// Terminal state of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalState {
    Pending,
    Resolved { approved: bool },
    Expired,
    Cancelled,
}

/// What a call to [`ApprovalBroker::respond`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespondOutcome {
    Applied,
    /// The id was already settled; the response was discarded.
    AlreadySettled(ApprovalState),
    /// The id was never issued by this broker.
    Unknown,
}

struct PendingSlot {
    request: ApprovalRequest,
    tx: oneshot::Sender<ApprovalDecision>,
}

#[derive(Default)]
struct Slots {
    pending: HashMap<Uuid, PendingSlot>,
    settled: HashMap<Uuid, ApprovalState>,
    settled_order: VecDeque<Uuid>,
}

impl Slots {
    fn settle(&mut self, id: Uuid, state: ApprovalState) -> Option<PendingSlot> {
        let slot = self.pending.remove(&id)?;
        self.settled.insert(id, state);
        self.settled_order.push_back(id);
        while self.settled_order.len() > TOMBSTONE_CAPACITY {
            if let Some(old) = self.settled_order.pop_front() {
                self.settled.remove(&old);
            }
        }
        Some(slot)
    }

    fn state(&self, id: &Uuid) -> Option<ApprovalState> {
        if self.pending.contains_key(id) {
            return Some(ApprovalState::Pending);
        }
        self.settled.get(id).cloned()
    }
}

/// Handle to a registered request; resolve it with [`ApprovalBroker::wait`].
#[derive(Debug)]
pub struct ApprovalHandle {
    pub approval_id: Uuid,
    pub tool_name: String,
    timeout: Duration,
    rx: oneshot::Receiver<ApprovalDecision>,
}

/// Mediates every effectful call for one runtime session.
pub struct ApprovalBroker {
    slots: Mutex<Slots>,
    memory: SessionMemory,
    sink: Arc<dyn EventSink>,
}

impl Default for ApprovalBroker {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl std::fmt::Debug for ApprovalBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalBroker")
            .field("pending", &self.lock().pending.len())
            .field("remembered", &self.memory.len())
            .finish()
    }
}

impl ApprovalBroker {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            memory: SessionMemory::new(),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Judge `call` against `rules`, session memory and `mode`.
    pub fn evaluate(&self, call: &ApprovalCall, rules: &RuleSet, mode: ApprovalMode) -> PolicyVerdict {
        apply_mode(evaluate_call(call, rules, &self.memory), mode)
    }

    pub fn lookup_remembered(&self, cache_key: &str) -> Option<ApprovalDecision> {
        self.memory.lookup(cache_key)
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    /// Register `request` as pending and announce it to the event sink. The
    /// handle belongs in [`ApprovalBroker::wait`]; dropping that wait
    /// settles the request as cancelled.
    pub fn open(&self, request: ApprovalRequest) -> ApprovalHandle {
        let (tx, rx) = oneshot::channel();
        let handle = ApprovalHandle {
            approval_id: request.approval_id,
            tool_name: request.tool_name.clone(),
            timeout: Duration::from_secs(request.timeout_seconds),
            rx,
        };
        let event = RuntimeEvent::ApprovalRequested(request.to_event());
        obs::emit_approval_requested(&request.approval_id, &request.tool_name, request.timeout_seconds);
        self.lock()
            .pending
            .insert(request.approval_id, PendingSlot { request, tx });
        self.sink.emit(&event);
        handle
    }

    /// Suspend until the request is answered, times out or is cancelled.
    pub async fn wait(
        &self,
        handle: ApprovalHandle,
        cancel: &CancelSignal,
    ) -> ApprovalResult<ApprovalDecision> {
        let ApprovalHandle {
            approval_id,
            tool_name,
            timeout,
            mut rx,
        } = handle;
        let mut cancel = cancel.clone();
        let guard = SettleOnDrop {
            broker: self,
            approval_id,
            armed: true,
        };

        let interrupted = tokio::select! {
            decision = &mut rx => match decision {
                Ok(decision) => return Ok(decision),
                // Sender dropped without a decision: treat as cancelled.
                Err(_) => ApprovalState::Cancelled,
            },
            _ = tokio::time::sleep(timeout) => ApprovalState::Expired,
            _ = cancel.cancelled() => ApprovalState::Cancelled,
        };
        guard.disarm();

        // A response may have landed between the wake-up and this lock.
        if self.lock().settle(approval_id, interrupted.clone()).is_none() {
            if let Ok(decision) = rx.try_recv() {
                return Ok(decision);
            }
        }

        let outcome = match interrupted {
            ApprovalState::Expired => "expired",
            _ => "cancelled",
        };
        self.announce_resolved(approval_id, outcome);

        match interrupted {
            ApprovalState::Expired => Err(ApprovalError::Timeout {
                approval_id,
                tool: tool_name,
                timeout_secs: timeout.as_secs(),
            }),
            _ => Err(ApprovalError::Cancelled {
                approval_id,
                tool: tool_name,
            }),
        }
    }

    /// Register and wait in one step.
    pub async fn request_approval(
        &self,
        request: ApprovalRequest,
        cancel: &CancelSignal,
    ) -> ApprovalResult<ApprovalDecision> {
        let handle = self.open(request);
        self.wait(handle, cancel).await
    }

    /// Apply a decision. The first response for an id wins; anything later
    /// is logged and discarded.
    pub fn respond(&self, decision: ApprovalDecision) -> RespondOutcome {
        let id = decision.approval_id;
        let mut slots = self.lock();
        let state = ApprovalState::Resolved {
            approved: decision.approved,
        };
        let Some(slot) = slots.settle(id, state) else {
            let existing = slots.state(&id);
            drop(slots);
            return match existing {
                Some(state) => {
                    obs::emit_duplicate_response(&id, &format!("{state:?}"));
                    RespondOutcome::AlreadySettled(state)
                }
                None => {
                    obs::emit_duplicate_response(&id, "unknown");
                    RespondOutcome::Unknown
                }
            };
        };

        // Memory and hand-off happen under the lock so a waiter that wakes
        // on timeout at the same instant still observes this decision.
        if decision.remembers_for_session() {
            self.memory.remember(slot.request.cache_key.clone(), decision.clone());
        }
        let approved = decision.approved;
        // The waiter may already be gone; the decision stays authoritative.
        let _ = slot.tx.send(decision);
        drop(slots);

        let outcome = if approved { "approved" } else { "denied" };
        self.announce_resolved(id, outcome);
        RespondOutcome::Applied
    }

    fn announce_resolved(&self, approval_id: Uuid, outcome: &str) {
        obs::emit_approval_resolved(&approval_id, outcome);
        self.sink.emit(&RuntimeEvent::ApprovalResolved {
            approval_id,
            outcome: outcome.to_string(),
        });
    }

    /// Requests currently awaiting a decision, oldest first.
    pub fn pending_requests(&self) -> Vec<ApprovalRequest> {
        let mut pending: Vec<ApprovalRequest> = self
            .lock()
            .pending
            .values()
            .map(|s| s.request.clone())
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    pub fn state(&self, approval_id: &Uuid) -> Option<ApprovalState> {
        self.lock().state(approval_id)
    }
}

/// Settles a request as cancelled when its waiter is dropped mid-wait, as
/// happens to fan-out siblings of a call that failed fatally.
struct SettleOnDrop<'a> {
    broker: &'a ApprovalBroker,
    approval_id: Uuid,
    armed: bool,
}

impl SettleOnDrop<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let settled = self
            .broker
            .lock()
            .settle(self.approval_id, ApprovalState::Cancelled)
            .is_some();
        if settled {
            self.broker.announce_resolved(self.approval_id, "cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;
    use crate::events::ChannelSink;
    use chrono::Utc;
    use serde_json::json;

    fn request(timeout: u64) -> ApprovalRequest {
        ApprovalRequest::new(
            "shell",
            "run",
            "run git push",
            &json!({"command": "git push"}),
            timeout,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_respond_resolves_waiter() {
        let broker = Arc::new(ApprovalBroker::default());
        let req = request(60);
        let id = req.approval_id;
        let handle = broker.open(req);
        assert_eq!(broker.state(&id), Some(ApprovalState::Pending));

        let b = Arc::clone(&broker);
        let waiter = tokio::spawn(async move { b.wait(handle, &CancelSignal::never()).await });
        assert_eq!(broker.respond(ApprovalDecision::approve(id)), RespondOutcome::Applied);

        let decision = waiter.await.unwrap().unwrap();
        assert!(decision.approved);
        assert_eq!(broker.state(&id), Some(ApprovalState::Resolved { approved: true }));
    }

    #[tokio::test]
    async fn test_first_response_wins() {
        let broker = ApprovalBroker::default();
        let req = request(60);
        let id = req.approval_id;
        let handle = broker.open(req);

        assert_eq!(broker.respond(ApprovalDecision::deny(id, None)), RespondOutcome::Applied);
        assert_eq!(
            broker.respond(ApprovalDecision::approve(id)),
            RespondOutcome::AlreadySettled(ApprovalState::Resolved { approved: false })
        );

        let decision = broker.wait(handle, &CancelSignal::never()).await.unwrap();
        assert!(!decision.approved);
    }

    #[tokio::test]
    async fn test_unknown_id_is_a_no_op() {
        let broker = ApprovalBroker::default();
        assert_eq!(
            broker.respond(ApprovalDecision::approve(Uuid::new_v4())),
            RespondOutcome::Unknown
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires_request() {
        let broker = ApprovalBroker::default();
        let req = request(5);
        let id = req.approval_id;
        let started = tokio::time::Instant::now();
        let err = broker
            .request_approval(req, &CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert!(matches!(err, ApprovalError::Timeout { timeout_secs: 5, .. }));
        assert_eq!(broker.state(&id), Some(ApprovalState::Expired));
        assert!(matches!(
            broker.respond(ApprovalDecision::approve(id)),
            RespondOutcome::AlreadySettled(ApprovalState::Expired)
        ));
    }

    #[tokio::test]
    async fn test_cancel_resolves_as_cancelled_and_clears_pending() {
        let broker = Arc::new(ApprovalBroker::default());
        let (cancel, signal) = CancelHandle::new();
        let req = request(600);
        let id = req.approval_id;
        let b = Arc::clone(&broker);
        let waiter = tokio::spawn(async move { b.request_approval(req, &signal).await });
        while broker.pending_requests().is_empty() {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, ApprovalError::Cancelled { .. }));
        assert!(broker.pending_requests().is_empty());
        assert_eq!(broker.state(&id), Some(ApprovalState::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_waiter_settles_as_cancelled() {
        let (sink, mut rx) = ChannelSink::new();
        let broker = Arc::new(ApprovalBroker::new(Arc::new(sink)));
        let req = request(600);
        let id = req.approval_id;
        let b = Arc::clone(&broker);
        let waiter =
            tokio::spawn(async move { b.request_approval(req, &CancelSignal::never()).await });
        while broker.pending_requests().is_empty() {
            tokio::task::yield_now().await;
        }
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        assert!(broker.pending_requests().is_empty());
        assert_eq!(broker.state(&id), Some(ApprovalState::Cancelled));
        assert_eq!(
            broker.respond(ApprovalDecision::approve(id)),
            RespondOutcome::AlreadySettled(ApprovalState::Cancelled)
        );
        let mut outcomes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RuntimeEvent::ApprovalResolved { outcome, .. } = event {
                outcomes.push(outcome);
            }
        }
        assert_eq!(outcomes, vec!["cancelled".to_string()]);
    }

    #[tokio::test]
    async fn test_remember_session_populates_memory() {
        let broker = ApprovalBroker::default();
        let req = request(60);
        let id = req.approval_id;
        let key = req.cache_key.clone();
        let handle = broker.open(req);
        broker.respond(ApprovalDecision::approve_for_session(id));
        broker.wait(handle, &CancelSignal::never()).await.unwrap();
        assert!(broker.lookup_remembered(&key).is_some());
    }

    #[tokio::test]
    async fn test_denied_remember_is_not_stored() {
        let broker = ApprovalBroker::default();
        let req = request(60);
        let id = req.approval_id;
        let key = req.cache_key.clone();
        let _handle = broker.open(req);
        let mut decision = ApprovalDecision::deny(id, Some("no".into()));
        decision.remember = Some(crate::approval::request::RememberScope::Session);
        broker.respond(decision);
        assert!(broker.lookup_remembered(&key).is_none());
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let (sink, mut rx) = ChannelSink::new();
        let broker = ApprovalBroker::new(Arc::new(sink));
        let req = request(60);
        let id = req.approval_id;
        let _handle = broker.open(req);
        broker.respond(ApprovalDecision::approve(id));

        match rx.recv().await {
            Some(RuntimeEvent::ApprovalRequested(ev)) => assert_eq!(ev.approval_id, id),
            other => panic!("expected approval.requested, got {other:?}"),
        }
        match rx.recv().await {
            Some(RuntimeEvent::ApprovalResolved { outcome, .. }) => assert_eq!(outcome, "approved"),
            other => panic!("expected approval.resolved, got {other:?}"),
        }
    }
}
