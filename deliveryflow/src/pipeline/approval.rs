//! Manual approval gate.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// The outcome of a manual approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// The approver let the run continue.
    Approved,
    /// The approver stopped the run.
    Rejected {
        /// Approver's reason.
        reason: String,
    },
    /// Nobody decided in time.
    TimedOut,
}

/// A pending manual approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request id.
    pub id: Uuid,
    /// Run waiting on the approval.
    pub run_id: String,
    /// Stage holding the approval.
    pub stage: String,
    /// Approval action name.
    pub action: String,
    /// When the request was issued.
    pub requested_at: String,
}

impl ApprovalRequest {
    /// Creates a request for an approval action.
    #[must_use]
    pub fn new(run_id: impl Into<String>, stage: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: run_id.into(),
            stage: stage.into(),
            action: action.into(),
            requested_at: crate::utils::iso_timestamp(),
        }
    }
}

/// Delivers an approval request to a human and waits for the decision.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Blocks until the request is decided or `timeout` elapses.
    async fn request(&self, request: ApprovalRequest, timeout: Duration) -> ApprovalDecision;
}

#[derive(Debug)]
struct Pending {
    request: ApprovalRequest,
    response_tx: Option<oneshot::Sender<ApprovalDecision>>,
}

/// Removes a pending request when its waiter finishes or is dropped.
struct PendingGuard<'a> {
    requests: &'a RwLock<HashMap<Uuid, Pending>>,
    request_id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.requests.write().remove(&self.request_id).is_some() {
            debug!(request_id = %self.request_id, "Approval request withdrawn");
        }
    }
}

/// In-process approval notifier.
///
/// Requests wait on a channel until [`approve`](Self::approve),
/// [`reject`](Self::reject) or the timeout. Cancelling a request rejects it.
#[derive(Default)]
pub struct ApprovalService {
    requests: RwLock<HashMap<Uuid, Pending>>,
}

impl ApprovalService {
    /// Creates a new approval service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Approves a pending request. Returns false if it is not pending.
    pub fn approve(&self, request_id: Uuid) -> bool {
        self.decide(request_id, ApprovalDecision::Approved)
    }

    /// Rejects a pending request. Returns false if it is not pending.
    pub fn reject(&self, request_id: Uuid, reason: impl Into<String>) -> bool {
        self.decide(
            request_id,
            ApprovalDecision::Rejected {
                reason: reason.into(),
            },
        )
    }

    /// Drops a pending request without a decision.
    pub fn cancel(&self, request_id: Uuid) -> bool {
        self.requests.write().remove(&request_id).is_some()
    }

    /// Returns the number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests.read().len()
    }

    /// Lists pending requests, oldest first.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<ApprovalRequest> {
        let mut pending: Vec<ApprovalRequest> = self
            .requests
            .read()
            .values()
            .map(|p| p.request.clone())
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        pending
    }

    fn decide(&self, request_id: Uuid, decision: ApprovalDecision) -> bool {
        if let Some(mut pending) = self.requests.write().remove(&request_id) {
            if let Some(tx) = pending.response_tx.take() {
                debug!(request_id = %request_id, ?decision, "Approval decided");
                return tx.send(decision).is_ok();
            }
        }
        false
    }
}

#[async_trait]
impl ApprovalGate for ApprovalService {
    async fn request(&self, request: ApprovalRequest, timeout: Duration) -> ApprovalDecision {
        let request_id = request.id;
        let (tx, rx) = oneshot::channel();
        info!(
            request_id = %request_id,
            run_id = %request.run_id,
            stage = %request.stage,
            "Waiting for manual approval"
        );
        self.requests.write().insert(
            request_id,
            Pending {
                request,
                response_tx: Some(tx),
            },
        );
        let _guard = PendingGuard {
            requests: &self.requests,
            request_id,
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => ApprovalDecision::Rejected {
                reason: "approval request cancelled".to_string(),
            },
            Err(_) => ApprovalDecision::TimedOut,
        }
    }
}

impl std::fmt::Debug for ApprovalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalService")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn request() -> ApprovalRequest {
        ApprovalRequest::new("run-1", "Manual_Approve", "Deploy_to_Prod")
    }

    async fn wait_for_pending(service: &ApprovalService) -> ApprovalRequest {
        loop {
            if let Some(first) = service.pending_requests().into_iter().next() {
                return first;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_approval_approved() {
        let service = Arc::new(ApprovalService::new());
        let service_clone = service.clone();

        let handle = tokio::spawn(async move {
            service_clone.request(request(), Duration::from_secs(5)).await
        });

        let pending = wait_for_pending(&service).await;
        assert_eq!(pending.stage, "Manual_Approve");
        assert!(service.approve(pending.id));

        assert_eq!(handle.await.unwrap(), ApprovalDecision::Approved);
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_approval_rejected() {
        let service = Arc::new(ApprovalService::new());
        let service_clone = service.clone();

        let handle = tokio::spawn(async move {
            service_clone.request(request(), Duration::from_secs(5)).await
        });

        let pending = wait_for_pending(&service).await;
        assert!(service.reject(pending.id, "release frozen"));
        assert!(!service.approve(pending.id));

        assert_eq!(
            handle.await.unwrap(),
            ApprovalDecision::Rejected {
                reason: "release frozen".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_approval_timeout() {
        let service = ApprovalService::new();
        let decision = service.request(request(), Duration::from_millis(20)).await;

        assert_eq!(decision, ApprovalDecision::TimedOut);
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_rejects() {
        let service = Arc::new(ApprovalService::new());
        let service_clone = service.clone();

        let handle = tokio::spawn(async move {
            service_clone.request(request(), Duration::from_secs(5)).await
        });

        let pending = wait_for_pending(&service).await;
        assert!(service.cancel(pending.id));

        assert!(matches!(handle.await.unwrap(), ApprovalDecision::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_dropped_waiter_withdraws_request() {
        let service = ApprovalService::new();
        let waited = tokio::time::timeout(
            Duration::from_millis(10),
            service.request(request(), Duration::from_secs(60)),
        )
        .await;

        assert!(waited.is_err());
        assert_eq!(service.pending_count(), 0);
        assert!(service.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn test_aborted_waiter_withdraws_request() {
        let service = Arc::new(ApprovalService::new());
        let service_clone = service.clone();

        let handle = tokio::spawn(async move {
            service_clone.request(request(), Duration::from_secs(60)).await
        });
        let pending = wait_for_pending(&service).await;

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(service.pending_count(), 0);
        assert!(!service.approve(pending.id));
    }

    #[test]
    fn test_decision_serde() {
        let json = serde_json::to_value(ApprovalDecision::Rejected {
            reason: "no".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"decision": "rejected", "reason": "no"}));
    }
}
