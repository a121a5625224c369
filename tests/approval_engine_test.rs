//! Integration tests for the approval engine (C9) covering the decision
//! order end to end through the public API: the approver is consulted only
//! once per fingerprint, and `Always`/`Never` decisions stick within the
//! same engine instance across unrelated tool calls.

use async_trait::async_trait;
use coda_core::{ApprovalDecision, ApprovalEngine, ApprovalMode, ApprovalRequest, Approver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingApprover {
    decision: ApprovalDecision,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Approver for CountingApprover {
    async fn ask(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}

#[tokio::test]
async fn test_always_decision_is_not_reprompted_for_the_same_path() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = ApprovalEngine::new(
        ApprovalMode::AlwaysAsk,
        Box::new(CountingApprover { decision: ApprovalDecision::Always, calls: calls.clone() }),
    );

    let first = ApprovalRequest::new("write_file", serde_json::json!({"path": "/tmp/report.txt"}));
    assert_eq!(engine.decide(&first).await, ApprovalDecision::Always);

    let second = ApprovalRequest::new("write_file", serde_json::json!({"path": "/tmp/report.txt"}));
    assert_eq!(engine.decide(&second).await, ApprovalDecision::Always);

    assert_eq!(calls.load(Ordering::SeqCst), 1, "the approver should only be asked once");
}

#[tokio::test]
async fn test_always_decision_for_one_path_does_not_cover_a_different_path() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = ApprovalEngine::new(
        ApprovalMode::AlwaysAsk,
        Box::new(CountingApprover { decision: ApprovalDecision::Always, calls: calls.clone() }),
    );

    let tmp = ApprovalRequest::new("write_file", serde_json::json!({"path": "/tmp/a.txt"}));
    engine.decide(&tmp).await;

    let etc = ApprovalRequest::new("write_file", serde_json::json!({"path": "/etc/a.txt"}));
    engine.decide(&etc).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2, "a different path is a different fingerprint");
}

#[tokio::test]
async fn test_never_decision_sticks_without_reprompting() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = ApprovalEngine::new(
        ApprovalMode::AlwaysAsk,
        Box::new(CountingApprover { decision: ApprovalDecision::Never, calls: calls.clone() }),
    );

    let req = ApprovalRequest::new("read_file", serde_json::json!({"path": "secret.txt"}));
    assert!(engine.decide(&req).await.is_denial());
    assert!(engine.decide(&req).await.is_denial());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_auto_approve_reads_mode_never_consults_the_approver_for_reads() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = ApprovalEngine::new(
        ApprovalMode::AutoApproveReads,
        Box::new(CountingApprover { decision: ApprovalDecision::No, calls: calls.clone() }),
    );

    let read = ApprovalRequest::new("list_files", serde_json::json!({"path": "."}));
    assert_eq!(engine.decide(&read).await, ApprovalDecision::Yes);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let write = ApprovalRequest::new("write_file", serde_json::json!({"path": "a.txt"}));
    assert_eq!(engine.decide(&write).await, ApprovalDecision::No);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_yes_or_no_decisions_are_not_remembered() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = ApprovalEngine::new(
        ApprovalMode::AlwaysAsk,
        Box::new(CountingApprover { decision: ApprovalDecision::Yes, calls: calls.clone() }),
    );

    let req = ApprovalRequest::new("write_file", serde_json::json!({"path": "a.txt"}));
    engine.decide(&req).await;
    engine.decide(&req).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2, "a plain Yes is not Always, so it must be asked again");
}
