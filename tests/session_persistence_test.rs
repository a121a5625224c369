//! Integration tests for session history and crash-safe persistence (C7)
//! beyond the module's own inline unit tests: multi-generation reload,
//! approval memory surviving a restart, and the workspace instructions loader.

use coda_core::{load_workspace_instructions, ApprovalDecision, ApprovalRecord, Message, Session};

#[tokio::test]
async fn test_session_survives_multiple_persist_load_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.ndjson");

    let mut session = Session::new("test-model");
    session.add_message(Message::system("base"));
    session.add_message(Message::user("first"));
    session.persist(&path).await.unwrap();

    let mut reloaded = Session::load(&path).await.unwrap();
    assert_eq!(reloaded.messages().len(), 2);

    reloaded.add_message(Message::user("second"));
    reloaded.persist(&path).await.unwrap();

    let final_session = Session::load(&path).await.unwrap();
    assert_eq!(final_session.messages().len(), 3);
    assert_eq!(final_session.id(), session.id());
}

#[tokio::test]
async fn test_approval_memory_round_trips_multiple_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.ndjson");

    let mut session = Session::new("test-model");
    session.record_approval(ApprovalRecord::new("write_file", "write_file:/tmp/a", ApprovalDecision::Always));
    session.record_approval(ApprovalRecord::new("read_file", "read_file", ApprovalDecision::Never));
    session.persist(&path).await.unwrap();

    let loaded = Session::load(&path).await.unwrap();
    assert_eq!(loaded.approval_memory().len(), 2);
    assert!(loaded.approval_memory().iter().any(|r| r.tool == "write_file" && r.decision == "always"));
    assert!(loaded.approval_memory().iter().any(|r| r.tool == "read_file" && r.decision == "never"));
}

#[tokio::test]
async fn test_recording_approval_for_same_fingerprint_replaces_prior_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.ndjson");

    let mut session = Session::new("test-model");
    session.record_approval(ApprovalRecord::new("write_file", "write_file:/tmp/a", ApprovalDecision::Always));
    session.record_approval(ApprovalRecord::new("write_file", "write_file:/tmp/a", ApprovalDecision::Never));
    session.persist(&path).await.unwrap();

    let loaded = Session::load(&path).await.unwrap();
    assert_eq!(loaded.approval_memory().len(), 1);
    assert_eq!(loaded.approval_memory()[0].decision, "never");
}

#[tokio::test]
async fn test_persist_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deep").join("session.ndjson");

    let mut session = Session::new("test-model");
    session.add_message(Message::user("hi"));
    session.persist(&path).await.expect("parent dirs are created");

    assert!(tokio::fs::try_exists(&path).await.unwrap());
}

#[tokio::test]
async fn test_workspace_instructions_found_in_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    tokio::fs::create_dir_all(&nested).await.unwrap();
    tokio::fs::write(dir.path().join("CODA.md"), "be concise").await.unwrap();

    let found = load_workspace_instructions(&nested).await;
    assert_eq!(found.as_deref(), Some("be concise"));
}

#[tokio::test]
async fn test_workspace_instructions_absent_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let found = load_workspace_instructions(dir.path()).await;
    assert!(found.is_none());
}
