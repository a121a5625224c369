//! Integration tests for the built-in filesystem tools (C4) running through
//! the shared [`ToolManager`], rather than calling each `Tool` impl directly.

use coda_core::builtin;
use coda_core::{ToolContext, ToolManager};

async fn manager_with_builtins() -> ToolManager {
    let manager = ToolManager::new();
    builtin::register_all(&manager).await.expect("built-ins register cleanly");
    manager
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with_builtins().await;
    let ctx = ToolContext::new(dir.path());

    manager
        .execute(&ctx, "write_file", serde_json::json!({"path": "notes.txt", "content": "hello"}))
        .await
        .expect("write succeeds");

    let result = manager
        .execute(&ctx, "read_file", serde_json::json!({"path": "notes.txt"}))
        .await
        .expect("read succeeds");

    assert_eq!(result["content"], "hello");
}

#[tokio::test]
async fn test_edit_file_replaces_all_occurrences() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with_builtins().await;
    let ctx = ToolContext::new(dir.path());

    manager
        .execute(
            &ctx,
            "write_file",
            serde_json::json!({"path": "a.txt", "content": "foo bar foo baz foo"}),
        )
        .await
        .unwrap();

    manager
        .execute(
            &ctx,
            "edit_file",
            serde_json::json!({"path": "a.txt", "old_text": "foo", "new_text": "qux", "all": true}),
        )
        .await
        .expect("edit succeeds");

    let result = manager.execute(&ctx, "read_file", serde_json::json!({"path": "a.txt"})).await.unwrap();
    assert_eq!(result["content"], "qux bar qux baz qux");
}

#[tokio::test]
async fn test_list_files_recursive() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();
    tokio::fs::write(dir.path().join("top.txt"), "x").await.unwrap();
    tokio::fs::write(dir.path().join("sub/nested.txt"), "y").await.unwrap();

    let manager = manager_with_builtins().await;
    let ctx = ToolContext::new(dir.path());

    let result = manager
        .execute(&ctx, "list_files", serde_json::json!({"recursive": true}))
        .await
        .expect("list succeeds");

    let entries = result["entries"].as_array().expect("entries array");
    let names: Vec<&str> = entries.iter().filter_map(|e| e["path"].as_str()).collect();
    assert!(names.iter().any(|n| n.contains("nested.txt")));
}

#[tokio::test]
async fn test_search_files_finds_match_under_directory() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("a.txt"), "alpha\nneedle here\nomega\n").await.unwrap();

    let manager = manager_with_builtins().await;
    let ctx = ToolContext::new(dir.path());

    let result = manager
        .execute(&ctx, "search_files", serde_json::json!({"query": "needle"}))
        .await
        .expect("search succeeds");

    assert_eq!(result["count"], 1);
    assert_eq!(result["matches"][0]["line"], 2);
}

#[tokio::test]
async fn test_registering_builtins_twice_on_same_manager_fails() {
    let manager = manager_with_builtins().await;
    let result = builtin::register_all(&manager).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_read_file_unknown_tool_name_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with_builtins().await;
    let ctx = ToolContext::new(dir.path());

    let result = manager.execute(&ctx, "delete_file", serde_json::json!({"path": "a.txt"})).await;
    assert!(result.is_err());
}
