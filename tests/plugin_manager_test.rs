//! Integration tests for the plug-in server lifecycle manager (C6).
//!
//! These exercise the parts of the state machine that don't require an
//! actual external server process: unknown-server error paths, and the
//! Stdio transport's ability to round-trip a JSON-RPC call against a real
//! child process that speaks line-delimited JSON-RPC over stdio.

use std::sync::Arc;

use coda_core::{PluginManager, PluginServerConfig, ServerState, ToolManager, TransportKind};

fn manager() -> Arc<PluginManager> {
    PluginManager::new(Arc::new(ToolManager::new()), "plugin")
}

#[tokio::test]
async fn test_execute_tool_unknown_server_is_an_error() {
    let manager = manager();
    let result = manager
        .execute_tool("does-not-exist", "whatever", serde_json::json!({}))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_stop_unknown_server_is_an_error() {
    let manager = manager();
    assert!(manager.stop_server("ghost").await.is_err());
}

#[tokio::test]
async fn test_restart_unknown_server_is_an_error() {
    let manager = manager();
    assert!(manager.restart_server("ghost").await.is_err());
}

#[tokio::test]
async fn test_get_all_statuses_empty_by_default() {
    let manager = manager();
    assert!(manager.get_all_statuses().await.is_empty());
}

/// A tiny Python JSON-RPC-over-stdio echo server: responds to `initialize`
/// with an empty `tools` capability and to `tools/list` with a single tool.
/// Skipped in environments without `python3` on PATH.
#[tokio::test]
async fn test_start_server_with_stdio_transport_reaches_running() {
    if std::process::Command::new("python3").arg("--version").output().is_err() {
        eprintln!("skipping: python3 not available");
        return;
    }

    let manager = manager();
    let script = r#"
import sys, json

for line in sys.stdin:
    req = json.loads(line)
    method = req["method"]
    if method == "initialize":
        result = {"capabilities": {"tools": {}}}
    elif method == "tools/list":
        result = {"tools": [{"name": "ping", "description": "pings back", "inputSchema": {"type": "object", "properties": {}, "required": []}}]}
    elif method == "tools/call":
        result = {"content": [{"type": "text", "text": "pong"}]}
    else:
        result = {}
    sys.stdout.write(json.dumps({"jsonrpc": "2.0", "id": req["id"], "result": result}) + "\n")
    sys.stdout.flush()
"#;

    let config = PluginServerConfig {
        name: "echo".to_string(),
        transport: TransportKind::Stdio {
            command: "python3".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: Default::default(),
        },
    };

    manager.start_server(config).await.expect("server should start");

    let status = manager.get_server_status("echo").await.expect("status present");
    assert_eq!(status.state, ServerState::Running);
    assert!(status.capabilities.tools);

    let tools = manager.list_tools().await;
    assert_eq!(tools, vec!["plugin_echo_ping".to_string()]);

    let result = manager
        .execute_tool("echo", "ping", serde_json::json!({}))
        .await
        .expect("tool call should succeed");
    assert_eq!(result["content"][0]["text"], "pong");

    manager.stop_server("echo").await.expect("stop should succeed");
    let status = manager.get_server_status("echo").await.expect("status still present");
    assert_eq!(status.state, ServerState::Stopped);
    assert!(manager.list_tools().await.is_empty());
}
