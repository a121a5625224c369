//! Approval engine: user-consent gate for tool execution (§4.9).
//!
//! Every tool call passes through [`ApprovalEngine::decide`] before it runs.
//! The engine consults session memory (exact `Never`/`Always` matches,
//! fingerprinted by tool name and, for mutating file tools, the target path),
//! then falls back to the configured [`ApprovalMode`], and finally to an
//! interactive prompt driven by a caller-supplied [`Approver`].

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::ApprovalMode;

/// Interactive decision returned by a human (or an automated stand-in) when
/// asked to approve a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Yes,
    No,
    Always,
    Never,
}

impl Decision {
    /// §4.9: the orchestrator treats `No`/`Never` as "skip this call".
    pub fn is_denial(&self) -> bool {
        matches!(self, Decision::No | Decision::Never)
    }
}

/// A tool invocation awaiting approval, with enough context for a human (or
/// a hook) to make an informed decision without inspecting raw parameters.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool_name: String,
    pub parameters: Value,
    pub description: String,
    pub risk_annotations: Vec<String>,
    pub preview: Option<String>,
    pub affected_files: Vec<String>,
    pub reversible: bool,
}

impl ApprovalRequest {
    pub fn new(tool_name: impl Into<String>, parameters: Value) -> Self {
        let tool_name = tool_name.into();
        let affected_files = extract_path(&parameters).into_iter().collect();
        let (description, risk_annotations, reversible) = describe(&tool_name, &parameters);
        Self {
            tool_name,
            parameters,
            description,
            risk_annotations,
            preview: None,
            affected_files,
            reversible,
        }
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }

    /// The memory key this request is checked and recorded under: tool name
    /// alone for read-only tools, tool name + path for anything mutating
    /// (§9 design note — "always-write to /tmp/x" must not also approve
    /// "always-write to /etc/passwd").
    fn fingerprint(&self) -> String {
        if is_read_only(&self.tool_name) {
            self.tool_name.clone()
        } else {
            match self.affected_files.first() {
                Some(path) => format!("{}:{}", self.tool_name, path),
                None => self.tool_name.clone(),
            }
        }
    }
}

fn is_read_only(tool_name: &str) -> bool {
    matches!(tool_name, "read_file" | "list_files" | "search_files")
}

fn extract_path(parameters: &Value) -> Option<String> {
    parameters.get("path").and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn describe(tool_name: &str, parameters: &Value) -> (String, Vec<String>, bool) {
    let path = extract_path(parameters).unwrap_or_else(|| "?".to_string());
    match tool_name {
        "read_file" | "list_files" | "search_files" => {
            (format!("reads {path}"), vec!["read-only".to_string()], true)
        }
        "write_file" => (
            format!("writes file {path}"),
            vec!["overwrites file contents".to_string(), "cannot be undone without a backup".to_string()],
            false,
        ),
        "edit_file" => (
            format!("edits file {path}"),
            vec!["modifies file contents in place".to_string()],
            false,
        ),
        other => (format!("invokes {other}"), vec![], false),
    }
}

/// A caller-supplied source of interactive decisions. Implementations range
/// from a terminal prompt to a headless stub that always returns `Yes`.
#[async_trait::async_trait]
pub trait Approver: Send + Sync {
    async fn ask(&self, request: &ApprovalRequest) -> Decision;
}

/// An approver that never prompts — used when [`ApprovalMode::AutoApproveAll`]
/// makes interactive consent unreachable, and in tests.
pub struct AlwaysApprove;

#[async_trait::async_trait]
impl Approver for AlwaysApprove {
    async fn ask(&self, _request: &ApprovalRequest) -> Decision {
        Decision::Yes
    }
}

/// Session-scoped memory of `Always`/`Never` decisions, keyed by fingerprint.
#[derive(Default)]
struct Memory {
    entries: HashMap<String, Decision>,
}

/// Gates tool execution behind session memory, the configured
/// [`ApprovalMode`], and (if neither settles it) an [`Approver`].
pub struct ApprovalEngine {
    mode: ApprovalMode,
    approver: Box<dyn Approver>,
    memory: Mutex<Memory>,
}

impl ApprovalEngine {
    pub fn new(mode: ApprovalMode, approver: Box<dyn Approver>) -> Self {
        Self { mode, approver, memory: Mutex::new(Memory::default()) }
    }

    /// Runs the §4.9 decision order: exact `Never` → deny, exact `Always` →
    /// approve, mode-level auto-approval rule → approve, else prompt.
    pub async fn decide(&self, request: &ApprovalRequest) -> Decision {
        let fingerprint = request.fingerprint();

        if let Some(remembered) = self.memory.lock().unwrap().entries.get(&fingerprint).copied() {
            return remembered;
        }

        if self.auto_approves(&request.tool_name) {
            return Decision::Yes;
        }

        let decision = self.approver.ask(request).await;
        if matches!(decision, Decision::Always | Decision::Never) {
            self.memory.lock().unwrap().entries.insert(fingerprint, decision);
        }
        decision
    }

    fn auto_approves(&self, tool_name: &str) -> bool {
        match self.mode {
            ApprovalMode::AutoApproveAll => true,
            ApprovalMode::AutoApproveReads => is_read_only(tool_name),
            ApprovalMode::AlwaysAsk => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Decision);

    #[async_trait::async_trait]
    impl Approver for Scripted {
        async fn ask(&self, _request: &ApprovalRequest) -> Decision {
            self.0
        }
    }

    #[tokio::test]
    async fn test_auto_approve_all_skips_prompt() {
        let engine = ApprovalEngine::new(ApprovalMode::AutoApproveAll, Box::new(Scripted(Decision::No)));
        let req = ApprovalRequest::new("write_file", serde_json::json!({"path": "foo.txt"}));
        assert_eq!(engine.decide(&req).await, Decision::Yes);
    }

    #[tokio::test]
    async fn test_auto_approve_reads_only_covers_read_tools() {
        let engine = ApprovalEngine::new(ApprovalMode::AutoApproveReads, Box::new(Scripted(Decision::No)));
        let read = ApprovalRequest::new("read_file", serde_json::json!({"path": "foo.txt"}));
        assert_eq!(engine.decide(&read).await, Decision::Yes);

        let write = ApprovalRequest::new("write_file", serde_json::json!({"path": "foo.txt"}));
        assert_eq!(engine.decide(&write).await, Decision::No);
    }

    #[tokio::test]
    async fn test_always_decision_is_remembered_per_path() {
        let engine = ApprovalEngine::new(ApprovalMode::AlwaysAsk, Box::new(Scripted(Decision::Always)));
        let tmp = ApprovalRequest::new("write_file", serde_json::json!({"path": "/tmp/x"}));
        assert_eq!(engine.decide(&tmp).await, Decision::Always);

        // Second call to the same path is served from memory without re-prompting.
        let engine2 = ApprovalEngine::new(ApprovalMode::AlwaysAsk, Box::new(Scripted(Decision::No)));
        engine2.memory.lock().unwrap().entries.insert("write_file:/tmp/x".to_string(), Decision::Always);
        assert_eq!(engine2.decide(&tmp).await, Decision::Always);

        // A different path under the same tool is not covered by that memory.
        let etc = ApprovalRequest::new("write_file", serde_json::json!({"path": "/etc/passwd"}));
        assert_eq!(engine2.decide(&etc).await, Decision::No);
    }

    #[tokio::test]
    async fn test_never_decision_denies_without_reprompt() {
        let engine = ApprovalEngine::new(ApprovalMode::AlwaysAsk, Box::new(Scripted(Decision::Never)));
        let req = ApprovalRequest::new("read_file", serde_json::json!({"path": "secret.txt"}));
        let decision = engine.decide(&req).await;
        assert!(decision.is_denial());
    }
}
