//! Append-only conversational state for one user-agent dialogue (§4.7).
//!
//! A [`Session`] owns its message log exclusively; the orchestrator is the
//! only component permitted to append to it. Persistence is crash-safe
//! (write to temp, rename onto target) and tolerant of a truncated tail on
//! load, since a hard crash mid-append can leave a partial final line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::approval::Decision as ApprovalDecision;
use crate::types::{ContentBlock, Message, MessageRole, TextBlock};
use crate::{Error, Result};

/// Project-level instructions files, searched upward from the working
/// directory; first match wins.
const INSTRUCTIONS_CANDIDATES: &[&str] = &["CODA.md", ".coda.md", "AGENTS.md"];

/// A remembered `Always`/`Never` approval decision, persisted alongside the
/// session so it survives a process restart mid-conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub tool: String,
    pub fingerprint: String,
    pub decision: String,
}

impl ApprovalRecord {
    pub fn new(tool: impl Into<String>, fingerprint: impl Into<String>, decision: ApprovalDecision) -> Self {
        Self {
            tool: tool.into(),
            fingerprint: fingerprint.into(),
            decision: match decision {
                ApprovalDecision::Yes => "yes",
                ApprovalDecision::No => "no",
                ApprovalDecision::Always => "always",
                ApprovalDecision::Never => "never",
            }
            .to_string(),
        }
    }
}

/// One record in a session's on-disk log. Serialized one-per-line (NDJSON)
/// so a truncated tail can be detected and dropped without invalidating the
/// records written before it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SessionRecord {
    Header { version: u32, id: Uuid, model: String, created_at: DateTime<Utc> },
    Message(Message),
    Approval(ApprovalRecord),
}

/// The append-only conversational state for one dialogue. Message order is
/// an invariant: once committed, a message is never edited or removed
/// except through [`Session::elide`]'s soft-cap trimming.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    model: String,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    messages: Vec<Message>,
    approval_memory: Vec<ApprovalRecord>,
    /// Soft cap on retained messages (excluding the system message); above
    /// this, `elide` drops the oldest non-system messages.
    retained_cap: usize,
}

impl Session {
    pub fn new(model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            created_at: now,
            last_activity: now,
            messages: Vec::new(),
            approval_memory: Vec::new(),
            retained_cap: 200,
        }
    }

    pub fn with_retained_cap(mut self, cap: usize) -> Self {
        self.retained_cap = cap;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Appends a message to the log. Only the orchestrator should call this.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.last_activity = Utc::now();
        self.elide();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Drops the oldest non-system messages once the log exceeds
    /// `retained_cap`, replacing them with a single summary marker so the
    /// model sees that history was elided rather than silently vanishing.
    fn elide(&mut self) {
        let non_system = self.messages.iter().filter(|m| m.role != MessageRole::System).count();
        if non_system <= self.retained_cap {
            return;
        }

        let excess = non_system - self.retained_cap;
        let system_prefix: Vec<Message> =
            self.messages.iter().take_while(|m| m.role == MessageRole::System).cloned().collect();
        let rest = &self.messages[system_prefix.len()..];
        let kept = &rest[excess.min(rest.len())..];

        let marker = Message::new(
            MessageRole::System,
            vec![ContentBlock::Text(TextBlock::new(format!(
                "[{excess} earlier messages elided to stay under the retained-message cap]"
            )))],
        );

        let mut rebuilt = system_prefix;
        rebuilt.push(marker);
        rebuilt.extend_from_slice(kept);
        self.messages = rebuilt;
    }

    /// Replaces the entire log with a single summary message — an explicit,
    /// caller-requested compaction rather than the automatic cap-based elision.
    pub fn summarize(&mut self, summary: impl Into<String>) {
        self.messages = vec![Message::new(
            MessageRole::System,
            vec![ContentBlock::Text(TextBlock::new(summary.into()))],
        )];
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.approval_memory.clear();
    }

    pub fn record_approval(&mut self, record: ApprovalRecord) {
        self.approval_memory.retain(|r| !(r.tool == record.tool && r.fingerprint == record.fingerprint));
        self.approval_memory.push(record);
    }

    pub fn approval_memory(&self) -> &[ApprovalRecord] {
        &self.approval_memory
    }

    /// Builds the ordered message list fed to the provider: a system prompt
    /// assembled from `{base_instructions, tool catalog, workspace
    /// instructions, user overrides}` prepended to the session's own history.
    /// Pure in the session's current message log and the inputs given — no
    /// hidden state.
    pub fn assemble_prompt(
        &self,
        base_instructions: &str,
        tool_schemas: &[serde_json::Value],
        workspace_instructions: Option<&str>,
        user_overrides: Option<&str>,
    ) -> Vec<Message> {
        let mut system_prompt = String::from(base_instructions);

        if !tool_schemas.is_empty() {
            system_prompt.push_str("\n\n## Available tools\n");
            for schema in tool_schemas {
                let name = schema
                    .pointer("/function/name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                let description = schema
                    .pointer("/function/description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                system_prompt.push_str(&format!("- {name}: {description}\n"));
            }
        }

        if let Some(workspace) = workspace_instructions {
            system_prompt.push_str("\n\n## Workspace instructions\n");
            system_prompt.push_str(workspace);
        }

        if let Some(overrides) = user_overrides {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(overrides);
        }

        let mut assembled = vec![Message::system(system_prompt)];
        assembled.extend(self.messages.iter().filter(|m| m.role != MessageRole::System).cloned());
        assembled
    }

    /// Writes the session atomically: serialize to a temp file in the
    /// target's directory, then rename onto the target.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let mut body = String::new();
        let header = SessionRecord::Header {
            version: 1,
            id: self.id,
            model: self.model.clone(),
            created_at: self.created_at,
        };
        body.push_str(&serde_json::to_string(&header).map_err(|e| Error::tool(e.to_string()))?);
        body.push('\n');
        for message in &self.messages {
            body.push_str(
                &serde_json::to_string(&SessionRecord::Message(message.clone()))
                    .map_err(|e| Error::tool(e.to_string()))?,
            );
            body.push('\n');
        }
        for record in &self.approval_memory {
            body.push_str(
                &serde_json::to_string(&SessionRecord::Approval(record.clone()))
                    .map_err(|e| Error::tool(e.to_string()))?,
            );
            body.push('\n');
        }

        let dir = path.parent().ok_or_else(|| Error::tool("session path has no parent directory"))?;
        tokio::fs::create_dir_all(dir).await.map_err(|e| Error::tool(format!("failed to create {}: {e}", dir.display())))?;
        let tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::tool(format!("failed to create temp file: {e}")))?;
        tokio::fs::write(tmp.path(), &body)
            .await
            .map_err(|e| Error::tool(format!("failed to write session: {e}")))?;
        tmp.persist(path)
            .map_err(|e| Error::tool(format!("failed to rename session onto {}: {}", path.display(), e.error)))?;
        Ok(())
    }

    /// Loads a session from `path`, tolerating a truncated tail: parsing
    /// stops at the first line that doesn't deserialize, and everything
    /// parsed before it is kept.
    pub async fn load(path: &Path) -> Result<Self> {
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::tool(format!("failed to read session {}: {e}", path.display())))?;

        let mut lines = body.lines();
        let header_line = lines.next().ok_or_else(|| Error::tool("empty session file"))?;
        let header: SessionRecord =
            serde_json::from_str(header_line).map_err(|e| Error::tool(format!("corrupt session header: {e}")))?;
        let (id, model, created_at) = match header {
            SessionRecord::Header { id, model, created_at, .. } => (id, model, created_at),
            _ => return Err(Error::tool("session file must start with a header record")),
        };

        let mut messages = Vec::new();
        let mut approval_memory = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionRecord>(line) {
                Ok(SessionRecord::Message(message)) => messages.push(message),
                Ok(SessionRecord::Approval(record)) => approval_memory.push(record),
                Ok(SessionRecord::Header { .. }) | Err(_) => break,
            }
        }

        Ok(Self {
            id,
            model,
            created_at,
            last_activity: Utc::now(),
            messages,
            approval_memory,
            retained_cap: 200,
        })
    }
}

/// Searches upward from `start` for the first matching workspace
/// instructions file (§4.7's workspace loader), returning its contents.
pub async fn load_workspace_instructions(start: &Path) -> Option<String> {
    let mut dir = Some(start.to_path_buf());
    while let Some(candidate_dir) = dir {
        for name in INSTRUCTIONS_CANDIDATES {
            let candidate = candidate_dir.join(name);
            if let Ok(content) = tokio::fs::read_to_string(&candidate).await {
                return Some(content);
            }
        }
        dir = candidate_dir.parent().map(|p| p.to_path_buf());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_message_updates_log() {
        let mut session = Session::new("test-model");
        session.add_message(Message::user("hi"));
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_elide_keeps_system_prefix_and_drops_oldest() {
        let mut session = Session::new("test-model").with_retained_cap(2);
        session.add_message(Message::system("base"));
        for i in 0..5 {
            session.add_message(Message::user(format!("msg {i}")));
        }
        // system + marker + 2 retained
        assert_eq!(session.messages().len(), 4);
        assert_eq!(session.messages()[0].role, MessageRole::System);
    }

    #[test]
    fn test_assemble_prompt_is_pure_function_of_log() {
        let mut session = Session::new("test-model");
        session.add_message(Message::user("hi"));
        let a = session.assemble_prompt("base", &[], None, None);
        let b = session.assemble_prompt("base", &[], None, None);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[tokio::test]
    async fn test_persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ndjson");

        let mut session = Session::new("test-model");
        session.add_message(Message::user("hi"));
        session.add_message(Message::system("hello"));
        session.record_approval(ApprovalRecord::new("write_file", "write_file:/tmp/x", ApprovalDecision::Always));
        session.persist(&path).await.unwrap();

        let loaded = Session::load(&path).await.unwrap();
        assert_eq!(loaded.id(), session.id());
        assert_eq!(loaded.messages().len(), 2);
        assert_eq!(loaded.approval_memory().len(), 1);
    }

    #[tokio::test]
    async fn test_load_tolerates_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ndjson");

        let mut session = Session::new("test-model");
        session.add_message(Message::user("hi"));
        session.persist(&path).await.unwrap();

        let mut body = tokio::fs::read_to_string(&path).await.unwrap();
        body.push_str("{not valid json");
        tokio::fs::write(&path, &body).await.unwrap();

        let loaded = Session::load(&path).await.unwrap();
        assert_eq!(loaded.messages().len(), 1);
    }
}
