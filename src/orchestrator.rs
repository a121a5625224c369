//! Chat handler / orchestrator (C10, §4.10): drives the per-turn loop.
//!
//! Build request → stream → detect → approve → execute → feed back →
//! repeat. The orchestrator is the *only* component permitted to append to a
//! [`Session`] (§4.10) — every other component (the provider client, the
//! detector, the approval engine, the tool manager) is a pure collaborator it
//! calls into, never a second writer.
//!
//! Per-turn tool-call iterations are capped by
//! [`AgentOptions::max_tool_iterations`]; exceeding the cap is a turn-fatal
//! error (§4.10 guardrail) rather than a silent truncation.

use tokio_util::sync::CancellationToken;

use crate::approval::{ApprovalEngine, ApprovalRequest, Decision};
use crate::provider::{CallOptions, ChatRequest, Provider};
use crate::retry::RetryConfig;
use crate::session::Session;
use crate::tools::{Manager as ToolManager, ToolContext};
use crate::types::{
    ContentBlock, Message, OpenAIContent, OpenAIContentPart, OpenAIMessage, ToolResultBlock,
};
use crate::{detector::{Detector, DetectorEvent}, Error, Result};

/// Emitted as a turn progresses. Consumers (a CLI, a TUI, a test harness)
/// subscribe to these rather than polling the session, so display text
/// reaches them in chunk-arrival order even while tool calls are still being
/// resolved underneath.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Display-only text, in arrival order.
    Display(String),
    /// A tool call was detected and committed to the session; approval is
    /// about to be requested.
    ToolCallDetected { id: String, name: String },
    /// The approval engine's decision for a detected tool call.
    ToolApproval { name: String, decision: ApprovalDecisionKind },
    /// A tool finished executing (or was skipped because it was denied).
    ToolResult { name: String, is_error: bool },
    /// The turn ended naturally, was cancelled, or hit the iteration cap.
    EndOfTurn { reason: String },
}

/// A display-friendly mirror of [`Decision`] (kept separate so this module
/// doesn't leak `approval`'s internals into every event consumer's match
/// arms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecisionKind {
    Approved,
    Denied,
}

impl From<Decision> for ApprovalDecisionKind {
    fn from(d: Decision) -> Self {
        if d.is_denial() {
            ApprovalDecisionKind::Denied
        } else {
            ApprovalDecisionKind::Approved
        }
    }
}

/// Static prompt material the orchestrator weaves into every request via
/// [`Session::assemble_prompt`] (§4.7).
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub base_instructions: String,
    pub workspace_instructions: Option<String>,
    pub user_overrides: Option<String>,
}

/// Tunables the orchestrator needs that don't belong to any single
/// collaborator: iteration cap, sampling parameters, and call timing.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_tool_iterations: u32,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<String>,
    pub call_options: CallOptionsTemplate,
}

/// `CallOptions` without a pre-bound cancellation token — the orchestrator
/// clones this per call and plugs in its own token so a single turn's
/// cancellation doesn't leak into the next.
#[derive(Debug, Clone)]
pub struct CallOptionsTemplate {
    pub timeout: std::time::Duration,
    pub retry: RetryConfig,
}

impl Default for CallOptionsTemplate {
    fn default() -> Self {
        Self {
            timeout: std::time::Duration::from_secs(120),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 16,
            max_tokens: Some(4096),
            temperature: Some(0.7),
            reasoning_effort: None,
            call_options: CallOptionsTemplate::default(),
        }
    }
}

/// Drives one [`Session`] end to end: the streaming request/response cycle,
/// tool-call detection, approval, and dispatch (§4.10).
pub struct Orchestrator {
    provider: Provider,
    tools: ToolManager,
    approval: ApprovalEngine,
    config: OrchestratorConfig,
    prompt: PromptContext,
}

impl Orchestrator {
    pub fn new(
        provider: Provider,
        tools: ToolManager,
        approval: ApprovalEngine,
        config: OrchestratorConfig,
        prompt: PromptContext,
    ) -> Self {
        Self {
            provider,
            tools,
            approval,
            config,
            prompt,
        }
    }

    /// Runs one user turn to completion, appending every message it produces
    /// to `session` and emitting a [`TurnEvent`] for each externally visible
    /// thing that happens along the way.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        workspace_root: impl Into<std::path::PathBuf>,
        user_input: &str,
        cancelled: CancellationToken,
        mut events: impl FnMut(TurnEvent),
    ) -> Result<()> {
        let workspace_root = workspace_root.into();
        session.add_message(Message::user(user_input));

        let mut iteration = 0u32;

        loop {
            if cancelled.is_cancelled() {
                events(TurnEvent::EndOfTurn { reason: "cancelled".to_string() });
                return Ok(());
            }

            let schemas = self.tools.get_all_schemas().await;
            let prompt_messages = session.assemble_prompt(
                &self.prompt.base_instructions,
                &schemas,
                self.prompt.workspace_instructions.as_deref(),
                self.prompt.user_overrides.as_deref(),
            );

            let wire_messages: Vec<OpenAIMessage> =
                prompt_messages.iter().map(to_openai_message).collect();

            let request = ChatRequest::new(wire_messages)
                .with_tools(schemas)
                .with_max_tokens(self.config.max_tokens)
                .with_temperature(self.config.temperature)
                .with_reasoning_effort(self.config.reasoning_effort.clone());

            let call_opts = CallOptions {
                timeout: self.config.call_options.timeout,
                cancelled: cancelled.clone(),
                retry: self.config.call_options.retry.clone(),
            };

            let mut stream = self.provider.chat_completion_stream(&request, &call_opts).await?;

            let mut detector = Detector::new();
            let mut display_text = String::new();
            let mut tool_calls = Vec::new();
            let mut finish_reason = String::new();

            'stream: loop {
                tokio::select! {
                    next = futures::StreamExt::next(&mut stream) => {
                        let Some(chunk) = next else { break 'stream; };
                        let chunk = chunk?;
                        for ev in detector.process_chunk(chunk)? {
                            match ev {
                                DetectorEvent::Display(text) => {
                                    display_text.push_str(&text);
                                    events(TurnEvent::Display(text));
                                }
                                DetectorEvent::ToolCall(call) => tool_calls.push(call),
                                DetectorEvent::EndOfTurn { finish_reason: fr } => {
                                    finish_reason = fr;
                                }
                            }
                        }
                    }
                    _ = cancelled.cancelled() => {
                        for ev in detector.cancel() {
                            if let DetectorEvent::Display(text) = ev {
                                display_text.push_str(&text);
                                events(TurnEvent::Display(text));
                            }
                        }
                        finish_reason = "cancelled".to_string();
                        break 'stream;
                    }
                }
            }

            let mut assistant_blocks = Vec::new();
            if !display_text.is_empty() {
                assistant_blocks.push(ContentBlock::Text(crate::types::TextBlock::new(display_text)));
            }
            for call in &tool_calls {
                events(TurnEvent::ToolCallDetected { id: call.id.clone(), name: call.name.clone() });
                assistant_blocks.push(ContentBlock::ToolUse(call.clone()));
            }
            session.add_message(Message::assistant(assistant_blocks));

            if finish_reason == "cancelled" {
                events(TurnEvent::EndOfTurn { reason: finish_reason });
                return Ok(());
            }

            if tool_calls.is_empty() {
                events(TurnEvent::EndOfTurn { reason: finish_reason });
                return Ok(());
            }

            iteration += 1;
            if iteration > self.config.max_tool_iterations {
                return Err(Error::tool(format!(
                    "exceeded {} tool-call iterations in one turn",
                    self.config.max_tool_iterations
                )));
            }

            for call in tool_calls {
                let request = ApprovalRequest::new(call.name.clone(), call.input.clone());
                let decision = self.approval.decide(&request).await;
                events(TurnEvent::ToolApproval {
                    name: call.name.clone(),
                    decision: decision.into(),
                });

                if decision.is_denial() {
                    let result = ToolResultBlock::error(call.id.as_str(), "user declined this tool call");
                    session.add_message(Message::tool_result(result));
                    events(TurnEvent::ToolResult { name: call.name.clone(), is_error: true });
                    continue;
                }

                let ctx = ToolContext::new(workspace_root.clone()).with_cancelled(cancelled.clone());
                let result = match self.tools.execute(&ctx, &call.name, call.input.clone()).await {
                    Ok(value) => ToolResultBlock::new(call.id.as_str(), value),
                    Err(e) => ToolResultBlock::error(call.id.as_str(), e.to_string()),
                };
                let is_error = result.is_error;
                session.add_message(Message::tool_result(result));
                events(TurnEvent::ToolResult { name: call.name.clone(), is_error });
            }
        }
    }
}

/// Converts a session [`Message`] into OpenAI wire format. Tool-use blocks on
/// an assistant message become the `tool_calls` array; a tool-role message's
/// single `ToolResult` block becomes `content` + `tool_call_id`.
fn to_openai_message(message: &Message) -> OpenAIMessage {
    use crate::types::MessageRole;

    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
    .to_string();

    if message.role == MessageRole::Tool {
        if let Some(ContentBlock::ToolResult(result)) = message.content.first() {
            return OpenAIMessage {
                role,
                content: Some(OpenAIContent::Text(
                    serde_json::to_string(&result.content).unwrap_or_default(),
                )),
                tool_calls: None,
                tool_call_id: Some(result.tool_use_id.clone()),
                name: message.name.clone(),
            };
        }
    }

    let tool_calls: Vec<crate::types::OpenAIToolCall> = message
        .content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse(t) => Some(crate::types::OpenAIToolCall {
                id: t.id.clone(),
                call_type: "function".to_string(),
                function: crate::types::OpenAIFunction {
                    name: t.name.clone(),
                    arguments: serde_json::to_string(&t.input).unwrap_or_default(),
                },
            }),
            _ => None,
        })
        .collect();

    let parts: Vec<OpenAIContentPart> = message
        .content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text(t) => Some(OpenAIContentPart::text(t.text.clone())),
            ContentBlock::Image(img) => {
                Some(OpenAIContentPart::image_url(img.url(), img.detail()))
            }
            _ => None,
        })
        .collect();

    let content = if parts.is_empty() {
        None
    } else if parts.len() == 1 {
        match &parts[0] {
            OpenAIContentPart::Text { text } => Some(OpenAIContent::Text(text.clone())),
            _ => Some(OpenAIContent::Parts(parts)),
        }
    } else {
        Some(OpenAIContent::Parts(parts))
    };

    OpenAIMessage {
        role,
        content,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
        name: message.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextBlock, ToolUseBlock};

    #[test]
    fn test_to_openai_message_assistant_with_tool_call() {
        let msg = Message::assistant(vec![
            ContentBlock::Text(TextBlock::new("checking")),
            ContentBlock::ToolUse(ToolUseBlock::new("call_1", "read_file", serde_json::json!({"path": "a"}))),
        ]);
        let wire = to_openai_message(&msg);
        assert_eq!(wire.role, "assistant");
        assert!(wire.tool_calls.is_some());
        assert_eq!(wire.tool_calls.unwrap()[0].function.name, "read_file");
    }

    #[test]
    fn test_to_openai_message_tool_result_carries_call_id() {
        let msg = Message::tool_result(ToolResultBlock::new("call_1", serde_json::json!({"ok": true})));
        let wire = to_openai_message(&msg);
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_to_openai_message_plain_user_text() {
        let msg = Message::user("hello");
        let wire = to_openai_message(&msg);
        assert_eq!(wire.role, "user");
        match wire.content {
            Some(OpenAIContent::Text(t)) => assert_eq!(t, "hello"),
            other => panic!("expected Text content, got {other:?}"),
        }
    }
}
