//! # Coda Core
//!
//! Core conversational agent runtime for a terminal AI coding assistant:
//! streaming provider client, tool registry with built-in and plug-in tools,
//! security validation, and human-in-the-loop approval.
//!
//! ## Overview
//!
//! This crate provides the agent runtime underneath a CLI (not included
//! here): a per-turn orchestration loop that talks to an OpenAI-compatible
//! chat-completions endpoint (direct or enterprise-hosted), detects tool
//! calls in the streamed response, gates them behind an approval engine, and
//! dispatches them to built-in filesystem tools or externally plugged-in
//! tool servers.
//!
//! ## Key Features
//!
//! - **Streaming first**: token-by-token display text, decoupled from tool-call
//!   detection via a small state machine ([`Detector`]).
//! - **Tool calling**: a trait-object [`Tool`] registry with automatic JSON
//!   schema generation and a security-validated built-in filesystem toolset.
//! - **Human-in-the-loop approval**: every tool call passes through an
//!   [`ApprovalEngine`] before it runs, with per-session `Always`/`Never` memory.
//! - **Crash-safe sessions**: append-only history persisted as newline-delimited
//!   JSON, tolerating a truncated tail from a crash mid-write.
//! - **Cancellation**: every suspension point (network calls, tool I/O, approval
//!   prompts) observes a `tokio_util::sync::CancellationToken`.
//! - **Retry with backoff**: exponential backoff with jitter for retryable
//!   provider errors, never applied once a stream has started.
//!
//! ## Minimal usage
//!
//! ```rust,no_run
//! use coda_core::{
//!     AgentOptions, AlwaysApprove, ApprovalEngine, Orchestrator, OrchestratorConfig,
//!     PromptContext, Provider, Session, ToolManager, TurnEvent,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .model("gpt-4o")
//!         .base_url("https://api.openai.com/v1")
//!         .build()?;
//!
//!     let provider = Provider::new(options.provider().clone())?;
//!     let tools = ToolManager::new();
//!     let approval = ApprovalEngine::new(options.approval_mode(), Box::new(AlwaysApprove));
//!     let mut session = Session::new(options.provider().model_field());
//!
//!     let orchestrator = Orchestrator::new(
//!         provider,
//!         tools,
//!         approval,
//!         OrchestratorConfig::default(),
//!         PromptContext { base_instructions: options.system_prompt().to_string(), ..Default::default() },
//!     );
//!
//!     orchestrator
//!         .run_turn(
//!             &mut session,
//!             std::env::current_dir()?,
//!             "What's the capital of France?",
//!             Default::default(),
//!             |event| {
//!                 if let TurnEvent::Display(text) = event {
//!                     print!("{text}");
//!                 }
//!             },
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **provider**: uniform chat-completion/streaming/model-listing contract over
//!   direct and enterprise-hosted wire dialects
//! - **config**: provider dialect selection and URL/auth shaping
//! - **plugin**: external tool-server lifecycle and its registry adaptor into `tools`
//! - **orchestrator**: the per-turn chat handler tying every other module together
//! - **detector**: streaming state machine separating display text from tool calls
//! - **approval**: human-consent gate with session memory and fingerprinting
//! - **tools**: tool trait, registry, and the built-in filesystem tools
//! - **security**: path/operation/content validation the built-in tools run through
//! - **session**: append-only history, prompt assembly, crash-safe persistence
//! - **types**: messages, content blocks, agent configuration, wire types
//! - **hooks**: lower-level PreToolUse/PostToolUse/UserPromptSubmit interception
//! - **context**: token estimation and history truncation utilities
//! - **retry**: exponential backoff retry logic with jitter
//! - **error**: the closed error taxonomy used across the public API

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
// These modules are private (internal implementation details) unless explicitly
// re-exported through `pub use` statements below.

/// User-consent gate for tool execution: session memory, fingerprinting,
/// and the interactive-prompt fallback described in the approval engine design.
mod approval;

/// Provider dialect selection (direct vs. enterprise-hosted) and URL/auth
/// shaping, with environment-variable fallback for base URL and model name.
mod config;

/// External tool-server lifecycle manager and its registry adaptor into
/// `tools`: the Starting/Running/Error/Stopped state machine, plus
/// stdio/HTTP/SSE JSON-RPC transports.
mod plugin;

/// Context window management utilities for token estimation and history truncation.
/// Provides manual control over conversation memory to prevent context overflow.
mod context;

/// Stream/tool-call detector: separates display text from structured and
/// textual-fence tool-call conventions in a streaming response.
mod detector;

/// Error types and conversions for comprehensive error handling throughout the SDK.
/// Defines the `Error` enum and `Result<T>` type alias used across all public APIs.
mod error;

/// Lifecycle hooks system for intercepting and controlling execution at key points.
/// Enables security gates, audit logging, input/output modification, and compliance checks.
mod hooks;

/// Chat handler: the per-turn orchestration loop tying the provider client,
/// detector, approval engine, and tool manager together.
mod orchestrator;

/// Provider client: the uniform `ChatCompletion`/`ChatCompletionStream`/
/// `ListModels`/`Ping` contract over the direct and enterprise-hosted wire
/// dialects described in `config`.
mod provider;

/// Security validator: path/operation/content checks built-in tools run
/// before touching the filesystem.
mod security;

/// Append-only session log, prompt assembly, and crash-safe persistence.
mod session;

/// Tool definition and execution system with automatic JSON schema generation.
/// Allows LLMs to call Rust functions with type-safe parameter handling.
mod tools;

/// Core type definitions for messages, content blocks, and agent configuration.
/// Includes builder patterns for ergonomic configuration and OpenAI API serialization.
mod types;

/// Internal utilities for Server-Sent Events (SSE) parsing and tool call aggregation.
/// Handles the low-level details of streaming response parsing.
mod utils;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================
// These items form the public API of the crate. Everything else is internal.

/// Retry utilities with exponential backoff and jitter.
/// Made public as a module so users can access retry configuration and functions
/// for their own operations that need retry logic.
pub mod retry;

// --- Provider Client ---

pub use provider::{CallOptions, ChatRequest, Model, Provider, StreamReader};

// --- Provider Configuration ---

pub use config::{ProviderConfig, ProviderKind, get_api_key, get_base_url, get_model};

// --- Context Management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Error Handling ---

pub use error::{Error, ErrorKind, Result};

// --- Lifecycle Hooks ---

pub use hooks::{
    HOOK_POST_TOOL_USE, HOOK_PRE_TOOL_USE, HOOK_USER_PROMPT_SUBMIT, HookDecision, Hooks,
    PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent,
};

// --- Tool System ---

pub use tools::{Manager as ToolManager, Tool, ToolBuilder, ToolContext, tool};
pub use tools::builtin;

// --- Plug-in Server Manager ---

pub use plugin::{Capabilities, PluginManager, PluginServerConfig, ServerState, ServerStatus, TransportKind};

// --- Approval Engine ---

pub use approval::{AlwaysApprove, ApprovalEngine, ApprovalRequest, Approver, Decision as ApprovalDecision};

// --- Session & History ---

pub use session::{ApprovalRecord, Session, load_workspace_instructions};

// --- Stream / Tool-Call Detector ---

pub use detector::{Detector, DetectorEvent};

// --- Chat Handler / Orchestrator ---

pub use orchestrator::{
    ApprovalDecisionKind, CallOptionsTemplate, Orchestrator, OrchestratorConfig, PromptContext,
    TurnEvent,
};

// --- Core Types ---

pub use types::{
    AgentOptions, AgentOptionsBuilder, ApprovalMode, ContentBlock, Message, MessageRole, TextBlock,
    ToolResultBlock, ToolUseBlock,
};

// --- Streaming Wire Types ---
//
// Named here because `Provider::chat_completion_stream` already returns
// `StreamReader = Stream<Item = Result<OpenAIChunk>>` — without these, a
// caller driving the stream by hand (rather than through `Orchestrator`)
// couldn't name the item type, and `Detector::process_chunk` couldn't be
// called from outside this crate either.
pub use types::{OpenAIChoice, OpenAIChunk, OpenAIDelta, OpenAIFunctionDelta, OpenAIToolCallDelta};

// --- Security Validation ---

pub use security::{Operation, SecurityPolicy, SecurityValidator};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module bundling the pieces a typical embedder wires together:
/// the orchestrator and its collaborators, agent configuration, and the
/// closed error type. Import with `use coda_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        AgentOptions, AgentOptionsBuilder, AlwaysApprove, ApprovalEngine, ApprovalMode,
        ContentBlock, Error, Message, Orchestrator, OrchestratorConfig, PromptContext, Provider,
        Result, Session, TextBlock, Tool, ToolManager, ToolUseBlock, TurnEvent, tool,
    };
}
