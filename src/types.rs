//! Core type definitions for the agent runtime.
//!
//! The type system is organized into three groups:
//!
//! - **Agent configuration**: [`AgentOptions`] / [`AgentOptionsBuilder`], plus the
//!   validated newtypes ([`ModelName`], [`BaseUrl`], [`Temperature`]) that keep invalid
//!   configuration from being representable.
//! - **Conversation model**: [`Message`], [`MessageRole`], [`ContentBlock`] and its
//!   variants — the provider-agnostic shape everything above C2 works with.
//! - **Wire format**: the `OpenAI*` family, matching the chat-completion request and
//!   response shapes consumed/produced on the network (§6). These are an internal
//!   serialization detail; callers interact with [`Message`], not `OpenAIMessage`.
//!
//! Internal SDK types are kept distinct from wire types so that request/response
//! shaping (camelCase/snake_case quirks, the `arguments`-as-JSON-string convention,
//! streaming deltas) stays out of the conversation model.

use crate::Error;
use crate::hooks::Hooks;
use crate::retry::RetryConfig;
use crate::security::SecurityPolicy;
use crate::tools::Tool;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// NEWTYPE WRAPPERS FOR COMPILE-TIME TYPE SAFETY
// ============================================================================

/// Validated model name with compile-time type safety.
///
/// This newtype wrapper ensures that model names are validated at construction time
/// rather than at runtime, catching invalid configurations earlier in development.
///
/// # Validation Rules
///
/// - Must not be empty
/// - Must not be only whitespace
///
/// # Example
///
/// ```
/// use coda_core::ModelName;
///
/// let model = ModelName::new("gpt-4o").unwrap();
/// assert_eq!(model.as_str(), "gpt-4o");
/// assert!(ModelName::new("").is_err());
/// assert!(ModelName::new("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelName(String);

impl ModelName {
    /// Creates a new `ModelName` after validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the model name is empty or contains only whitespace.
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(Error::invalid_request(
                "model name cannot be empty or whitespace",
            ));
        }

        Ok(ModelName(name))
    }

    /// Returns the model name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `ModelName` and returns the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated base URL with compile-time type safety.
///
/// # Validation Rules
///
/// - Must not be empty
/// - Must start with `http://` or `https://`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Creates a new `BaseUrl` after validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or doesn't start with http:// or https://.
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        let url = url.into();
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(Error::invalid_request("base_url cannot be empty"));
        }

        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(Error::invalid_request(
                "base_url must start with http:// or https://",
            ));
        }

        Ok(BaseUrl(url))
    }

    /// Returns the base URL as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `BaseUrl` and returns the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated sampling temperature (`0.0..=2.0`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f32);

impl Temperature {
    /// Creates a new `Temperature` after validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the temperature is not between 0.0 and 2.0 (inclusive).
    pub fn new(temp: f32) -> crate::Result<Self> {
        if !(0.0..=2.0).contains(&temp) {
            return Err(Error::invalid_request(
                "temperature must be between 0.0 and 2.0",
            ));
        }

        Ok(Temperature(temp))
    }

    /// Returns the temperature value.
    pub fn value(&self) -> f32 {
        self.0
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// AGENT CONFIGURATION
// ============================================================================

/// Default used when the embedding application supplies no approval mode and
/// none of the `OPEN_AGENT_*` knobs apply. Interactive prompting on every
/// tool call is the safe default; callers opt into automation explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalMode {
    /// Every tool invocation is routed through the approval engine's
    /// interactive decision (§4.9), subject to session memory.
    #[default]
    AlwaysAsk,
    /// Read-only tool categories (e.g. `read_file`, `list_files`, `search_files`)
    /// are auto-approved; writes/edits/deletes still prompt.
    AutoApproveReads,
    /// Nothing prompts. Intended for CI/headless callers that have already
    /// reviewed the tool catalog and security policy out of band.
    AutoApproveAll,
}

/// Configuration options for an agent session.
///
/// `AgentOptions` controls provider selection, sampling parameters, tool
/// availability, retry/security/approval policy, and lifecycle hooks.
/// Construct it via [`AgentOptions::builder()`] rather than directly, so
/// required fields are validated before a session can start.
///
/// # Thread Safety
///
/// Tools are wrapped in `Arc<dyn Tool>` so the option set (and the tools it
/// carries) can be cheaply cloned and shared across an orchestrator's worker
/// tasks.
#[derive(Clone)]
pub struct AgentOptions {
    system_prompt: String,
    provider: crate::config::ProviderConfig,
    max_turns: u32,
    max_tokens: Option<u32>,
    temperature: f32,
    top_p: Option<f32>,
    presence_penalty: Option<f32>,
    frequency_penalty: Option<f32>,
    stop: Option<Vec<String>>,
    seed: Option<i64>,
    reasoning_effort: Option<String>,
    timeout: u64,
    tools: Vec<Arc<dyn Tool>>,
    auto_execute_tools: bool,
    max_tool_iterations: u32,
    hooks: Hooks,
    retry: RetryConfig,
    security_policy: Option<SecurityPolicy>,
    approval_mode: ApprovalMode,
    workspace_root: PathBuf,
}

/// Custom Debug impl: masks the API key and summarizes the tool list instead
/// of trying to debug-print `Arc<dyn Tool>` closures.
impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("system_prompt", &self.system_prompt)
            .field("model", &self.provider.model_field())
            .field("base_url", &self.provider.base_url)
            .field("api_key", &self.provider.api_key.as_ref().map(|_| "***"))
            .field("max_turns", &self.max_turns)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("tools", &format!("{} tools", self.tools.len()))
            .field("auto_execute_tools", &self.auto_execute_tools)
            .field("max_tool_iterations", &self.max_tool_iterations)
            .field("approval_mode", &self.approval_mode)
            .field("workspace_root", &self.workspace_root)
            .finish()
    }
}

impl AgentOptions {
    /// Creates a new builder for constructing [`AgentOptions`].
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn provider(&self) -> &crate::config::ProviderConfig {
        &self.provider
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn top_p(&self) -> Option<f32> {
        self.top_p
    }

    pub fn presence_penalty(&self) -> Option<f32> {
        self.presence_penalty
    }

    pub fn frequency_penalty(&self) -> Option<f32> {
        self.frequency_penalty
    }

    pub fn stop(&self) -> Option<&[String]> {
        self.stop.as_deref()
    }

    pub fn seed(&self) -> Option<i64> {
        self.seed
    }

    /// The reasoning-effort hint (§4.2), passed through verbatim to providers
    /// that support it and omitted otherwise.
    pub fn reasoning_effort(&self) -> Option<&str> {
        self.reasoning_effort.as_deref()
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn auto_execute_tools(&self) -> bool {
        self.auto_execute_tools
    }

    /// The per-turn tool-call iteration cap (§4.10 guardrail).
    pub fn max_tool_iterations(&self) -> u32 {
        self.max_tool_iterations
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn security_policy(&self) -> Option<&SecurityPolicy> {
        self.security_policy.as_ref()
    }

    pub fn approval_mode(&self) -> ApprovalMode {
        self.approval_mode
    }

    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace_root
    }
}

/// Builder for constructing [`AgentOptions`] with validation.
///
/// Required: `model`, `base_url` (or a prior call to
/// [`provider()`](AgentOptionsBuilder::provider) supplying a complete
/// [`ProviderConfig`](crate::config::ProviderConfig)). Everything else has a
/// default consistent with §4's component defaults.
#[derive(Default)]
pub struct AgentOptionsBuilder {
    system_prompt: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    provider_override: Option<crate::config::ProviderConfig>,
    max_turns: Option<u32>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    presence_penalty: Option<f32>,
    frequency_penalty: Option<f32>,
    stop: Option<Vec<String>>,
    seed: Option<i64>,
    reasoning_effort: Option<String>,
    timeout: Option<u64>,
    tools: Vec<Arc<dyn Tool>>,
    auto_execute_tools: Option<bool>,
    max_tool_iterations: Option<u32>,
    hooks: Hooks,
    retry: Option<RetryConfig>,
    security_policy: Option<SecurityPolicy>,
    approval_mode: Option<ApprovalMode>,
    workspace_root: Option<PathBuf>,
}

impl std::fmt::Debug for AgentOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptionsBuilder")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("tools", &format!("{} tools", self.tools.len()))
            .finish()
    }
}

impl AgentOptionsBuilder {
    /// Sets the system prompt prepended to every turn's assembled prompt (§4.7).
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the model identifier. Ignored if [`provider()`](Self::provider) was
    /// also called — the explicit `ProviderConfig` wins.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the API endpoint URL. Ignored if [`provider()`](Self::provider) was
    /// also called.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the API key used to authenticate.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Supplies a full [`ProviderConfig`](crate::config::ProviderConfig) directly —
    /// use this for the enterprise-hosted variant, which needs a deployment name
    /// and api-version that `model()`/`base_url()` can't express.
    pub fn provider(mut self, provider: crate::config::ProviderConfig) -> Self {
        self.provider_override = Some(provider);
        self
    }

    pub fn max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn presence_penalty(mut self, penalty: f32) -> Self {
        self.presence_penalty = Some(penalty);
        self
    }

    pub fn frequency_penalty(mut self, penalty: f32) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }

    pub fn stop(mut self, sequences: Vec<String>) -> Self {
        self.stop = Some(sequences);
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the reasoning-effort hint for reasoning-class models (§4.2 quirk:
    /// these models also reject `max_tokens` under that name, handled in C2).
    pub fn reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = Some(effort.into());
        self
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn auto_execute_tools(mut self, auto: bool) -> Self {
        self.auto_execute_tools = Some(auto);
        self
    }

    /// Per-turn tool-call iteration cap (§4.10). Exceeding it surfaces a
    /// turn-fatal error rather than looping forever.
    pub fn max_tool_iterations(mut self, iterations: u32) -> Self {
        self.max_tool_iterations = Some(iterations);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = Some(policy);
        self
    }

    pub fn approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = Some(mode);
        self
    }

    /// Root used to resolve relative tool paths and to discover workspace
    /// instructions files (§4.7). Defaults to the process's current directory.
    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Validates configuration and builds the final [`AgentOptions`].
    ///
    /// # Errors
    ///
    /// Returns an error if no provider could be resolved (no explicit
    /// `model`/`base_url`/`provider()`, and no usable environment-variable
    /// fallback — see `crate::config`), or if `temperature`/`max_tokens` are
    /// out of range.
    pub fn build(self) -> crate::Result<AgentOptions> {
        let provider = match self.provider_override {
            Some(p) => p,
            None => {
                let base_url = crate::config::get_base_url(self.base_url.as_deref());
                let model = crate::config::get_model(self.model.as_deref(), true)
                    .ok_or_else(|| Error::invalid_request("model is required"))?;
                let api_key = crate::config::get_api_key(self.api_key.as_deref());
                crate::config::ProviderConfig::direct(base_url, model, api_key)
            }
        };
        crate::config::validate(&provider)?;

        let temperature = self.temperature.unwrap_or(0.7);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::invalid_request(
                "temperature must be between 0.0 and 2.0",
            ));
        }

        let max_tokens = self.max_tokens.or(Some(4096));
        if let Some(tokens) = max_tokens {
            if tokens == 0 {
                return Err(Error::invalid_request("max_tokens must be greater than 0"));
            }
        }

        Ok(AgentOptions {
            system_prompt: self.system_prompt.unwrap_or_default(),
            provider,
            max_turns: self.max_turns.unwrap_or(1),
            max_tokens,
            temperature,
            top_p: self.top_p,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            stop: self.stop,
            seed: self.seed,
            reasoning_effort: self.reasoning_effort,
            timeout: self.timeout.unwrap_or(60),
            tools: self.tools,
            auto_execute_tools: self.auto_execute_tools.unwrap_or(false),
            // §4.10: default cap of 16 tool-call iterations per turn.
            max_tool_iterations: self.max_tool_iterations.unwrap_or(16),
            hooks: self.hooks,
            retry: self.retry.unwrap_or_default(),
            security_policy: self.security_policy,
            approval_mode: self.approval_mode.unwrap_or_default(),
            workspace_root: self.workspace_root.unwrap_or_else(|| {
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            }),
        })
    }
}

// ============================================================================
// CONVERSATION MODEL
// ============================================================================

/// Identifies the sender/role of a message in the conversation.
///
/// Serializes to lowercase strings via serde (`"system"`, `"user"`, etc.) to
/// match the wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Establishes agent behavior and context; typically the first message.
    System,
    /// Input from the human or calling application.
    User,
    /// Response from the model; may include text, tool-use requests, or both.
    Assistant,
    /// Result of a tool execution, sent back to the model.
    Tool,
}

/// Multi-modal content blocks that can appear in messages.
///
/// Uses serde's externally tagged enum format with a `"type"` field:
/// ```json
/// {"type": "text", "text": "Hello"}
/// {"type": "tool_use", "id": "call_123", "name": "search", "input": {...}}
/// {"type": "tool_result", "tool_use_id": "call_123", "content": {...}}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Image(ImageBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
}

/// Simple text content in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A tool invocation requested by the model (§3 ToolCall, in its parsed form).
///
/// `id` correlates this request with the [`ToolResultBlock`] sent back after
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl ToolUseBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Tool execution result sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// Must match the `id` of the [`ToolUseBlock`] this result answers.
    pub tool_use_id: String,
    pub content: serde_json::Value,
    /// Set when the tool call was denied or failed — the orchestrator still
    /// appends a tool-role message (§7), but marks it so C10 doesn't treat
    /// the content as a successful result when deciding the next turn.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResultBlock {
    pub fn new(tool_use_id: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content,
            is_error: false,
        }
    }

    pub fn error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: serde_json::json!({ "error": message.into() }),
            is_error: true,
        }
    }
}

/// Image detail level for vision API calls.
///
/// Controls the resolution and token cost of image processing: `Low` is a
/// fixed 85 tokens at 512x512, `High` is variable based on dimensions, `Auto`
/// (default) lets the model decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    #[default]
    Auto,
}

impl std::fmt::Display for ImageDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageDetail::Low => write!(f, "low"),
            ImageDetail::High => write!(f, "high"),
            ImageDetail::Auto => write!(f, "auto"),
        }
    }
}

/// Image content block for vision-capable models. Supports both URL-based
/// and base64-encoded (data URI) images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBlock {
    url: String,
    #[serde(default)]
    detail: ImageDetail,
}

impl ImageBlock {
    /// Creates an image block from a URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty, has an unsupported scheme, or
    /// (for a `data:` URI) is malformed.
    pub fn from_url(url: impl Into<String>) -> crate::Result<Self> {
        let url = url.into();

        if url.is_empty() {
            return Err(Error::invalid_request("image URL cannot be empty"));
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(Self {
                url,
                detail: ImageDetail::default(),
            });
        }

        if let Some(mime_part) = url.strip_prefix("data:") {
            if !url.contains(";base64,") {
                return Err(Error::invalid_request(
                    "data URI must be in format: data:image/TYPE;base64,DATA",
                ));
            }
            match mime_part.find(';') {
                Some(semicolon_pos) => {
                    let mime_type = &mime_part[..semicolon_pos];
                    if mime_type.is_empty() || !mime_type.starts_with("image/") {
                        return Err(Error::invalid_request(
                            "data URI MIME type must start with 'image/'",
                        ));
                    }
                }
                None => {
                    return Err(Error::invalid_request(
                        "malformed data URI: missing MIME type",
                    ));
                }
            }
            return Ok(Self {
                url,
                detail: ImageDetail::default(),
            });
        }

        Err(Error::invalid_request(
            "image URL must start with http://, https://, or data:",
        ))
    }

    /// Creates an image block from base64-encoded data, wrapped as a data URI.
    pub fn from_base64(
        base64_data: impl AsRef<str>,
        mime_type: impl AsRef<str>,
    ) -> crate::Result<Self> {
        let data = base64_data.as_ref();
        let mime = mime_type.as_ref();

        if data.is_empty() {
            return Err(Error::invalid_request("base64 image data cannot be empty"));
        }
        if mime.is_empty() {
            return Err(Error::invalid_request("MIME type cannot be empty"));
        }
        if !mime.starts_with("image/") {
            return Err(Error::invalid_request(
                "MIME type must start with 'image/' (e.g. 'image/png')",
            ));
        }

        Ok(Self {
            url: format!("data:{};base64,{}", mime, data),
            detail: ImageDetail::default(),
        })
    }

    pub fn with_detail(mut self, detail: ImageDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Returns the image URL (or data URI for base64 images).
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn detail(&self) -> ImageDetail {
        self.detail
    }
}

/// A complete message in a conversation (§3 Message).
///
/// Each message has a role (who sent it) and one or more content blocks
/// (what it contains), supporting multi-modal and tool-use content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
    /// Optional sender name (§3), e.g. to distinguish multiple human
    /// participants or tool identities sharing the same role. Not set by any
    /// constructor here; attach one with [`Message::with_name`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self { role, content, name: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::Text(TextBlock::new(text))],
            name: None,
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
            name: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: vec![ContentBlock::Text(TextBlock::new(text))],
            name: None,
        }
    }

    pub fn user_with_blocks(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::User,
            content,
            name: None,
        }
    }

    /// Tool-role message carrying a tool's result (or its denial/failure, via
    /// [`ToolResultBlock::error`]).
    pub fn tool_result(block: ToolResultBlock) -> Self {
        Self {
            role: MessageRole::Tool,
            content: vec![ContentBlock::ToolResult(block)],
            name: None,
        }
    }

    /// User message with text and an image from a URL (`ImageDetail::Auto`).
    pub fn user_with_image(
        text: impl Into<String>,
        image_url: impl Into<String>,
    ) -> crate::Result<Self> {
        Ok(Self {
            role: MessageRole::User,
            content: vec![
                ContentBlock::Text(TextBlock::new(text)),
                ContentBlock::Image(ImageBlock::from_url(image_url)?),
            ],
            name: None,
        })
    }

    pub fn user_with_image_detail(
        text: impl Into<String>,
        image_url: impl Into<String>,
        detail: ImageDetail,
    ) -> crate::Result<Self> {
        Ok(Self {
            role: MessageRole::User,
            content: vec![
                ContentBlock::Text(TextBlock::new(text)),
                ContentBlock::Image(ImageBlock::from_url(image_url)?.with_detail(detail)),
            ],
            name: None,
        })
    }

    pub fn user_with_base64_image(
        text: impl Into<String>,
        base64_data: impl AsRef<str>,
        mime_type: impl AsRef<str>,
    ) -> crate::Result<Self> {
        Ok(Self {
            role: MessageRole::User,
            content: vec![
                ContentBlock::Text(TextBlock::new(text)),
                ContentBlock::Image(ImageBlock::from_base64(base64_data, mime_type)?),
            ],
            name: None,
        })
    }

    /// Attaches a sender name, overwriting any previous one.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Any tool-use blocks this (assistant) message carries, in order.
    pub fn tool_calls(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of this message's text blocks, for display and for
    /// token-estimation in [`crate::context`].
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

// ============================================================================
// OPENAI-COMPATIBLE WIRE FORMAT (§6)
// ============================================================================

/// OpenAI message content: a plain string, or an array of parts for
/// multi-modal (text + image) messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

/// A single content part in an OpenAI message: text or an image URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAIContentPart {
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: OpenAIImageUrl },
}

impl OpenAIContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>, detail: ImageDetail) -> Self {
        Self::ImageUrl {
            image_url: OpenAIImageUrl {
                url: url.into(),
                detail: Some(detail.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A message in OpenAI wire format — the serialized form of [`Message`] sent
/// over the network, and the form [`OpenAIResponseChoice`] deserializes into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<OpenAIContent>,
    /// Tool calls requested by the assistant (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    /// ID of the tool call this message answers (tool messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A tool call in OpenAI wire format: `{id, type: "function", function}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAIFunction,
}

/// Function/tool call details. `arguments` is a JSON **string**, not a parsed
/// object — an OpenAI API quirk callers must `serde_json::from_str` themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunction {
    pub name: String,
    pub arguments: String,
}

/// Request payload for the chat-completions endpoint (§6). Optional fields
/// are omitted from the serialized JSON when `None`, letting the provider
/// apply its own defaults.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Reasoning-effort hint for reasoning-class models. These models also
    /// reject `max_tokens` under that name (§4.2 quirk) — C2 omits it rather
    /// than translating, since there's no universal equivalent parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

/// Token usage reported alongside a completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenAIUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) chat-completion response — C2's
/// `ChatCompletion` return type.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<OpenAIResponseChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
    #[serde(default)]
    pub system_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIResponseChoice {
    pub index: u32,
    pub message: OpenAIMessage,
    pub finish_reason: Option<String>,
}

/// A single chunk from a streaming chat-completion response. Chunks arrive as
/// Server-Sent Events; the stream terminates with the literal event data
/// `[DONE]` (handled in `detector`/`client`, not represented here).
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChunk {
    #[allow(dead_code)]
    pub id: String,
    #[allow(dead_code)]
    pub object: String,
    #[allow(dead_code)]
    pub created: i64,
    #[allow(dead_code)]
    pub model: String,
    pub choices: Vec<OpenAIChoice>,
}

/// A single choice in a streaming chunk: an incremental delta plus an
/// optional finish reason (`stop`, `length`, `tool_calls`, `content_filter`).
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChoice {
    #[allow(dead_code)]
    pub index: u32,
    pub delta: OpenAIDelta,
    pub finish_reason: Option<String>,
}

/// Incremental update in a streaming chunk. Deltas are cumulative only in the
/// sense that the detector (C8) concatenates them; each individual delta
/// carries only what's new in this chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIDelta {
    #[allow(dead_code)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

/// Incremental update for one tool call, keyed by `index` so multiple
/// concurrently-streamed tool calls don't interleave into each other.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[allow(dead_code)]
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    pub call_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<OpenAIFunctionDelta>,
}

/// Incremental function-call details: `name` usually arrives once, then
/// `arguments` streams as JSON-string fragments to be concatenated and parsed.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIFunctionDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
