//! Provider client (C2, §4.2): the uniform contract over chat-completion and
//! streaming chat-completion that the rest of the system is built on.
//!
//! `ChatCompletion`, `ChatCompletionStream`, `ListModels`, and `Ping` are the
//! only four operations anything above this module needs from a model
//! backend. [`ProviderConfig`](crate::config::ProviderConfig) decides how
//! those four operations are shaped and authenticated for the two supported
//! wire dialects (direct vs. enterprise-hosted); this module doesn't care
//! which one it's talking to beyond asking the config for a URL, an auth
//! header, and a `model` field value.
//!
//! Retries (non-streaming only, per §4.2 — a stream already mid-flight is
//! never retried) are delegated to [`crate::retry::retry_with_backoff`],
//! which in turn defers all retryability decisions to
//! [`crate::Error::is_retryable`]. This module does not re-derive
//! classification logic.

use std::time::Duration;

use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::{OpenAIChunk, OpenAIMessage, OpenAIRequest, OpenAIResponse};
use crate::utils::parse_sse_stream;
use crate::{Error, Result};

/// A model the provider can serve, as returned by [`Provider::list_models`].
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ModelListResponse {
    data: Vec<Model>,
}

/// A forward-only, lazily-pulled sequence of streaming chunks. Dropping it
/// (rather than reading it to exhaustion) is the idiomatic way to close it;
/// closing twice is a no-op, same as dropping a `reqwest` response body twice.
pub type StreamReader = Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>>;

/// Everything a call needs beyond the request body: how long to wait, and
/// how to cancel.
#[derive(Clone)]
pub struct CallOptions {
    pub timeout: Duration,
    pub cancelled: CancellationToken,
    pub retry: RetryConfig,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            cancelled: CancellationToken::new(),
            retry: RetryConfig::default(),
        }
    }
}

/// The provider client (§4.2). One instance per [`ProviderConfig`]; cheap to
/// construct, cheap to clone (the inner `reqwest::Client` pools connections).
#[derive(Clone)]
pub struct Provider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl Provider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        crate::config::validate(&config)?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// `reasoning_effort` models reject `max_tokens` under that name (§4.2
    /// quirk); we omit it entirely rather than guess at a translated field.
    fn shape_request(&self, req: &ChatRequest) -> OpenAIRequest {
        let reasoning = req.reasoning_effort.clone();
        OpenAIRequest {
            model: self.config.model_field().to_string(),
            messages: req.messages.clone(),
            stream: req.stream,
            max_tokens: if reasoning.is_some() { None } else { req.max_tokens },
            temperature: req.temperature,
            top_p: None,
            presence_penalty: None,
            frequency_penalty: None,
            stop: None,
            seed: None,
            tools: req.tools.clone(),
            tool_choice: None,
            response_format: None,
            user: None,
            reasoning_effort: reasoning,
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.auth_header() {
            Some((name, value)) => builder.header(name, value),
            None => builder,
        }
    }

    /// `ChatCompletion(ctx, req) → resp | err` (§4.2): synchronous, retried
    /// per `opts.retry` on retryable kinds, cancellable mid-attempt or
    /// mid-backoff.
    pub async fn chat_completion(&self, req: &ChatRequest, opts: &CallOptions) -> Result<OpenAIResponse> {
        let body = self.shape_request(&ChatRequest { stream: false, ..req.clone() });
        let url = self.config.chat_completions_url();

        retry_with_backoff(&opts.retry, &opts.cancelled, || async {
            let request = self
                .auth(self.http.post(&url))
                .header("Content-Type", "application/json")
                .timeout(opts.timeout)
                .json(&body);

            let response = tokio::select! {
                r = request.send() => r.map_err(Error::from)?,
                _ = opts.cancelled.cancelled() => return Err(Error::unknown("chat completion cancelled")),
            };

            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            response.json::<OpenAIResponse>().await.map_err(Error::from)
        })
        .await
    }

    /// `ChatCompletionStream(ctx, req) → StreamReader | err` (§4.2). Only the
    /// initial connection attempt is retried; once bytes start arriving the
    /// stream is handed off as-is (§4.2, "not retried after bytes have begun
    /// to arrive").
    pub async fn chat_completion_stream(&self, req: &ChatRequest, opts: &CallOptions) -> Result<StreamReader> {
        let body = self.shape_request(&ChatRequest { stream: true, ..req.clone() });
        let url = self.config.chat_completions_url();

        let response = retry_with_backoff(&opts.retry, &opts.cancelled, || async {
            let request = self
                .auth(self.http.post(&url))
                .header("Content-Type", "application/json")
                .header("Accept", "text/event-stream")
                .timeout(opts.timeout)
                .json(&body);

            let response = tokio::select! {
                r = request.send() => r.map_err(Error::from)?,
                _ = opts.cancelled.cancelled() => return Err(Error::unknown("stream connection cancelled")),
            };

            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            Ok(response)
        })
        .await?;

        Ok(parse_sse_stream(response))
    }

    /// `ListModels(ctx) → [Model] | err` (§4.2). The enterprise-hosted
    /// dialect has no listing API; it synthesizes a single-entry list naming
    /// its fixed deployment.
    pub async fn list_models(&self, opts: &CallOptions) -> Result<Vec<Model>> {
        let Some(url) = self.config.models_url() else {
            return Ok(vec![Model {
                id: self.config.model_field().to_string(),
                owned_by: None,
            }]);
        };

        retry_with_backoff(&opts.retry, &opts.cancelled, || async {
            let request = self.auth(self.http.get(&url)).timeout(opts.timeout);
            let response = request.send().await.map_err(Error::from)?;

            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            let parsed: ModelListResponse = response.json().await.map_err(Error::from)?;
            Ok(parsed.data)
        })
        .await
    }

    /// `Ping(ctx) → err?` (§4.2): a minimum-cost reachability probe.
    /// Authentication failures count as "reachable" — the point is whether
    /// the network path and server exist, not whether our credentials work.
    pub async fn ping(&self, opts: &CallOptions) -> Result<()> {
        match self.list_models(opts).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind == crate::error::ErrorKind::Authentication => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());

    let kind = match status {
        401 | 403 => crate::error::ErrorKind::Authentication,
        404 => crate::error::ErrorKind::ModelNotFound,
        408 => crate::error::ErrorKind::Timeout,
        429 => crate::error::ErrorKind::RateLimit,
        400 | 422 => crate::error::ErrorKind::InvalidRequest,
        s if s >= 500 => crate::error::ErrorKind::ServerError,
        _ => crate::error::ErrorKind::Unknown,
    };

    Error::new(kind, format!("provider returned {status}: {body}")).with_status(status)
}

/// A chat-completion request, provider-dialect-agnostic (the `model` field in
/// the wire request is filled in by [`Provider`] from its config, not from
/// here).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<OpenAIMessage>,
    pub stream: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tools: Option<Vec<serde_json::Value>>,
    pub reasoning_effort: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<OpenAIMessage>) -> Self {
        Self {
            messages,
            stream: false,
            max_tokens: None,
            temperature: None,
            tools: None,
            reasoning_effort: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<serde_json::Value>) -> Self {
        self.tools = if tools.is_empty() { None } else { Some(tools) };
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: Option<String>) -> Self {
        self.reasoning_effort = effort;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_request_omits_max_tokens_for_reasoning_models() {
        let provider = Provider::new(ProviderConfig::direct("http://x", "o1", None)).unwrap();
        let req = ChatRequest::new(vec![])
            .with_max_tokens(Some(100))
            .with_reasoning_effort(Some("high".to_string()));

        let shaped = provider.shape_request(&req);
        assert!(shaped.max_tokens.is_none());
        assert_eq!(shaped.reasoning_effort.as_deref(), Some("high"));
    }

    #[test]
    fn test_shape_request_keeps_max_tokens_without_reasoning_effort() {
        let provider = Provider::new(ProviderConfig::direct("http://x", "gpt-4o", None)).unwrap();
        let req = ChatRequest::new(vec![]).with_max_tokens(Some(2048));

        let shaped = provider.shape_request(&req);
        assert_eq!(shaped.max_tokens, Some(2048));
    }

    #[test]
    fn test_shape_request_uses_deployment_as_model_field() {
        let provider = Provider::new(ProviderConfig::enterprise_hosted(
            "https://x",
            "gpt4-deploy",
            "2024-06-01",
            None,
        ))
        .unwrap();
        let req = ChatRequest::new(vec![]);
        assert_eq!(provider.shape_request(&req).model, "gpt4-deploy");
    }

    #[tokio::test]
    async fn test_list_models_synthesizes_single_entry_for_enterprise() {
        let provider = Provider::new(ProviderConfig::enterprise_hosted(
            "https://x",
            "my-deploy",
            "v1",
            None,
        ))
        .unwrap();
        let models = provider.list_models(&CallOptions::default()).await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "my-deploy");
    }
}
