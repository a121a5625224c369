//! # Provider configuration
//!
//! Resolves which wire dialect (§4.2) the provider client should speak and
//! how a chat-completion request should be shaped and authenticated for it.
//!
//! Two variants are supported:
//!
//! - **Direct**: bearer-token `Authorization` header, model id selected per
//!   request, real model-listing API.
//! - **EnterpriseHosted**: deployment-name-in-path URL construction, a custom
//!   `api-key` header, and a fixed deployment that substitutes for both the
//!   model id on requests and the entire model listing.
//!
//! Resolution of the base URL and model name follows the same
//! environment-variable precedence chain used throughout this crate: an
//! explicit argument wins, then an `OPEN_AGENT_*`-prefixed environment
//! variable, then a hardcoded default. There is no config-file format here —
//! that belongs to the excluded CLI collaborator.

use std::env;

use crate::error::{Error, Result};

/// Which wire dialect a provider speaks. See module docs for the distinction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// Bearer-token auth, model id passed verbatim, real `/models` listing.
    Direct,
    /// Deployment-name-in-path URL, `api-key` header, fixed deployment
    /// substitutes for the model id and the listing.
    EnterpriseHosted {
        /// The deployment name, used both as the path segment and as the
        /// `model` field in request bodies.
        deployment: String,
        /// The `api-version` query parameter required by the hosting gateway.
        api_version: String,
    },
}

/// Resolved provider configuration: which dialect, where to send requests,
/// and which credentials to use.
#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl ProviderConfig {
    pub fn direct(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            kind: ProviderKind::Direct,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    pub fn enterprise_hosted(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let deployment = deployment.into();
        Self {
            kind: ProviderKind::EnterpriseHosted {
                deployment: deployment.clone(),
                api_version: api_version.into(),
            },
            base_url: endpoint.into(),
            api_key,
            model: deployment,
        }
    }

    /// The full URL for a (streaming or non-streaming) chat-completion call.
    pub fn chat_completions_url(&self) -> String {
        match &self.kind {
            ProviderKind::Direct => format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            ProviderKind::EnterpriseHosted {
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    /// The URL for listing models, or `None` when the variant has no
    /// listing API and instead synthesizes a single-entry list (see C2).
    pub fn models_url(&self) -> Option<String> {
        match &self.kind {
            ProviderKind::Direct => Some(format!("{}/models", self.base_url.trim_end_matches('/'))),
            ProviderKind::EnterpriseHosted { .. } => None,
        }
    }

    /// The header name/value pair used to authenticate, if any credential is
    /// configured.
    pub fn auth_header(&self) -> Option<(&'static str, String)> {
        let key = self.api_key.as_ref()?;
        let header = match self.kind {
            ProviderKind::Direct => ("Authorization", format!("Bearer {key}")),
            ProviderKind::EnterpriseHosted { .. } => ("api-key", key.clone()),
        };
        Some(header)
    }

    /// The value to place in the request body's `model` field.
    pub fn model_field(&self) -> &str {
        match &self.kind {
            ProviderKind::Direct => &self.model,
            ProviderKind::EnterpriseHosted { deployment, .. } => deployment,
        }
    }
}

/// Get the base URL (or enterprise endpoint) with environment variable
/// support.
///
/// Priority: `OPEN_AGENT_BASE_URL` env var, then `fallback`, then a generic
/// OpenAI-compatible default.
pub fn get_base_url(fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("OPEN_AGENT_BASE_URL") {
        return url;
    }
    fallback.unwrap_or("https://api.openai.com/v1").to_string()
}

/// Get the API key with environment variable support.
///
/// Priority: `OPEN_AGENT_API_KEY` env var, then `fallback`.
pub fn get_api_key(fallback: Option<&str>) -> Option<String> {
    if let Ok(key) = env::var("OPEN_AGENT_API_KEY") {
        return Some(key);
    }
    fallback.map(|s| s.to_string())
}

/// Get the model name with optional environment variable override.
///
/// If `prefer_env` is true, `OPEN_AGENT_MODEL` is checked before `fallback`;
/// otherwise only `fallback` is used.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Ok(model) = env::var("OPEN_AGENT_MODEL") {
            return Some(model);
        }
    }
    fallback.map(|s| s.to_string())
}

/// Validates that an enterprise-hosted config has a non-empty deployment and
/// api-version; direct configs have no such requirement.
pub fn validate(config: &ProviderConfig) -> Result<()> {
    if let ProviderKind::EnterpriseHosted {
        deployment,
        api_version,
    } = &config.kind
    {
        if deployment.is_empty() {
            return Err(Error::invalid_request(
                "enterprise-hosted provider requires a non-empty deployment name",
            ));
        }
        if api_version.is_empty() {
            return Err(Error::invalid_request(
                "enterprise-hosted provider requires a non-empty api-version",
            ));
        }
    }
    if config.base_url.is_empty() {
        return Err(Error::invalid_request("base_url must not be empty"));
    }
    Ok(())
}
