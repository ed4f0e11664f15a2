//! # AI Relay
//!
//! Sends a user prompt to the configured provider over the shared [`ApiClient`]
//! and extracts the reply text.
//!
//! ## Wire formats:
//! - **Gemini**: `POST {endpoint}/v1beta/models/{model}:generateContent`, key in
//!   `x-goog-api-key`, reply in `candidates[0].content.parts[*].text`.
//! - **OpenAI / xAI**: `POST {endpoint}/v1/chat/completions`, bearer key, reply in
//!   `choices[0].message.content`.
//! - **Azure**: `POST {endpoint}/openai/deployments/{model}/chat/completions?api-version=...`,
//!   key in `api-key`, same reply shape as OpenAI.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::provider::Provider;
use crate::retrieve::{header_map, ApiClient, Payload};

/// Default Azure OpenAI REST API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Language models answer slowly; feeds keep the client default.
pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("AI assistant is not configured: {0}")]
    Config(String),

    #[error("{provider} request failed: {reason}")]
    Request { provider: Provider, reason: String },

    #[error("{provider} returned no text")]
    EmptyReply { provider: Provider },
}

/// The `ask(prompt) -> text` capability the message handler depends on.
#[async_trait]
pub trait Ask: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<String, AssistantError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub provider: Provider,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Model name; for Azure, the deployment name.
    pub model: Option<String>,
    /// Overrides the provider's base URL. Required for Azure.
    pub endpoint: Option<String>,
    pub api_version: Option<String>,
}

impl AssistantConfig {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: None,
            endpoint: None,
            api_version: None,
        }
    }
}

pub struct Assistant {
    provider: Provider,
    url: String,
    model: String,
    headers: HeaderMap,
    client: Arc<ApiClient>,
    timeout: Duration,
}

impl Assistant {
    /// Validates `config` and prepares the request target for its provider.
    pub fn new(config: AssistantConfig, client: Arc<ApiClient>) -> Result<Self, AssistantError> {
        let provider = config.provider;
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(AssistantError::Config(format!(
                "missing API key for {provider} (set {})",
                provider.api_key_env()
            )));
        }

        let model = config
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());
        let endpoint = config
            .endpoint
            .or_else(|| provider.default_endpoint().map(str::to_string))
            .ok_or_else(|| AssistantError::Config(format!("{provider} needs an endpoint URL")))?;
        let endpoint = endpoint.trim_end_matches('/');

        let (url, headers) = match provider {
            Provider::Gemini => (
                format!("{endpoint}/v1beta/models/{model}:generateContent"),
                header_map([("x-goog-api-key", api_key)]),
            ),
            Provider::OpenAi | Provider::Xai => (
                format!("{endpoint}/v1/chat/completions"),
                header_map([("authorization", format!("Bearer {api_key}"))]),
            ),
            Provider::Azure => {
                let version = config
                    .api_version
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
                (
                    format!("{endpoint}/openai/deployments/{model}/chat/completions?api-version={version}"),
                    header_map([("api-key", api_key)]),
                )
            }
        };

        Ok(Self {
            provider,
            url,
            model,
            headers,
            client,
            timeout: DEFAULT_ASK_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str) -> Value {
        match self.provider {
            Provider::Gemini => json!({
                "contents": [{"role": "user", "parts": [{"text": prompt}]}]
            }),
            Provider::Azure => json!({
                "messages": [{"role": "user", "content": prompt}]
            }),
            Provider::OpenAi | Provider::Xai => json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}]
            }),
        }
    }
}

/// Pulls the reply text out of a provider response.
pub fn reply_text(provider: Provider, body: &Value) -> Option<String> {
    let text = match provider {
        Provider::Gemini => body
            .pointer("/candidates/0/content/parts")?
            .as_array()?
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<String>(),
        Provider::OpenAi | Provider::Azure | Provider::Xai => body
            .pointer("/choices/0/message/content")?
            .as_str()?
            .to_string(),
    };
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl Ask for Assistant {
    async fn ask(&self, prompt: &str) -> Result<String, AssistantError> {
        log::info!("{} request: {prompt}", self.provider);

        let result = self
            .client
            .post(
                &self.url,
                Some(Payload::Json(self.request_body(prompt))),
                Some(&self.headers),
                Some(self.timeout),
                None,
            )
            .await;

        if !result.ok {
            let mut reason = result.error_text().to_string();
            if let Some(message) = result
                .body_json
                .as_ref()
                .and_then(|body| body.pointer("/error/message"))
                .and_then(Value::as_str)
            {
                reason = format!("{reason}: {message}");
            }
            return Err(AssistantError::Request {
                provider: self.provider,
                reason,
            });
        }

        let reply = result
            .body_json
            .as_ref()
            .and_then(|body| reply_text(self.provider, body))
            .ok_or(AssistantError::EmptyReply {
                provider: self.provider,
            })?;

        log::info!("{} response: {reply}", self.provider);
        Ok(reply)
    }
}
