//! HTTP provider backends and the config-driven client builder.
//!
//! Two wire families cover the supported vendors: the OpenAI-style chat
//! completions protocol (groq, nvidia NIM, most hosted inference APIs) and
//! Google's `generateContent` endpoint.

use async_trait::async_trait;
use hive_config::{FallbackConfig, ProviderConfig, ProviderKind};
use hive_core::HivemindError;
use hive_core::types::{GenerationRequest, ProviderFailure};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{ClientProvider, FallbackClient};
use crate::provider::Provider;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Cap on error-body text carried into failure messages and logs.
const ERROR_BODY_LIMIT: usize = 300;

fn failure_from_status(status: u16, body: &str) -> ProviderFailure {
    let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    match status {
        401 | 403 => ProviderFailure::Auth(message),
        429 => ProviderFailure::RateLimit(message),
        _ => ProviderFailure::Api { status, message },
    }
}

fn failure_from_transport(err: reqwest::Error) -> ProviderFailure {
    ProviderFailure::Transport(err.to_string())
}

/// OpenAI-compatible `POST {base_url}/chat/completions` with bearer auth.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    model: String,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            http,
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

fn parse_chat_completion(body: &str) -> Result<String, ProviderFailure> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| ProviderFailure::Api {
        status: 200,
        message: format!("malformed response body: {}", e),
    })?;
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or(ProviderFailure::Api {
            status: 200,
            message: "response contained no choices".to_string(),
        })
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderFailure> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(failure_from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(failure_from_transport)?;
        if !status.is_success() {
            return Err(failure_from_status(status.as_u16(), &body));
        }
        parse_chat_completion(&body)
    }
}

/// Google `generateContent` endpoint, key passed as a query parameter.
pub struct GeminiProvider {
    id: String,
    base_url: String,
    model: String,
    api_key: String,
    http: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            http,
        }
    }
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

fn parse_generate_content(body: &str) -> Result<String, ProviderFailure> {
    let response: GeminiResponse = serde_json::from_str(body).map_err(|e| ProviderFailure::Api {
        status: 200,
        message: format!("malformed response body: {}", e),
    })?;
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .map(|c| {
            c.content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    if text.is_empty() {
        return Err(ProviderFailure::Api {
            status: 200,
            message: "response contained no candidates".to_string(),
        });
    }
    Ok(text)
}

#[async_trait]
impl Provider for GeminiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderFailure> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key,
        );
        let payload = json!({
            "system_instruction": {
                "parts": [{ "text": request.system }]
            },
            "contents": [
                { "role": "user", "parts": [{ "text": request.prompt }] }
            ],
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
            },
        });

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(failure_from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(failure_from_transport)?;
        if !status.is_success() {
            return Err(failure_from_status(status.as_u16(), &body));
        }
        parse_generate_content(&body)
    }
}

/// Build the fallback client from configured providers, in list order.
///
/// API keys are read from each provider's `api_key_env` once, at startup.
/// A provider with its env var unset is still registered so the health
/// surface reports it, but it is marked unavailable and never attempted.
pub fn build_client(
    providers: &[ProviderConfig],
    policy: &FallbackConfig,
) -> Result<FallbackClient, HivemindError> {
    let http = reqwest::Client::new();
    let mut entries = Vec::with_capacity(providers.len());

    for cfg in providers {
        let (api_key, missing_credentials) = match std::env::var(&cfg.api_key_env) {
            Ok(key) if !key.trim().is_empty() => (key, None),
            _ => (String::new(), Some(cfg.api_key_env.clone())),
        };

        let provider: Arc<dyn Provider> = match cfg.kind {
            ProviderKind::OpenaiCompat => {
                // Validated at config load; an absent base_url here means the
                // config bypassed validation.
                let base_url = cfg.base_url.clone().unwrap_or_default();
                Arc::new(OpenAiCompatProvider::new(
                    &cfg.id,
                    base_url,
                    &cfg.model,
                    api_key,
                    http.clone(),
                ))
            }
            ProviderKind::Gemini => {
                let base_url = cfg
                    .base_url
                    .clone()
                    .unwrap_or_else(|| GEMINI_BASE_URL.to_string());
                Arc::new(GeminiProvider::new(
                    &cfg.id,
                    base_url,
                    &cfg.model,
                    api_key,
                    http.clone(),
                ))
            }
        };

        entries.push(ClientProvider {
            provider,
            timeout: Duration::from_secs(cfg.timeout_secs),
            missing_credentials,
        });
    }

    FallbackClient::new(entries, policy)
}
