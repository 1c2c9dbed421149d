//! Chat model clients.
//!
//! Every supported provider exposes an OpenAI-compatible
//! `/chat/completions` endpoint, so a single reqwest client covers them all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use persona_core::Provider;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },
    #[error("rate limit exceeded (429): {0}")]
    RateLimit(String),
    #[error("model not found (404): {0}")]
    NotFound(String),
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Http {
            status: e.status().map_or(0, |s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// Map a non-success HTTP status to an error the failover classifier can read.
pub fn error_for_status(status: u16, body: String) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth {
            status,
            message: body,
        },
        429 => LlmError::RateLimit(body),
        404 => LlmError::NotFound(body),
        _ => LlmError::Http {
            status,
            message: body,
        },
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    fn model(&self) -> &str;

    fn provider(&self) -> Provider;

    /// Single-turn completion.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Creates provider-specific chat clients.
pub trait ChatModelFactory: Send + Sync {
    fn create(&self, provider: Provider, model: &str, api_key: &str) -> Result<Arc<dyn ChatClient>>;
}

pub fn default_base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
        Provider::Groq => "https://api.groq.com/openai/v1",
        Provider::Sambanova => "https://api.sambanova.ai/v1",
        Provider::Cerebras => "https://api.cerebras.ai/v1",
        Provider::Openrouter => "https://openrouter.ai/api/v1",
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(
        http: reqwest::Client,
        provider: Provider,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            provider,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_for_status(status.as_u16(), text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices in completion".to_string()))
    }
}

/// Factory producing [`OpenAiCompatClient`]s over a shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpChatFactory {
    http: reqwest::Client,
    base_urls: HashMap<Provider, String>,
}

impl HttpChatFactory {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_urls: HashMap::new(),
        })
    }

    /// Point a provider at a different endpoint (proxies, local gateways).
    pub fn with_base_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.base_urls.insert(provider, url.into());
        self
    }

    fn base_url(&self, provider: Provider) -> &str {
        self.base_urls
            .get(&provider)
            .map_or_else(|| default_base_url(provider), String::as_str)
    }
}

impl ChatModelFactory for HttpChatFactory {
    fn create(
        &self,
        provider: Provider,
        model: &str,
        api_key: &str,
    ) -> Result<Arc<dyn ChatClient>> {
        Ok(Arc::new(OpenAiCompatClient::new(
            self.http.clone(),
            provider,
            self.base_url(provider),
            api_key,
            model,
        )))
    }
}
