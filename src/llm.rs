use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;

/// Failure of one generative-service call
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{0} environment variable not set")]
    MissingCredential(&'static str),

    #[error("request timed out")]
    Timeout,

    #[error("quota or rate limit exceeded: {0}")]
    Quota(String),

    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected API response format")]
    Malformed,
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else if e.is_decode() {
            GenerationError::Malformed
        } else {
            GenerationError::Transport(e.to_string())
        }
    }
}

/// A single generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// External text-generation service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;

    /// Model identifier reported alongside generated summaries
    fn model(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAi,
}

impl Provider {
    pub fn for_model(model: &str) -> Self {
        if is_anthropic_model(model) {
            Provider::Anthropic
        } else {
            Provider::OpenAi
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

fn is_anthropic_model(model: &str) -> bool {
    model.starts_with("claude")
}

/// HTTP client for Anthropic or OpenAI chat models, chosen by model name
pub struct LlmClient {
    client: reqwest::Client,
    provider: Provider,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(client: reqwest::Client, model: &str, api_key: String, timeout: Duration) -> Self {
        Self {
            client,
            provider: Provider::for_model(model),
            model: model.to_string(),
            api_key,
            timeout,
        }
    }

    /// Build a client from the provider's API key variable
    pub fn from_env(client: reqwest::Client, model: &str, timeout: Duration) -> Result<Self, GenerationError> {
        let var = Provider::for_model(model).key_var();
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(GenerationError::MissingCredential(var))?;
        Ok(Self::new(client, model, api_key, timeout))
    }

    async fn generate_anthropic(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        debug!("Generating via Anthropic API with model {}", self.model);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": prompt.max_tokens,
            "system": prompt.system,
            "messages": [
                {
                    "role": "user",
                    "content": prompt.user
                }
            ]
        });

        let resp = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let json = read_json(resp).await?;
        extract_anthropic_text(&json)
    }

    async fn generate_openai(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        debug!("Generating via OpenAI API with model {}", self.model);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": prompt.max_tokens,
            "messages": [
                {
                    "role": "system",
                    "content": prompt.system
                },
                {
                    "role": "user",
                    "content": prompt.user
                }
            ]
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let json = read_json(resp).await?;
        extract_openai_text(&json)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        match self.provider {
            Provider::Anthropic => self.generate_anthropic(prompt).await,
            Provider::OpenAi => self.generate_openai(prompt).await,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value, GenerationError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

fn classify_status(status: StatusCode, body: String) -> GenerationError {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYMENT_REQUIRED => GenerationError::Quota(body),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GenerationError::Timeout,
        _ => GenerationError::Status { status, body },
    }
}

fn extract_anthropic_text(json: &serde_json::Value) -> Result<String, GenerationError> {
    if let Some(content) = json.get("content").and_then(|c| c.as_array()) {
        let text: String = content
            .iter()
            .filter_map(|block| {
                if block.get("type")?.as_str()? == "text" {
                    block.get("text")?.as_str().map(|s| s.to_string())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");
        if !text.trim().is_empty() {
            return Ok(text);
        }
    }
    Err(GenerationError::Malformed)
}

fn extract_openai_text(json: &serde_json::Value) -> Result<String, GenerationError> {
    if let Some(text) = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.trim().is_empty())
    {
        return Ok(text.to_string());
    }
    Err(GenerationError::Malformed)
}
