use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BackendError, Error, Result};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Configuration for the Anthropic API client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (from ANTHROPIC_API_KEY env var)
    pub api_key: String,
    /// Model to use (COACH_MODEL overrides the default)
    pub model: String,
    /// Messages endpoint (COACH_API_URL overrides the default)
    pub api_url: String,
    /// Transport-level timeout applied to every request
    pub request_timeout: Duration,
}

impl AnthropicConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::config("ANTHROPIC_API_KEY environment variable not set"))?;

        let mut config = Self::new(api_key, DEFAULT_MODEL.to_string());
        if let Ok(model) = std::env::var("COACH_MODEL") {
            config.model = model;
        }
        if let Ok(url) = std::env::var("COACH_API_URL") {
            config.api_url = url;
        }
        Ok(config)
    }

    /// Create with custom settings
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// A single prompt sent to a generative model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Raw text completion against a hosted model
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, BackendError>;
}

/// Anthropic API client
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    /// Send a message and concatenate every text block of the reply
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, BackendError> {
        let body = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            system: (!request.system.is_empty()).then(|| request.system.clone()),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_request(e, self.config.request_timeout))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("unreadable API response: {}", e)))?;

        let text: String = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect();

        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_request_timeout_reports_configured_duration() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut config = AnthropicConfig::new("key".to_string(), "m".to_string());
        config.api_url = format!("http://{}/v1/messages", addr);
        config.request_timeout = Duration::from_millis(200);
        let client = AnthropicClient {
            client: Client::builder().no_proxy().timeout(config.request_timeout).build().unwrap(),
            config,
        };
        let request = CompletionRequest {
            system: String::new(),
            prompt: "hi".to_string(),
            max_tokens: 10,
            temperature: 0.0,
        };

        let err = client.complete(&request).await.unwrap_err();
        server.abort();

        assert!(matches!(err, BackendError::Timeout(d) if d == Duration::from_millis(200)));
        assert_eq!(err.to_string(), "call timed out after 200ms");
    }

    #[test]
    fn test_request_omits_empty_system() {
        let body = AnthropicRequest {
            model: "m".to_string(),
            max_tokens: 200,
            temperature: Some(0.0),
            system: None,
            messages: vec![Message {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
        };

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["max_tokens"], 200);
    }

    #[test]
    fn test_response_text_blocks_parse() {
        let json = r#"{"content": [{"type": "text", "text": "{\"score\""}, {"type": "text", "text": ": 0.4}"}]}"#;
        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        let text: String = response.content.iter().map(|c| c.text.as_str()).collect();

        assert_eq!(text, "{\"score\": 0.4}");
    }
}
