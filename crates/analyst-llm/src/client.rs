//! Model client seam and the Anthropic Messages API implementation

use crate::error::LlmError;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default Anthropic API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One piece of a user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image { media_type: String, data: Vec<u8> },
}

/// Single-turn completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub system: Option<String>,
    pub parts: Vec<ContentPart>,
    pub max_tokens: Option<u32>,
}

impl Completion {
    /// Text-only request
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            parts: vec![ContentPart::Text(prompt.into())],
            max_tokens: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_image(mut self, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.parts.push(ContentPart::Image {
            media_type: media_type.into(),
            data,
        });
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Concatenated text parts, for logging and tests
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Anything that turns a prompt into reply text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion and return the reply text
    async fn complete(&self, request: Completion) -> Result<String, LlmError>;
}

/// `[llm]` configuration section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnthropicSettings {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            model: "claude-3-7-sonnet-latest".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
        }
    }
}

/// Anthropic Messages API client
#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    settings: AnthropicSettings,
}

impl AnthropicClient {
    /// # Errors
    /// `LlmError::Misconfiguration` if the HTTP client cannot be built
    pub fn new(api_key: impl Into<String>, settings: AnthropicSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            settings,
        })
    }

    /// Read the API key from the variable named in `settings`
    ///
    /// # Errors
    /// `LlmError::Misconfiguration` if the variable is unset or empty
    pub fn from_env_with<F>(settings: AnthropicSettings, lookup: F) -> Result<Self, LlmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(&settings.api_key_env)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "API key not found in environment variable '{}'. Set it or configure a different api_key_env in [llm].",
                    settings.api_key_env
                ))
            })?;
        Self::new(api_key, settings)
    }

    /// Read the API key from the process environment
    ///
    /// # Errors
    /// See [`AnthropicClient::from_env_with`]
    pub fn from_env(settings: AnthropicSettings) -> Result<Self, LlmError> {
        Self::from_env_with(settings, |name| std::env::var(name).ok())
    }

    pub fn settings(&self) -> &AnthropicSettings {
        &self.settings
    }

    fn body<'a>(&'a self, request: &'a Completion) -> MessagesRequest<'a> {
        let content = request
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => RequestBlock::Text { text },
                ContentPart::Image { media_type, data } => RequestBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type,
                        data: base64::engine::general_purpose::STANDARD.encode(data),
                    },
                },
            })
            .collect();

        MessagesRequest {
            model: &self.settings.model,
            max_tokens: request.max_tokens.unwrap_or(self.settings.max_tokens),
            temperature: self.settings.temperature,
            system: request.system.as_deref(),
            messages: vec![RequestMessage {
                role: "user",
                content,
            }],
        }
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.settings.model)
            .field("base_url", &self.settings.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: Completion) -> Result<String, LlmError> {
        let body = self.body(&request);
        debug!(
            model = %self.settings.model,
            max_tokens = body.max_tokens,
            prompt_bytes = request.prompt_text().len(),
            images = request.parts.iter().filter(|p| matches!(p, ContentPart::Image { .. })).count(),
            "invoking model"
        );

        let response = self
            .http
            .post(&self.settings.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.trim().is_empty() {
            return Err(LlmError::Empty);
        }

        if let Some(usage) = parsed.usage {
            debug!(
                tokens_input = usage.input_tokens,
                tokens_output = usage.output_tokens,
                "model invocation completed"
            );
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: Vec<RequestBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RequestBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> AnthropicClient {
        AnthropicClient::new("test-key", AnthropicSettings::default()).unwrap()
    }

    #[test]
    fn text_request_body() {
        let client = client();
        let request = Completion::text("hello").with_system("be brief");
        let body = serde_json::to_value(client.body(&request)).unwrap();

        assert_eq!(body["system"], "be brief");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(
            body["messages"],
            json!([{"role": "user", "content": [{"type": "text", "text": "hello"}]}])
        );
    }

    #[test]
    fn images_are_base64_blocks() {
        let client = client();
        let request = Completion::text("read this").with_image("image/png", vec![1, 2, 3]);
        let body = serde_json::to_value(client.body(&request)).unwrap();

        let block = &body["messages"][0]["content"][1];
        assert_eq!(block["type"], "image");
        assert_eq!(block["source"]["type"], "base64");
        assert_eq!(block["source"]["media_type"], "image/png");
        assert_eq!(block["source"]["data"], "AQID");
    }

    #[test]
    fn missing_key_is_misconfiguration() {
        let err = AnthropicClient::from_env_with(AnthropicSettings::default(), |_| None).unwrap_err();
        assert!(matches!(err, LlmError::Misconfiguration(msg) if msg.contains("ANTHROPIC_API_KEY")));
    }

    #[test]
    fn max_tokens_override() {
        let client = client();
        let request = Completion::text("x").with_max_tokens(256);
        let body = serde_json::to_value(client.body(&request)).unwrap();
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("system").is_none());
    }
}
