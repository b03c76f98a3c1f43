//! Chat-completions backend shared by the search and extraction steps.
//!
//! Both the search provider and the extraction model speak the OpenAI
//! `chat/completions` dialect, so one client covers both; only the base URL,
//! key and model differ.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

pub const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// One system + user exchange.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the model for a JSON object reply.
    pub json_output: bool,
}

/// A model that answers a single chat turn with text.
pub trait ChatBackend: Send + Sync {
    fn complete(&self, request: ChatRequest<'_>) -> impl Future<Output = Result<String>> + Send;

    /// Fail with `Configuration` if the backend cannot be used at all.
    /// Checked before any request of a multi-step flow is sent.
    fn check_config(&self) -> Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: [ApiMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ApiResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl<'a> ApiRequest<'a> {
    fn new(model: &'a str, request: &ChatRequest<'a>) -> Self {
        Self {
            model,
            messages: [
                ApiMessage {
                    role: "system",
                    content: request.system,
                },
                ApiMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_output.then_some(ApiResponseFormat {
                format_type: "json_object",
            }),
        }
    }
}

/// Builder for [`ChatCompletions`].
#[derive(Debug, Clone)]
pub struct ChatCompletionsBuilder {
    name: String,
    api_key: String,
    model: String,
    base_url: String,
}

impl ChatCompletionsBuilder {
    /// `name` identifies the provider in logs and configuration errors.
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    /// Override the API root (everything before `/chat/completions`).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn build(self) -> ChatCompletions {
        ChatCompletions {
            client: reqwest::Client::new(),
            name: self.name,
            api_key: self.api_key,
            model: self.model,
            endpoint: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
        }
    }
}

/// HTTP client for an OpenAI-compatible `chat/completions` endpoint.
pub struct ChatCompletions {
    client: reqwest::Client,
    name: String,
    api_key: String,
    model: String,
    endpoint: String,
}

impl ChatCompletions {
    pub fn builder(
        name: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> ChatCompletionsBuilder {
        ChatCompletionsBuilder::new(name, api_key, model)
    }
}

impl std::fmt::Display for ChatCompletions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.model)
    }
}

impl ChatBackend for ChatCompletions {
    fn check_config(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Configuration(format!("{} API key not set", self.name)));
        }
        Ok(())
    }

    async fn complete(&self, request: ChatRequest<'_>) -> Result<String> {
        self.check_config()?;

        let api_request = ApiRequest::new(&self.model, &request);
        debug!(provider = %self, endpoint = %self.endpoint, "chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream { status, body });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        Ok(api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json_output: bool) -> ChatRequest<'static> {
        ChatRequest {
            system: "sys",
            user: "hi",
            max_tokens: 500,
            temperature: 0.1,
            json_output,
        }
    }

    #[test]
    fn wire_request_shape() {
        let req = request(true);
        let json = serde_json::to_value(ApiRequest::new("gpt-4o-mini", &req)).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["response_format"]["type"], "json_object");

        let req = request(false);
        let json = serde_json::to_value(ApiRequest::new("sonar", &req)).unwrap();
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn response_without_choices_is_empty() {
        let resp: ApiResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(resp.choices.is_empty());
    }

    #[test]
    fn endpoint_joins_base_url() {
        let backend = ChatCompletions::builder("search", "k", "sonar")
            .base_url("https://api.perplexity.ai/")
            .build();
        assert_eq!(backend.endpoint, "https://api.perplexity.ai/chat/completions");
        assert_eq!(backend.to_string(), "search(sonar)");
    }

    #[tokio::test]
    async fn missing_key_fails_before_sending() {
        let backend = ChatCompletions::builder("search", "  ", "sonar")
            .base_url("http://127.0.0.1:9")
            .build();
        let err = backend.complete(request(false)).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("search")));
    }
}
