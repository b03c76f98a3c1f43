//! Voice-call provider abstraction and the ElevenLabs batch-calling client.

use std::future::Future;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
const BATCH_SUBMIT_PATH: &str = "/v1/convai/batch-calling/submit";

/// A batch of outbound calls sharing one task.
#[derive(Debug, Clone)]
pub struct BatchCall<'a> {
    /// Human-readable batch label.
    pub name: String,
    pub task: &'a str,
    pub recipients: &'a [String],
    pub scheduled_time_unix: i64,
}

impl<'a> BatchCall<'a> {
    /// A batch scheduled for immediate dispatch.
    pub fn new(task: &'a str, recipients: &'a [String]) -> Self {
        let now = Utc::now();
        Self {
            name: format!("Task: {task} - {}", now.to_rfc3339()),
            task,
            recipients,
            scheduled_time_unix: now.timestamp(),
        }
    }
}

/// What the provider reports back for an accepted batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchSubmission {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_calls_dispatched: u32,
    #[serde(default)]
    pub total_calls_scheduled: u32,
}

/// A service that places outbound calls and later reports each result
/// through the callback endpoint.
pub trait CallProvider: Send + Sync {
    /// Submit a batch. Must fail with `DispatchFailed` when the provider did
    /// not accept it.
    fn submit_batch(
        &self,
        call: &BatchCall<'_>,
    ) -> impl Future<Output = Result<BatchSubmission>> + Send;
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiBatchRequest<'a> {
    call_name: &'a str,
    agent_id: &'a str,
    agent_phone_number_id: &'a str,
    scheduled_time_unix: i64,
    recipients: Vec<ApiRecipient<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiRecipient<'a> {
    phone_number: &'a str,
    conversation_initiation_client_data: ApiClientData<'a>,
}

#[derive(Debug, Serialize)]
struct ApiClientData<'a> {
    conversation_config_override: ApiConfigOverride<'a>,
    dynamic_variables: ApiDynamicVariables<'a>,
}

#[derive(Debug, Serialize)]
struct ApiConfigOverride<'a> {
    agent: ApiAgentOverride<'a>,
}

#[derive(Debug, Serialize)]
struct ApiAgentOverride<'a> {
    prompt: ApiPrompt,
    first_message: String,
    language: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiPrompt {
    prompt: String,
}

/// Echoed back in every callback; `phone_number` is the correlation key.
#[derive(Debug, Serialize)]
struct ApiDynamicVariables<'a> {
    task: &'a str,
    phone_number: &'a str,
}

/// Builder for [`ElevenLabsProvider`].
#[derive(Debug, Clone)]
pub struct ElevenLabsProviderBuilder {
    api_key: String,
    agent_id: String,
    phone_number_id: String,
    base_url: String,
    language: String,
}

impl ElevenLabsProviderBuilder {
    pub fn new(
        api_key: impl Into<String>,
        agent_id: impl Into<String>,
        phone_number_id: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            agent_id: agent_id.into(),
            phone_number_id: phone_number_id.into(),
            base_url: ELEVENLABS_BASE_URL.to_string(),
            language: "en".to_string(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Language the agent speaks on the call.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn build(self) -> ElevenLabsProvider {
        ElevenLabsProvider {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            agent_id: self.agent_id,
            phone_number_id: self.phone_number_id,
            endpoint: format!("{}{BATCH_SUBMIT_PATH}", self.base_url.trim_end_matches('/')),
            language: self.language,
        }
    }
}

/// ElevenLabs conversational-AI batch calling.
pub struct ElevenLabsProvider {
    client: reqwest::Client,
    api_key: String,
    agent_id: String,
    phone_number_id: String,
    endpoint: String,
    language: String,
}

impl ElevenLabsProvider {
    pub fn builder(
        api_key: impl Into<String>,
        agent_id: impl Into<String>,
        phone_number_id: impl Into<String>,
    ) -> ElevenLabsProviderBuilder {
        ElevenLabsProviderBuilder::new(api_key, agent_id, phone_number_id)
    }

    fn check_config(&self) -> Result<()> {
        let required = [
            ("voice API key", &self.api_key),
            ("voice agent id", &self.agent_id),
            ("voice phone number id", &self.phone_number_id),
        ];
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((what, _)) => Err(Error::Configuration(format!("{what} not set"))),
            None => Ok(()),
        }
    }

    fn build_request<'a>(&'a self, call: &'a BatchCall<'a>) -> ApiBatchRequest<'a> {
        let recipients = call
            .recipients
            .iter()
            .map(|number| ApiRecipient {
                phone_number: number,
                conversation_initiation_client_data: ApiClientData {
                    conversation_config_override: ApiConfigOverride {
                        agent: ApiAgentOverride {
                            prompt: ApiPrompt {
                                prompt: format!(
                                    "You are an assistant making a phone call. Your task is: {}",
                                    call.task
                                ),
                            },
                            first_message: format!("Hello! I'm calling regarding {}", call.task),
                            language: &self.language,
                        },
                    },
                    dynamic_variables: ApiDynamicVariables {
                        task: call.task,
                        phone_number: number,
                    },
                },
            })
            .collect();

        ApiBatchRequest {
            call_name: &call.name,
            agent_id: &self.agent_id,
            agent_phone_number_id: &self.phone_number_id,
            scheduled_time_unix: call.scheduled_time_unix,
            recipients,
        }
    }
}

impl std::fmt::Display for ElevenLabsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "elevenlabs(agent={})", self.agent_id)
    }
}

impl CallProvider for ElevenLabsProvider {
    async fn submit_batch(&self, call: &BatchCall<'_>) -> Result<BatchSubmission> {
        self.check_config()?;

        let api_request = self.build_request(call);
        debug!(provider = %self, recipients = call.recipients.len(), "submitting batch");

        let response = self
            .client
            .post(&self.endpoint)
            .header("xi-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::DispatchFailed {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::DispatchFailed {
                status: Some(status.as_u16()),
                body,
            });
        }

        // The calls are going out regardless of what the body looks like.
        Ok(serde_json::from_str(&body).unwrap_or_else(|e| {
            warn!(error = %e, "unreadable batch submission response");
            BatchSubmission::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_embeds_task_per_recipient() {
        let provider = ElevenLabsProvider::builder("key", "agent_1", "phnum_1")
            .language("es")
            .build();
        let recipients = vec!["+1-555-000-0001".to_string(), "+1-555-000-0002".to_string()];
        let call = BatchCall::new("confirm appointment", &recipients);

        let json = serde_json::to_value(provider.build_request(&call)).unwrap();
        assert_eq!(json["agent_id"], "agent_1");
        assert_eq!(json["agent_phone_number_id"], "phnum_1");
        assert!(
            json["call_name"]
                .as_str()
                .unwrap()
                .starts_with("Task: confirm appointment - ")
        );

        let second = &json["recipients"][1];
        assert_eq!(second["phone_number"], "+1-555-000-0002");
        let data = &second["conversation_initiation_client_data"];
        assert_eq!(data["dynamic_variables"]["phone_number"], "+1-555-000-0002");
        assert_eq!(data["dynamic_variables"]["task"], "confirm appointment");
        let agent = &data["conversation_config_override"]["agent"];
        assert!(agent["prompt"]["prompt"].as_str().unwrap().ends_with("confirm appointment"));
        assert_eq!(agent["language"], "es");
    }

    #[test]
    fn submission_tolerates_sparse_response() {
        let sub: BatchSubmission = serde_json::from_str(
            r#"{"id":"btcal_1","status":"pending","total_calls_dispatched":2,"agent_name":"x"}"#,
        )
        .unwrap();
        assert_eq!(sub.id.as_deref(), Some("btcal_1"));
        assert_eq!(sub.total_calls_dispatched, 2);
        assert_eq!(sub.total_calls_scheduled, 0);
    }

    #[test]
    fn endpoint_joins_base_url() {
        let provider = ElevenLabsProvider::builder("k", "a", "p")
            .base_url("http://localhost:8080/")
            .build();
        assert_eq!(
            provider.endpoint,
            "http://localhost:8080/v1/convai/batch-calling/submit"
        );
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_sending() {
        let provider = ElevenLabsProvider::builder("", "agent", "phone")
            .base_url("http://127.0.0.1:9")
            .build();
        let recipients = vec!["+1-555-000-0001".to_string()];
        let err = provider
            .submit_batch(&BatchCall::new("t", &recipients))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("API key")));

        let provider = ElevenLabsProvider::builder("key", " ", "phone").build();
        let err = provider
            .submit_batch(&BatchCall::new("t", &recipients))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("agent id")));
    }
}
