//! Configuration loading from callmcp.toml, with environment overrides.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use calling::{CallCorrelator, CallDispatcher, CallbackReceiver, ElevenLabsProvider};
use lookup::{
    ChatCompletions, ExtractionClient, OPENAI_BASE_URL, PERPLEXITY_BASE_URL, PhoneLookup,
    SearchClient,
};
use serde::Deserialize;

const DEFAULT_SEARCH_MODEL: &str = "sonar";
const DEFAULT_EXTRACTION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_WAIT_SECS: u64 = 30 * 60;

/// Top-level configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Web-search model (Perplexity).
    pub search: ChatConfig,
    /// Phone number extraction model (OpenAI).
    pub extraction: ChatConfig,
    pub voice: VoiceConfig,
    pub webhook: WebhookConfig,
    pub calls: CallsConfig,
}

/// A chat-completions endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// ElevenLabs batch calling.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
    pub phone_number_id: Option<String>,
    pub base_url: Option<String>,
    pub language: Option<String>,
}

/// The callback HTTP server.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub bind: SocketAddr,
    /// HMAC secret for the `elevenlabs-signature` header. Unset accepts
    /// unsigned callbacks.
    pub secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            secret: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CallsConfig {
    /// How long a batch may wait for its callbacks. `0` waits indefinitely.
    pub max_wait_secs: u64,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: DEFAULT_MAX_WAIT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `path` if it exists, then apply environment overrides.
    pub fn resolve(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay credentials from the environment; blank values are skipped.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut Option<String>); 6] = [
            ("PERPLEXITY_API_KEY", &mut self.search.api_key),
            ("OPENAI_API_KEY", &mut self.extraction.api_key),
            ("ELEVENLABS_API_KEY", &mut self.voice.api_key),
            ("ELEVENLABS_AGENT_ID", &mut self.voice.agent_id),
            ("ELEVENLABS_PHONE_NUMBER_ID", &mut self.voice.phone_number_id),
            ("ELEVENLABS_WEBHOOK_SECRET", &mut self.webhook.secret),
        ];
        for (key, slot) in overrides {
            if let Some(value) = var(key).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value);
            }
        }
    }

    /// Credentials that are not set. The tools needing them fail on use.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let required = [
            ("search.api_key", &self.search.api_key),
            ("extraction.api_key", &self.extraction.api_key),
            ("voice.api_key", &self.voice.api_key),
            ("voice.agent_id", &self.voice.agent_id),
            ("voice.phone_number_id", &self.voice.phone_number_id),
        ];
        required
            .into_iter()
            .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
            .map(|(key, _)| key)
            .collect()
    }

    pub fn phone_lookup(&self) -> PhoneLookup<ChatCompletions> {
        let search = chat_backend(
            "search",
            &self.search,
            DEFAULT_SEARCH_MODEL,
            PERPLEXITY_BASE_URL,
        );
        let extraction = chat_backend(
            "extraction",
            &self.extraction,
            DEFAULT_EXTRACTION_MODEL,
            OPENAI_BASE_URL,
        );
        PhoneLookup::new(SearchClient::new(search), ExtractionClient::new(extraction))
    }

    pub fn dispatcher(
        &self,
        correlator: Arc<CallCorrelator>,
    ) -> CallDispatcher<ElevenLabsProvider> {
        let voice = &self.voice;
        let mut provider = ElevenLabsProvider::builder(
            voice.api_key.clone().unwrap_or_default(),
            voice.agent_id.clone().unwrap_or_default(),
            voice.phone_number_id.clone().unwrap_or_default(),
        );
        if let Some(base_url) = &voice.base_url {
            provider = provider.base_url(base_url);
        }
        if let Some(language) = &voice.language {
            provider = provider.language(language);
        }

        CallDispatcher::new(provider.build(), correlator).with_max_wait(self.max_wait())
    }

    pub fn callback_receiver(&self, correlator: Arc<CallCorrelator>) -> CallbackReceiver {
        CallbackReceiver::new(correlator).with_signing_secret(self.webhook.secret.clone())
    }

    pub fn max_wait(&self) -> Option<Duration> {
        match self.calls.max_wait_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn chat_backend(
    name: &str,
    config: &ChatConfig,
    default_model: &str,
    default_base_url: &str,
) -> ChatCompletions {
    ChatCompletions::builder(
        name,
        config.api_key.clone().unwrap_or_default(),
        config.model.as_deref().unwrap_or(default_model),
    )
    .base_url(config.base_url.as_deref().unwrap_or(default_base_url))
    .build()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
