//! Phone number extraction step.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::Result;
use crate::chat::{ChatBackend, ChatRequest};
use crate::phone;

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an expert at extracting phone numbers from text. Extract all phone numbers from the provided text.

Rules:
1. Extract all phone numbers regardless of format (e.g. (555) 123-4567, 555-123-4567, 555.123.4567, +1-555-123-4567).
2. Return US numbers as +1-XXX-XXX-XXXX. If the country code is missing, assume US (+1).
3. Remove extensions and any surrounding text.
4. Return only valid phone numbers.

Reply with a JSON object of exactly this shape: {"phoneNumbers": ["+1-555-123-4567"]}
If no phone numbers are found, reply {"phoneNumbers": []}"#;

/// The only reply shape the extraction model is asked for.
#[derive(Debug, Deserialize)]
struct ExtractionReply {
    #[serde(rename = "phoneNumbers")]
    phone_numbers: Vec<String>,
}

/// Parse a model reply. `None` means the reply is unusable.
fn parse_reply(reply: &str) -> Option<Vec<String>> {
    serde_json::from_str::<ExtractionReply>(reply.trim())
        .ok()
        .map(|r| r.phone_numbers)
}

/// Structures phone numbers out of free text with a language model, falling
/// back to [`phone::scan`] when the model's reply cannot be parsed.
pub struct ExtractionClient<B> {
    backend: B,
    max_tokens: u32,
}

impl<B: ChatBackend> ExtractionClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_tokens: 500,
        }
    }

    pub(crate) fn check_config(&self) -> Result<()> {
        self.backend.check_config()
    }

    pub async fn extract_phone_numbers(&self, text: &str) -> Result<Vec<String>> {
        let user = format!("Extract all phone numbers from this text:\n\n{text}");
        let reply = self
            .backend
            .complete(ChatRequest {
                system: EXTRACTION_SYSTEM_PROMPT,
                user: &user,
                max_tokens: self.max_tokens,
                temperature: 0.1,
                json_output: true,
            })
            .await?;

        let numbers = match parse_reply(&reply) {
            Some(numbers) => phone::normalize_all(numbers),
            None => {
                warn!(reply = %reply, "unparseable extraction reply, scanning text instead");
                phone::scan(text)
            }
        };

        debug!(count = numbers.len(), "phone numbers extracted");
        Ok(numbers)
    }
}
