//! Call batch types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Locally assigned identifier of one submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One utterance in a call transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    pub message: String,
}

impl TranscriptTurn {
    pub fn new(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            message: message.into(),
        }
    }
}

/// Renders as `role: message`.
impl std::fmt::Display for TranscriptTurn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.role, self.message)
    }
}

/// Result of one finished call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub phone_number: String,
    pub transcript: Vec<TranscriptTurn>,
    pub summary: String,
}

impl CallOutcome {
    pub fn new(
        phone_number: impl Into<String>,
        transcript: Vec<TranscriptTurn>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            phone_number: phone_number.into(),
            transcript,
            summary: summary.into(),
        }
    }
}

/// Aggregate delivered once every recipient of a batch has reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: BatchId,
    /// Batch id assigned by the voice provider, when it returned one.
    pub provider_batch_id: Option<String>,
    pub task: String,
    /// One outcome per recipient, in callback arrival order.
    pub outcomes: Vec<CallOutcome>,
    /// Summary of the call that completed the batch.
    pub summary: Option<String>,
}

impl BatchResult {
    pub(crate) fn new(batch_id: BatchId, task: String, outcomes: Vec<CallOutcome>) -> Self {
        let summary = outcomes
            .last()
            .map(|o| o.summary.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            batch_id,
            provider_batch_id: None,
            task,
            outcomes,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_turn_renders_role_and_message() {
        assert_eq!(
            TranscriptTurn::new("user", "Not available").to_string(),
            "user: Not available"
        );
    }

    #[test]
    fn result_summary_comes_from_last_outcome() {
        let first = CallOutcome::new("a", vec![], "Confirmed");
        let last = CallOutcome::new("b", vec![], "  ");
        let result = BatchResult::new(BatchId::new(), "t".into(), vec![first.clone(), last]);
        assert_eq!(result.summary, None);

        let result = BatchResult::new(BatchId::new(), "t".into(), vec![first]);
        assert_eq!(result.summary.as_deref(), Some("Confirmed"));
    }
}
