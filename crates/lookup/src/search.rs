//! Web search step.

use tracing::{debug, info};

use crate::chat::{ChatBackend, ChatRequest};
use crate::{Error, Result};

const SEARCH_SYSTEM_PROMPT: &str = "You are a helpful assistant that searches for information \
and provides detailed responses with contact information when available.";

/// Sends a free-text query to an online search model and returns its answer.
pub struct SearchClient<B> {
    backend: B,
    max_tokens: u32,
}

impl<B: ChatBackend> SearchClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_tokens: 1000,
        }
    }

    pub(crate) fn check_config(&self) -> Result<()> {
        self.backend.check_config()
    }

    /// Run a search and return the answer text.
    pub async fn search(&self, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidRequest("search query is empty".into()));
        }

        debug!(%query, "searching");
        let answer = self
            .backend
            .complete(ChatRequest {
                system: SEARCH_SYSTEM_PROMPT,
                user: query,
                max_tokens: self.max_tokens,
                temperature: 0.2,
                json_output: false,
            })
            .await?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::EmptyResult("search".into()));
        }

        info!(chars = answer.len(), "search answered");
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl ChatBackend for Fixed {
        async fn complete(&self, request: ChatRequest<'_>) -> Result<String> {
            assert!(!request.json_output);
            Ok(self.0.to_string())
        }
    }

    struct Rejecting;

    impl ChatBackend for Rejecting {
        async fn complete(&self, _request: ChatRequest<'_>) -> Result<String> {
            Err(Error::Upstream {
                status: 429,
                body: "rate limited".into(),
            })
        }
    }

    #[tokio::test]
    async fn returns_trimmed_answer() {
        let client = SearchClient::new(Fixed("  Joe's Diner: (415) 555-0199\n"));
        let answer = client.search("diners near me").await.unwrap();
        assert_eq!(answer, "Joe's Diner: (415) 555-0199");
    }

    #[tokio::test]
    async fn blank_answer_is_empty_result() {
        let client = SearchClient::new(Fixed("   "));
        let err = client.search("anything").await.unwrap_err();
        assert!(matches!(err, Error::EmptyResult(_)));
    }

    #[tokio::test]
    async fn upstream_failure_propagates() {
        let client = SearchClient::new(Rejecting);
        let err = client.search("anything").await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 429, .. }));
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let client = SearchClient::new(Fixed("unused"));
        let err = client.search(" ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
