//! Search-then-extract pipeline.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Result;
use crate::chat::ChatBackend;
use crate::extract::ExtractionClient;
use crate::search::SearchClient;

/// Phone numbers found for a query, with the answer they were pulled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub phone_numbers: Vec<String>,
    pub source: String,
}

/// Chains a [`SearchClient`] and an [`ExtractionClient`]. Holds no state
/// between calls.
pub struct PhoneLookup<B> {
    search: SearchClient<B>,
    extraction: ExtractionClient<B>,
}

impl<B: ChatBackend> PhoneLookup<B> {
    pub fn new(search: SearchClient<B>, extraction: ExtractionClient<B>) -> Self {
        Self { search, extraction }
    }

    /// Search for `query` and extract phone numbers from the answer.
    ///
    /// Both backends are checked for usable configuration first, so a
    /// missing extraction key never costs a search request.
    pub async fn find(&self, query: &str) -> Result<LookupResult> {
        self.search.check_config()?;
        self.extraction.check_config()?;

        let source = self.search.search(query).await?;
        let phone_numbers = self.extraction.extract_phone_numbers(&source).await?;
        info!(count = phone_numbers.len(), "lookup complete");
        Ok(LookupResult {
            phone_numbers,
            source,
        })
    }
}
