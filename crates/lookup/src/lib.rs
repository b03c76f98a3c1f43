//! Phone number discovery: web search followed by structured extraction.
//!
//! ```ignore
//! use lookup::{ChatCompletions, ExtractionClient, PhoneLookup, SearchClient, PERPLEXITY_BASE_URL};
//!
//! # async fn example() -> lookup::Result<()> {
//! let search = ChatCompletions::builder("search", "pplx-...", "sonar")
//!     .base_url(PERPLEXITY_BASE_URL)
//!     .build();
//! let extraction = ChatCompletions::builder("extraction", "sk-...", "gpt-4o-mini").build();
//!
//! let lookup = PhoneLookup::new(SearchClient::new(search), ExtractionClient::new(extraction));
//! let result = lookup.find("pizza restaurants in New York City").await?;
//! println!("{:?}", result.phone_numbers);
//! # Ok(())
//! # }
//! ```

mod chat;
mod error;
mod extract;
mod lookup;
pub mod phone;
mod search;

pub use chat::{
    ChatBackend, ChatCompletions, ChatCompletionsBuilder, ChatRequest, OPENAI_BASE_URL,
    PERPLEXITY_BASE_URL,
};
pub use error::{Error, Result};
pub use extract::ExtractionClient;
pub use lookup::{LookupResult, PhoneLookup};
pub use search::SearchClient;
