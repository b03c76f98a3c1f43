//! Outbound call batches and correlation of their asynchronous results.
//!
//! A batch is registered with the [`CallCorrelator`] before it is handed to
//! the [`CallProvider`]. The provider later reports each finished call to the
//! webhook served by [`CallbackReceiver`], which feeds the correlator; the
//! caller's [`CallHandle`] resolves once every recipient has reported.
//!
//! ```ignore
//! use std::sync::Arc;
//! use calling::{CallCorrelator, CallDispatcher, CallbackReceiver, ElevenLabsProvider};
//!
//! # async fn example() -> calling::Result<()> {
//! let correlator = Arc::new(CallCorrelator::new());
//! let provider = ElevenLabsProvider::builder("xi-...", "agent_...", "phnum_...").build();
//! let dispatcher = CallDispatcher::new(provider, Arc::clone(&correlator));
//!
//! let app = CallbackReceiver::new(correlator).router();
//! // serve `app` where the provider can reach it ...
//!
//! let numbers = vec!["+1-555-000-0001".to_string()];
//! let handle = dispatcher.submit(&numbers, "confirm appointment").await?;
//! let result = handle.wait().await?;
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod callback;
mod correlator;
mod dispatcher;
mod error;
mod provider;

pub use batch::{BatchId, BatchResult, CallOutcome, TranscriptTurn};
pub use callback::{CallbackEvent, CallbackReceiver, Receipt};
pub use correlator::{CallCorrelator, Correlation, Registration};
pub use dispatcher::{CallDispatcher, CallHandle, DEFAULT_MAX_WAIT};
pub use error::{Error, Result};
pub use provider::{
    BatchCall, BatchSubmission, CallProvider, ELEVENLABS_BASE_URL, ElevenLabsProvider,
    ElevenLabsProviderBuilder,
};
