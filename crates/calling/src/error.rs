use std::time::Duration;

use thiserror::Error;

use crate::BatchId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// The number is still awaiting its callback in another batch.
    #[error("{0} is already part of an outstanding call batch")]
    RecipientInFlight(String),

    #[error("dispatch failed ({}): {body}", .status.map_or("no response".to_string(), |s| s.to_string()))]
    DispatchFailed { status: Option<u16>, body: String },

    #[error("batch {batch_id} timed out after {waited:?} waiting for call results")]
    Timeout { batch_id: BatchId, waited: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
