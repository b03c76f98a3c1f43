//! Inbound webhook for finished calls.
//!
//! Every well-formed delivery is acknowledged with `200`, matched or not;
//! the provider disables endpoints that keep failing. Only an unreadable body
//! (`400`) or a bad signature (`401`) is refused.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::batch::{CallOutcome, TranscriptTurn};
use crate::correlator::{CallCorrelator, Correlation};

/// Event type carrying a finished call's transcript.
pub const POST_CALL_TRANSCRIPTION: &str = "post_call_transcription";
pub const SIGNATURE_HEADER: &str = "elevenlabs-signature";
pub const CALLBACK_PATH: &str = "/call-callback";

const SIGNATURE_TOLERANCE_SECS: i64 = 30 * 60;

type HmacSha256 = Hmac<Sha256>;

/// Webhook envelope. `data` is only decoded for transcription events.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct TranscriptionData {
    #[serde(default)]
    transcript: Vec<ApiTurn>,
    #[serde(default)]
    analysis: Option<ApiAnalysis>,
    conversation_initiation_client_data: ApiClientData,
}

#[derive(Debug, Deserialize)]
struct ApiTurn {
    role: String,
    /// Absent on tool-call turns.
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiAnalysis {
    #[serde(default)]
    transcript_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiClientData {
    dynamic_variables: ApiDynamicVariables,
}

#[derive(Debug, Deserialize)]
struct ApiDynamicVariables {
    phone_number: String,
}

/// What the receiver did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    /// Not a transcription event.
    Ignored,
    /// A transcription event without the fields needed to correlate it.
    Malformed,
    Correlated(Correlation),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,
    #[error("signature header malformed")]
    Malformed,
    #[error("signature timestamp is {age_secs}s off")]
    Stale { age_secs: i64 },
    #[error("signature mismatch")]
    Mismatch,
}

/// Decodes provider callbacks and feeds them to the correlator.
pub struct CallbackReceiver {
    correlator: Arc<CallCorrelator>,
    signing_secret: Option<String>,
}

impl CallbackReceiver {
    pub fn new(correlator: Arc<CallCorrelator>) -> Self {
        Self {
            correlator,
            signing_secret: None,
        }
    }

    /// Require a valid `elevenlabs-signature` header. Blank secrets disable
    /// verification.
    pub fn with_signing_secret(mut self, secret: Option<String>) -> Self {
        self.signing_secret = secret.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn handle(&self, event: CallbackEvent) -> Receipt {
        if event.event_type != POST_CALL_TRANSCRIPTION {
            debug!(event_type = %event.event_type, "ignoring callback event");
            return Receipt::Ignored;
        }

        let data: TranscriptionData = match serde_json::from_value(event.data) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "transcription event without correlation data");
                return Receipt::Malformed;
            }
        };

        let transcript = data
            .transcript
            .into_iter()
            .filter_map(|turn| turn.message.map(|m| TranscriptTurn::new(turn.role, m)))
            .collect();
        let summary = data
            .analysis
            .and_then(|a| a.transcript_summary)
            .unwrap_or_default();
        let outcome = CallOutcome::new(
            data.conversation_initiation_client_data
                .dynamic_variables
                .phone_number,
            transcript,
            summary,
        );

        Receipt::Correlated(self.correlator.record_completion(outcome))
    }

    /// Routes: `POST /call-callback` and `GET /health`.
    pub fn router(self) -> Router {
        Router::new()
            .route(CALLBACK_PATH, post(receive_callback))
            .route("/health", get(health))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(self))
    }
}

async fn receive_callback(
    State(receiver): State<Arc<CallbackReceiver>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &receiver.signing_secret {
        let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if let Err(e) = verify_signature(secret, header, &body, Utc::now().timestamp()) {
            warn!(error = %e, "rejected unsigned callback");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let event: CallbackEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "unreadable callback body");
            return (StatusCode::BAD_REQUEST, "malformed event").into_response();
        }
    };

    let receipt = receiver.handle(event);
    info!(?receipt, "callback handled");
    Json(json!({ "received": true })).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Check a `t=<unix>,v0=<hex hmac>` header against the raw body. The MAC
/// covers `"<t>.<body>"`.
pub fn verify_signature(
    secret: &str,
    header: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;

    let mut timestamp = None;
    let mut digest = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v0", value)) => digest = Some(value),
            _ => {}
        }
    }
    let (Some(timestamp), Some(digest)) = (timestamp, digest) else {
        return Err(SignatureError::Malformed);
    };

    let issued: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    let age_secs = now - issued;
    if age_secs.abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Stale { age_secs });
    }

    let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
