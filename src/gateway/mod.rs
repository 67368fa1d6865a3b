//! Inference providers.
//!
//! The rest of the crate treats a provider as an opaque function from history
//! to text. Provider failures are mapped onto [`InferError`] here so callers
//! branch on a stable taxonomy instead of vendor strings.

pub mod gemini;
pub mod openai;
pub mod simulated;

pub use gemini::GeminiGateway;
pub use openai::OpenAiGateway;
pub use simulated::SimulatedGateway;

use crate::error::InferError;
use crate::types::{ChatTurn, ModelId};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Longest slice of an error body carried into an [`InferError`]
const ERROR_BODY_LIMIT: usize = 200;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Produce the assistant reply for `history` on `model`
    async fn infer(&self, history: &[ChatTurn], model: &ModelId) -> Result<String, InferError>;
}

/// Map a non-success HTTP status onto the error taxonomy
pub(crate) fn classify_status(status: StatusCode, body: &str) -> InferError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InferError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => InferError::RateLimited,
        StatusCode::REQUEST_TIMEOUT => InferError::Unavailable(format!("status {status}")),
        s if s.is_client_error() => {
            InferError::Malformed(format!("status {status}: {}", truncate(body)))
        }
        _ => InferError::Unavailable(format!("status {status}")),
    }
}

/// Map a transport failure (connect, TLS, timeout, body read)
///
/// The URL is stripped first; it may carry credentials.
pub(crate) fn classify_transport(error: reqwest::Error, timeout: Duration) -> InferError {
    let error = error.without_url();
    if error.is_timeout() {
        InferError::Timeout(timeout)
    } else if error.is_decode() {
        InferError::Malformed(error.to_string())
    } else {
        InferError::Unavailable(error.to_string())
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}
