//! Upstream API access
//!
//! The `Upstream` trait is what the cache calls on a miss. `TwitterClient` is
//! the production implementation.

pub mod twitter;

pub use twitter::{Credentials, CredentialsError, TwitterClient};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::cache::Params;

/// Status reported when the upstream could not be reached
pub const BAD_GATEWAY: u16 = 502;

/// Status reported when the upstream did not answer in time
pub const GATEWAY_TIMEOUT: u16 = 504;

/// Errors from an upstream fetch
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream answered with a non-success status
    #[error("upstream returned status {status}")]
    Status { status: u16, body: Value },

    /// The request never produced a response
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// The request exceeded the client timeout
    #[error("upstream request timed out")]
    Timeout,

    /// The upstream answered with something that is not JSON
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// The HTTP status to report to the caller
    pub fn status(&self) -> u16 {
        match self {
            UpstreamError::Status { status, .. } => *status,
            UpstreamError::Timeout => GATEWAY_TIMEOUT,
            UpstreamError::Transport(_) | UpstreamError::InvalidResponse(_) => BAD_GATEWAY,
        }
    }

    /// The body to report to the caller
    ///
    /// Upstream error bodies pass through unchanged; local failures use the
    /// upstream's `{"errors": [{"message": ..}]}` shape.
    pub fn body(&self) -> Value {
        match self {
            UpstreamError::Status { body, .. } => body.clone(),
            other => json!({ "errors": [{ "message": other.to_string() }] }),
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// An API whose responses can be cached
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetches `endpoint` with `params` passed through unmodified
    async fn fetch(&self, endpoint: &str, params: &Params) -> Result<Value, UpstreamError>;
}
