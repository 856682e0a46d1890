//! Error taxonomy for remote catalog access.

use thiserror::Error;

/// Errors surfaced by [`CatalogClient`](super::CatalogClient) implementations.
///
/// Fetch errors are confined to the entity whose fetch raised them: callers
/// record them in that entity's load state and carry on with the rest of the
/// batch. A timeout is reported like any other transport failure and is never
/// retried automatically.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network, TLS, timeout or non-success HTTP status.
    #[error("transport failure: {message}")]
    Transport { message: String, timed_out: bool },

    /// The requested solution or record does not exist upstream.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response payload: {0}")]
    Payload(String),
}

impl ApiError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }
}
