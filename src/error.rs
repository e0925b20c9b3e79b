use thiserror::Error;

/// Failure taxonomy surfaced to callers of the resolver and clients.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Search/lookup came back empty, or a match is missing a usable id.
    #[error("not found: {0}")]
    NotFound(String),

    /// A required destination field could not be resolved from any source.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Non-retryable HTTP failure, or retries exhausted. `status` is absent
    /// when the transport itself failed (timeout, connection refused).
    #[error("upstream error: {body}")]
    Upstream { status: Option<u16>, body: String },

    /// Malformed caller input (season list, profile id) caught before any
    /// network call.
    #[error("invalid input: {0}")]
    Validation(String),
}

impl RequestError {
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status: Some(status),
            body: body.into(),
        }
    }

    pub fn transport(body: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            body: body.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RequestError>;
