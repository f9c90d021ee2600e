//! Error types at the model-API and pipeline boundaries.

/// A JSON POST to a model API that did not produce a JSON body.
///
/// Returned by [`post_json_with_retry`](crate::http::post_json_with_retry)
/// once retries are exhausted or the failure is not worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl HttpError {
    /// Rate limits, server-side errors and network failures are worth
    /// another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Transport(_) => true,
            HttpError::Status { status, .. } => *status == 429 || *status >= 500,
            HttpError::Malformed(_) => false,
        }
    }
}

/// Failure to obtain a reply from a generation backend.
///
/// Returned by [`ResponseGenerator::generate`](crate::generation::ResponseGenerator::generate).
/// The pipelines turn every variant into the fallback reply, so none of these
/// ever reach an HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed backend reply: {0}")]
    Malformed(String),
}

impl From<HttpError> for GenerationError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Transport(e) => GenerationError::Transport(e),
            HttpError::Status { status, body } => GenerationError::Status { status, body },
            HttpError::Malformed(msg) => GenerationError::Malformed(msg),
        }
    }
}

/// Why a retrieval-augmented turn fell back.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
