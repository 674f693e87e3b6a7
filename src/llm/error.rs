use thiserror::Error;

/// Errors raised by generation backends.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Missing credentials or an unusable client setup
    #[error("LLM configuration error: {0}")]
    Config(String),

    #[error("Failed to connect to LLM service: {0}")]
    Connection(String),

    #[error("LLM service returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Rate limited by LLM service, retry after {0} seconds")]
    RateLimited(u64),

    #[error("LLM request timed out after {0} seconds")]
    Timeout(u64),

    /// The service answered but the payload did not contain generated text
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

impl LlmError {
    /// Map a transport error, telling timeouts apart from other failures.
    pub(crate) fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(timeout_secs)
        } else {
            LlmError::Connection(err.to_string())
        }
    }
}
