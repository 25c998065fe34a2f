use thiserror::Error;

/// Failure reaching the inference service or reading its body.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("failed reading response body: {0}")]
    Body(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let text = err.to_string();
        if err.is_timeout() {
            TransportError::Timeout(text)
        } else if err.is_connect() {
            TransportError::Connect(text)
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(text)
        } else {
            TransportError::Other(text)
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Error generating image: {reason} ({status}): {body}")]
    HttpStatus {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("inference service returned an empty body")]
    EmptyBody,

    #[error("response ended after {received} of {declared} bytes")]
    Truncated { received: u64, declared: u64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("another generation is already in flight")]
    Busy,

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl GenerationError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GenerationError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub(crate) const DIAGNOSTIC_BODY_MAX_CHARS: usize = 512;

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
