//! Error types for forkchat-ai

use thiserror::Error;

/// Result type alias using forkchat-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a chat-completion provider
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The model string does not name a configured provider
    #[error("Unknown provider for model '{0}'")]
    UnknownProvider(String),

    /// Byte stream failed mid-response
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether trying the same request again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Transport(_) => true,
            Error::Api { status, message } => {
                let msg = message.to_lowercase();
                *status == 429
                    || (500..600).contains(status)
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
                    || msg.contains("too many requests")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_rate_limit_status() {
        assert!(Error::api(429, "slow down").is_retryable());
    }

    #[test]
    fn test_retryable_server_error() {
        assert!(Error::api(503, "Service Unavailable").is_retryable());
        assert!(Error::Transport("connection reset".into()).is_retryable());
    }

    #[test]
    fn test_retryable_overloaded_message() {
        let e = Error::api(400, "API is overloaded right now");
        assert!(e.is_retryable());
    }

    #[test]
    fn test_not_retryable_auth() {
        assert!(!Error::api(401, "Invalid API key").is_retryable());
    }

    #[test]
    fn test_not_retryable_unknown_provider() {
        let e = Error::UnknownProvider("Nope: gpt".into());
        assert!(!e.is_retryable());
        assert!(!Error::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_status() {
        let e = Error::api(404, "model not found");
        assert_eq!(e.to_string(), "API error (404): model not found");
    }
}
