//! Structured errors for the relaycache host bridge.

use relaycache_core::Error;
use serde::Serialize;

/// Failures surfaced to the host on a reply line.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The signal line could not be parsed.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The worker rejected or failed the signal.
    #[error(transparent)]
    Worker(#[from] Error),
}

/// Wire shape of an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

impl From<BridgeError> for ErrorBody {
    fn from(err: BridgeError) -> Self {
        let code = match &err {
            BridgeError::InvalidInput(_) => -32602,
            BridgeError::Worker(inner) => inner.code(),
        };

        ErrorBody { code, message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_body() {
        let body = ErrorBody::from(BridgeError::InvalidInput("expected value".into()));
        assert_eq!(body.code, -32602);
        assert_eq!(body.message, "INVALID_INPUT: expected value");
    }

    #[test]
    fn test_worker_error_keeps_code() {
        let body = ErrorBody::from(BridgeError::from(Error::NoOfflineFallback("no shell".into())));
        assert_eq!(body.code, -32017);
        assert!(body.message.starts_with("NO_OFFLINE_FALLBACK:"));
    }
}
