use thiserror::Error;

/// Failure modes of a single exchange request.
///
/// Callers that fan out per wallet only care about success vs failure,
/// so these collapse to `None` at the port boundary; the variant is kept
/// for log lines and for deciding what was transient.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request timed out after {timeout_sec}s")]
    Timeout { timeout_sec: u64 },

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("HTTP {status} from exchange")]
    Status { status: u16 },

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("unexpected response shape: {reason}")]
    Malformed { reason: String },
}

impl ExchangeError {
    /// Transient failures are expected under load and logged at warn;
    /// malformed payloads indicate a contract change and log at error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ExchangeError::Malformed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::Timeout { timeout_sec: 15 }.is_transient());
        assert!(ExchangeError::RateLimited.is_transient());
        assert!(ExchangeError::Status { status: 503 }.is_transient());
        assert!(
            !ExchangeError::Malformed {
                reason: "missing leaderboardRows".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_error_formatting() {
        let err = ExchangeError::Timeout { timeout_sec: 15 };
        assert!(err.to_string().contains("15s"));

        let err = ExchangeError::Status { status: 502 };
        assert!(err.to_string().contains("502"));
    }
}
