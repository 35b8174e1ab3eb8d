use pathfinder_core::{CoreError, StageId};
use std::time::Duration;
use thiserror::Error;

/// Failure of one external capability call.
///
/// Always recovered by the calling stage's fallback; never reaches the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("{capability} unavailable: {reason}")]
    Unavailable { capability: String, reason: String },

    #[error("{capability} timed out after {timeout_ms}ms")]
    Timeout { capability: String, timeout_ms: u64 },

    #[error("{capability} returned an invalid response: {reason}")]
    InvalidResponse { capability: String, reason: String },

    #[error("{capability} rate limited the request")]
    RateLimited {
        capability: String,
        retry_after_secs: Option<u64>,
    },
}

impl AdapterError {
    pub fn unavailable(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(capability: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            capability: capability.into(),
            timeout_ms: after.as_millis() as u64,
        }
    }

    pub fn invalid(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::Timeout { .. } => "timeout",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::RateLimited { .. } => "rate_limited",
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid veto state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid fan-out group: {0}")]
    InvalidFanOut(String),

    #[error("Request rejected: {0}")]
    Malformed(#[from] CoreError),

    #[error("Stage {0} is not in the active set for this request")]
    StageInactive(StageId),

    #[error("Active stages were already fixed for this request")]
    ActiveStagesFixed,

    #[error("Retry bound of {max} exceeded")]
    RetryBoundExceeded { max: u32 },
}

impl OrchestratorError {
    /// The rejected field, when the request itself was malformed.
    pub fn rejected_field(&self) -> Option<&str> {
        match self {
            Self::Malformed(err) => err.field(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_error_kinds() {
        assert_eq!(
            AdapterError::unavailable("places", "connection refused").kind(),
            "unavailable"
        );
        assert_eq!(
            AdapterError::timeout("places", Duration::from_millis(1500)),
            AdapterError::Timeout {
                capability: "places".into(),
                timeout_ms: 1500
            }
        );
        assert_eq!(AdapterError::invalid("llm", "not json").kind(), "invalid_response");
    }

    #[test]
    fn test_malformed_exposes_field() {
        let err: OrchestratorError = CoreError::malformed("group_size", "too big").into();
        assert_eq!(err.rejected_field(), Some("group_size"));
        assert!(err.to_string().contains("group_size"));
        assert_eq!(OrchestratorError::ActiveStagesFixed.rejected_field(), None);
    }
}
