use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The request cannot be planned; `field` names the offending input.
    #[error("Malformed request: {field}: {reason}")]
    RequestMalformed { field: String, reason: String },

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Unknown price tier: {0}")]
    UnknownPriceTier(String),
}

impl CoreError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RequestMalformed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Field name for a malformed request, if this is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::RequestMalformed { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::malformed("group_size", "must be at least 1");
        assert_eq!(
            error.to_string(),
            "Malformed request: group_size: must be at least 1"
        );
        assert_eq!(error.field(), Some("group_size"));
    }

    #[test]
    fn test_field_only_for_malformed() {
        assert_eq!(CoreError::UnknownStage("x".into()).field(), None);
    }
}
