use crate::slsconfig::{ConfigError, MutationOutcome};
use serde::{Deserialize, Serialize};

/// Result shape returned to the front end for every config operation:
/// `{success, message?, error?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    /// Success with nothing to report.
    pub fn done() -> Self {
        Self {
            success: true,
            message: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<MutationOutcome, ConfigError>> for OperationResult {
    fn from(result: Result<MutationOutcome, ConfigError>) -> Self {
        match result {
            Ok(outcome) => match outcome.message() {
                Some(message) => Self::ok(message),
                None => Self::done(),
            },
            Err(e) => {
                tracing::error!("Config operation failed: {}", e);
                Self::failure(e.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for OperationResult {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Operation failed: {:#}", error);
        Self::failure(format!("{:#}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_applied() {
        let result: OperationResult = Ok(MutationOutcome::Applied("Added".into())).into();
        assert_eq!(result, OperationResult::ok("Added"));
    }

    #[test]
    fn test_from_not_present_is_success() {
        let result: OperationResult = Ok(MutationOutcome::NotPresent).into();
        assert!(result.success);
        assert_eq!(result.message, None);
    }

    #[test]
    fn test_from_error() {
        let result: OperationResult = Err(ConfigError::TokenNotFound(42)).into();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Token not found for AppID 42"));
    }

    #[test]
    fn test_serialization_omits_empty_fields() {
        let json = serde_json::to_string(&OperationResult::done()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);
    }
}
