//! Error types for survey eligibility and client state synchronization
//!
//! This module provides structured error definitions using thiserror, plus
//! the remote fetch error shape shared by the environment and user
//! collaborators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for survey-sync operations
#[derive(Error, Debug)]
pub enum SurveySyncError {
    /// A required setup input was blank
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Input failed validation (malformed id, bad value)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Project or survey missing for an environment
    #[error("{resource} not found: {id}")]
    ResourceNotFound { resource: &'static str, id: String },

    /// Known backend query failure, decoupled from the storage engine's error shape
    #[error("Database error: {0}")]
    Database(String),

    /// Environment or user state fetch failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Upstream survey data is corrupt (e.g. unknown display option)
    #[error("Invalid survey configuration: {0}")]
    ConfigIntegrity(String),

    /// Segment evaluation failed for a single survey
    #[error("Segment evaluation failed for survey {survey_id}: {message}")]
    SegmentEvaluation { survey_id: String, message: String },

    /// The segment evaluator itself cannot be reached
    #[error("Segment evaluator unavailable: {0}")]
    SegmentEvaluatorUnavailable(String),

    /// First-time setup failed; an error status has been persisted
    #[error("Could not set up survey sync: {code} - {message}")]
    SetupFailed { code: FetchErrorCode, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl SurveySyncError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            SurveySyncError::MissingField(_) => "missing_field",
            SurveySyncError::Validation(_) => "validation",
            SurveySyncError::ResourceNotFound { .. } => "not_found",
            SurveySyncError::Database(_) => "database",
            SurveySyncError::Fetch(_) => "fetch",
            SurveySyncError::ConfigIntegrity(_) => "config_integrity",
            SurveySyncError::SegmentEvaluation { .. } => "segment_evaluation",
            SurveySyncError::SegmentEvaluatorUnavailable(_) => "segment_evaluator_unavailable",
            SurveySyncError::SetupFailed { .. } => "setup_failed",
            SurveySyncError::Config(_) => "config",
            SurveySyncError::Io(_) => "io",
            SurveySyncError::Serialization(_) => "serialization",
            SurveySyncError::Http(_) => "http",
            SurveySyncError::Other(_) => "other",
        }
    }

    /// Whether this error indicates corrupt upstream data that must never be recovered
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SurveySyncError::ConfigIntegrity(_) | SurveySyncError::SetupFailed { .. }
        )
    }
}

/// Result type alias for survey-sync operations
pub type Result<T> = std::result::Result<T, SurveySyncError>;

/// Convert anyhow::Error to SurveySyncError
impl From<anyhow::Error> for SurveySyncError {
    fn from(err: anyhow::Error) -> Self {
        SurveySyncError::Other(err.to_string())
    }
}

/// Failure category of a remote environment/user call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorCode {
    Forbidden,
    NotFound,
    Network,
    InvalidResponse,
    /// The payload decoded but carries corrupt survey data
    ConfigIntegrity,
    ServerError,
}

impl FetchErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorCode::Forbidden => "forbidden",
            FetchErrorCode::NotFound => "not_found",
            FetchErrorCode::Network => "network",
            FetchErrorCode::InvalidResponse => "invalid_response",
            FetchErrorCode::ConfigIntegrity => "config_integrity",
            FetchErrorCode::ServerError => "server_error",
        }
    }
}

impl std::fmt::Display for FetchErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the environment fetch and user update collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {response_message}")]
#[serde(rename_all = "camelCase")]
pub struct FetchError {
    pub code: FetchErrorCode,
    pub response_message: String,
}

impl FetchError {
    pub fn new(code: FetchErrorCode, response_message: impl Into<String>) -> Self {
        Self {
            code,
            response_message: response_message.into(),
        }
    }

    pub fn forbidden(response_message: impl Into<String>) -> Self {
        Self::new(FetchErrorCode::Forbidden, response_message)
    }

    pub fn network(response_message: impl Into<String>) -> Self {
        Self::new(FetchErrorCode::Network, response_message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SurveySyncError::ResourceNotFound {
            resource: "Project",
            id: "env_1".to_string(),
        };
        assert_eq!(err.to_string(), "Project not found: env_1");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_missing_field_code() {
        let err = SurveySyncError::MissingField("environmentId");
        assert_eq!(err.code(), "missing_field");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fetch_error_conversion() {
        let err: SurveySyncError = FetchError::forbidden("No access").into();
        assert!(matches!(err, SurveySyncError::Fetch(ref e) if e.code == FetchErrorCode::Forbidden));
        assert_eq!(err.to_string(), "Fetch error: forbidden: No access");
    }

    #[test]
    fn test_fetch_error_wire_shape() {
        let err = FetchError::forbidden("No access");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "forbidden");
        assert_eq!(json["responseMessage"], "No access");
    }

    #[test]
    fn test_config_integrity_is_fatal() {
        let err = SurveySyncError::ConfigIntegrity("Invalid displayOption".to_string());
        assert!(err.is_fatal());
        assert_eq!(err.code(), "config_integrity");
    }
}
