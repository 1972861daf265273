//! Cached client configuration
//!
//! The [`Config`] record is what the sync state machine keeps in memory and
//! mirrors to the persistence slot. The environment snapshot, the user state
//! and the status each carry their own expiry.

use crate::error::Result;
use crate::types::{surveys_from_json, EnvironmentData, Survey, UserData};
use crate::utils::datetime::{is_expired_at, is_now_expired};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a [`super::SyncClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Uninitialized,
    SettingUp,
    Ready,
    Error,
}

/// Environment snapshot with its expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentState {
    pub data: EnvironmentData,
    pub expires_at: DateTime<Utc>,
}

impl EnvironmentState {
    /// Decode a remote environment snapshot, checking every survey strictly
    pub fn from_value(mut value: serde_json::Value) -> Result<Self> {
        let surveys = value
            .get_mut("data")
            .and_then(serde_json::Value::as_object_mut)
            .and_then(|data| data.remove("surveys"));

        let mut state: EnvironmentState = serde_json::from_value(value)?;
        if let Some(surveys) = surveys {
            state.data.surveys = surveys_from_json(surveys)?;
        }
        Ok(state)
    }

    pub fn is_expired(&self) -> bool {
        is_now_expired(self.expires_at)
    }
}

/// User state with its expiry; anonymous state never expires
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub data: UserData,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserState {
    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusValue {
    Success,
    Error,
}

/// Outcome of the last setup; an error status backs off remote calls until it expires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub value: StatusValue,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            value: StatusValue::Success,
            expires_at: None,
        }
    }

    pub fn error_until(expires_at: DateTime<Utc>) -> Self {
        Self {
            value: StatusValue::Error,
            expires_at: Some(expires_at),
        }
    }

    pub fn is_error(&self) -> bool {
        self.value == StatusValue::Error
    }

    /// An error status without an expiry counts as already expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| is_expired_at(at, now))
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// The cached client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub environment_id: String,
    #[serde(default)]
    pub app_url: String,
    #[serde(default)]
    pub environment: Option<EnvironmentState>,
    #[serde(default)]
    pub user: UserState,
    #[serde(default)]
    pub filtered_surveys: Vec<Survey>,
    #[serde(default)]
    pub status: Status,
}

impl Config {
    /// Record left behind by a failed first setup
    pub fn errored(expires_at: DateTime<Utc>) -> Self {
        Self {
            status: Status::error_until(expires_at),
            ..Default::default()
        }
    }

    /// Whether this config was built for the given environment and app
    pub fn matches(&self, environment_id: &str, app_url: &str) -> bool {
        self.environment_id == environment_id && self.app_url == app_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_environment_snapshot_decodes_surveys_strictly() {
        let valid = serde_json::json!({
            "data": {
                "surveys": [
                    {"id": "s1", "status": "inProgress", "type": "app", "displayOption": "displayOnce"}
                ]
            },
            "expiresAt": "2030-01-01T00:00:00Z"
        });
        let state = EnvironmentState::from_value(valid).unwrap();
        assert_eq!(state.data.surveys.len(), 1);
        assert!(!state.is_expired());

        let corrupt = serde_json::json!({
            "data": {
                "surveys": [
                    {"id": "s1", "status": "inProgress", "type": "app", "displayOption": "invalidOption"}
                ]
            },
            "expiresAt": "2030-01-01T00:00:00Z"
        });
        let err = EnvironmentState::from_value(corrupt).unwrap_err();
        assert!(matches!(err, crate::error::SurveySyncError::ConfigIntegrity(_)));
    }

    #[test]
    fn test_environment_snapshot_without_surveys() {
        let state = EnvironmentState::from_value(serde_json::json!({
            "data": {},
            "expiresAt": "2020-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(state.data.surveys.is_empty());
        assert!(state.is_expired());
    }

    #[test]
    fn test_error_status_expiry() {
        let now = Utc::now();
        assert!(!Status::error_until(now + Duration::minutes(10)).is_expired_at(now));
        assert!(Status::error_until(now - Duration::minutes(1)).is_expired_at(now));

        let no_expiry = Status {
            value: StatusValue::Error,
            expires_at: None,
        };
        assert!(no_expiry.is_expired_at(now));
    }

    #[test]
    fn test_errored_config_wire_shape() {
        let config = Config::errored(Utc::now());
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["status"]["value"], "error");
        assert!(json["status"]["expiresAt"].is_string());
        assert!(json["environment"].is_null());
    }

    #[test]
    fn test_partial_record_deserializes() {
        let config: Config = serde_json::from_str(
            r#"{"status": {"value": "error", "expiresAt": "2030-01-01T00:00:00Z"}}"#,
        )
        .unwrap();
        assert!(config.status.is_error());
        assert_eq!(config.user, UserState::anonymous());
        assert!(config.filtered_surveys.is_empty());
    }

    #[test]
    fn test_matches() {
        let config = Config {
            environment_id: "env1".to_string(),
            app_url: "https://app.example.com".to_string(),
            ..Default::default()
        };
        assert!(config.matches("env1", "https://app.example.com"));
        assert!(!config.matches("env2", "https://app.example.com"));
        assert!(!config.matches("env1", "https://other.example.com"));
    }
}
