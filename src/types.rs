//! Core data types for survey eligibility
//!
//! This module defines the surveys, segments, projects and history records
//! the eligibility engine works on, plus the client-side views of an
//! environment and a user that the sync state machine caches. Wire names are
//! camelCase so cached state and fixtures read the same as the remote API.

use crate::error::{Result, SurveySyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Lifecycle status of a survey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurveyStatus {
    Draft,
    InProgress,
    Paused,
    Completed,
    Archived,
}

/// Where a survey is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyType {
    App,
    Link,
    Website,
}

/// How often a survey may be shown to the same contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayOption {
    /// Show every time, even after a response
    RespondMultiple,
    /// Show at most once
    DisplayOnce,
    /// Show until the contact responds
    DisplayMultiple,
    /// Show up to `display_limit` times, never after a response
    DisplaySome,
}

impl DisplayOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayOption::RespondMultiple => "respondMultiple",
            DisplayOption::DisplayOnce => "displayOnce",
            DisplayOption::DisplayMultiple => "displayMultiple",
            DisplayOption::DisplaySome => "displaySome",
        }
    }
}

impl FromStr for DisplayOption {
    type Err = SurveySyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "respondMultiple" => Ok(DisplayOption::RespondMultiple),
            "displayOnce" => Ok(DisplayOption::DisplayOnce),
            "displayMultiple" => Ok(DisplayOption::DisplayMultiple),
            "displaySome" => Ok(DisplayOption::DisplaySome),
            other => Err(SurveySyncError::ConfigIntegrity(format!(
                "Invalid displayOption: {}",
                other
            ))),
        }
    }
}

/// Contact device class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Phone,
    #[default]
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Phone => "phone",
            DeviceType::Desktop => "desktop",
        }
    }
}

impl FromStr for DeviceType {
    type Err = SurveySyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "phone" => Ok(DeviceType::Phone),
            "desktop" => Ok(DeviceType::Desktop),
            other => Err(SurveySyncError::Validation(format!(
                "Unknown device type: {}",
                other
            ))),
        }
    }
}

/// Contact attribute value: attributes are either text or numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Numeric view of the value; text that parses as a number is coerced
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value as f64)
    }
}

/// How a predicate joins the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connector {
    And,
    Or,
}

/// Operators for attribute predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeOperator {
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    IsSet,
    IsNotSet,
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
}

/// Operators for person and device predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EqualityOperator {
    Equals,
    NotEquals,
}

/// What a segment predicate inspects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum FilterResource {
    /// Compare a contact attribute
    Attribute {
        key: String,
        operator: AttributeOperator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<AttributeValue>,
    },

    /// Compare the contact's `userId`
    Person {
        operator: EqualityOperator,
        value: String,
    },

    /// Compare the contact's device class
    Device {
        operator: EqualityOperator,
        value: DeviceType,
    },

    /// Nested predicate list, evaluated as one term
    Group { filters: Vec<FilterPredicate> },
}

/// One audience predicate of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPredicate {
    pub id: String,

    /// Ignored on the first predicate of a list
    #[serde(default)]
    pub connector: Option<Connector>,

    pub resource: FilterResource,
}

/// Audience segment attached to a survey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    #[serde(default)]
    pub filters: Vec<FilterPredicate>,
}

/// A survey as delivered by the survey repository or the environment state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub environment_id: String,
    pub status: SurveyStatus,
    #[serde(rename = "type")]
    pub survey_type: SurveyType,
    pub display_option: DisplayOption,
    #[serde(default)]
    pub display_limit: Option<u32>,
    #[serde(default)]
    pub recontact_days: Option<u32>,
    #[serde(default)]
    pub segment: Option<Segment>,
}

impl Survey {
    /// Decode one survey from raw JSON
    ///
    /// An unknown `displayOption` is reported as a configuration integrity
    /// failure rather than a generic parse error.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value.get("displayOption") {
            Some(serde_json::Value::String(option)) => {
                DisplayOption::from_str(option)?;
            }
            Some(other) => {
                return Err(SurveySyncError::ConfigIntegrity(format!(
                    "Invalid displayOption: {}",
                    other
                )))
            }
            None => {
                return Err(SurveySyncError::ConfigIntegrity(
                    "Missing displayOption".to_string(),
                ))
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Only running app surveys can ever be displayed
    pub fn is_active_app_survey(&self) -> bool {
        self.status == SurveyStatus::InProgress && self.survey_type == SurveyType::App
    }

    pub fn has_segment_filters(&self) -> bool {
        self.segment
            .as_ref()
            .is_some_and(|segment| !segment.filters.is_empty())
    }
}

/// Decode a JSON array of surveys, failing on the first corrupt entry
pub fn surveys_from_json(value: serde_json::Value) -> Result<Vec<Survey>> {
    match value {
        serde_json::Value::Array(items) => items.into_iter().map(Survey::from_value).collect(),
        other => Err(SurveySyncError::Validation(format!(
            "Expected an array of surveys, got {}",
            other
        ))),
    }
}

/// Project-level settings of an environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub environment_id: String,
    /// Global recontact cooldown, overridden per survey
    #[serde(default)]
    pub recontact_days: Option<u32>,
}

/// One time a survey was shown to a contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    pub survey_id: String,
    pub contact_id: String,
    pub created_at: DateTime<Utc>,
}

/// A contact's answer to a survey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub survey_id: String,
    pub contact_id: String,
}

/// The end user a survey decision is made for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub contact_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub device_type: DeviceType,
}

impl Contact {
    pub fn new(contact_id: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_device(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    /// The `userId` attribute rendered as a string
    pub fn user_id(&self) -> Option<String> {
        self.attributes.get("userId").map(|value| value.to_string())
    }
}

/// Kind of trigger an action class represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Code,
    NoCode,
    Automatic,
}

/// Trigger definition shipped with the environment state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionClass {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub no_code_config: Option<serde_json::Value>,
}

/// Environment snapshot as seen by the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentData {
    #[serde(default)]
    pub project: Project,
    #[serde(default)]
    pub surveys: Vec<Survey>,
    #[serde(default)]
    pub action_classes: Vec<ActionClass>,
}

/// A display as recorded in the client-side user state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDisplay {
    pub survey_id: String,
    pub created_at: DateTime<Utc>,
}

/// User state as seen by the client
///
/// The default value is the anonymous user: no id, no segments, no history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    /// Ids of the segments this user is a member of
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(default)]
    pub displays: Vec<UserDisplay>,
    /// Ids of the surveys this user responded to
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub last_display_at: Option<DateTime<Utc>>,
}

impl UserData {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn survey_json(display_option: &str) -> serde_json::Value {
        json!({
            "id": "s1",
            "name": "NPS",
            "status": "inProgress",
            "type": "app",
            "displayOption": display_option,
        })
    }

    #[test]
    fn test_survey_from_value() {
        let survey = Survey::from_value(survey_json("displaySome")).unwrap();
        assert_eq!(survey.display_option, DisplayOption::DisplaySome);
        assert_eq!(survey.display_limit, None);
        assert!(survey.is_active_app_survey());
        assert!(!survey.has_segment_filters());
    }

    #[test]
    fn test_invalid_display_option_is_integrity_error() {
        let err = Survey::from_value(survey_json("invalidOption")).unwrap_err();
        assert!(matches!(err, SurveySyncError::ConfigIntegrity(_)));
    }

    #[test]
    fn test_surveys_from_json_does_not_drop_corrupt_entries() {
        let raw = json!([survey_json("respondMultiple"), survey_json("invalidOption")]);
        let err = surveys_from_json(raw).unwrap_err();
        assert!(matches!(err, SurveySyncError::ConfigIntegrity(_)));
    }

    #[test]
    fn test_segment_filters_deserialize() {
        let raw = json!({
            "id": "seg1",
            "filters": [
                {
                    "id": "f1",
                    "resource": {"type": "attribute", "key": "plan", "operator": "equals", "value": "pro"}
                },
                {
                    "id": "f2",
                    "connector": "or",
                    "resource": {"type": "group", "filters": [
                        {"id": "f3", "resource": {"type": "device", "operator": "equals", "value": "phone"}}
                    ]}
                }
            ]
        });
        let segment: Segment = serde_json::from_value(raw).unwrap();
        assert_eq!(segment.filters.len(), 2);
        assert_eq!(segment.filters[1].connector, Some(Connector::Or));
        assert!(matches!(
            segment.filters[0].resource,
            FilterResource::Attribute { operator: AttributeOperator::Equals, .. }
        ));
    }

    #[test]
    fn test_contact_user_id_renders_numbers_without_fraction() {
        let contact = Contact::new("c1").with_attribute("userId", 42i64);
        assert_eq!(contact.user_id(), Some("42".to_string()));

        let contact = Contact::new("c2").with_attribute("userId", "abc");
        assert_eq!(contact.user_id(), Some("abc".to_string()));
    }

    #[test]
    fn test_attribute_value_numeric_coercion() {
        assert_eq!(AttributeValue::from("12.5").as_number(), Some(12.5));
        assert_eq!(AttributeValue::from("pro").as_number(), None);
        assert_eq!(AttributeValue::from(3i64).as_number(), Some(3.0));
    }

    #[test]
    fn test_anonymous_user_default() {
        let user = UserData::anonymous();
        assert!(user.is_anonymous());
        assert!(user.segments.is_empty());
        assert!(user.last_display_at.is_none());
    }
}
