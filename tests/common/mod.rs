//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use survey_sync_core::{
    Display, DisplayOption, EnvironmentData, EnvironmentFetcher, EnvironmentState, FetchError,
    Project, Response, Survey, SurveyStatus, SurveyType, UserState, UserUpdate, UserUpdater,
};

pub const ENV: &str = "clenv0001";
pub const APP_URL: &str = "https://app.example.com";

/// Environment fetcher with a scripted result and a call counter
pub struct ScriptedFetcher {
    result: Mutex<std::result::Result<EnvironmentState, FetchError>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn ok(state: EnvironmentState) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Ok(state)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: FetchError) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Err(error)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnvironmentFetcher for ScriptedFetcher {
    async fn fetch_environment_state(
        &self,
        _environment_id: &str,
        _app_url: &str,
    ) -> std::result::Result<EnvironmentState, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone()
    }
}

/// User updater that must never be reached
#[derive(Default)]
pub struct UnreachableUpdater {
    calls: AtomicUsize,
}

impl UnreachableUpdater {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserUpdater for UnreachableUpdater {
    async fn send_updates_to_backend(
        &self,
        _environment_id: &str,
        _app_url: &str,
        _update: &UserUpdate,
    ) -> std::result::Result<UserState, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::network("user endpoint not expected in this test"))
    }
}

pub fn survey(id: &str, display_option: DisplayOption) -> Survey {
    Survey {
        id: id.to_string(),
        name: format!("Survey {}", id),
        environment_id: ENV.to_string(),
        status: SurveyStatus::InProgress,
        survey_type: SurveyType::App,
        display_option,
        display_limit: None,
        recontact_days: None,
        segment: None,
    }
}

pub fn project(recontact_days: Option<u32>) -> Project {
    Project {
        id: "clproj001".to_string(),
        environment_id: ENV.to_string(),
        recontact_days,
    }
}

pub fn environment_state(surveys: Vec<Survey>, expires_at: DateTime<Utc>) -> EnvironmentState {
    EnvironmentState {
        data: EnvironmentData {
            project: project(None),
            surveys,
            action_classes: vec![],
        },
        expires_at,
    }
}

pub fn fresh_environment(surveys: Vec<Survey>) -> EnvironmentState {
    environment_state(surveys, Utc::now() + Duration::minutes(30))
}

/// Fixed clock for history-dependent assertions
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// A display `days_ago` whole days before [`reference_time`]
pub fn display(survey_id: &str, contact_id: &str, days_ago: i64) -> Display {
    Display {
        survey_id: survey_id.to_string(),
        contact_id: contact_id.to_string(),
        created_at: reference_time() - Duration::days(days_ago),
    }
}

pub fn response(survey_id: &str, contact_id: &str) -> Response {
    Response {
        survey_id: survey_id.to_string(),
        contact_id: contact_id.to_string(),
    }
}

pub fn ids(surveys: &[Survey]) -> Vec<String> {
    surveys.iter().map(|s| s.id.clone()).collect()
}
