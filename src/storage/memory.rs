//! In-memory repositories
//!
//! Backs the project, survey and history repositories with plain maps. Used
//! by the `eligible` command to evaluate a JSON fixture and by tests.

use super::{HistoryStore, ProjectRepository, StorageError, StorageResult, SurveyRepository};
use crate::error::{Result, SurveySyncError};
use crate::types::{surveys_from_json, Contact, Display, Project, Response, Survey};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

/// A self-contained environment snapshot for offline evaluation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub project: Project,
    /// Raw survey JSON, decoded strictly by [`Fixture::surveys`]
    #[serde(default)]
    pub surveys: serde_json::Value,
    #[serde(default)]
    pub displays: Vec<Display>,
    #[serde(default)]
    pub responses: Vec<Response>,
    #[serde(default)]
    pub contact: Option<Contact>,
}

impl Fixture {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&raw)
    }

    /// Decode the fixture's surveys; an invalid display option fails the whole fixture
    pub fn surveys(&self) -> Result<Vec<Survey>> {
        if self.surveys.is_null() {
            return Ok(Vec::new());
        }
        surveys_from_json(self.surveys.clone())
    }
}

#[derive(Default)]
struct Tables {
    projects: HashMap<String, Project>,
    surveys: HashMap<String, Vec<Survey>>,
    displays: Vec<Display>,
    responses: Vec<Response>,
    query_failure: Option<String>,
}

/// Map-backed implementation of every repository trait
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a fixture, keyed by the fixture project's environment id
    pub async fn from_fixture(fixture: &Fixture) -> Result<Self> {
        let repository = Self::new();
        let environment_id = fixture.project.environment_id.clone();
        repository.insert_project(fixture.project.clone()).await;
        let surveys = fixture.surveys().map_err(|e| match e {
            SurveySyncError::ConfigIntegrity(message) => {
                StorageError::Integrity(format!("fixture for {}: {}", environment_id, message))
                    .into()
            }
            other => other,
        })?;
        repository.insert_surveys(&environment_id, surveys).await;
        for display in &fixture.displays {
            repository.record_display(display.clone()).await;
        }
        for response in &fixture.responses {
            repository.record_response(response.clone()).await;
        }
        Ok(repository)
    }

    pub async fn insert_project(&self, project: Project) {
        let mut tables = self.tables.write().await;
        tables
            .projects
            .insert(project.environment_id.clone(), project);
    }

    pub async fn insert_surveys(&self, environment_id: &str, surveys: Vec<Survey>) {
        let mut tables = self.tables.write().await;
        tables
            .surveys
            .entry(environment_id.to_string())
            .or_default()
            .extend(surveys);
    }

    pub async fn record_display(&self, display: Display) {
        self.tables.write().await.displays.push(display);
    }

    pub async fn record_response(&self, response: Response) {
        self.tables.write().await.responses.push(response);
    }

    /// Make every subsequent query fail with a backend query error
    pub async fn fail_queries_with(&self, message: impl Into<String>) {
        self.tables.write().await.query_failure = Some(message.into());
    }

    fn check(tables: &Tables) -> StorageResult<()> {
        match &tables.query_failure {
            Some(message) => Err(StorageError::Query(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProjectRepository for InMemoryRepository {
    async fn get_project_by_environment_id(
        &self,
        environment_id: &str,
    ) -> StorageResult<Option<Project>> {
        let tables = self.tables.read().await;
        Self::check(&tables)?;
        Ok(tables.projects.get(environment_id).cloned())
    }
}

#[async_trait]
impl SurveyRepository for InMemoryRepository {
    async fn get_surveys(&self, environment_id: &str) -> StorageResult<Vec<Survey>> {
        let tables = self.tables.read().await;
        Self::check(&tables)?;
        let surveys = tables
            .surveys
            .get(environment_id)
            .cloned()
            .unwrap_or_default();
        debug!(
            "Loaded {} surveys for environment {}",
            surveys.len(),
            environment_id
        );
        Ok(surveys)
    }
}

#[async_trait]
impl HistoryStore for InMemoryRepository {
    async fn find_displays(&self, contact_id: &str) -> StorageResult<Vec<Display>> {
        let tables = self.tables.read().await;
        Self::check(&tables)?;
        Ok(tables
            .displays
            .iter()
            .filter(|display| display.contact_id == contact_id)
            .cloned()
            .collect())
    }

    async fn find_responses(&self, contact_id: &str) -> StorageResult<Vec<Response>> {
        let tables = self.tables.read().await;
        Self::check(&tables)?;
        Ok(tables
            .responses
            .iter()
            .filter(|response| response.contact_id == contact_id)
            .cloned()
            .collect())
    }
}
