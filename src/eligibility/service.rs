//! Sync-surveys service
//!
//! Server-side entry point: given an environment and a contact, load the
//! project, surveys and history from the repositories, run the eligibility
//! engine and cache the answer.

use super::segment::SegmentEvaluator;
use super::EligibilityEngine;
use crate::cache::{CacheKey, SyncSurveyCache};
use crate::error::{Result, SurveySyncError};
use crate::storage::{HistoryStore, ProjectRepository, StorageError, SurveyRepository};
use crate::types::{AttributeValue, Contact, DeviceType, Survey};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const MAX_ID_LEN: usize = 64;

/// Reject blank, overlong or non-identifier ids
pub fn validate_id(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SurveySyncError::Validation(format!("{} must not be empty", field)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(SurveySyncError::Validation(format!(
            "{} exceeds {} characters",
            field, MAX_ID_LEN
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SurveySyncError::Validation(format!(
            "{} contains invalid characters: {}",
            field, value
        )));
    }
    Ok(())
}

fn database_error(operation: &str, err: StorageError) -> SurveySyncError {
    error!("Failed to {}: {}", operation, err);
    err.into()
}

/// Eligible surveys per contact, backed by repositories and a TTL cache
pub struct SyncSurveysService {
    projects: Arc<dyn ProjectRepository>,
    surveys: Arc<dyn SurveyRepository>,
    history: Arc<dyn HistoryStore>,
    engine: EligibilityEngine,
    cache: SyncSurveyCache,
}

impl SyncSurveysService {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        surveys: Arc<dyn SurveyRepository>,
        history: Arc<dyn HistoryStore>,
        evaluator: Arc<dyn SegmentEvaluator>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            projects,
            surveys,
            history,
            engine: EligibilityEngine::new(evaluator),
            cache: SyncSurveyCache::new(cache_ttl),
        }
    }

    /// Surveys the contact may currently see
    pub async fn get_sync_surveys(
        &self,
        environment_id: &str,
        contact_id: &str,
        attributes: &BTreeMap<String, AttributeValue>,
        device_type: DeviceType,
    ) -> Result<Vec<Survey>> {
        validate_id("environmentId", environment_id)?;
        validate_id("contactId", contact_id)?;

        let key = CacheKey::new(environment_id, contact_id, attributes, device_type);
        if let Some(surveys) = self.cache.get(&key).await {
            debug!(
                "Cache hit for contact {} in environment {}",
                contact_id, environment_id
            );
            return Ok(surveys);
        }

        let mut project = self
            .projects
            .get_project_by_environment_id(environment_id)
            .await
            .map_err(|e| database_error("load project", e))?
            .ok_or_else(|| SurveySyncError::ResourceNotFound {
                resource: "Project",
                id: environment_id.to_string(),
            })?;
        if project.environment_id.is_empty() {
            project.environment_id = environment_id.to_string();
        }

        let surveys: Vec<Survey> = self
            .surveys
            .get_surveys(environment_id)
            .await
            .map_err(|e| database_error("load surveys", e))?
            .into_iter()
            .filter(Survey::is_active_app_survey)
            .collect();

        if surveys.is_empty() {
            debug!("No active app surveys in environment {}", environment_id);
            self.cache.insert(key, Vec::new()).await;
            return Ok(Vec::new());
        }

        let displays = self
            .history
            .find_displays(contact_id)
            .await
            .map_err(|e| database_error("load displays", e))?;
        let responses = self
            .history
            .find_responses(contact_id)
            .await
            .map_err(|e| database_error("load responses", e))?;

        let contact = Contact {
            contact_id: contact_id.to_string(),
            attributes: attributes.clone(),
            device_type,
        };
        let eligible = self
            .engine
            .select_eligible_surveys(surveys, &project, &contact, &displays, &responses)
            .await?;

        info!(
            "{} eligible survey(s) for contact {} in environment {}",
            eligible.len(),
            contact_id,
            environment_id
        );

        self.cache.insert(key, eligible.clone()).await;
        Ok(eligible)
    }

    /// Convenience wrapper taking a [`Contact`]
    pub async fn get_sync_surveys_for(
        &self,
        environment_id: &str,
        contact: &Contact,
    ) -> Result<Vec<Survey>> {
        self.get_sync_surveys(
            environment_id,
            &contact.contact_id,
            &contact.attributes,
            contact.device_type,
        )
        .await
    }

    pub async fn invalidate_environment(&self, environment_id: &str) -> usize {
        self.cache.invalidate_environment(environment_id).await
    }

    pub async fn invalidate_contact(&self, environment_id: &str, contact_id: &str) -> usize {
        self.cache.invalidate_contact(environment_id, contact_id).await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await
    }

    pub fn engine(&self) -> &EligibilityEngine {
        &self.engine
    }
}
