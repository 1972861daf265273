//! Survey eligibility engine
//!
//! Decides which surveys a contact may currently see. The pipeline runs four
//! stages in order and stops as soon as nothing is left:
//!
//! 1. type/status: only running app surveys
//! 2. display option: how often a survey may be shown
//! 3. recontact: cooldown since the latest display
//! 4. segment: audience predicates, evaluated concurrently per survey
//!
//! The first three stages live in [`rules`], the segment stage in
//! [`segment`]. [`service`] wraps the engine with repositories and a cache.

pub mod rules;
pub mod segment;
pub mod service;

use crate::error::Result;
use crate::types::{Contact, Display, EnvironmentData, Project, Response, Survey, UserData};
use chrono::{DateTime, Utc};
use rules::{apply_display_rules, DisplayHistory};
use segment::{SegmentContext, SegmentEvaluator, SegmentVerdict};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub use rules::{passes_display_option, passes_recontact};
pub use segment::{matches_filters, LocalSegmentEvaluator};

/// The eligibility pipeline bound to a segment evaluator
#[derive(Clone)]
pub struct EligibilityEngine {
    evaluator: Arc<dyn SegmentEvaluator>,
}

impl EligibilityEngine {
    pub fn new(evaluator: Arc<dyn SegmentEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Surveys the contact may see right now, in input order
    pub async fn select_eligible_surveys(
        &self,
        surveys: Vec<Survey>,
        project: &Project,
        contact: &Contact,
        displays: &[Display],
        responses: &[Response],
    ) -> Result<Vec<Survey>> {
        self.select_eligible_surveys_at(surveys, project, contact, displays, responses, Utc::now())
            .await
    }

    /// [`Self::select_eligible_surveys`] with an explicit clock
    pub async fn select_eligible_surveys_at(
        &self,
        surveys: Vec<Survey>,
        project: &Project,
        contact: &Contact,
        displays: &[Display],
        responses: &[Response],
        now: DateTime<Utc>,
    ) -> Result<Vec<Survey>> {
        let total = surveys.len();
        let history = DisplayHistory::from_events(&contact.contact_id, displays, responses);
        let surveys = apply_display_rules(surveys, &history, project.recontact_days, now);

        debug!(
            "{} of {} surveys passed display rules for contact {}",
            surveys.len(),
            total,
            contact.contact_id
        );

        if !surveys.iter().any(Survey::has_segment_filters) {
            return Ok(surveys);
        }

        let context = SegmentContext::for_contact(&project.environment_id, contact);
        let verdicts = self.evaluate_segments(&surveys, &context).await?;

        Ok(surveys
            .into_iter()
            .zip(verdicts)
            .filter(|(_, verdict)| verdict.keeps_survey())
            .map(|(survey, _)| survey)
            .collect())
    }

    /// Per-survey segment verdicts, in input order
    pub async fn evaluate_segments(
        &self,
        surveys: &[Survey],
        context: &SegmentContext,
    ) -> Result<Vec<SegmentVerdict>> {
        segment::evaluate_segments(Arc::clone(&self.evaluator), surveys, context).await
    }
}

/// Client-side recomputation of the surveys a cached user may see
///
/// Uses the user's local display/response history for the display rules.
/// Segment membership comes from `user.segments`: anonymous users only see
/// surveys without audience filters.
pub fn filter_surveys(
    environment: &EnvironmentData,
    user: &UserData,
    now: DateTime<Utc>,
) -> Vec<Survey> {
    let history = DisplayHistory::from_user(user);
    let surveys = apply_display_rules(
        environment.surveys.clone(),
        &history,
        environment.project.recontact_days,
        now,
    );

    if user.is_anonymous() {
        return surveys
            .into_iter()
            .filter(|survey| !survey.has_segment_filters())
            .collect();
    }

    let memberships: HashSet<&str> = user.segments.iter().map(String::as_str).collect();
    surveys
        .into_iter()
        .filter(|survey| match &survey.segment {
            Some(segment) if !segment.filters.is_empty() => {
                memberships.contains(segment.id.as_str())
            }
            _ => true,
        })
        .collect()
}
