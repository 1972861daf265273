//! Synchronous eligibility rules
//!
//! The type/status, display-option and recontact stages. They only need a
//! contact's display/response history, so the same rules serve the server
//! path (history from the history store) and the client path (history from
//! the cached user state).

use crate::types::{Display, DisplayOption, Response, Survey, UserData};
use crate::utils::datetime::diff_in_days;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Display and response history of one contact
#[derive(Debug, Clone, Default)]
pub struct DisplayHistory {
    /// (survey id, shown at), newest first
    displays: Vec<(String, DateTime<Utc>)>,
    display_counts: HashMap<String, usize>,
    responded: HashSet<String>,
    /// Latest display known from elsewhere (e.g. a cached `lastDisplayAt`)
    latest_hint: Option<DateTime<Utc>>,
}

impl DisplayHistory {
    /// History from store events; events of other contacts are ignored
    pub fn from_events(contact_id: &str, displays: &[Display], responses: &[Response]) -> Self {
        Self::build(
            displays
                .iter()
                .filter(|display| display.contact_id == contact_id)
                .map(|display| (display.survey_id.clone(), display.created_at)),
            responses
                .iter()
                .filter(|response| response.contact_id == contact_id)
                .map(|response| response.survey_id.clone()),
            None,
        )
    }

    /// History from the client-side user state
    pub fn from_user(user: &UserData) -> Self {
        Self::build(
            user.displays
                .iter()
                .map(|display| (display.survey_id.clone(), display.created_at)),
            user.responses.iter().cloned(),
            user.last_display_at,
        )
    }

    fn build(
        displays: impl Iterator<Item = (String, DateTime<Utc>)>,
        responses: impl Iterator<Item = String>,
        latest_hint: Option<DateTime<Utc>>,
    ) -> Self {
        let mut displays: Vec<(String, DateTime<Utc>)> = displays.collect();
        // fetch order is not trusted
        displays.sort_by(|a, b| b.1.cmp(&a.1));

        let mut display_counts = HashMap::new();
        for (survey_id, _) in &displays {
            *display_counts.entry(survey_id.clone()).or_insert(0) += 1;
        }

        Self {
            displays,
            display_counts,
            responded: responses.collect(),
            latest_hint,
        }
    }

    pub fn display_count(&self, survey_id: &str) -> usize {
        self.display_counts.get(survey_id).copied().unwrap_or(0)
    }

    pub fn has_response(&self, survey_id: &str) -> bool {
        self.responded.contains(survey_id)
    }

    /// Most recent display across all surveys
    pub fn latest_display(&self) -> Option<DateTime<Utc>> {
        let newest = self.displays.first().map(|(_, at)| *at);
        match (newest, self.latest_hint) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Most recent display of one survey
    pub fn latest_display_of(&self, survey_id: &str) -> Option<DateTime<Utc>> {
        self.displays
            .iter()
            .find(|(id, _)| id == survey_id)
            .map(|(_, at)| *at)
    }
}

/// Display-option rule for one survey
pub fn passes_display_option(survey: &Survey, history: &DisplayHistory) -> bool {
    match survey.display_option {
        DisplayOption::RespondMultiple => true,
        DisplayOption::DisplayOnce => history.display_count(&survey.id) == 0,
        DisplayOption::DisplayMultiple => !history.has_response(&survey.id),
        DisplayOption::DisplaySome => match survey.display_limit {
            None => true,
            Some(_) if history.has_response(&survey.id) => false,
            Some(limit) => history.display_count(&survey.id) < limit as usize,
        },
    }
}

/// Recontact cooldown rule for one survey
///
/// The survey's own `recontact_days` is measured from its latest display;
/// the project fallback from the latest display of any survey.
pub fn passes_recontact(
    survey: &Survey,
    history: &DisplayHistory,
    project_recontact_days: Option<u32>,
    now: DateTime<Utc>,
) -> bool {
    let Some(latest) = history.latest_display() else {
        return true;
    };

    if let Some(days) = survey.recontact_days {
        return match history.latest_display_of(&survey.id) {
            None => true,
            Some(shown_at) => diff_in_days(now, shown_at) >= i64::from(days),
        };
    }

    match project_recontact_days {
        Some(days) => diff_in_days(now, latest) >= i64::from(days),
        None => true,
    }
}

/// Type/status, display-option and recontact stages in order
///
/// Relative order of the input is preserved.
pub fn apply_display_rules(
    surveys: Vec<Survey>,
    history: &DisplayHistory,
    project_recontact_days: Option<u32>,
    now: DateTime<Utc>,
) -> Vec<Survey> {
    let surveys: Vec<Survey> = surveys
        .into_iter()
        .filter(Survey::is_active_app_survey)
        .collect();
    if surveys.is_empty() {
        return surveys;
    }

    let surveys: Vec<Survey> = surveys
        .into_iter()
        .filter(|survey| passes_display_option(survey, history))
        .collect();
    if surveys.is_empty() {
        return surveys;
    }

    surveys
        .into_iter()
        .filter(|survey| passes_recontact(survey, history, project_recontact_days, now))
        .collect()
}
