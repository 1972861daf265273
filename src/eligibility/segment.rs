//! Segment stage of the eligibility pipeline
//!
//! Audience predicates are evaluated by a [`SegmentEvaluator`]. Every survey
//! with filters gets its own task; all tasks run concurrently and each
//! produces a [`SegmentVerdict`], so one failing evaluation only excludes its
//! own survey.

use crate::error::{Result, SurveySyncError};
use crate::types::{
    AttributeOperator, AttributeValue, Connector, Contact, DeviceType, EqualityOperator,
    FilterPredicate, FilterResource, Survey,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the evaluator knows about the contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentContext {
    pub attributes: BTreeMap<String, AttributeValue>,
    pub device_type: DeviceType,
    pub environment_id: String,
    pub contact_id: String,
    pub user_id: Option<String>,
}

impl SegmentContext {
    pub fn for_contact(environment_id: &str, contact: &Contact) -> Self {
        Self {
            attributes: contact.attributes.clone(),
            device_type: contact.device_type,
            environment_id: environment_id.to_string(),
            contact_id: contact.contact_id.clone(),
            user_id: contact.user_id(),
        }
    }
}

/// Decides whether a contact matches a list of audience predicates
///
/// Implementations must be safe to call concurrently. Returning
/// [`SurveySyncError::SegmentEvaluatorUnavailable`] aborts the whole batch;
/// any other error only affects the survey being evaluated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SegmentEvaluator: Send + Sync {
    async fn evaluate(&self, context: &SegmentContext, filters: &[FilterPredicate])
        -> Result<bool>;
}

/// Outcome of the segment stage for one survey
#[derive(Debug)]
pub enum SegmentVerdict {
    /// No segment, or a segment without filters
    Unfiltered,
    Matched,
    NotMatched,
    Failed(SurveySyncError),
}

impl SegmentVerdict {
    pub fn keeps_survey(&self) -> bool {
        matches!(self, SegmentVerdict::Unfiltered | SegmentVerdict::Matched)
    }
}

/// Evaluate every survey's segment concurrently
///
/// Verdicts are returned in the order of `surveys`.
pub async fn evaluate_segments(
    evaluator: Arc<dyn SegmentEvaluator>,
    surveys: &[Survey],
    context: &SegmentContext,
) -> Result<Vec<SegmentVerdict>> {
    let mut verdicts: Vec<SegmentVerdict> =
        surveys.iter().map(|_| SegmentVerdict::Unfiltered).collect();
    let mut tasks = Vec::new();

    for (index, survey) in surveys.iter().enumerate() {
        let Some(segment) = survey.segment.as_ref().filter(|s| !s.filters.is_empty()) else {
            continue;
        };
        let evaluator = Arc::clone(&evaluator);
        let context = context.clone();
        let filters = segment.filters.clone();
        let handle =
            tokio::spawn(async move { evaluator.evaluate(&context, &filters).await });
        tasks.push((index, survey.id.clone(), handle));
    }

    debug!("Evaluating {} segment(s)", tasks.len());

    let mut remaining = tasks.into_iter();
    while let Some((index, survey_id, handle)) = remaining.next() {
        verdicts[index] = match handle.await {
            Ok(Ok(true)) => SegmentVerdict::Matched,
            Ok(Ok(false)) => SegmentVerdict::NotMatched,
            Ok(Err(SurveySyncError::SegmentEvaluatorUnavailable(message))) => {
                for (_, _, pending) in remaining {
                    pending.abort();
                }
                return Err(SurveySyncError::SegmentEvaluatorUnavailable(message));
            }
            Ok(Err(e)) => {
                warn!("Segment evaluation failed for survey {}: {}", survey_id, e);
                SegmentVerdict::Failed(SurveySyncError::SegmentEvaluation {
                    survey_id,
                    message: e.to_string(),
                })
            }
            Err(join_error) => {
                warn!(
                    "Segment evaluation task for survey {} did not complete: {}",
                    survey_id, join_error
                );
                SegmentVerdict::Failed(SurveySyncError::SegmentEvaluation {
                    survey_id,
                    message: join_error.to_string(),
                })
            }
        };
    }

    Ok(verdicts)
}

/// In-process evaluator over the predicate tree
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSegmentEvaluator;

#[async_trait]
impl SegmentEvaluator for LocalSegmentEvaluator {
    async fn evaluate(
        &self,
        context: &SegmentContext,
        filters: &[FilterPredicate],
    ) -> Result<bool> {
        Ok(matches_filters(filters, context))
    }
}

/// Evaluate a predicate list; `and` binds tighter than `or`
///
/// An empty list matches everyone.
pub fn matches_filters(filters: &[FilterPredicate], context: &SegmentContext) -> bool {
    if filters.is_empty() {
        return true;
    }

    let mut any_chain = false;
    let mut chain = true;
    for (i, predicate) in filters.iter().enumerate() {
        let result = matches_resource(&predicate.resource, context);
        if i > 0 && predicate.connector == Some(Connector::Or) {
            any_chain |= chain;
            chain = result;
        } else {
            chain &= result;
        }
    }
    any_chain || chain
}

fn matches_resource(resource: &FilterResource, context: &SegmentContext) -> bool {
    match resource {
        FilterResource::Attribute {
            key,
            operator,
            value,
        } => matches_attribute(context.attributes.get(key), *operator, value.as_ref()),
        FilterResource::Person { operator, value } => {
            let is_equal = context.user_id.as_deref() == Some(value.as_str());
            match operator {
                EqualityOperator::Equals => is_equal,
                EqualityOperator::NotEquals => !is_equal,
            }
        }
        FilterResource::Device { operator, value } => match operator {
            EqualityOperator::Equals => context.device_type == *value,
            EqualityOperator::NotEquals => context.device_type != *value,
        },
        FilterResource::Group { filters } => matches_filters(filters, context),
    }
}

fn matches_attribute(
    actual: Option<&AttributeValue>,
    operator: AttributeOperator,
    expected: Option<&AttributeValue>,
) -> bool {
    match operator {
        AttributeOperator::IsSet => return actual.is_some(),
        AttributeOperator::IsNotSet => return actual.is_none(),
        _ => {}
    }

    let (Some(actual), Some(expected)) = (actual, expected) else {
        return false;
    };

    let numbers = actual.as_number().zip(expected.as_number());
    let actual_text = actual.to_string();
    let expected_text = expected.to_string();

    match operator {
        AttributeOperator::Equals => match numbers {
            Some((a, b)) => a == b,
            None => actual_text == expected_text,
        },
        AttributeOperator::NotEquals => match numbers {
            Some((a, b)) => a != b,
            None => actual_text != expected_text,
        },
        AttributeOperator::LessThan => numbers.is_some_and(|(a, b)| a < b),
        AttributeOperator::LessEqual => numbers.is_some_and(|(a, b)| a <= b),
        AttributeOperator::GreaterThan => numbers.is_some_and(|(a, b)| a > b),
        AttributeOperator::GreaterEqual => numbers.is_some_and(|(a, b)| a >= b),
        AttributeOperator::Contains => actual_text.contains(&expected_text),
        AttributeOperator::DoesNotContain => !actual_text.contains(&expected_text),
        AttributeOperator::StartsWith => actual_text.starts_with(&expected_text),
        AttributeOperator::EndsWith => actual_text.ends_with(&expected_text),
        AttributeOperator::IsSet => true,
        AttributeOperator::IsNotSet => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DisplayOption, Segment, SurveyStatus, SurveyType};

    fn context() -> SegmentContext {
        let contact = Contact::new("c1")
            .with_attribute("userId", "user_1")
            .with_attribute("plan", "pro")
            .with_attribute("seats", 12i64)
            .with_attribute("email", "ada@example.com")
            .with_device(DeviceType::Phone);
        SegmentContext::for_contact("env1", &contact)
    }

    fn attr(id: &str, key: &str, operator: AttributeOperator, value: &str) -> FilterPredicate {
        FilterPredicate {
            id: id.to_string(),
            connector: None,
            resource: FilterResource::Attribute {
                key: key.to_string(),
                operator,
                value: Some(AttributeValue::from(value)),
            },
        }
    }

    fn joined(mut predicate: FilterPredicate, connector: Connector) -> FilterPredicate {
        predicate.connector = Some(connector);
        predicate
    }

    fn survey_with_filters(id: &str, filters: Vec<FilterPredicate>) -> Survey {
        Survey {
            id: id.to_string(),
            name: String::new(),
            environment_id: "env1".to_string(),
            status: SurveyStatus::InProgress,
            survey_type: SurveyType::App,
            display_option: DisplayOption::RespondMultiple,
            display_limit: None,
            recontact_days: None,
            segment: Some(Segment {
                id: format!("seg_{}", id),
                filters,
            }),
        }
    }

    #[test]
    fn test_attribute_operators() {
        let ctx = context();
        assert!(matches_filters(&[attr("f", "plan", AttributeOperator::Equals, "pro")], &ctx));
        assert!(matches_filters(&[attr("f", "plan", AttributeOperator::NotEquals, "free")], &ctx));
        assert!(matches_filters(&[attr("f", "seats", AttributeOperator::GreaterThan, "10")], &ctx));
        assert!(!matches_filters(&[attr("f", "seats", AttributeOperator::LessThan, "10")], &ctx));
        assert!(matches_filters(&[attr("f", "seats", AttributeOperator::Equals, "12")], &ctx));
        assert!(matches_filters(&[attr("f", "email", AttributeOperator::EndsWith, "@example.com")], &ctx));
        assert!(matches_filters(&[attr("f", "email", AttributeOperator::StartsWith, "ada")], &ctx));
        assert!(matches_filters(&[attr("f", "email", AttributeOperator::DoesNotContain, "bob")], &ctx));
        // text never compares numerically
        assert!(!matches_filters(&[attr("f", "plan", AttributeOperator::GreaterThan, "1")], &ctx));
    }

    #[test]
    fn test_missing_attribute() {
        let ctx = context();
        assert!(!matches_filters(&[attr("f", "country", AttributeOperator::Equals, "DE")], &ctx));
        assert!(!matches_filters(&[attr("f", "country", AttributeOperator::NotEquals, "DE")], &ctx));

        let is_not_set = FilterPredicate {
            id: "f".to_string(),
            connector: None,
            resource: FilterResource::Attribute {
                key: "country".to_string(),
                operator: AttributeOperator::IsNotSet,
                value: None,
            },
        };
        assert!(matches_filters(&[is_not_set], &ctx));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let ctx = context();
        // false AND false OR true  => true
        let filters = vec![
            attr("f1", "plan", AttributeOperator::Equals, "free"),
            joined(attr("f2", "seats", AttributeOperator::LessThan, "5"), Connector::And),
            joined(attr("f3", "email", AttributeOperator::Contains, "ada"), Connector::Or),
        ];
        assert!(matches_filters(&filters, &ctx));

        // true OR false AND false  => true
        let filters = vec![
            attr("f1", "plan", AttributeOperator::Equals, "pro"),
            joined(attr("f2", "seats", AttributeOperator::LessThan, "5"), Connector::Or),
            joined(attr("f3", "email", AttributeOperator::Contains, "bob"), Connector::And),
        ];
        assert!(matches_filters(&filters, &ctx));

        // true AND false  => false
        let filters = vec![
            attr("f1", "plan", AttributeOperator::Equals, "pro"),
            joined(attr("f2", "seats", AttributeOperator::LessThan, "5"), Connector::And),
        ];
        assert!(!matches_filters(&filters, &ctx));
    }

    #[test]
    fn test_person_device_and_group() {
        let ctx = context();
        let filters = vec![
            FilterPredicate {
                id: "p".to_string(),
                connector: None,
                resource: FilterResource::Person {
                    operator: EqualityOperator::Equals,
                    value: "user_1".to_string(),
                },
            },
            FilterPredicate {
                id: "g".to_string(),
                connector: Some(Connector::And),
                resource: FilterResource::Group {
                    filters: vec![FilterPredicate {
                        id: "d".to_string(),
                        connector: None,
                        resource: FilterResource::Device {
                            operator: EqualityOperator::Equals,
                            value: DeviceType::Phone,
                        },
                    }],
                },
            },
        ];
        assert!(matches_filters(&filters, &ctx));
        assert!(matches_filters(&[], &ctx));
    }

    #[tokio::test]
    async fn test_verdicts_keep_input_order() {
        let surveys = vec![
            survey_with_filters("a", vec![attr("f", "plan", AttributeOperator::Equals, "pro")]),
            survey_with_filters("b", vec![]),
            survey_with_filters("c", vec![attr("f", "plan", AttributeOperator::Equals, "free")]),
        ];
        let verdicts = evaluate_segments(Arc::new(LocalSegmentEvaluator), &surveys, &context())
            .await
            .unwrap();

        assert!(matches!(verdicts[0], SegmentVerdict::Matched));
        assert!(matches!(verdicts[1], SegmentVerdict::Unfiltered));
        assert!(matches!(verdicts[2], SegmentVerdict::NotMatched));
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let mut evaluator = MockSegmentEvaluator::new();
        evaluator.expect_evaluate().times(2).returning(|_, filters| {
            if filters[0].id == "boom" {
                Err(SurveySyncError::Other("evaluator timeout".to_string()))
            } else {
                Ok(true)
            }
        });

        let surveys = vec![
            survey_with_filters("a", vec![attr("boom", "plan", AttributeOperator::Equals, "pro")]),
            survey_with_filters("b", vec![attr("ok", "plan", AttributeOperator::Equals, "pro")]),
        ];
        let verdicts = evaluate_segments(Arc::new(evaluator), &surveys, &context())
            .await
            .unwrap();

        assert!(matches!(
            &verdicts[0],
            SegmentVerdict::Failed(SurveySyncError::SegmentEvaluation { survey_id, .. }) if survey_id == "a"
        ));
        assert!(verdicts[1].keeps_survey());
    }

    #[tokio::test]
    async fn test_unavailable_evaluator_aborts_batch() {
        let mut evaluator = MockSegmentEvaluator::new();
        evaluator.expect_evaluate().returning(|_, _| {
            Err(SurveySyncError::SegmentEvaluatorUnavailable(
                "no connection".to_string(),
            ))
        });

        let surveys = vec![survey_with_filters(
            "a",
            vec![attr("f", "plan", AttributeOperator::Equals, "pro")],
        )];
        let result = evaluate_segments(Arc::new(evaluator), &surveys, &context()).await;
        assert!(matches!(
            result,
            Err(SurveySyncError::SegmentEvaluatorUnavailable(_))
        ));
    }
}
