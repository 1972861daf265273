//! Storage layer for survey-sync
//!
//! Defines the read-only repositories the eligibility engine is fed from
//! (projects, surveys, display/response history) and the persistence slot
//! that holds the client-side sync configuration.

pub mod config_store;
pub mod memory;

use crate::error::SurveySyncError;
use crate::types::{Display, Project, Response, Survey};
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a repository backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A known query failure (bad query, constraint, timeout)
    #[error("query failed: {0}")]
    Query(String),

    /// Stored data could not be decoded into a valid record
    #[error("corrupt record: {0}")]
    Integrity(String),
}

/// Result type alias for repository operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for SurveySyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(message) => SurveySyncError::Database(message),
            StorageError::Integrity(message) => SurveySyncError::ConfigIntegrity(message),
        }
    }
}

/// Project configuration by environment
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get_project_by_environment_id(&self, environment_id: &str)
        -> StorageResult<Option<Project>>;
}

/// All surveys of an environment, in authoring order
#[async_trait]
pub trait SurveyRepository: Send + Sync {
    async fn get_surveys(&self, environment_id: &str) -> StorageResult<Vec<Survey>>;
}

/// Display and response events per contact
///
/// No ordering is guaranteed; callers sort when recency matters.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn find_displays(&self, contact_id: &str) -> StorageResult<Vec<Display>>;

    async fn find_responses(&self, contact_id: &str) -> StorageResult<Vec<Response>>;
}
