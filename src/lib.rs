//! Survey Sync - survey eligibility and client state synchronization
//!
//! Decides which surveys an end user may see right now and keeps a
//! client-side cache of that decision in sync with the remote source of
//! truth.
//!
//! # Architecture
//!
//! - **Types**: surveys, segments, projects, display/response history
//! - **Eligibility**: the display-rule and segment pipeline, plus the
//!   repository-backed sync-surveys service with its TTL cache
//! - **Sync**: the client state machine (setup, refresh, teardown)
//! - **Storage**: repositories and the persisted config slot
//! - **Services**: remote environment/user collaborators over HTTP
//!
//! # Example
//!
//! ```ignore
//! use survey_sync_core::{
//!     FileConfigStore, HttpEnvironmentFetcher, HttpUserUpdater, Settings, SyncClient,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let client = SyncClient::new(
//!         Arc::new(HttpEnvironmentFetcher::new(settings.request_timeout())?),
//!         Arc::new(HttpUserUpdater::new(settings.request_timeout())?),
//!         Arc::new(FileConfigStore::new(&settings.storage_path)),
//!     )
//!     .with_options(settings.sync_options());
//!
//!     client.setup("clx8envid", "https://app.example.com").await?;
//!     for survey in client.filtered_surveys().await {
//!         println!("{}", survey.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod services;
pub mod storage;
pub mod sync;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use cache::{CacheKey, SyncSurveyCache};
pub use crate::config::Settings;
pub use eligibility::segment::{SegmentContext, SegmentEvaluator, SegmentVerdict};
pub use eligibility::service::SyncSurveysService;
pub use eligibility::{filter_surveys, EligibilityEngine, LocalSegmentEvaluator};
pub use error::{FetchError, FetchErrorCode, Result, SurveySyncError};
pub use services::{
    EnvironmentFetcher, HttpEnvironmentFetcher, HttpUserUpdater, UserUpdate, UserUpdater,
};
pub use storage::config_store::{ConfigStore, FileConfigStore, MemoryConfigStore};
pub use storage::memory::{Fixture, InMemoryRepository};
pub use storage::{HistoryStore, ProjectRepository, StorageError, SurveyRepository};
pub use sync::listeners::{NoopHooks, RuntimeHooks};
pub use sync::state::{Config, EnvironmentState, Status, StatusValue, UserState};
pub use sync::{SyncClient, SyncOptions, SyncState};
pub use types::{
    AttributeValue, Contact, DeviceType, Display, DisplayOption, EnvironmentData,
    FilterPredicate, FilterResource, Project, Response, Segment, Survey, SurveyStatus,
    SurveyType, UserData,
};
