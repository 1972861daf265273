//! Remote collaborators of the sync state machine
//!
//! The environment fetcher returns the environment snapshot and the user
//! updater pushes identity/attribute updates and returns the fresh user
//! state. Both report failures as [`FetchError`].

pub mod http;

use crate::error::FetchError;
use crate::sync::state::{EnvironmentState, UserState};
use crate::types::AttributeValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use http::{HttpEnvironmentFetcher, HttpUserUpdater};

/// Fetches the environment snapshot
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvironmentFetcher: Send + Sync {
    async fn fetch_environment_state(
        &self,
        environment_id: &str,
        app_url: &str,
    ) -> std::result::Result<EnvironmentState, FetchError>;
}

/// Payload sent to the user endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl UserUpdate {
    /// Refresh of an identified user without attribute changes
    pub fn identify(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            attributes: BTreeMap::new(),
        }
    }
}

/// Pushes user updates and returns the resulting user state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserUpdater: Send + Sync {
    async fn send_updates_to_backend(
        &self,
        environment_id: &str,
        app_url: &str,
        update: &UserUpdate,
    ) -> std::result::Result<UserState, FetchError>;
}
