//! HTTP implementations of the remote collaborators
//!
//! Both endpoints live under `{app_url}/api/v1/client/{environment_id}` and
//! wrap their payload in a `data` envelope.

use super::{EnvironmentFetcher, UserUpdate, UserUpdater};
use crate::error::{FetchError, FetchErrorCode, Result, SurveySyncError};
use crate::sync::state::{EnvironmentState, UserState};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("survey-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    state: UserState,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub(crate) fn client_url(app_url: &str, environment_id: &str, resource: &str) -> String {
    format!(
        "{}/api/v1/client/{}/{}",
        app_url.trim_end_matches('/'),
        environment_id,
        resource
    )
}

pub(crate) fn code_for_status(status: StatusCode) -> FetchErrorCode {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchErrorCode::Forbidden,
        StatusCode::NOT_FOUND => FetchErrorCode::NotFound,
        _ => FetchErrorCode::ServerError,
    }
}

/// Prefer the `message` field of a JSON error body, then the raw body
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(ErrorBody {
        message: Some(message),
    }) = serde_json::from_str::<ErrorBody>(body)
    {
        return message;
    }
    if body.trim().is_empty() {
        status.to_string()
    } else {
        body.trim().to_string()
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

async fn read_payload<T: DeserializeOwned>(
    response: reqwest::Response,
) -> std::result::Result<T, FetchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        warn!("Request failed with status {}: {}", status, message);
        return Err(FetchError::new(code_for_status(status), message));
    }

    let envelope: Envelope<T> = response.json().await.map_err(|e| {
        FetchError::new(
            FetchErrorCode::InvalidResponse,
            format!("Failed to parse response: {}", e),
        )
    })?;
    Ok(envelope.data)
}

/// Corrupt surveys keep their own code so setup can treat them as fatal
pub(crate) fn decode_environment(
    value: serde_json::Value,
) -> std::result::Result<EnvironmentState, FetchError> {
    EnvironmentState::from_value(value).map_err(|e| match e {
        SurveySyncError::ConfigIntegrity(message) => {
            FetchError::new(FetchErrorCode::ConfigIntegrity, message)
        }
        other => FetchError::new(
            FetchErrorCode::InvalidResponse,
            format!("Failed to parse response: {}", other),
        ),
    })
}

/// `GET {app_url}/api/v1/client/{environment_id}/environment`
pub struct HttpEnvironmentFetcher {
    client: reqwest::Client,
}

impl HttpEnvironmentFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl EnvironmentFetcher for HttpEnvironmentFetcher {
    async fn fetch_environment_state(
        &self,
        environment_id: &str,
        app_url: &str,
    ) -> std::result::Result<EnvironmentState, FetchError> {
        let url = client_url(app_url, environment_id, "environment");
        debug!("Fetching environment state from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::network(e.to_string()))?;
        let payload: serde_json::Value = read_payload(response).await?;
        decode_environment(payload)
    }
}

/// `POST {app_url}/api/v1/client/{environment_id}/user`
pub struct HttpUserUpdater {
    client: reqwest::Client,
}

impl HttpUserUpdater {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl UserUpdater for HttpUserUpdater {
    async fn send_updates_to_backend(
        &self,
        environment_id: &str,
        app_url: &str,
        update: &UserUpdate,
    ) -> std::result::Result<UserState, FetchError> {
        let url = client_url(app_url, environment_id, "user");
        debug!("Sending user update for {} to {}", update.user_id, url);

        let response = self
            .client
            .post(&url)
            .json(update)
            .send()
            .await
            .map_err(|e| FetchError::network(e.to_string()))?;
        let envelope: UserEnvelope = read_payload(response).await?;
        Ok(envelope.state)
    }
}
