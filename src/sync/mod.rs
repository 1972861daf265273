//! Client state synchronization
//!
//! A [`SyncClient`] acquires the environment and user state, caches it in a
//! [`Config`] mirrored to a [`ConfigStore`], refreshes whatever expired and
//! keeps the list of surveys the current user may see.
//!
//! ```text
//! Uninitialized -> SettingUp -> Ready
//!                           \-> Error
//! ```
//!
//! A failed first setup persists an error status; later setups back off
//! without remote calls until it expires. Failures while refreshing an
//! existing config are absorbed and the cached data keeps serving, except
//! corrupt survey data, which fails setup on either path.

pub mod listeners;
pub mod state;

use crate::eligibility::filter_surveys;
use crate::error::{FetchError, FetchErrorCode, Result, SurveySyncError};
use crate::services::{EnvironmentFetcher, UserUpdate, UserUpdater};
use crate::storage::config_store::ConfigStore;
use crate::types::Survey;
use crate::utils::datetime::{is_expired_at, is_optional_expired};
use chrono::{DateTime, Duration, Utc};
use listeners::{NoopHooks, RuntimeHooks};
use state::{Config, Status, UserState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub use state::SyncState;

/// Behaviour switches of a [`SyncClient`]
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// How long a failed first setup blocks further attempts
    pub error_backoff: Duration,
    /// Ignore a persisted error status and always set up again
    pub debug: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            error_backoff: Duration::minutes(10),
            debug: false,
        }
    }
}

/// Long-lived client keeping environment and user state in sync
pub struct SyncClient {
    fetcher: Arc<dyn EnvironmentFetcher>,
    user_updater: Arc<dyn UserUpdater>,
    store: Arc<dyn ConfigStore>,
    hooks: Arc<dyn RuntimeHooks>,
    options: SyncOptions,
    config: RwLock<Option<Config>>,
    is_setup: AtomicBool,
    state: RwLock<SyncState>,
    setup_lock: Mutex<()>,
}

impl SyncClient {
    pub fn new(
        fetcher: Arc<dyn EnvironmentFetcher>,
        user_updater: Arc<dyn UserUpdater>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            fetcher,
            user_updater,
            store,
            hooks: Arc::new(NoopHooks),
            options: SyncOptions::default(),
            config: RwLock::new(None),
            is_setup: AtomicBool::new(false),
            state: RwLock::new(SyncState::Uninitialized),
            setup_lock: Mutex::new(()),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RuntimeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> SyncState {
        *self.state.read().await
    }

    /// Snapshot of the in-memory config
    pub async fn config(&self) -> Option<Config> {
        self.config.read().await.clone()
    }

    pub async fn filtered_surveys(&self) -> Vec<Survey> {
        self.config
            .read()
            .await
            .as_ref()
            .map(|config| config.filtered_surveys.clone())
            .unwrap_or_default()
    }

    /// Acquire or refresh state for an environment
    ///
    /// Blank inputs are rejected with [`SurveySyncError::MissingField`]. Only
    /// a failed first setup returns [`SurveySyncError::SetupFailed`].
    pub async fn setup(&self, environment_id: &str, app_url: &str) -> Result<()> {
        if environment_id.trim().is_empty() {
            return Err(SurveySyncError::MissingField("environmentId"));
        }
        if app_url.trim().is_empty() {
            return Err(SurveySyncError::MissingField("appUrl"));
        }

        let _guard = self.setup_lock.lock().await;
        if self.is_setup() {
            debug!("Already set up, skipping setup.");
            return Ok(());
        }

        self.set_state(SyncState::SettingUp).await;
        let now = Utc::now();

        let existing = match self.load_config().await {
            Some(config) if config.status.is_error() => {
                if self.options.debug {
                    debug!("Survey sync is in error state, but debug mode is active. Resetting config and continuing.");
                    None
                } else if !config.status.is_expired_at(now) {
                    debug!(
                        "Survey sync was set up with an error state. Not retrying before {}.",
                        config
                            .status
                            .expires_at
                            .map(|at| at.to_rfc3339())
                            .unwrap_or_default()
                    );
                    self.set_state(SyncState::Error).await;
                    return Ok(());
                } else {
                    debug!("Error state has expired. Continuing with setup.");
                    None
                }
            }
            other => other,
        };

        match existing {
            Some(config)
                if config.matches(environment_id, app_url) && config.environment.is_some() =>
            {
                debug!("Configuration exists for this environment.");
                self.refresh(config, now).await?;
            }
            _ => {
                debug!("No valid configuration found. Resetting config and creating new one.");
                if let Err(e) = self.initialize(environment_id, app_url, now).await {
                    if e.code == FetchErrorCode::ConfigIntegrity {
                        return Err(self.integrity_failure(e).await);
                    }
                    return Err(self.handle_error_on_first_setup(e).await);
                }
            }
        }

        self.hooks.add_page_view_listeners();
        self.hooks.add_cleanup_listeners();
        self.is_setup.store(true, Ordering::SeqCst);
        self.set_state(SyncState::Ready).await;
        info!("Survey sync set up for environment {}", environment_id);

        self.hooks.check_page_url();
        Ok(())
    }

    /// Record a failed first setup and build the error to return
    ///
    /// Persists an error status that expires after the configured backoff.
    pub async fn handle_error_on_first_setup(&self, error: FetchError) -> SurveySyncError {
        if error.code == FetchErrorCode::Forbidden {
            error!("Authorization error: {}", error.response_message);
        } else {
            error!(
                "Error during first setup: {} - {}",
                error.code, error.response_message
            );
        }

        let expires_at = Utc::now()
            .checked_add_signed(self.options.error_backoff)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.commit(Config::errored(expires_at)).await;
        self.set_state(SyncState::Error).await;

        SurveySyncError::SetupFailed {
            code: error.code,
            message: error.response_message,
        }
    }

    /// Corrupt survey data is never retried or served from cache
    async fn integrity_failure(&self, error: FetchError) -> SurveySyncError {
        error!("Environment state contains invalid surveys: {}", error.response_message);
        self.set_state(SyncState::Error).await;
        SurveySyncError::ConfigIntegrity(error.response_message)
    }

    /// Forget the current user; the environment and status are kept
    pub async fn tear_down(&self) {
        let _guard = self.setup_lock.lock().await;
        debug!("Setting user state to default");
        let Some(mut config) = self.load_config().await else {
            return;
        };

        config.user = UserState::anonymous();
        config.filtered_surveys = match &config.environment {
            Some(environment) => filter_surveys(&environment.data, &config.user.data, Utc::now()),
            None => Vec::new(),
        };
        self.commit(config).await;
    }

    /// Detach from the host runtime; the next setup starts over
    pub async fn dispose(&self) {
        let _guard = self.setup_lock.lock().await;
        self.hooks.remove_all_listeners();
        self.is_setup.store(false, Ordering::SeqCst);
        self.set_state(SyncState::Uninitialized).await;
    }

    async fn set_state(&self, state: SyncState) {
        *self.state.write().await = state;
    }

    /// Memory mirror first, then the store
    async fn load_config(&self) -> Option<Config> {
        if let Some(config) = self.config.read().await.clone() {
            return Some(config);
        }
        match self.store.load().await {
            Ok(Some(config)) => {
                *self.config.write().await = Some(config.clone());
                Some(config)
            }
            Ok(None) => {
                debug!("No existing configuration found.");
                None
            }
            Err(e) => {
                debug!("No existing configuration found.");
                warn!("Stored configuration is unreadable: {}", e);
                None
            }
        }
    }

    /// Memory is authoritative; a failed write is only logged
    async fn commit(&self, config: Config) {
        *self.config.write().await = Some(config.clone());
        if let Err(e) = self.store.save(&config).await {
            warn!("Failed to persist configuration: {}", e);
        }
    }

    async fn refresh(&self, mut config: Config, now: DateTime<Utc>) -> Result<()> {
        let mut changed = false;

        let environment_expired = config
            .environment
            .as_ref()
            .map_or(true, |environment| is_expired_at(environment.expires_at, now));
        if environment_expired {
            debug!("Environment state expired. Syncing.");
            match self
                .fetcher
                .fetch_environment_state(&config.environment_id, &config.app_url)
                .await
            {
                Ok(environment) => {
                    config.environment = Some(environment);
                    changed = true;
                }
                Err(e) if e.code == FetchErrorCode::ConfigIntegrity => {
                    return Err(self.integrity_failure(e).await);
                }
                Err(e) => warn!("Could not refresh environment state, serving cached data: {}", e),
            }
        }

        if is_optional_expired(config.user.expires_at, now) {
            match config.user.data.user_id.clone() {
                Some(user_id) => {
                    debug!("User state expired. Syncing.");
                    match self
                        .user_updater
                        .send_updates_to_backend(
                            &config.environment_id,
                            &config.app_url,
                            &UserUpdate::identify(user_id),
                        )
                        .await
                    {
                        Ok(user) => {
                            config.user = user;
                            changed = true;
                        }
                        Err(e) => warn!("Could not refresh user state, serving cached data: {}", e),
                    }
                }
                None => {
                    config.user = UserState::anonymous();
                    changed = true;
                }
            }
        }

        if changed {
            if let Some(environment) = &config.environment {
                config.filtered_surveys = filter_surveys(&environment.data, &config.user.data, now);
            }
        }

        config.status = Status::success();
        self.commit(config).await;
        Ok(())
    }

    async fn initialize(
        &self,
        environment_id: &str,
        app_url: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), FetchError> {
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear stored configuration: {}", e);
        }
        *self.config.write().await = None;

        let environment = self
            .fetcher
            .fetch_environment_state(environment_id, app_url)
            .await?;
        let user = UserState::anonymous();
        let filtered_surveys = filter_surveys(&environment.data, &user.data, now);

        self.commit(Config {
            environment_id: environment_id.to_string(),
            app_url: app_url.to_string(),
            environment: Some(environment),
            user,
            filtered_surveys,
            status: Status::success(),
        })
        .await;
        Ok(())
    }
}
