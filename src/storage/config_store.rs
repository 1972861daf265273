//! Persistence slot for the client configuration
//!
//! A single record per client, stored as a versioned JSON envelope. The file
//! store writes through a temporary file and renames it into place so a
//! crash never leaves a half-written record behind.

use crate::error::{Result, SurveySyncError};
use crate::sync::state::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Version of the stored envelope; other versions read as unusable
pub const CONFIG_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoredConfig {
    version: u32,
    config: Config,
}

fn encode(config: &Config) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&StoredConfig {
        version: CONFIG_FORMAT_VERSION,
        config: config.clone(),
    })?)
}

fn decode(bytes: &[u8]) -> Result<Config> {
    let stored: StoredConfig = serde_json::from_slice(bytes)?;
    if stored.version != CONFIG_FORMAT_VERSION {
        return Err(SurveySyncError::Validation(format!(
            "Unsupported config format version {}",
            stored.version
        )));
    }
    Ok(stored.config)
}

/// Durable slot holding one serialized [`Config`]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet
    async fn load(&self) -> Result<Option<Config>>;

    async fn save(&self, config: &Config) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// JSON file on local disk
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<Option<Config>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => decode(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, encode(config)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Persisted configuration to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local slot, serialized the same way as the file store
#[derive(Default)]
pub struct MemoryConfigStore {
    slot: Mutex<Option<Vec<u8>>>,
    fail_writes: bool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail, for exercising write-failure paths
    pub fn failing_writes() -> Self {
        Self {
            slot: Mutex::new(None),
            fail_writes: true,
        }
    }

    /// Put raw bytes into the slot, bypassing encoding
    pub async fn put_raw(&self, bytes: impl Into<Vec<u8>>) {
        *self.slot.lock().await = Some(bytes.into());
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<Option<Config>> {
        match self.slot.lock().await.as_deref() {
            Some(bytes) => decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, config: &Config) -> Result<()> {
        if self.fail_writes {
            return Err(SurveySyncError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "config slot is read-only",
            )));
        }
        *self.slot.lock().await = Some(encode(config)?);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.lock().await = None;
        Ok(())
    }
}
