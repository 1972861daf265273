//! TTL cache for sync-survey results
//!
//! Entries are keyed by environment, contact, a hash of the contact's
//! attributes and the device type, so any attribute change is a miss.
//! Invalidation is explicit; entries also expire after the TTL.

use crate::types::{AttributeValue, DeviceType, Survey};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Cache key of one sync-survey lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub environment_id: String,
    pub contact_id: String,
    pub attributes_hash: String,
    pub device_type: DeviceType,
}

impl CacheKey {
    pub fn new(
        environment_id: &str,
        contact_id: &str,
        attributes: &BTreeMap<String, AttributeValue>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            environment_id: environment_id.to_string(),
            contact_id: contact_id.to_string(),
            attributes_hash: hash_attributes(attributes),
            device_type,
        }
    }
}

/// SHA-256 over the attributes in key order, hex encoded
///
/// Numbers and text hash differently even when they render the same.
pub fn hash_attributes(attributes: &BTreeMap<String, AttributeValue>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in attributes {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        match value {
            AttributeValue::Number(n) => {
                hasher.update(b"n");
                hasher.update(n.to_le_bytes());
            }
            AttributeValue::Text(s) => {
                hasher.update(b"s");
                hasher.update(s.as_bytes());
            }
        }
        hasher.update([0xffu8]);
    }
    format!("{:x}", hasher.finalize())
}

struct Entry {
    surveys: Vec<Survey>,
    inserted_at: Instant,
}

/// Time-bounded cache of eligible surveys per [`CacheKey`]
///
/// A zero TTL disables caching.
pub struct SyncSurveyCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl SyncSurveyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Vec<Survey>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.surveys.clone())
    }

    pub async fn insert(&self, key: CacheKey, surveys: Vec<Survey>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        entries.insert(
            key,
            Entry {
                surveys,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every entry of an environment
    pub async fn invalidate_environment(&self, environment_id: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.environment_id != environment_id);
        let removed = before - entries.len();
        debug!(
            "Invalidated {} cache entries for environment {}",
            removed, environment_id
        );
        removed
    }

    /// Drop every entry of a contact within an environment
    pub async fn invalidate_contact(&self, environment_id: &str, contact_id: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| {
            !(key.environment_id == environment_id && key.contact_id == contact_id)
        });
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
