//! crates/synthstyle_core/src/storage.rs
//!
//! The storage synchronization facade. It unifies the extension's local key-value
//! store with the backend: reads prefer the backend when it answers in time and
//! overwrite the local copy with its value, writes land locally first and are
//! pushed to the backend on a best-effort basis.

use crate::domain::{BodyMeasurements, ExtensionStats, Preferences, UserProfile};
use crate::ports::{LocalStore, PortError, PortResult, RemoteResource, RemoteStore};
use async_trait::async_trait;
use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

const USER_ID_PREFIX: &str = "user_";
const USER_ID_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

//=========================================================================================
// Storage Keys
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    UserId,
    Preferences,
    UserProfile,
    Measurements,
    BodyMeasurements,
    VerifiedItems,
    TryOns,
}

impl StorageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::UserId => "userId",
            StorageKey::Preferences => "preferences",
            StorageKey::UserProfile => "userProfile",
            StorageKey::Measurements => "measurements",
            StorageKey::BodyMeasurements => "bodyMeasurements",
            StorageKey::VerifiedItems => "verifiedItems",
            StorageKey::TryOns => "tryOns",
        }
    }

    /// The backend document mirroring this key, if any.
    pub fn remote_resource(self) -> Option<RemoteResource> {
        match self {
            StorageKey::Preferences => Some(RemoteResource::Preferences),
            StorageKey::UserProfile => Some(RemoteResource::UserProfile),
            _ => None,
        }
    }
}

//=========================================================================================
// The Facade
//=========================================================================================

#[derive(Clone)]
pub struct SyncedStorage {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    remote_timeout: Duration,
    /// Held across the read and write of the counters. Shared by clones.
    stats_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SyncedStorage {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            local,
            remote,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            stats_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_remote_timeout(mut self, remote_timeout: Duration) -> Self {
        self.remote_timeout = remote_timeout;
        self
    }

    /// Reads a key. Synced keys consult the backend first; any backend failure falls
    /// back to the local value. Only local store failures are returned as errors.
    pub async fn get(&self, key: StorageKey) -> PortResult<Option<Value>> {
        if let Some(resource) = key.remote_resource() {
            let user_id = self.get_user_id().await?;
            match self.fetch_remote(resource, &user_id).await {
                Ok(Some(value)) => {
                    self.local.set(key.as_str(), value.clone()).await?;
                    return Ok(Some(value));
                }
                Ok(None) => {
                    debug!("Backend has no {} for {}, using local copy.", key.as_str(), user_id);
                }
                Err(e) => {
                    warn!("Backend read of {} failed, using local copy: {}", key.as_str(), e);
                }
            }
        }
        self.local.get(key.as_str()).await
    }

    /// Writes a key locally, then pushes synced keys to the backend. A backend failure
    /// is logged and does not fail the write.
    pub async fn set(&self, key: StorageKey, value: Value) -> PortResult<()> {
        self.local.set(key.as_str(), value.clone()).await?;

        if let Some(resource) = key.remote_resource() {
            let user_id = self.get_user_id().await?;
            let push = self.remote.push(resource, &user_id, value);
            match tokio::time::timeout(self.remote_timeout, push).await {
                Ok(Ok(_)) => debug!("Pushed {} to backend.", key.as_str()),
                Ok(Err(e)) => warn!("Backend write of {} failed: {}", key.as_str(), e),
                Err(_) => warn!("Backend write of {} timed out.", key.as_str()),
            }
        }
        Ok(())
    }

    async fn fetch_remote(
        &self,
        resource: RemoteResource,
        user_id: &str,
    ) -> PortResult<Option<Value>> {
        tokio::time::timeout(self.remote_timeout, self.remote.fetch(resource, user_id))
            .await
            .map_err(|_| PortError::Timeout)?
    }

    /// Returns the extension's user id, generating and storing one on first use.
    pub async fn get_user_id(&self) -> PortResult<String> {
        if let Some(Value::String(id)) = self.local.get(StorageKey::UserId.as_str()).await? {
            return Ok(id);
        }
        let id = generate_user_id();
        self.local
            .set(StorageKey::UserId.as_str(), Value::String(id.clone()))
            .await?;
        Ok(id)
    }

    //-------------------------------------------------------------------------------------
    // Typed helpers
    //-------------------------------------------------------------------------------------

    async fn get_typed<T: DeserializeOwned>(&self, key: StorageKey) -> PortResult<Option<T>> {
        match self.get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                PortError::Unexpected(format!("Stored {} is malformed: {}", key.as_str(), e))
            }),
        }
    }

    async fn set_typed<T: Serialize>(&self, key: StorageKey, value: &T) -> PortResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.set(key, value).await
    }

    pub async fn preferences(&self) -> PortResult<Preferences> {
        Ok(self.get_typed(StorageKey::Preferences).await?.unwrap_or_default())
    }

    pub async fn save_preferences(&self, preferences: &Preferences) -> PortResult<()> {
        preferences.validate()?;
        self.set_typed(StorageKey::Preferences, preferences).await
    }

    pub async fn user_profile(&self) -> PortResult<Option<UserProfile>> {
        self.get_typed(StorageKey::UserProfile).await
    }

    pub async fn save_user_profile(&self, profile: &UserProfile) -> PortResult<()> {
        self.set_typed(StorageKey::UserProfile, profile).await
    }

    pub async fn measurements(&self) -> PortResult<Option<BodyMeasurements>> {
        self.get_typed(StorageKey::Measurements).await
    }

    pub async fn save_measurements(&self, measurements: &BodyMeasurements) -> PortResult<()> {
        self.set_typed(StorageKey::Measurements, measurements).await
    }

    pub async fn body_measurements(&self) -> PortResult<Option<BodyMeasurements>> {
        self.get_typed(StorageKey::BodyMeasurements).await
    }

    pub async fn save_body_measurements(&self, measurements: &BodyMeasurements) -> PortResult<()> {
        self.set_typed(StorageKey::BodyMeasurements, measurements).await
    }

    pub async fn stats(&self) -> PortResult<ExtensionStats> {
        Ok(ExtensionStats {
            verified_items: self.get_typed(StorageKey::VerifiedItems).await?.unwrap_or(0),
            try_ons: self.get_typed(StorageKey::TryOns).await?.unwrap_or(0),
        })
    }

    /// Adds `delta` to the stored counters and returns the new totals.
    pub async fn increment_stats(&self, delta: ExtensionStats) -> PortResult<ExtensionStats> {
        let _guard = self.stats_lock.lock().await;
        let current = self.stats().await?;
        let updated = ExtensionStats {
            verified_items: current.verified_items + delta.verified_items,
            try_ons: current.try_ons + delta.try_ons,
        };
        self.set_typed(StorageKey::VerifiedItems, &updated.verified_items).await?;
        self.set_typed(StorageKey::TryOns, &updated.try_ons).await?;
        Ok(updated)
    }

    /// Writes the install-time defaults for every key that has no value yet. Local
    /// only, the backend is not touched. Safe to run on every start.
    pub async fn initialize_defaults(&self) -> PortResult<()> {
        let preferences = serde_json::to_value(Preferences::default())
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let defaults = [
            (StorageKey::Preferences, preferences),
            (StorageKey::UserProfile, Value::Null),
            (StorageKey::Measurements, Value::Null),
            (StorageKey::VerifiedItems, Value::from(0)),
            (StorageKey::TryOns, Value::from(0)),
        ];
        let _guard = self.stats_lock.lock().await;
        for (key, value) in defaults {
            if self.local.get(key.as_str()).await?.is_none() {
                self.local.set(key.as_str(), value).await?;
            }
        }
        Ok(())
    }

    /// Wipes the local store, then asks the backend to drop the same user's data.
    pub async fn clear(&self) -> PortResult<()> {
        let user_id = self.get_user_id().await?;
        self.local.clear().await?;

        match tokio::time::timeout(self.remote_timeout, self.remote.clear(&user_id)).await {
            Ok(Ok(())) => debug!("Cleared backend data for {}.", user_id),
            Ok(Err(e)) => warn!("Backend clear for {} failed: {}", user_id, e),
            Err(_) => warn!("Backend clear for {} timed out.", user_id),
        }
        Ok(())
    }
}

fn generate_user_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..USER_ID_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}", USER_ID_PREFIX, suffix)
}

//=========================================================================================
// In-Memory Local Store
//=========================================================================================

/// A `LocalStore` kept entirely in memory. Can be switched to an unavailable state
/// to mimic a host without a storage API.
#[derive(Default)]
pub struct MemoryLocalStore {
    entries: Mutex<HashMap<String, Value>>,
    unavailable: std::sync::atomic::AtomicBool,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable
            .store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }

    /// A copy of everything stored, as one JSON object.
    pub fn snapshot(&self) -> PortResult<Value> {
        let entries = self.entries()?;
        Ok(Value::Object(
            entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>(),
        ))
    }

    fn entries(&self) -> PortResult<std::sync::MutexGuard<'_, HashMap<String, Value>>> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PortError::StorageUnavailable(
                "storage API is not available".to_string(),
            ));
        }
        self.entries
            .lock()
            .map_err(|_| PortError::StorageUnavailable("storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, key: &str) -> PortResult<Option<Value>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> PortResult<()> {
        self.entries()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    async fn clear(&self) -> PortResult<()> {
        self.entries()?.clear();
        Ok(())
    }
}
