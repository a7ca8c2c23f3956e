//! services/extension_host/src/host.rs
//!
//! Wires the background context to its adapters. The browser launches a fresh host
//! process for every connection, so everything here must be safe to repeat over the
//! same storage file.

use std::sync::Arc;
use synthstyle_core::{
    background::BackgroundContext, session::BackgroundSession, Endpoint, MessageRouter,
    SyncedStorage,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::adapters::{
    BackendClient, CatalogModels, CatalogVerifier, FileLocalStore, HttpRemoteStore,
    UnconfiguredScanner,
};
use crate::{Config, HostError};

/// A running background context and the tasks it owns.
pub struct Host {
    router: MessageRouter,
    storage: SyncedStorage,
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Host {
    /// Opens local storage, fills in missing defaults and registers the background.
    pub async fn start(config: &Config) -> Result<Self, HostError> {
        let local = Arc::new(FileLocalStore::open(&config.storage_path).await?);
        info!("Local storage at {}.", local.path().display());
        let backend = BackendClient::new(&config.api_url, config.remote_timeout)?;
        let storage = SyncedStorage::new(local, Arc::new(HttpRemoteStore::new(backend.clone())))
            .with_remote_timeout(config.remote_timeout);

        let router = MessageRouter::new();
        let session = Arc::new(BackgroundSession::new());
        let background = BackgroundContext::new(
            session.clone(),
            storage.clone(),
            router.clone(),
            Arc::new(CatalogVerifier::new(backend.clone())),
            Arc::new(UnconfiguredScanner),
            Arc::new(CatalogModels::new(backend, config.model_base_url.clone())),
        );
        background.on_installed().await?;

        let shutdown = CancellationToken::new();
        let sweeper = session
            .product_cache
            .spawn_sweeper(config.cache_sweep_interval, shutdown.clone());
        let tasks = vec![("background", background.register()), ("cache sweeper", sweeper)];

        Ok(Self {
            router,
            storage,
            shutdown,
            tasks,
        })
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn storage(&self) -> &SyncedStorage {
        &self.storage
    }

    /// Cancelling this token stops the sweeper and any bridge run with it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Unregisters the background and waits for every owned task to finish.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.router.unregister(Endpoint::Background);
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!("The {} task failed: {}", name, e);
            }
        }
        info!("Extension host stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use synthstyle_core::domain::{ExtensionStats, Preferences, StyleTag};
    use synthstyle_core::{ExtensionMessage, Reply};

    fn config(dir: &tempfile::TempDir) -> Config {
        Config {
            // Nothing listens here, so every backend call fails fast.
            api_url: "http://127.0.0.1:9".to_string(),
            storage_path: dir.path().join("storage.json"),
            remote_timeout: Duration::from_millis(300),
            cache_sweep_interval: Duration::from_secs(3600),
            model_base_url: None,
            log_level: tracing::Level::INFO,
        }
    }

    #[tokio::test]
    async fn restarts_keep_counters_and_preferences() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let first = Host::start(&config).await.unwrap();
        let user_id = first.storage().get_user_id().await.unwrap();
        let reply = first
            .router()
            .request(
                Endpoint::Popup,
                Endpoint::Background,
                ExtensionMessage::UpdateStats {
                    verified_items: 3,
                    try_ons: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(reply, Reply::ok());
        let mut preferences = Preferences::default();
        preferences.style.insert(StyleTag::Formal);
        first.storage().save_preferences(&preferences).await.unwrap();
        first.stop().await;

        let second = Host::start(&config).await.unwrap();
        assert_eq!(second.storage().get_user_id().await.unwrap(), user_id);
        assert_eq!(
            second.storage().stats().await.unwrap(),
            ExtensionStats {
                verified_items: 3,
                try_ons: 2
            }
        );
        assert_eq!(second.storage().preferences().await.unwrap(), preferences);
        second.stop().await;
    }

    #[tokio::test]
    async fn first_start_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::start(&config(&dir)).await.unwrap();

        assert_eq!(host.storage().stats().await.unwrap(), ExtensionStats::default());
        assert_eq!(host.storage().preferences().await.unwrap(), Preferences::default());
        assert!(dir.path().join("storage.json").exists());
        host.stop().await;
    }

    #[tokio::test]
    async fn stopping_unregisters_the_background() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::start(&config(&dir)).await.unwrap();
        let router = host.router().clone();
        host.stop().await;

        assert!(router
            .notify(Endpoint::Popup, Endpoint::Background, ExtensionMessage::GetUserProfile)
            .is_err());
    }
}
