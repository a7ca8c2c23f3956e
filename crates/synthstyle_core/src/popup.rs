//! crates/synthstyle_core/src/popup.rs
//!
//! The popup context. It lives only while the popup is open, keeps the latest
//! counters pushed by the background and wraps the requests its buttons send.

use crate::domain::{ExtensionStats, Preferences, ProductSnapshot};
use crate::ports::PortResult;
use crate::protocol::{Endpoint, ExtensionMessage, Reply, TabId};
use crate::router::{Envelope, MessageListener, MessageRouter, RouterError};
use crate::storage::SyncedStorage;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

pub struct PopupContext {
    router: MessageRouter,
    storage: SyncedStorage,
    stats: Mutex<Option<ExtensionStats>>,
}

impl PopupContext {
    pub fn new(router: MessageRouter, storage: SyncedStorage) -> Self {
        Self {
            router,
            storage,
            stats: Mutex::new(None),
        }
    }

    pub fn register(self: &Arc<Self>) -> JoinHandle<()> {
        self.router.register(Endpoint::Popup, self.clone())
    }

    /// The counters last pushed by the background, if any arrived since opening.
    pub fn latest_stats(&self) -> Option<ExtensionStats> {
        *self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The counters to display: the latest push, or the stored values.
    pub async fn stats(&self) -> PortResult<ExtensionStats> {
        match self.latest_stats() {
            Some(stats) => Ok(stats),
            None => self.storage.stats().await,
        }
    }

    pub async fn load_preferences(&self) -> PortResult<Preferences> {
        self.storage.preferences().await
    }

    pub async fn save_preferences(&self, preferences: &Preferences) -> PortResult<()> {
        self.storage.save_preferences(preferences).await
    }

    pub async fn start_try_on(
        &self,
        tab_id: TabId,
        image_url: Option<String>,
    ) -> Result<Reply, RouterError> {
        self.ask(ExtensionMessage::StartTryOn { tab_id, image_url })
            .await
    }

    pub async fn start_scan(&self, stream: &str) -> Result<Reply, RouterError> {
        self.ask(ExtensionMessage::StartScan {
            stream: stream.to_string(),
        })
        .await
    }

    /// The product shown in `tab_id`. Served from the background's cache when it
    /// knows the product, otherwise read from the page itself.
    pub async fn current_product(&self, tab_id: TabId) -> Result<Option<ProductSnapshot>, RouterError> {
        let tab = Endpoint::Tab { tab_id };
        let reply = self
            .router
            .request(Endpoint::Popup, tab, ExtensionMessage::GetProductId)
            .await?;
        let Reply::ProductId {
            product_id: Some(product_id),
        } = reply
        else {
            return Ok(None);
        };

        if let Reply::CachedProduct {
            product: Some(product),
        } = self
            .ask(ExtensionMessage::GetCachedProduct { product_id })
            .await?
        {
            return Ok(Some(product));
        }

        match self
            .router
            .request(Endpoint::Popup, tab, ExtensionMessage::GetProductDetails)
            .await?
        {
            Reply::ProductDetails { product } => Ok(Some(product)),
            _ => Ok(None),
        }
    }

    async fn ask(&self, message: ExtensionMessage) -> Result<Reply, RouterError> {
        self.router
            .request(Endpoint::Popup, Endpoint::Background, message)
            .await
    }
}

#[async_trait]
impl MessageListener for PopupContext {
    async fn on_message(&self, envelope: Envelope) {
        match envelope.message {
            ExtensionMessage::StatsUpdated { stats } => {
                *self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(stats);
            }
            other => debug!("Popup ignores {}.", other.kind()),
        }
    }
}
