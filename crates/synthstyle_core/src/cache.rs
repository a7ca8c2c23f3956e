//! crates/synthstyle_core/src/cache.rs
//!
//! The background context's product cache. Entries never expire one by one; the
//! whole cache is wiped on a fixed interval.

use crate::domain::ProductSnapshot;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Default)]
pub struct ProductCache {
    entries: Arc<Mutex<HashMap<String, ProductSnapshot>>>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product_id: impl Into<String>, product: ProductSnapshot) {
        self.lock().insert(product_id.into(), product);
    }

    pub fn get(&self, product_id: &str) -> Option<ProductSnapshot> {
        self.lock().get(product_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Spawns a task that clears the cache every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Product cache sweeper stopped.");
                        return;
                    }
                    _ = ticker.tick() => {
                        let dropped = cache.len();
                        cache.clear();
                        info!("Cleared product cache ({} entries).", dropped);
                    }
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProductSnapshot>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
