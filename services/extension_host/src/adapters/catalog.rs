//! services/extension_host/src/adapters/catalog.rs

use async_trait::async_trait;
use synthstyle_core::domain::ProductRecord;
use synthstyle_core::ports::{PortError, PortResult, TryOnModelCatalog};

use super::backend::BackendClient;

/// Resolves try-on models from the product catalog, falling back to
/// `{base_url}/{product_id}.glb` when a base URL is configured.
pub struct CatalogModels {
    backend: BackendClient,
    base_url: Option<String>,
}

impl CatalogModels {
    pub fn new(backend: BackendClient, base_url: Option<String>) -> Self {
        Self { backend, base_url }
    }

    fn fallback(&self, product_id: &str) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}.glb", base, product_id))
    }
}

#[async_trait]
impl TryOnModelCatalog for CatalogModels {
    async fn model_url(&self, product_id: &str) -> PortResult<Option<String>> {
        match self
            .backend
            .get_json::<ProductRecord>(&format!("/api/products/{}", product_id))
            .await
        {
            Ok(ProductRecord {
                model_url: Some(url),
                ..
            }) => Ok(Some(url)),
            Ok(_) | Err(PortError::NotFound(_)) => Ok(self.fallback(product_id)),
            Err(e) => Err(e),
        }
    }
}
