//! services/extension_host/src/adapters/http_store.rs
//!
//! The `RemoteStore` port over the backend's preference and profile endpoints.

use async_trait::async_trait;
use serde_json::{json, Value};
use synthstyle_core::ports::{PortResult, RemoteResource, RemoteStore};
use tracing::instrument;

use super::backend::BackendClient;

pub struct HttpRemoteStore {
    backend: BackendClient,
}

impl HttpRemoteStore {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

fn read_path(resource: RemoteResource, user_id: &str) -> String {
    match resource {
        RemoteResource::Preferences => format!("/api/preferences/{}", user_id),
        RemoteResource::UserProfile => format!("/api/user/profile/{}", user_id),
    }
}

/// Preference records carry bookkeeping that the local copy does not keep.
fn strip_record_fields(resource: RemoteResource, mut document: Value) -> Value {
    if let (RemoteResource::Preferences, Some(fields)) = (resource, document.as_object_mut()) {
        fields.remove("userId");
        fields.remove("updatedAt");
    }
    document
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    #[instrument(skip(self))]
    async fn fetch(&self, resource: RemoteResource, user_id: &str) -> PortResult<Option<Value>> {
        // The backend answers `null` for users it has never seen.
        let document = self
            .backend
            .get_json::<Option<Value>>(&read_path(resource, user_id))
            .await?;
        Ok(document.map(|document| strip_record_fields(resource, document)))
    }

    #[instrument(skip(self, value))]
    async fn push(&self, resource: RemoteResource, user_id: &str, value: Value) -> PortResult<Value> {
        let (path, body) = match resource {
            RemoteResource::Preferences => (
                "/api/preferences",
                json!({ "userId": user_id, "preferences": value }),
            ),
            RemoteResource::UserProfile => (
                "/api/user/profile",
                json!({ "userId": user_id, "profile": value }),
            ),
        };
        self.backend.post_json(path, &body).await
    }

    #[instrument(skip(self))]
    async fn clear(&self, user_id: &str) -> PortResult<()> {
        self.backend
            .post_empty(&format!("/api/user/clear/{}", user_id))
            .await
    }
}
