//! crates/synthstyle_core/src/background.rs
//!
//! The background context: the long-lived coordinator every other context talks to.
//! It owns the `BackgroundSession` and serves product verification, try-on and scan
//! sessions, counters and the profile documents kept in storage.

use crate::domain::{ExtensionStats, ProductSnapshot};
use crate::messages::user_message;
use crate::ports::{BodyScanner, PortError, SustainabilityVerifier, TryOnModelCatalog};
use crate::protocol::{Endpoint, ExtensionMessage, Reply, TabId};
use crate::router::{Envelope, MessageListener, MessageRouter, Responder};
use crate::session::BackgroundSession;
use crate::storage::SyncedStorage;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct BackgroundContext {
    session: Arc<BackgroundSession>,
    storage: SyncedStorage,
    router: MessageRouter,
    verifier: Arc<dyn SustainabilityVerifier>,
    scanner: Arc<dyn BodyScanner>,
    models: Arc<dyn TryOnModelCatalog>,
}

impl BackgroundContext {
    pub fn new(
        session: Arc<BackgroundSession>,
        storage: SyncedStorage,
        router: MessageRouter,
        verifier: Arc<dyn SustainabilityVerifier>,
        scanner: Arc<dyn BodyScanner>,
        models: Arc<dyn TryOnModelCatalog>,
    ) -> Self {
        Self {
            session,
            storage,
            router,
            verifier,
            scanner,
            models,
        }
    }

    pub fn session(&self) -> &BackgroundSession {
        &self.session
    }

    /// Registers this context as the background endpoint.
    pub fn register(self) -> JoinHandle<()> {
        let router = self.router.clone();
        router.register(Endpoint::Background, Arc::new(self))
    }

    /// Fills in install-time defaults. Values already stored are kept, so this runs on
    /// every host start.
    pub async fn on_installed(&self) -> Result<(), PortError> {
        self.storage.initialize_defaults().await?;
        let user_id = self.storage.get_user_id().await?;
        info!("Extension installed for {}.", user_id);
        Ok(())
    }

    //-------------------------------------------------------------------------------------
    // Product flow
    //-------------------------------------------------------------------------------------

    async fn on_product_changed(&self, from: Endpoint, product: ProductSnapshot) {
        let Some(product_id) = product.id.clone() else {
            debug!("Ignoring product change without an identifier.");
            return;
        };
        self.session.product_cache.insert(product_id.clone(), product.clone());

        let verification = match self.verifier.verify(&product_id).await {
            Ok(verification) => verification,
            Err(e) => {
                warn!("Verification of {} failed: {}", product_id, e);
                return;
            }
        };

        let Endpoint::Tab { .. } = from else {
            return;
        };
        if let Err(e) = self.router.notify(
            Endpoint::Background,
            from,
            ExtensionMessage::UpdateSustainability {
                score: verification.score,
            },
        ) {
            debug!("Could not deliver sustainability score: {}", e);
            return;
        }

        if !product.supports_try_on() {
            return;
        }
        match self.models.model_url(&product_id).await {
            Ok(Some(model_url)) => {
                if let Err(e) = self.router.notify(
                    Endpoint::Background,
                    from,
                    ExtensionMessage::PrepareVirtualTryOn { model_url },
                ) {
                    debug!("Could not deliver try-on model: {}", e);
                }
            }
            Ok(None) => debug!("No try-on model for {}.", product_id),
            Err(e) => warn!("Model lookup for {} failed: {}", product_id, e),
        }
    }

    async fn verify(&self, product_id: &str) -> Reply {
        match self.verifier.verify(product_id).await {
            Ok(result) => {
                if result.verified {
                    self.bump_stats(ExtensionStats {
                        verified_items: 1,
                        try_ons: 0,
                    })
                    .await;
                }
                Reply::Verification {
                    success: true,
                    verified: result.verified,
                    score: result.score,
                    message: None,
                }
            }
            Err(e) => {
                warn!("Verification of {} failed: {}", product_id, e);
                Reply::Verification {
                    success: false,
                    verified: false,
                    score: 0,
                    message: Some(user_message(&e).to_string()),
                }
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Guarded sessions
    //-------------------------------------------------------------------------------------

    fn start_try_on(&self, tab_id: TabId, image_url: Option<String>, responder: Option<Responder>) {
        let ticket = match self.session.try_on.begin() {
            Ok(ticket) => ticket,
            Err(e) => {
                info!("Rejected try-on for tab {}: {}", tab_id, e);
                answer(responder, Reply::failed(e.to_string()));
                return;
            }
        };

        let this = self.clone();
        tokio::spawn(async move {
            ticket.start();
            let tab = Endpoint::Tab { tab_id };
            let reply = match this
                .router
                .request(Endpoint::Background, tab, ExtensionMessage::InitializeTryOn { image_url })
                .await
            {
                Ok(reply) if reply.is_success() => {
                    ticket.complete();
                    this.bump_stats(ExtensionStats {
                        verified_items: 0,
                        try_ons: 1,
                    })
                    .await;
                    Reply::ok()
                }
                Ok(reply) => {
                    ticket.fail();
                    reply
                }
                Err(e) => {
                    warn!("Try-on in tab {} failed: {}", tab_id, e);
                    ticket.fail();
                    Reply::failed(e.to_string())
                }
            };
            answer(responder, reply);
        });
    }

    fn start_scan(&self, stream: String, responder: Option<Responder>) {
        let ticket = match self.session.scan.begin() {
            Ok(ticket) => ticket,
            Err(e) => {
                info!("Rejected scan: {}", e);
                answer(
                    responder,
                    Reply::Scan {
                        success: false,
                        measurements: None,
                        message: Some(e.to_string()),
                    },
                );
                return;
            }
        };

        let this = self.clone();
        tokio::spawn(async move {
            ticket.start();
            let outcome = match this.scanner.measure(&stream).await {
                Ok(measurements) => this
                    .storage
                    .save_body_measurements(&measurements)
                    .await
                    .map(|_| measurements),
                Err(e) => Err(e),
            };
            let reply = match outcome {
                Ok(measurements) => {
                    ticket.complete();
                    Reply::Scan {
                        success: true,
                        measurements: Some(measurements),
                        message: None,
                    }
                }
                Err(e) => {
                    error!("Body scan failed: {}", e);
                    ticket.fail();
                    Reply::Scan {
                        success: false,
                        measurements: None,
                        message: Some(user_message(&e).to_string()),
                    }
                }
            };
            answer(responder, reply);
        });
    }

    //-------------------------------------------------------------------------------------
    // Counters
    //-------------------------------------------------------------------------------------

    async fn bump_stats(&self, delta: ExtensionStats) -> Reply {
        match self.storage.increment_stats(delta).await {
            Ok(stats) => {
                let update = ExtensionMessage::StatsUpdated { stats };
                if let Err(e) = self.router.notify(Endpoint::Background, Endpoint::Popup, update) {
                    debug!("Popup not listening for stats: {}", e);
                }
                Reply::ok()
            }
            Err(e) => {
                error!("Failed to update counters: {}", e);
                Reply::failed(user_message(&e))
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Stored documents
    //-------------------------------------------------------------------------------------

    fn stored_reply<T>(result: Result<T, PortError>, to_reply: impl FnOnce(T) -> Reply) -> Reply {
        match result {
            Ok(value) => to_reply(value),
            Err(e) => {
                warn!("Storage request failed: {}", e);
                Reply::failed(user_message(&e))
            }
        }
    }
}

fn answer(responder: Option<Responder>, reply: Reply) {
    if let Some(responder) = responder {
        responder.send(reply);
    }
}

#[async_trait]
impl MessageListener for BackgroundContext {
    async fn on_message(&self, envelope: Envelope) {
        let Envelope {
            from,
            message,
            responder,
        } = envelope;
        debug!("Background received {} from {}.", message.kind(), from);

        match message {
            ExtensionMessage::ProductChanged { product } => {
                let this = self.clone();
                tokio::spawn(async move { this.on_product_changed(from, product).await });
                answer(responder, Reply::ok());
            }
            ExtensionMessage::VerifySustainability { product_id } => {
                let this = self.clone();
                tokio::spawn(async move {
                    let reply = this.verify(&product_id).await;
                    answer(responder, reply);
                });
            }
            ExtensionMessage::GetCachedProduct { product_id } => {
                let product = self.session.product_cache.get(&product_id);
                answer(responder, Reply::CachedProduct { product });
            }
            ExtensionMessage::StartTryOn { tab_id, image_url } => {
                self.start_try_on(tab_id, image_url, responder);
            }
            ExtensionMessage::StartScan { stream } => {
                self.start_scan(stream, responder);
            }
            ExtensionMessage::UpdateStats {
                verified_items,
                try_ons,
            } => {
                let reply = self
                    .bump_stats(ExtensionStats {
                        verified_items,
                        try_ons,
                    })
                    .await;
                answer(responder, reply);
            }
            ExtensionMessage::GetUserProfile => {
                let result = self.storage.user_profile().await;
                let reply = Self::stored_reply(result, |profile| Reply::Profile { profile });
                answer(responder, reply);
            }
            ExtensionMessage::UpdateUserProfile { profile } => {
                let result = self.storage.save_user_profile(&profile).await;
                let reply = Self::stored_reply(result, |_| Reply::ok());
                answer(responder, reply);
            }
            ExtensionMessage::GetMeasurements => {
                let result = match self.storage.measurements().await {
                    Ok(None) => self.storage.body_measurements().await,
                    other => other,
                };
                let reply =
                    Self::stored_reply(result, |measurements| Reply::Measurements { measurements });
                answer(responder, reply);
            }
            ExtensionMessage::UpdateMeasurements { measurements } => {
                let result = self.storage.save_measurements(&measurements).await;
                let reply = Self::stored_reply(result, |_| Reply::ok());
                answer(responder, reply);
            }
            other => {
                debug!("Background ignores {}.", other.kind());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BodyMeasurements, VerificationResult};
    use crate::ports::{LocalStore, PortResult, RemoteResource, RemoteStore};
    use crate::storage::MemoryLocalStore;
    use serde_json::Value;
    use tokio::sync::{mpsc, Mutex, Notify};

    struct OfflineRemote;

    #[async_trait]
    impl RemoteStore for OfflineRemote {
        async fn fetch(&self, _: RemoteResource, _: &str) -> PortResult<Option<Value>> {
            Err(PortError::Unavailable("offline".to_string()))
        }
        async fn push(&self, _: RemoteResource, _: &str, _: Value) -> PortResult<Value> {
            Err(PortError::Unavailable("offline".to_string()))
        }
        async fn clear(&self, _: &str) -> PortResult<()> {
            Err(PortError::Unavailable("offline".to_string()))
        }
    }

    struct FixedVerifier(VerificationResult);

    #[async_trait]
    impl SustainabilityVerifier for FixedVerifier {
        async fn verify(&self, product_id: &str) -> PortResult<VerificationResult> {
            if product_id == "B0GONE0000" {
                return Err(PortError::NotFound(format!("Product {}", product_id)));
            }
            Ok(self.0.clone())
        }
    }

    /// Holds every scan until released.
    #[derive(Default)]
    struct GatedScanner {
        release: Notify,
    }

    #[async_trait]
    impl BodyScanner for GatedScanner {
        async fn measure(&self, stream: &str) -> PortResult<BodyMeasurements> {
            if stream == "denied" {
                return Err(PortError::Unauthorized);
            }
            self.release.notified().await;
            Ok(BodyMeasurements {
                height: Some(170.0),
                waist: Some(76.0),
                ..Default::default()
            })
        }
    }

    struct Models;

    #[async_trait]
    impl TryOnModelCatalog for Models {
        async fn model_url(&self, product_id: &str) -> PortResult<Option<String>> {
            Ok(Some(format!("https://models.example/{}.glb", product_id)))
        }
    }

    /// A tab that forwards what it receives and holds try-on requests until released.
    struct Tab {
        seen: mpsc::UnboundedSender<ExtensionMessage>,
        release: Arc<Notify>,
        accept: bool,
    }

    #[async_trait]
    impl MessageListener for Tab {
        async fn on_message(&self, envelope: Envelope) {
            let _ = self.seen.send(envelope.message.clone());
            if let Some(responder) = envelope.responder {
                let release = self.release.clone();
                let accept = self.accept;
                tokio::spawn(async move {
                    release.notified().await;
                    responder.send(if accept {
                        Reply::ok()
                    } else {
                        Reply::failed("camera unavailable")
                    });
                });
            }
        }
    }

    #[derive(Default)]
    struct Popup {
        stats: Mutex<Vec<ExtensionStats>>,
    }

    #[async_trait]
    impl MessageListener for Popup {
        async fn on_message(&self, envelope: Envelope) {
            if let ExtensionMessage::StatsUpdated { stats } = envelope.message {
                self.stats.lock().await.push(stats);
            }
        }
    }

    struct Harness {
        router: MessageRouter,
        local: Arc<MemoryLocalStore>,
        scanner: Arc<GatedScanner>,
        context: BackgroundContext,
    }

    fn harness(verified: bool, score: u8) -> Harness {
        let router = MessageRouter::new();
        let local = Arc::new(MemoryLocalStore::new());
        let scanner = Arc::new(GatedScanner::default());
        let storage = SyncedStorage::new(local.clone(), Arc::new(OfflineRemote));
        let context = BackgroundContext::new(
            Arc::new(BackgroundSession::new()),
            storage,
            router.clone(),
            Arc::new(FixedVerifier(VerificationResult {
                verified,
                score,
                certifications: vec![],
            })),
            scanner.clone(),
            Arc::new(Models),
        );
        context.clone().register();
        Harness {
            router,
            local,
            scanner,
            context,
        }
    }

    fn tab(
        router: &MessageRouter,
        tab_id: TabId,
        accept: bool,
    ) -> (mpsc::UnboundedReceiver<ExtensionMessage>, Arc<Notify>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        router.register(
            Endpoint::Tab { tab_id },
            Arc::new(Tab {
                seen: tx,
                release: release.clone(),
                accept,
            }),
        );
        (rx, release)
    }

    fn shirt(id: &str) -> ProductSnapshot {
        ProductSnapshot {
            id: Some(id.to_string()),
            title: Some("Organic Shirt".to_string()),
            category: Some("Clothing, Shoes & Jewelry".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn product_change_updates_badge_and_prepares_try_on() {
        let h = harness(true, 82);
        let (mut seen, _) = tab(&h.router, 4, true);

        h.router
            .notify(
                Endpoint::Tab { tab_id: 4 },
                Endpoint::Background,
                ExtensionMessage::ProductChanged {
                    product: shirt("B0SHIRT001"),
                },
            )
            .unwrap();

        assert_eq!(
            seen.recv().await.unwrap(),
            ExtensionMessage::UpdateSustainability { score: 82 }
        );
        assert_eq!(
            seen.recv().await.unwrap(),
            ExtensionMessage::PrepareVirtualTryOn {
                model_url: "https://models.example/B0SHIRT001.glb".to_string()
            }
        );

        let reply = h
            .router
            .request(
                Endpoint::Popup,
                Endpoint::Background,
                ExtensionMessage::GetCachedProduct {
                    product_id: "B0SHIRT001".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::CachedProduct {
                product: Some(shirt("B0SHIRT001"))
            }
        );
    }

    #[tokio::test]
    async fn non_apparel_products_get_no_try_on_model() {
        let h = harness(false, 35);
        let (mut seen, _) = tab(&h.router, 2, true);
        let mut product = shirt("B0KETTLE01");
        product.category = Some("Home & Kitchen".to_string());

        h.router
            .notify(
                Endpoint::Tab { tab_id: 2 },
                Endpoint::Background,
                ExtensionMessage::ProductChanged { product },
            )
            .unwrap();

        assert_eq!(
            seen.recv().await.unwrap(),
            ExtensionMessage::UpdateSustainability { score: 35 }
        );
        // Closing the tab drains its inbox, so any further message would show up here.
        h.router.unregister(Endpoint::Tab { tab_id: 2 });
        assert!(seen.recv().await.is_none());
    }

    #[tokio::test]
    async fn verified_products_bump_the_counter_and_notify_popup() {
        let h = harness(true, 90);
        let popup = Arc::new(Popup::default());
        h.router.register(Endpoint::Popup, popup.clone());

        let reply = h
            .router
            .request(
                Endpoint::Popup,
                Endpoint::Background,
                ExtensionMessage::VerifySustainability {
                    product_id: "B0SHIRT001".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Verification {
                success: true,
                verified: true,
                score: 90,
                message: None
            }
        );
        assert_eq!(h.context.storage.stats().await.unwrap().verified_items, 1);

        // Requests to the popup queue behind the notification.
        h.router
            .request(Endpoint::Background, Endpoint::Popup, ExtensionMessage::GetProductId)
            .await
            .ok();
        assert_eq!(
            popup.stats.lock().await.as_slice(),
            &[ExtensionStats {
                verified_items: 1,
                try_ons: 0
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_verifications_count_every_verified_item() {
        let h = harness(true, 90);
        h.context.on_installed().await.unwrap();

        let requests: Vec<_> = (0..10)
            .map(|i| {
                let router = h.router.clone();
                tokio::spawn(async move {
                    router
                        .request(
                            Endpoint::Popup,
                            Endpoint::Background,
                            ExtensionMessage::VerifySustainability {
                                product_id: format!("B0SHIRT{:03}", i),
                            },
                        )
                        .await
                })
            })
            .collect();
        for request in requests {
            assert!(request.await.unwrap().unwrap().is_success());
        }

        assert_eq!(h.context.storage.stats().await.unwrap().verified_items, 10);
    }

    #[tokio::test]
    async fn failed_verification_uses_friendly_message() {
        let h = harness(true, 90);
        let reply = h
            .router
            .request(
                Endpoint::Popup,
                Endpoint::Background,
                ExtensionMessage::VerifySustainability {
                    product_id: "B0GONE0000".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Verification {
                success: false,
                verified: false,
                score: 0,
                message: Some("The product you're looking for is no longer available.".to_string())
            }
        );
    }

    #[tokio::test]
    async fn second_try_on_is_rejected_while_first_runs() {
        let h = harness(true, 90);
        let (mut seen, release) = tab(&h.router, 9, true);
        let start = || ExtensionMessage::StartTryOn {
            tab_id: 9,
            image_url: None,
        };

        let router = h.router.clone();
        let first = tokio::spawn(async move {
            router
                .request(Endpoint::Popup, Endpoint::Background, start())
                .await
        });
        assert_eq!(
            seen.recv().await.unwrap(),
            ExtensionMessage::InitializeTryOn { image_url: None }
        );

        let second = h
            .router
            .request(Endpoint::Popup, Endpoint::Background, start())
            .await
            .unwrap();
        assert_eq!(second, Reply::failed("Try-on already in progress"));

        release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), Reply::ok());
        assert_eq!(h.context.storage.stats().await.unwrap().try_ons, 1);
        assert!(h.context.session().try_on.begin().is_ok());
    }

    #[tokio::test]
    async fn refused_try_on_is_forwarded_and_frees_the_slot() {
        let h = harness(true, 90);
        let (_seen, release) = tab(&h.router, 3, false);
        release.notify_one();

        let reply = h
            .router
            .request(
                Endpoint::Popup,
                Endpoint::Background,
                ExtensionMessage::StartTryOn {
                    tab_id: 3,
                    image_url: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(reply, Reply::failed("camera unavailable"));
        assert_eq!(h.context.storage.stats().await.unwrap().try_ons, 0);
        assert!(!h.context.session().try_on.state().is_busy());
    }

    #[tokio::test]
    async fn try_on_for_closed_tab_fails() {
        let h = harness(true, 90);
        let reply = h
            .router
            .request(
                Endpoint::Popup,
                Endpoint::Background,
                ExtensionMessage::StartTryOn {
                    tab_id: 77,
                    image_url: None,
                },
            )
            .await
            .unwrap();
        assert!(!reply.is_success());
    }

    #[tokio::test]
    async fn scan_persists_measurements_and_guards_reentry() {
        let h = harness(true, 90);
        let router = h.router.clone();
        let first = tokio::spawn(async move {
            router
                .request(
                    Endpoint::Popup,
                    Endpoint::Background,
                    ExtensionMessage::StartScan {
                        stream: "camera-1".to_string(),
                    },
                )
                .await
        });

        // Wait until the first scan has claimed the slot.
        while !h.context.session().scan.state().is_busy() {
            tokio::task::yield_now().await;
        }
        let second = h
            .router
            .request(
                Endpoint::Popup,
                Endpoint::Background,
                ExtensionMessage::StartScan {
                    stream: "camera-1".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            second,
            Reply::Scan {
                success: false,
                measurements: None,
                message: Some("Scan already in progress".to_string())
            }
        );

        h.scanner.release.notify_one();
        let reply = first.await.unwrap().unwrap();
        assert!(reply.is_success());

        let stored = h.local.get("bodyMeasurements").await.unwrap().unwrap();
        assert_eq!(stored["height"], 170.0);

        let measurements = h
            .router
            .request(Endpoint::Popup, Endpoint::Background, ExtensionMessage::GetMeasurements)
            .await
            .unwrap();
        assert!(matches!(
            measurements,
            Reply::Measurements { measurements: Some(m) } if m.waist == Some(76.0)
        ));
    }

    #[tokio::test]
    async fn denied_scan_reports_permission_message() {
        let h = harness(true, 90);
        let reply = h
            .router
            .request(
                Endpoint::Popup,
                Endpoint::Background,
                ExtensionMessage::StartScan {
                    stream: "denied".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Scan {
                success: false,
                measurements: None,
                message: Some("Permission was denied. Please allow access and try again.".to_string())
            }
        );
        assert_eq!(h.context.session().scan.state(), crate::session::OperationState::Failed);
    }

    #[tokio::test]
    async fn stats_update_without_popup_still_succeeds() {
        let h = harness(true, 90);
        let reply = h
            .router
            .request(
                Endpoint::Tab { tab_id: 1 },
                Endpoint::Background,
                ExtensionMessage::UpdateStats {
                    verified_items: 2,
                    try_ons: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(reply, Reply::ok());
        assert_eq!(
            h.context.storage.stats().await.unwrap(),
            ExtensionStats {
                verified_items: 2,
                try_ons: 1
            }
        );
    }

    #[tokio::test]
    async fn storage_outage_becomes_failed_reply() {
        let h = harness(true, 90);
        h.local.set_unavailable(true);
        let reply = h
            .router
            .request(Endpoint::Popup, Endpoint::Background, ExtensionMessage::GetUserProfile)
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::failed("Extension storage is unavailable. Please reload the extension.")
        );
    }
}
