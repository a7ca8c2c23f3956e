//! crates/synthstyle_core/src/content.rs
//!
//! The content context embedded in one shopping tab. It owns the page, watches it for
//! product changes and renders the badge and try-on overlay on request.

use crate::observer::{extract_product_id, ProductExtractor, ProductObserver};
use crate::page::{Page, PageView};
use crate::protocol::{Endpoint, ExtensionMessage, Reply, TabId};
use crate::render::{BadgeRenderer, OverlayRenderer};
use crate::router::{Envelope, MessageListener, MessageRouter, RouterError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::debug;

const TRY_ON_UNAVAILABLE: &str = "Virtual try-on is not available for this product.";

struct ContentState {
    page: Page,
    observer: ProductObserver,
    model_url: Option<String>,
}

pub struct ContentContext {
    tab_id: TabId,
    router: MessageRouter,
    state: Mutex<ContentState>,
}

impl ContentContext {
    pub fn new(tab_id: TabId, router: MessageRouter, page: Page) -> Self {
        Self {
            tab_id,
            router,
            state: Mutex::new(ContentState {
                page,
                observer: ProductObserver::new(),
                model_url: None,
            }),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::Tab {
            tab_id: self.tab_id,
        }
    }

    /// Registers the context for its tab. Dropping the returned handle does not
    /// unregister it; use `MessageRouter::unregister` when the tab closes.
    pub fn register(self: &Arc<Self>) -> JoinHandle<()> {
        self.router.register(self.endpoint(), self.clone())
    }

    /// Runs `f` against the page, e.g. to apply a DOM mutation.
    pub fn with_page<R>(&self, f: impl FnOnce(&mut Page) -> R) -> R {
        f(&mut self.lock().page)
    }

    /// Called after every mutation batch. Forwards a `ProductChanged` to the
    /// background when the page now shows a different product.
    pub fn on_mutations(&self) -> Result<bool, RouterError> {
        let changed = {
            let mut state = self.lock();
            let ContentState { page, observer, .. } = &mut *state;
            observer.on_mutations(&*page)
        };
        match changed {
            Some(product) => {
                let sent = self.router.notify(
                    self.endpoint(),
                    Endpoint::Background,
                    ExtensionMessage::ProductChanged { product },
                );
                if sent.is_err() {
                    // Undelivered, so the next batch must report the product again.
                    self.lock().observer.forget();
                }
                sent.map(|_| true)
            }
            None => Ok(false),
        }
    }

    /// Opens the overlay for a try-on session. The explicit image wins over the
    /// prepared model, which wins over the first product image.
    fn initialize_try_on(&self, image_url: Option<String>) -> Reply {
        let mut state = self.lock();
        let source = image_url
            .or_else(|| state.model_url.clone())
            .or_else(|| ProductExtractor::snapshot(&state.page).images.into_iter().next());
        let Some(source) = source else {
            return Reply::failed(TRY_ON_UNAVAILABLE);
        };
        OverlayRenderer::set_image(&mut state.page, &source);
        OverlayRenderer::show(&mut state.page);
        Reply::ok()
    }

    fn lock(&self) -> MutexGuard<'_, ContentState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageListener for ContentContext {
    async fn on_message(&self, mut envelope: Envelope) {
        let reply = match &envelope.message {
            ExtensionMessage::UpdateSustainability { score } => {
                BadgeRenderer::render(&mut self.lock().page, *score);
                Reply::ok()
            }
            ExtensionMessage::PrepareVirtualTryOn { model_url } => {
                let mut state = self.lock();
                state.model_url = Some(model_url.clone());
                OverlayRenderer::set_image(&mut state.page, model_url);
                Reply::ok()
            }
            ExtensionMessage::InitializeTryOn { image_url } => {
                self.initialize_try_on(image_url.clone())
            }
            ExtensionMessage::ShowVirtualTryOn { image_url } => {
                let mut state = self.lock();
                if let Some(url) = image_url {
                    OverlayRenderer::set_image(&mut state.page, url);
                }
                OverlayRenderer::show(&mut state.page);
                Reply::ok()
            }
            ExtensionMessage::HideVirtualTryOn => {
                OverlayRenderer::hide(&mut self.lock().page);
                Reply::ok()
            }
            ExtensionMessage::GetProductId => Reply::ProductId {
                product_id: extract_product_id(self.lock().page.url()),
            },
            ExtensionMessage::GetProductDetails => Reply::ProductDetails {
                product: ProductExtractor::snapshot(&self.lock().page),
            },
            other => {
                debug!("Tab {} ignores {}.", self.tab_id, other.kind());
                return;
            }
        };
        envelope.respond(reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Element;
    use crate::render::{BADGE_ID, OVERLAY_ID};
    use tokio::sync::mpsc;

    /// Stands in for the background and forwards what it receives.
    struct Background(mpsc::UnboundedSender<(Endpoint, ExtensionMessage)>);

    #[async_trait]
    impl MessageListener for Background {
        async fn on_message(&self, envelope: Envelope) {
            let _ = self.0.send((envelope.from, envelope.message));
        }
    }

    fn shirt_page() -> Page {
        let mut page = Page::new("https://www.amazon.com/Organic-Tee/dp/B0TEE00001");
        let body = page.body();
        page.append(
            body,
            Element::new("span").with_id("productTitle").with_text("Organic Tee"),
        );
        let gallery = page.append(body, Element::new("div").with_id("altImages"));
        page.append(gallery, Element::new("img").with_attr("src", "https://img/tee.jpg"));
        page
    }

    fn content(page: Page) -> (Arc<ContentContext>, MessageRouter) {
        let router = MessageRouter::new();
        let context = Arc::new(ContentContext::new(5, router.clone(), page));
        context.register();
        (context, router)
    }

    async fn ask(router: &MessageRouter, message: ExtensionMessage) -> Reply {
        router
            .request(Endpoint::Background, Endpoint::Tab { tab_id: 5 }, message)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn mutations_forward_product_changes_once() {
        let (context, router) = content(shirt_page());
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(Endpoint::Background, Arc::new(Background(tx)));

        assert!(context.on_mutations().unwrap());
        assert!(!context.on_mutations().unwrap());

        let (from, message) = rx.recv().await.unwrap();
        assert_eq!(from, Endpoint::Tab { tab_id: 5 });
        let ExtensionMessage::ProductChanged { product } = message else {
            panic!("expected a product change, got {:?}", message);
        };
        assert_eq!(product.id.as_deref(), Some("B0TEE00001"));
        assert_eq!(product.title.as_deref(), Some("Organic Tee"));
    }

    #[tokio::test]
    async fn mutations_without_background_report_no_receiver() {
        let (context, _router) = content(shirt_page());
        assert_eq!(
            context.on_mutations(),
            Err(RouterError::NoReceiver(Endpoint::Background))
        );
    }

    #[tokio::test]
    async fn undelivered_product_change_is_sent_once_background_registers() {
        let (context, router) = content(shirt_page());
        assert!(context.on_mutations().is_err());

        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(Endpoint::Background, Arc::new(Background(tx)));
        assert!(context.on_mutations().unwrap());

        let (_, message) = rx.recv().await.unwrap();
        assert!(matches!(
            message,
            ExtensionMessage::ProductChanged { product } if product.id.as_deref() == Some("B0TEE00001")
        ));
    }

    #[tokio::test]
    async fn repeated_score_updates_keep_one_badge() {
        let (context, router) = content(shirt_page());
        for score in [30, 75, 75] {
            assert_eq!(
                ask(&router, ExtensionMessage::UpdateSustainability { score }).await,
                Reply::ok()
            );
        }
        context.with_page(|page| {
            assert_eq!(page.count_by_id(BADGE_ID), 1);
            let badge = page.element_by_id(BADGE_ID).and_then(|n| page.element(n)).unwrap();
            assert_eq!(badge.text, "Sustainability Score: 75%");
        });
    }

    #[tokio::test]
    async fn try_on_prefers_prepared_model_and_toggles_overlay() {
        let (context, router) = content(shirt_page());
        ask(
            &router,
            ExtensionMessage::PrepareVirtualTryOn {
                model_url: "https://models.example/B0TEE00001.glb".to_string(),
            },
        )
        .await;
        assert!(!context.with_page(|page| OverlayRenderer::is_visible(page)));

        assert_eq!(
            ask(&router, ExtensionMessage::InitializeTryOn { image_url: None }).await,
            Reply::ok()
        );
        context.with_page(|page| {
            assert!(OverlayRenderer::is_visible(page));
            assert_eq!(
                OverlayRenderer::image(page).as_deref(),
                Some("https://models.example/B0TEE00001.glb")
            );
        });

        ask(&router, ExtensionMessage::HideVirtualTryOn).await;
        ask(&router, ExtensionMessage::ShowVirtualTryOn { image_url: None }).await;
        context.with_page(|page| {
            assert!(OverlayRenderer::is_visible(page));
            assert_eq!(page.count_by_id(OVERLAY_ID), 1);
        });
    }

    #[tokio::test]
    async fn try_on_falls_back_to_product_image() {
        let (context, router) = content(shirt_page());
        ask(&router, ExtensionMessage::InitializeTryOn { image_url: None }).await;
        assert_eq!(
            context.with_page(|page| OverlayRenderer::image(page)).as_deref(),
            Some("https://img/tee.jpg")
        );
    }

    #[tokio::test]
    async fn try_on_without_any_image_fails() {
        let (_context, router) = content(Page::new("https://www.amazon.com/dp/B0BARE0001"));
        assert_eq!(
            ask(&router, ExtensionMessage::InitializeTryOn { image_url: None }).await,
            Reply::failed(TRY_ON_UNAVAILABLE)
        );
    }

    #[tokio::test]
    async fn answers_product_queries() {
        let (_context, router) = content(shirt_page());
        assert_eq!(
            ask(&router, ExtensionMessage::GetProductId).await,
            Reply::ProductId {
                product_id: Some("B0TEE00001".to_string())
            }
        );
        let Reply::ProductDetails { product } = ask(&router, ExtensionMessage::GetProductDetails).await
        else {
            panic!("expected product details");
        };
        assert_eq!(product.images, vec!["https://img/tee.jpg"]);
    }
}
