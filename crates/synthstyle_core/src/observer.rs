//! crates/synthstyle_core/src/observer.rs
//!
//! Watches a shopping page for product changes. Every mutation batch is checked,
//! but an event is only produced when the page's product identifier changes.

use crate::domain::ProductSnapshot;
use crate::page::PageView;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

const TITLE_SELECTOR: &str = "#productTitle";
const PRICE_SELECTOR: &str = ".a-price-whole";
const CATEGORY_SELECTOR: &str = "#wayfinding-breadcrumbs_container";
const IMAGES_SELECTOR: &str = "#altImages img";
const DESCRIPTION_SELECTOR: &str = "#productDescription";

fn product_path() -> &'static Regex {
    static PRODUCT_PATH: OnceLock<Regex> = OnceLock::new();
    PRODUCT_PATH.get_or_init(|| {
        Regex::new(r"/dp/([A-Z0-9]+)").expect("product path pattern is valid")
    })
}

/// Extracts the product identifier from a page URL, e.g. `B08N5WRWNW` from
/// `https://www.amazon.com/Some-Shirt/dp/B08N5WRWNW?th=1`.
pub fn extract_product_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    product_path()
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn cleaned(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

pub struct ProductExtractor;

impl ProductExtractor {
    /// Builds a best-effort snapshot of the product on the page.
    pub fn snapshot(page: &dyn PageView) -> ProductSnapshot {
        ProductSnapshot {
            id: extract_product_id(page.url()),
            title: cleaned(page.text(TITLE_SELECTOR)),
            price: cleaned(page.text(PRICE_SELECTOR)),
            category: cleaned(page.text(CATEGORY_SELECTOR)),
            images: page.attributes(IMAGES_SELECTOR, "src"),
            description: cleaned(page.text(DESCRIPTION_SELECTOR)),
        }
    }
}

#[derive(Debug, Default)]
pub struct ProductObserver {
    last_seen: Option<String>,
}

impl ProductObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    /// Checks the page after a mutation batch. Returns a snapshot when the page now
    /// shows a product different from the last one reported.
    pub fn on_mutations(&mut self, page: &dyn PageView) -> Option<ProductSnapshot> {
        let product_id = extract_product_id(page.url())?;
        if self.last_seen.as_deref() == Some(product_id.as_str()) {
            return None;
        }
        debug!("Product changed to {}.", product_id);
        self.last_seen = Some(product_id);
        Some(ProductExtractor::snapshot(page))
    }

    /// Drops the last reported product so the next batch reports it again.
    pub fn forget(&mut self) {
        self.last_seen = None;
    }
}
