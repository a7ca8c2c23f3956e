//! crates/synthstyle_core/src/render.rs
//!
//! Renders the extension's widgets into the host page. Each widget is a singleton
//! node: it is created the first time it is needed and mutated in place afterwards.

use crate::domain::POSITIVE_SCORE_THRESHOLD;
use crate::page::{Element, NodeId, Page};

pub const BADGE_ID: &str = "synthstyle-sustainability-badge";
pub const OVERLAY_ID: &str = "synthstyle-tryon-overlay";
const OVERLAY_CANVAS_ID: &str = "synthstyle-tryon-canvas";
const OVERLAY_CLOSE_ID: &str = "synthstyle-tryon-close";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeStyle {
    Positive,
    Warning,
}

impl BadgeStyle {
    pub fn for_score(score: u8) -> Self {
        if score > POSITIVE_SCORE_THRESHOLD {
            BadgeStyle::Positive
        } else {
            BadgeStyle::Warning
        }
    }

    pub fn gradient(self) -> &'static str {
        match self {
            BadgeStyle::Positive => "linear-gradient(135deg, #4CAF50, #8BC34A)",
            BadgeStyle::Warning => "linear-gradient(135deg, #FF5722, #FF9800)",
        }
    }
}

pub struct BadgeRenderer;

impl BadgeRenderer {
    /// Creates or updates the sustainability badge and returns its node.
    pub fn render(page: &mut Page, score: u8) -> NodeId {
        let node = match page.element_by_id(BADGE_ID) {
            Some(node) => node,
            None => {
                let body = page.body();
                page.append(
                    body,
                    Element::new("div")
                        .with_id(BADGE_ID)
                        .with_style("position", "fixed")
                        .with_style("top", "100px")
                        .with_style("right", "20px")
                        .with_style("padding", "10px 15px")
                        .with_style("color", "white")
                        .with_style("border-radius", "8px")
                        .with_style("font-weight", "bold")
                        .with_style("z-index", "1000"),
                )
            }
        };

        if let Some(badge) = page.element_mut(node) {
            badge.text = format!("Sustainability Score: {}%", score);
            badge
                .style
                .insert("background".to_string(), BadgeStyle::for_score(score).gradient().to_string());
        }
        node
    }
}

//=========================================================================================
// Try-on Overlay
//=========================================================================================

pub struct OverlayRenderer;

impl OverlayRenderer {
    pub fn show(page: &mut Page) -> NodeId {
        Self::set_display(page, "block")
    }

    pub fn hide(page: &mut Page) -> NodeId {
        Self::set_display(page, "none")
    }

    pub fn is_visible(page: &Page) -> bool {
        page.element_by_id(OVERLAY_ID)
            .and_then(|node| page.element(node))
            .is_some_and(|e| e.style_value("display") == Some("block"))
    }

    /// Points the overlay canvas at the image (or 3D model) to draw.
    pub fn set_image(page: &mut Page, url: &str) {
        Self::ensure(page);
        if let Some(canvas) = page
            .element_by_id(OVERLAY_CANVAS_ID)
            .and_then(|node| page.element_mut(node))
        {
            canvas.attributes.insert("data-source".to_string(), url.to_string());
        }
    }

    pub fn image(page: &Page) -> Option<String> {
        page.element_by_id(OVERLAY_CANVAS_ID)
            .and_then(|node| page.element(node))
            .and_then(|e| e.attributes.get("data-source").cloned())
    }

    /// Returns the overlay node, creating it hidden on first use.
    fn ensure(page: &mut Page) -> NodeId {
        if let Some(node) = page.element_by_id(OVERLAY_ID) {
            return node;
        }
        let body = page.body();
        let overlay = page.append(
            body,
            Element::new("div")
                .with_id(OVERLAY_ID)
                .with_style("position", "fixed")
                .with_style("top", "0")
                .with_style("left", "0")
                .with_style("width", "100%")
                .with_style("height", "100%")
                .with_style("background", "rgba(0, 0, 0, 0.8)")
                .with_style("z-index", "9999")
                .with_style("display", "none"),
        );
        page.append(overlay, Element::new("canvas").with_id(OVERLAY_CANVAS_ID));
        page.append(
            overlay,
            Element::new("button").with_id(OVERLAY_CLOSE_ID).with_text("×"),
        );
        overlay
    }

    fn set_display(page: &mut Page, display: &str) -> NodeId {
        let node = Self::ensure(page);
        if let Some(overlay) = page.element_mut(node) {
            overlay.style.insert("display".to_string(), display.to_string());
        }
        node
    }
}
