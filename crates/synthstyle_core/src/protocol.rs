//! crates/synthstyle_core/src/protocol.rs
//!
//! Defines the message protocol spoken between the extension's execution contexts:
//! the content script embedded in a shopping tab, the background worker and the popup.

use crate::domain::{BodyMeasurements, ExtensionStats, ProductSnapshot, UserProfile};
use serde::{Deserialize, Serialize};

pub type TabId = u32;

/// An addressable execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Endpoint {
    Background,
    Popup,
    Tab {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Background => write!(f, "background"),
            Endpoint::Popup => write!(f, "popup"),
            Endpoint::Tab { tab_id } => write!(f, "tab {}", tab_id),
        }
    }
}

//=========================================================================================
// Messages
//=========================================================================================

/// Every message any context can send. Each context matches on the variants it
/// serves and ignores the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionMessage {
    /// The content script saw a new product on its page.
    ProductChanged { product: ProductSnapshot },

    VerifySustainability {
        #[serde(rename = "productId")]
        product_id: String,
    },

    GetCachedProduct {
        #[serde(rename = "productId")]
        product_id: String,
    },

    /// Asks the content script to show or refresh the sustainability badge.
    UpdateSustainability { score: u8 },

    PrepareVirtualTryOn {
        #[serde(rename = "modelUrl")]
        model_url: String,
    },

    /// Asks the content script to open its try-on overlay for a new session.
    InitializeTryOn {
        #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },

    ShowVirtualTryOn {
        #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },

    HideVirtualTryOn,

    GetProductId,

    GetProductDetails,

    StartTryOn {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },

    StartScan { stream: String },

    UpdateStats {
        #[serde(rename = "verifiedItems", default)]
        verified_items: u64,
        #[serde(rename = "tryOns", default)]
        try_ons: u64,
    },

    /// Tells the popup that the counters changed.
    StatsUpdated { stats: ExtensionStats },

    GetUserProfile,

    UpdateUserProfile { profile: UserProfile },

    GetMeasurements,

    UpdateMeasurements { measurements: BodyMeasurements },
}

impl ExtensionMessage {
    /// The wire tag, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtensionMessage::ProductChanged { .. } => "PRODUCT_CHANGED",
            ExtensionMessage::VerifySustainability { .. } => "VERIFY_SUSTAINABILITY",
            ExtensionMessage::GetCachedProduct { .. } => "GET_CACHED_PRODUCT",
            ExtensionMessage::UpdateSustainability { .. } => "UPDATE_SUSTAINABILITY",
            ExtensionMessage::PrepareVirtualTryOn { .. } => "PREPARE_VIRTUAL_TRY_ON",
            ExtensionMessage::InitializeTryOn { .. } => "INITIALIZE_TRY_ON",
            ExtensionMessage::ShowVirtualTryOn { .. } => "SHOW_VIRTUAL_TRY_ON",
            ExtensionMessage::HideVirtualTryOn => "HIDE_VIRTUAL_TRY_ON",
            ExtensionMessage::GetProductId => "GET_PRODUCT_ID",
            ExtensionMessage::GetProductDetails => "GET_PRODUCT_DETAILS",
            ExtensionMessage::StartTryOn { .. } => "START_TRY_ON",
            ExtensionMessage::StartScan { .. } => "START_SCAN",
            ExtensionMessage::UpdateStats { .. } => "UPDATE_STATS",
            ExtensionMessage::StatsUpdated { .. } => "STATS_UPDATED",
            ExtensionMessage::GetUserProfile => "GET_USER_PROFILE",
            ExtensionMessage::UpdateUserProfile { .. } => "UPDATE_USER_PROFILE",
            ExtensionMessage::GetMeasurements => "GET_MEASUREMENTS",
            ExtensionMessage::UpdateMeasurements { .. } => "UPDATE_MEASUREMENTS",
        }
    }
}

//=========================================================================================
// Replies
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Verification {
        success: bool,
        verified: bool,
        #[serde(default)]
        score: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    CachedProduct {
        #[serde(default)]
        product: Option<ProductSnapshot>,
    },
    ProductId {
        #[serde(rename = "productId", default)]
        product_id: Option<String>,
    },
    ProductDetails { product: ProductSnapshot },
    Scan {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        measurements: Option<BodyMeasurements>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Profile {
        #[serde(default)]
        profile: Option<UserProfile>,
    },
    Measurements {
        #[serde(default)]
        measurements: Option<BodyMeasurements>,
    },
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Ack {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Reply::Ack {
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Reply::Ack { success, .. }
            | Reply::Verification { success, .. }
            | Reply::Scan { success, .. } => *success,
            _ => true,
        }
    }
}
