//! crates/synthstyle_core/src/domain.rs
//!
//! Defines the core data structures shared by the backend and the extension contexts.
//! Everything here serializes with camelCase field names, which is the wire shape used
//! by both the HTTP API and the extension's local store.

use crate::ports::{PortError, PortResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub const MIN_MAX_PRICE: f64 = 50.0;
pub const MAX_MAX_PRICE: f64 = 500.0;
const DEFAULT_MAX_PRICE: f64 = 200.0;

/// Score above which a product counts as sustainable.
pub const POSITIVE_SCORE_THRESHOLD: u8 = 70;

//=========================================================================================
// Preferences
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StyleTag {
    Casual,
    Formal,
    Sporty,
    Vintage,
    Minimalist,
    Bohemian,
    Streetwear,
    Classic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SustainabilityPreferences {
    #[serde(default = "default_true")]
    pub prefer_organic: bool,
    #[serde(default = "default_true")]
    pub prefer_recycled: bool,
    #[serde(default = "default_max_price", alias = "maxPriceRange")]
    pub max_price: f64,
}

fn default_true() -> bool {
    true
}

fn default_max_price() -> f64 {
    DEFAULT_MAX_PRICE
}

impl Default for SustainabilityPreferences {
    fn default() -> Self {
        Self {
            prefer_organic: true,
            prefer_recycled: true,
            max_price: DEFAULT_MAX_PRICE,
        }
    }
}

/// A user's style and sustainability preferences, as edited in the popup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub style: BTreeSet<StyleTag>,
    #[serde(default)]
    pub sustainability: SustainabilityPreferences,
}

impl Preferences {
    pub fn validate(&self) -> PortResult<()> {
        let max_price = self.sustainability.max_price;
        if !(MIN_MAX_PRICE..=MAX_MAX_PRICE).contains(&max_price) {
            return Err(PortError::Invalid(format!(
                "maxPrice must be between {} and {}, got {}",
                MIN_MAX_PRICE, MAX_MAX_PRICE, max_price
            )));
        }
        Ok(())
    }
}

/// The durable copy of a user's preferences, keyed by `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
    pub user_id: String,
    #[serde(flatten)]
    pub preferences: Preferences,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyMeasurements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bust: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chest: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waist: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hips: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inseam: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoulder_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm_length: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StylePreferences {
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_preference: Option<String>,
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub occasions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub product_id: String,
    pub purchased_at: DateTime<Utc>,
    pub price: f64,
    pub sustainability_score: f64,
}

/// The shopper's profile. `sustainability_score` is always the mean of the
/// purchase scores and is recomputed whenever a purchase is recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<BodyMeasurements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_preferences: Option<StylePreferences>,
    #[serde(default)]
    pub purchase_history: Vec<Purchase>,
    #[serde(default)]
    pub sustainability_score: f64,
}

impl UserProfile {
    pub fn record_purchase(&mut self, purchase: Purchase) -> f64 {
        self.purchase_history.push(purchase);
        self.recompute_sustainability_score()
    }

    pub fn recompute_sustainability_score(&mut self) -> f64 {
        let count = self.purchase_history.len();
        self.sustainability_score = if count == 0 {
            0.0
        } else {
            let total: f64 = self
                .purchase_history
                .iter()
                .map(|p| p.sustainability_score)
                .sum();
            total / count as f64
        };
        self.sustainability_score
    }
}

// Only used by the backend for login/registration - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Products
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub name: String,
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sustainability_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recycled_content: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organic_content: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SustainabilityMetrics {
    #[serde(default)]
    pub overall_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_footprint: Option<f64>,
    #[serde(default)]
    pub recycled_materials: bool,
    #[serde(default)]
    pub organic_materials: bool,
    #[serde(default)]
    pub sustainable_packaging: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_efficiency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waste_management: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labor_conditions: Option<f64>,
}

impl SustainabilityMetrics {
    /// Recomputes `overall_score` as the rounded mean of the eight component scores.
    /// Missing numbers count as 0, flags count as 100 when set.
    pub fn recompute(&mut self) -> u8 {
        let flag = |set: bool| if set { 100.0 } else { 0.0 };
        let components = [
            self.water_usage.unwrap_or(0.0),
            self.carbon_footprint.unwrap_or(0.0),
            flag(self.recycled_materials),
            flag(self.organic_materials),
            flag(self.sustainable_packaging),
            self.energy_efficiency.unwrap_or(0.0),
            self.waste_management.unwrap_or(0.0),
            self.labor_conditions.unwrap_or(0.0),
        ];
        let mean = components.iter().sum::<f64>() / components.len() as f64;
        self.overall_score = mean.round().clamp(0.0, 100.0) as u8;
        self.overall_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub current: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ratings {
    #[serde(default)]
    pub average: f64,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub sustainability: SustainabilityMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    #[serde(default)]
    pub ratings: Ratings,
}

//=========================================================================================
// Extension-side values
//=========================================================================================

/// A best-effort view of the product shown on a shopping page. Any field may be
/// missing when the page does not match the expected layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProductSnapshot {
    /// Whether the product belongs to a category that supports virtual try-on.
    pub fn supports_try_on(&self) -> bool {
        self.category
            .as_deref()
            .is_some_and(|c| c.contains("Clothing") || c.contains("Shoes"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,
    pub score: u8,
    #[serde(default)]
    pub certifications: Vec<String>,
}

impl VerificationResult {
    pub fn unverified() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionStats {
    #[serde(default)]
    pub verified_items: u64,
    #[serde(default)]
    pub try_ons: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleAdvice {
    pub summary: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}
