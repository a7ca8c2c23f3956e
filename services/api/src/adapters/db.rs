//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ProfileRepository` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgExecutor, PgPool};
use std::collections::BTreeSet;
use synthstyle_core::domain::{
    AuthSession, BodyMeasurements, Material, Preferences, PreferenceRecord, Price,
    ProductRecord, Purchase, Ratings, StylePreferences, StyleTag, SustainabilityMetrics,
    SustainabilityPreferences, UserAccount, UserProfile,
};
use synthstyle_core::ports::{PortError, PortResult, ProfileRepository};
use tracing::{debug, instrument};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ProfileRepository` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct PreferenceRow {
    user_id: String,
    style: Json<BTreeSet<StyleTag>>,
    sustainability: Json<SustainabilityPreferences>,
    updated_at: DateTime<Utc>,
}
impl PreferenceRow {
    fn to_domain(self) -> PreferenceRecord {
        PreferenceRecord {
            user_id: self.user_id,
            preferences: Preferences {
                style: self.style.0,
                sustainability: self.sustainability.0,
            },
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ProfileRow {
    user_id: String,
    email: Option<String>,
    name: Option<String>,
    measurements: Option<Json<BodyMeasurements>>,
    style_preferences: Option<Json<StylePreferences>>,
    purchase_history: Json<Vec<Purchase>>,
    sustainability_score: f64,
}
impl ProfileRow {
    fn to_domain(self) -> UserProfile {
        UserProfile {
            user_id: self.user_id,
            email: self.email,
            name: self.name,
            measurements: self.measurements.map(|m| m.0),
            style_preferences: self.style_preferences.map(|s| s.0),
            purchase_history: self.purchase_history.0,
            sustainability_score: self.sustainability_score,
        }
    }
}

#[derive(FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
}
impl AccountRow {
    fn to_domain(self) -> UserAccount {
        UserAccount {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            name: self.name,
        }
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: String,
    name: String,
    brand: String,
    category: String,
    description: Option<String>,
    price: Json<Price>,
    materials: Json<Vec<Material>>,
    sustainability: Json<SustainabilityMetrics>,
    blockchain_ref: Option<String>,
    model_url: Option<String>,
    ratings: Json<Ratings>,
}
impl ProductRow {
    fn to_domain(self) -> ProductRecord {
        ProductRecord {
            id: self.id,
            name: self.name,
            brand: self.brand,
            category: self.category,
            description: self.description,
            price: self.price.0,
            materials: self.materials.0,
            sustainability: self.sustainability.0,
            blockchain_ref: self.blockchain_ref,
            model_url: self.model_url,
            ratings: self.ratings.0,
        }
    }
}

const PROFILE_COLUMNS: &str = "user_id, email, name, measurements, style_preferences, \
     purchase_history, sustainability_score";

const PRODUCT_COLUMNS: &str = "id, name, brand, category, description, price, materials, \
     sustainability, blockchain_ref, model_url, ratings";

async fn write_profile<'e>(
    executor: impl PgExecutor<'e>,
    profile: &UserProfile,
) -> PortResult<UserProfile> {
    let query = format!(
        "INSERT INTO user_profiles ({cols}, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, now())
         ON CONFLICT (user_id) DO UPDATE SET
             email = EXCLUDED.email,
             name = EXCLUDED.name,
             measurements = EXCLUDED.measurements,
             style_preferences = EXCLUDED.style_preferences,
             purchase_history = EXCLUDED.purchase_history,
             sustainability_score = EXCLUDED.sustainability_score,
             updated_at = now()
         RETURNING {cols}",
        cols = PROFILE_COLUMNS
    );
    let record = sqlx::query_as::<_, ProfileRow>(&query)
        .bind(&profile.user_id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(profile.measurements.as_ref().map(Json))
        .bind(profile.style_preferences.as_ref().map(Json))
        .bind(Json(&profile.purchase_history))
        .bind(profile.sustainability_score)
        .fetch_one(executor)
        .await
        .map_err(unexpected)?;
    Ok(record.to_domain())
}

//=========================================================================================
// `ProfileRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProfileRepository for DbAdapter {
    // --- Preferences ---

    async fn upsert_preferences(
        &self,
        user_id: &str,
        preferences: &Preferences,
    ) -> PortResult<PreferenceRecord> {
        let record = sqlx::query_as::<_, PreferenceRow>(
            "INSERT INTO preferences (user_id, style, sustainability, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (user_id) DO UPDATE SET
                 style = EXCLUDED.style,
                 sustainability = EXCLUDED.sustainability,
                 updated_at = now()
             RETURNING user_id, style, sustainability, updated_at",
        )
        .bind(user_id)
        .bind(Json(&preferences.style))
        .bind(Json(&preferences.sustainability))
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    #[instrument(skip(self))]
    async fn get_preferences(&self, user_id: &str) -> PortResult<Option<PreferenceRecord>> {
        let record = sqlx::query_as::<_, PreferenceRow>(
            "SELECT user_id, style, sustainability, updated_at FROM preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(PreferenceRow::to_domain))
    }

    // --- Profiles ---

    async fn upsert_profile(&self, user_id: &str, profile: &UserProfile) -> PortResult<UserProfile> {
        let mut profile = profile.clone();
        profile.user_id = user_id.to_string();
        write_profile(&self.pool, &profile).await
    }

    #[instrument(skip(self))]
    async fn get_profile(&self, user_id: &str) -> PortResult<Option<UserProfile>> {
        let query = format!("SELECT {} FROM user_profiles WHERE user_id = $1", PROFILE_COLUMNS);
        let record = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(ProfileRow::to_domain))
    }

    #[instrument(skip(self, purchase), fields(product_id = %purchase.product_id))]
    async fn record_purchase(&self, user_id: &str, purchase: Purchase) -> PortResult<UserProfile> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The row must exist before it can be locked; concurrent first purchases
        // otherwise both start from an empty history.
        sqlx::query("INSERT INTO user_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let query = format!(
            "SELECT {} FROM user_profiles WHERE user_id = $1 FOR UPDATE",
            PROFILE_COLUMNS
        );
        let mut profile = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?
            .to_domain();
        let score = profile.record_purchase(purchase);
        debug!("Sustainability score for {} is now {:.1}.", user_id, score);

        let saved = write_profile(&mut *tx, &profile).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(saved)
    }

    async fn clear_user_data(&self, user_id: &str) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("DELETE FROM preferences WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query("DELETE FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    // --- Accounts ---

    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> PortResult<UserAccount> {
        let record = sqlx::query_as::<_, AccountRow>(
            "INSERT INTO accounts (id, email, password_hash, name) VALUES ($1, $2, $3, $4)
             RETURNING id, email, password_hash, name",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return PortError::Invalid("User already exists".to_string());
                }
            }
            unexpected(e)
        })?;
        Ok(record.to_domain())
    }

    async fn get_account_by_email(&self, email: &str) -> PortResult<UserAccount> {
        let record = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash, name FROM accounts WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<AuthSession> {
        sqlx::query("INSERT INTO auth_sessions (id, account_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(account_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(AuthSession {
            id: session_id.to_string(),
            account_id,
            expires_at,
        })
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT account_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Products ---

    #[instrument(skip(self))]
    async fn get_product(&self, product_id: &str) -> PortResult<ProductRecord> {
        let query = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        let record = sqlx::query_as::<_, ProductRow>(&query)
            .bind(product_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Product {} not found", product_id))
                }
                _ => unexpected(e),
            })?;
        Ok(record.to_domain())
    }

    #[instrument(skip(self))]
    async fn search_products(
        &self,
        query: Option<&str>,
        category: Option<&str>,
        brand: Option<&str>,
        limit: usize,
    ) -> PortResult<Vec<ProductRecord>> {
        let sql = format!(
            "SELECT {} FROM products
             WHERE ($1::TEXT IS NULL
                    OR name ILIKE '%' || $1 || '%'
                    OR description ILIKE '%' || $1 || '%'
                    OR brand ILIKE '%' || $1 || '%')
               AND ($2::TEXT IS NULL OR category ILIKE '%' || $2 || '%')
               AND ($3::TEXT IS NULL OR brand = $3)
             ORDER BY overall_score DESC, name ASC
             LIMIT $4",
            PRODUCT_COLUMNS
        );
        let records = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(query)
            .bind(category)
            .bind(brand)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(ProductRow::to_domain).collect())
    }

    async fn save_product(&self, product: &ProductRecord) -> PortResult<ProductRecord> {
        let sql = format!(
            "INSERT INTO products ({cols}, overall_score, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
             ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 brand = EXCLUDED.brand,
                 category = EXCLUDED.category,
                 description = EXCLUDED.description,
                 price = EXCLUDED.price,
                 materials = EXCLUDED.materials,
                 sustainability = EXCLUDED.sustainability,
                 blockchain_ref = EXCLUDED.blockchain_ref,
                 model_url = EXCLUDED.model_url,
                 ratings = EXCLUDED.ratings,
                 overall_score = EXCLUDED.overall_score,
                 updated_at = now()
             RETURNING {cols}",
            cols = PRODUCT_COLUMNS
        );
        let record = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&product.id)
            .bind(&product.name)
            .bind(&product.brand)
            .bind(&product.category)
            .bind(&product.description)
            .bind(Json(&product.price))
            .bind(Json(&product.materials))
            .bind(Json(&product.sustainability))
            .bind(&product.blockchain_ref)
            .bind(&product.model_url)
            .bind(Json(&product.ratings))
            .bind(i16::from(product.sustainability.overall_score))
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }
}
