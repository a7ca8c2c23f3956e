//! services/api/src/adapters/memory.rs
//!
//! An in-process `ProfileRepository`. Used by the integration tests and by anything
//! that needs the API without a PostgreSQL server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use synthstyle_core::domain::{
    AuthSession, Preferences, PreferenceRecord, ProductRecord, Purchase, UserAccount,
    UserProfile,
};
use synthstyle_core::ports::{PortError, PortResult, ProfileRepository};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    preferences: HashMap<String, PreferenceRecord>,
    profiles: HashMap<String, UserProfile>,
    accounts: HashMap<String, UserAccount>,
    auth_sessions: HashMap<String, AuthSession>,
    products: HashMap<String, ProductRecord>,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl ProfileRepository for MemoryRepository {
    async fn upsert_preferences(
        &self,
        user_id: &str,
        preferences: &Preferences,
    ) -> PortResult<PreferenceRecord> {
        let record = PreferenceRecord {
            user_id: user_id.to_string(),
            preferences: preferences.clone(),
            updated_at: Utc::now(),
        };
        self.tables()
            .preferences
            .insert(user_id.to_string(), record.clone());
        Ok(record)
    }

    async fn get_preferences(&self, user_id: &str) -> PortResult<Option<PreferenceRecord>> {
        Ok(self.tables().preferences.get(user_id).cloned())
    }

    async fn upsert_profile(&self, user_id: &str, profile: &UserProfile) -> PortResult<UserProfile> {
        let mut profile = profile.clone();
        profile.user_id = user_id.to_string();
        self.tables()
            .profiles
            .insert(user_id.to_string(), profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, user_id: &str) -> PortResult<Option<UserProfile>> {
        Ok(self.tables().profiles.get(user_id).cloned())
    }

    async fn record_purchase(&self, user_id: &str, purchase: Purchase) -> PortResult<UserProfile> {
        let mut tables = self.tables();
        let profile = tables
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile {
                user_id: user_id.to_string(),
                ..Default::default()
            });
        profile.record_purchase(purchase);
        Ok(profile.clone())
    }

    async fn clear_user_data(&self, user_id: &str) -> PortResult<()> {
        let mut tables = self.tables();
        tables.preferences.remove(user_id);
        tables.profiles.remove(user_id);
        Ok(())
    }

    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> PortResult<UserAccount> {
        let mut tables = self.tables();
        if tables.accounts.contains_key(email) {
            return Err(PortError::Invalid("User already exists".to_string()));
        }
        let account = UserAccount {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
        };
        tables.accounts.insert(email.to_string(), account.clone());
        Ok(account)
    }

    async fn get_account_by_email(&self, email: &str) -> PortResult<UserAccount> {
        self.tables()
            .accounts
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<AuthSession> {
        let session = AuthSession {
            id: session_id.to_string(),
            account_id,
            expires_at,
        };
        self.tables()
            .auth_sessions
            .insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        self.tables()
            .auth_sessions
            .get(session_id)
            .filter(|s| s.expires_at > Utc::now())
            .map(|s| s.account_id)
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables().auth_sessions.remove(session_id);
        Ok(())
    }

    async fn get_product(&self, product_id: &str) -> PortResult<ProductRecord> {
        self.tables()
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Product {} not found", product_id)))
    }

    async fn search_products(
        &self,
        query: Option<&str>,
        category: Option<&str>,
        brand: Option<&str>,
        limit: usize,
    ) -> PortResult<Vec<ProductRecord>> {
        let tables = self.tables();
        let mut matches: Vec<ProductRecord> = tables
            .products
            .values()
            .filter(|p| {
                query.map_or(true, |q| {
                    contains_ignore_case(&p.name, q)
                        || contains_ignore_case(&p.brand, q)
                        || p.description
                            .as_deref()
                            .is_some_and(|d| contains_ignore_case(d, q))
                })
            })
            .filter(|p| category.map_or(true, |c| contains_ignore_case(&p.category, c)))
            .filter(|p| brand.map_or(true, |b| p.brand == b))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.sustainability
                .overall_score
                .cmp(&a.sustainability.overall_score)
                .then_with(|| a.name.cmp(&b.name))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn save_product(&self, product: &ProductRecord) -> PortResult<ProductRecord> {
        self.tables()
            .products
            .insert(product.id.clone(), product.clone());
        Ok(product.clone())
    }
}
