//! In-memory stores

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use super::{IdentityStore, QuoteStore, StoreError};
use crate::identity::{Referral, User};
use crate::quote::Quote;

#[derive(Debug, Default)]
pub struct MemoryQuoteStore {
    quotes: DashMap<String, Quote>,
}

impl MemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[async_trait]
impl QuoteStore for MemoryQuoteStore {
    async fn create(&self, quote: &Quote) -> Result<(), StoreError> {
        match self.quotes.entry(quote.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(quote.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(quote.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Quote>, StoreError> {
        Ok(self.quotes.get(id).map(|q| q.value().clone()))
    }
}

/// Users and referrals loaded at startup
#[derive(Debug, Default, Deserialize)]
pub struct IdentitySeed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub referrals: Vec<Referral>,
}

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    users: DashMap<String, User>,
    /// Keyed by slug
    referrals: DashMap<String, Referral>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: IdentitySeed) -> Self {
        let store = Self::new();
        for user in seed.users {
            store.insert_user(user);
        }
        for referral in seed.referrals {
            store.insert_referral(referral);
        }
        store
    }

    /// Load a JSON seed file of the form `{"users": [...], "referrals": [...]}`
    pub async fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Backend(format!("{}: {e}", path.display())))?;
        let seed: IdentitySeed = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            users = seed.users.len(),
            referrals = seed.referrals.len(),
            "Loaded identity seed"
        );
        Ok(Self::from_seed(seed))
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn insert_referral(&self, referral: Referral) {
        self.referrals.insert(referral.slug.clone(), referral);
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn get_referral_by_slug(&self, slug: &str) -> Result<Option<Referral>, StoreError> {
        Ok(self.referrals.get(slug).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_quote, sample_referral, sample_user};
    use chrono::Utc;
    use std::io::Write;

    #[tokio::test]
    async fn test_create_is_write_once() {
        let store = MemoryQuoteStore::new();
        let quote = sample_quote(Utc::now());
        store.create(&quote).await.unwrap();

        let mut changed = quote.clone();
        changed.slippage_bps = 999;
        let err = store.create(&changed).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        let stored = store.get(&quote.id).await.unwrap().unwrap();
        assert_eq!(stored.slippage_bps, quote.slippage_bps);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_quote_is_none() {
        let store = MemoryQuoteStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seed_file() {
        let seed = serde_json::json!({
            "users": [sample_user()],
            "referrals": [sample_referral()],
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(seed.to_string().as_bytes()).unwrap();

        let store = MemoryIdentityStore::from_seed_file(file.path()).await.unwrap();
        let referral = store
            .get_referral_by_slug(&sample_referral().slug)
            .await
            .unwrap()
            .unwrap();
        let user = store.get_user(&referral.user_id).await.unwrap().unwrap();
        assert_eq!(user.wallet_address, sample_user().wallet_address);
    }

    #[tokio::test]
    async fn test_bad_seed_is_codec_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = MemoryIdentityStore::from_seed_file(file.path())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }
}
