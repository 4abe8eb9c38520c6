//! Persistence for quotes, users and referrals
//!
//! Two interchangeable backends:
//! - [`memory`]: `DashMap` tables, optionally seeded from a JSON file
//! - [`sled_store`]: embedded on-disk quote table for single-node deployments
//!
//! Quotes are write-once. `create` never overwrites; a second create with the
//! same id fails with [`StoreError::AlreadyExists`].

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::{Referral, User};
use crate::quote::Quote;

pub mod memory;
pub mod sled_store;

pub use memory::{IdentitySeed, MemoryIdentityStore, MemoryQuoteStore};
pub use sled_store::SledQuoteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Failed to encode or decode record: {0}")]
    Codec(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Insert a new quote; fails if the id is taken
    async fn create(&self, quote: &Quote) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Quote>, StoreError>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn get_referral_by_slug(&self, slug: &str) -> Result<Option<Referral>, StoreError>;
}
