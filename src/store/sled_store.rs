//! sled-backed quote table
//!
//! Quotes are stored as JSON under their id. Create-if-absent is a single
//! `compare_and_swap` against an empty slot, so two writers racing on the
//! same id cannot both win.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use super::{QuoteStore, StoreError};
use crate::quote::Quote;

const TREE_QUOTES: &str = "quotes";

#[derive(Clone)]
pub struct SledQuoteStore {
    quotes: sled::Tree,
}

impl SledQuoteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::Config::new().path(path).open()?;
        let quotes = db.open_tree(TREE_QUOTES)?;
        Ok(Self { quotes })
    }

    /// Throwaway database, deleted on drop
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let quotes = db.open_tree(TREE_QUOTES)?;
        Ok(Self { quotes })
    }
}

#[async_trait]
impl QuoteStore for SledQuoteStore {
    async fn create(&self, quote: &Quote) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(quote)?;
        let tree = self.quotes.clone();
        let id = quote.id.clone();

        tokio::task::spawn_blocking(move || {
            let swapped = tree.compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(bytes))?;
            if swapped.is_err() {
                return Err(StoreError::AlreadyExists(id));
            }
            tree.flush()?;
            debug!(quote_id = %id, "Quote persisted");
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }

    async fn get(&self, id: &str) -> Result<Option<Quote>, StoreError> {
        let tree = self.quotes.clone();
        let id = id.to_string();

        let raw = tokio::task::spawn_blocking(move || tree.get(id.as_bytes()))
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))??;

        raw.map(|bytes| serde_json::from_slice(&bytes).map_err(StoreError::from))
            .transpose()
    }
}
