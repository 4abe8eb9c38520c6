//! feeswap - fee-splitting swap transaction builder for Solana
//!
//! Prices aggregator routes at a platform + referrer fee, then turns a stored
//! quote into one partially signed V0 transaction that swaps for the user and
//! pays the fee out to the referrer and the treasury atomically.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod observability;
pub mod quote;
pub mod signers;
pub mod store;
pub mod tx_builder;
pub mod wallet;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;


// Re-export commonly used types
pub use lifecycle::{BuildByIdParams, QuoteParams, SwapResponse, SwapService};
pub use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
pub use tx_builder::{SwapError, SwapTxBuilder};
