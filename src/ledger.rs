//! Ledger RPC collaborator
//!
//! A narrow async surface over the Solana JSON-RPC API: the handful of reads
//! the builder needs plus an optional dry-run. Everything network-facing is
//! behind [`LedgerRpc`] so the pipeline can be driven by an in-memory fake in
//! tests.
//!
//! ## Timeouts
//! Every call on [`SolanaLedger`] is bounded by `tokio::time::timeout`. A call
//! that overruns maps to [`LedgerError::Timeout`], which the pipeline surfaces
//! as a retryable upstream failure.

use async_trait::async_trait;
use serde::Serialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::RpcSimulateTransactionConfig;
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    transaction::VersionedTransaction,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Ledger RPC errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("{operation} failed: {message}")]
    Rpc {
        operation: &'static str,
        message: String,
    },
}

impl LedgerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Recent block reference a transaction is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReference {
    pub blockhash: Hash,
    /// Last block height at which a transaction using `blockhash` can land
    pub last_valid_block_height: u64,
}

/// Result of a dry-run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutcome {
    /// Runtime error, if the transaction would fail
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

impl SimulationOutcome {
    pub fn succeeded(&self) -> bool {
        self.err.is_none()
    }
}

/// Ledger reads used while building swap transactions
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fetch one account; `Ok(None)` when it does not exist
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError>;

    /// Fetch several accounts in one round trip, preserving order
    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, LedgerError>;

    async fn latest_block_reference(&self) -> Result<BlockReference, LedgerError>;

    /// Dry-run a transaction without signature verification
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome, LedgerError>;
}

/// [`LedgerRpc`] backed by the nonblocking Solana RPC client
pub struct SolanaLedger {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    timeout: Duration,
}

impl SolanaLedger {
    pub fn new(url: impl Into<String>, commitment: CommitmentConfig, timeout: Duration) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(url.into(), timeout, commitment);
        Self {
            client: Arc::new(client),
            commitment,
            timeout,
        }
    }

    async fn bounded<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(LedgerError::Rpc {
                operation,
                message: e.to_string(),
            }),
            Err(_) => Err(LedgerError::Timeout {
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl LedgerRpc for SolanaLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        let response = self
            .bounded(
                "get_account",
                self.client
                    .get_account_with_commitment(address, self.commitment),
            )
            .await?;
        Ok(response.value)
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, LedgerError> {
        if addresses.is_empty() {
            return Ok(vec![]);
        }
        let response = self
            .bounded(
                "get_multiple_accounts",
                self.client
                    .get_multiple_accounts_with_commitment(addresses, self.commitment),
            )
            .await?;
        debug!(requested = addresses.len(), "Batched account fetch");
        Ok(response.value)
    }

    async fn latest_block_reference(&self) -> Result<BlockReference, LedgerError> {
        let (blockhash, last_valid_block_height) = self
            .bounded(
                "get_latest_blockhash",
                self.client
                    .get_latest_blockhash_with_commitment(self.commitment),
            )
            .await?;
        Ok(BlockReference {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome, LedgerError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .bounded(
                "simulate_transaction",
                self.client.simulate_transaction_with_config(tx, config),
            )
            .await?;
        let value = response.value;
        Ok(SimulationOutcome {
            err: value.err.map(|e| format!("{e:?}")),
            logs: value.logs.unwrap_or_default(),
            units_consumed: value.units_consumed,
        })
    }
}
