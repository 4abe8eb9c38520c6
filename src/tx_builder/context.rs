//! Per-build context
//!
//! Holds the block reference a transaction is anchored to plus the trace
//! context every pipeline stage logs against. Built once, after the
//! instruction plan is known, so the blockhash is as fresh as possible when
//! the transaction is handed back.

use solana_sdk::hash::Hash;

use crate::ledger::{BlockReference, LedgerRpc};
use crate::observability::TraceContext;
use crate::tx_builder::errors::SwapError;

#[derive(Debug, Clone)]
pub struct BuildContext {
    pub block: BlockReference,
    pub trace: TraceContext,
}

impl BuildContext {
    /// Fetch a fresh block reference for this build
    pub async fn fetch(ledger: &dyn LedgerRpc, trace: &TraceContext) -> Result<Self, SwapError> {
        let block = ledger.latest_block_reference().await?;
        Ok(Self {
            block,
            trace: trace.stage("assemble_transaction"),
        })
    }

    pub fn blockhash(&self) -> Hash {
        self.block.blockhash
    }

    /// Block height after which the transaction can no longer land
    pub fn validity_ceiling(&self) -> u64 {
        self.block.last_valid_block_height
    }
}
