//! Build output and its wire form
//!
//! [`SwapBuildOutput`] is what the pipeline produces: the transaction plus
//! what it took to build it. [`BuildResult`] is the single-use response shape
//! streamed back to the caller, with the transaction encoded for transport.
//!
//! ## Partial signatures
//! The end user is always the fee payer (signature slot 0) and is always
//! missing from the returned transaction. The fee-vault authority's slot is
//! filled only when the plan moved fees out of the vault.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};

use crate::aggregator::SwapInstructionsResponse;
use crate::ledger::SimulationOutcome;
use crate::tx_builder::errors::SwapError;
use crate::tx_builder::fee::FeeSplit;

/// Largest serialized transaction the network accepts
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Transaction build output
#[derive(Debug, Clone)]
pub struct SwapBuildOutput {
    pub tx: VersionedTransaction,

    /// Block height ceiling for the transaction's blockhash
    pub last_valid_block_height: u64,

    pub fee_split: FeeSplit,
    pub fee_mint: Pubkey,

    /// Whether the fee-vault authority signed
    pub server_signed: bool,

    /// Signature-slot order, fee payer first
    pub required_signers: Vec<Pubkey>,

    /// Raw aggregator bundle, kept for debugging
    pub aggregator_bundle: SwapInstructionsResponse,

    pub simulation: Option<SimulationOutcome>,
}

impl SwapBuildOutput {
    pub fn new(
        tx: VersionedTransaction,
        last_valid_block_height: u64,
        fee_split: FeeSplit,
        fee_mint: Pubkey,
        server_signed: bool,
        aggregator_bundle: SwapInstructionsResponse,
    ) -> Self {
        let required_signers = crate::signers::required_signers(&tx.message).to_vec();
        Self {
            tx,
            last_valid_block_height,
            fee_split,
            fee_mint,
            server_signed,
            required_signers,
            aggregator_bundle,
            simulation: None,
        }
    }

    /// Signers that still have to sign before broadcast
    pub fn missing_signers(&self) -> Vec<Pubkey> {
        crate::signers::missing_signers(&self.tx)
    }

    pub fn into_result(self) -> Result<BuildResult, SwapError> {
        let transaction_base64 = encode_transaction(&self.tx)?;
        let missing_signers = self
            .missing_signers()
            .iter()
            .map(ToString::to_string)
            .collect();

        Ok(BuildResult {
            transaction_base64,
            last_valid_block_height: self.last_valid_block_height,
            fee_split: self.fee_split,
            fee_mint: self.fee_mint.to_string(),
            server_signed: self.server_signed,
            missing_signers,
            swap_instructions: self.aggregator_bundle,
            simulation: self.simulation,
        })
    }
}

/// Serialized, transport-encoded build result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub transaction_base64: String,
    pub last_valid_block_height: u64,
    pub fee_split: FeeSplit,
    pub fee_mint: String,
    pub server_signed: bool,
    pub missing_signers: Vec<String>,
    pub swap_instructions: SwapInstructionsResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationOutcome>,
}

/// Wire-encode a transaction as base64 of its bincode serialization
///
/// Fails if the result would not fit in a single packet.
pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String, SwapError> {
    let bytes = bincode::serialize(tx)
        .map_err(|e| SwapError::internal(format!("failed to serialize transaction: {e}")))?;
    if bytes.len() > MAX_TRANSACTION_SIZE {
        return Err(SwapError::internal(format!(
            "transaction is {} bytes, above the {MAX_TRANSACTION_SIZE} byte limit",
            bytes.len()
        )));
    }
    Ok(BASE64_STANDARD.encode(bytes))
}

/// Inverse of [`encode_transaction`]
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, SwapError> {
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| SwapError::validation(format!("transaction is not base64: {e}")))?;
    bincode::deserialize(&bytes)
        .map_err(|e| SwapError::validation(format!("transaction does not decode: {e}")))
}
