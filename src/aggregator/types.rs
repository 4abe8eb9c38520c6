//! Aggregator wire types
//!
//! The quote route is kept as an opaque payload: the handful of fields the
//! fee math needs are typed, everything else rides in `extra` and is sent
//! back to the aggregator verbatim at build time.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use std::str::FromStr;

use super::AggregatorError;

/// Platform fee as reported by the aggregator inside a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFee {
    pub amount: String,
    pub fee_bps: u16,
}

/// Priced route returned by the aggregator's quote endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: String,
    pub in_amount: String,
    pub output_mint: String,
    pub out_amount: String,
    pub other_amount_threshold: String,
    pub swap_mode: String,
    pub slippage_bps: u16,
    #[serde(default)]
    pub platform_fee: Option<PlatformFee>,
    /// Route plan, price impact, context slot and anything else we don't read
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl QuoteResponse {
    pub fn in_amount_atoms(&self) -> Result<u128, AggregatorError> {
        parse_atoms("inAmount", &self.in_amount)
    }

    pub fn out_amount_atoms(&self) -> Result<u128, AggregatorError> {
        parse_atoms("outAmount", &self.out_amount)
    }

    /// Minimum output after slippage
    pub fn other_amount_threshold_atoms(&self) -> Result<u128, AggregatorError> {
        parse_atoms("otherAmountThreshold", &self.other_amount_threshold)
    }
}

fn parse_atoms(field: &str, raw: &str) -> Result<u128, AggregatorError> {
    raw.parse::<u128>()
        .map_err(|_| AggregatorError::Decode(format!("{field} is not an integer: '{raw}'")))
}

/// Parameters for a fresh quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u128,
    pub slippage_bps: u16,
    pub platform_fee_bps: u16,
    pub swap_mode: String,
    pub dynamic_slippage: bool,
}

/// Body of the swap-instructions call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsRequest {
    pub quote_response: QuoteResponse,
    pub user_public_key: String,
    /// Token account that receives the platform fee skim
    pub fee_account: Option<String>,
    pub dynamic_slippage: bool,
    pub dynamic_compute_unit_limit: bool,
    pub wrap_and_unwrap_sol: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAccountMeta {
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// One instruction as the aggregator serializes it; `data` is base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInstruction {
    pub program_id: String,
    pub accounts: Vec<WireAccountMeta>,
    pub data: String,
}

impl WireInstruction {
    /// Decode just enough to place the instruction in a transaction
    pub fn decode(&self) -> Result<Instruction, AggregatorError> {
        let program_id = parse_pubkey("programId", &self.program_id)?;
        let accounts = self
            .accounts
            .iter()
            .map(|meta| {
                Ok(AccountMeta {
                    pubkey: parse_pubkey("account", &meta.pubkey)?,
                    is_signer: meta.is_signer,
                    is_writable: meta.is_writable,
                })
            })
            .collect::<Result<Vec<_>, AggregatorError>>()?;
        let data = BASE64_STANDARD.decode(&self.data).map_err(|e| {
            AggregatorError::InvalidInstruction(format!("data for {program_id} is not base64: {e}"))
        })?;

        Ok(Instruction {
            program_id,
            accounts,
            data,
        })
    }
}

fn parse_pubkey(field: &str, raw: &str) -> Result<Pubkey, AggregatorError> {
    Pubkey::from_str(raw)
        .map_err(|_| AggregatorError::InvalidInstruction(format!("{field} '{raw}' is not a pubkey")))
}

/// Instruction bundle returned by the swap-instructions endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsResponse {
    #[serde(default)]
    pub compute_budget_instructions: Vec<WireInstruction>,
    /// Extra instructions such as tips; placed right after compute budget
    #[serde(default)]
    pub other_instructions: Vec<WireInstruction>,
    #[serde(default)]
    pub setup_instructions: Vec<WireInstruction>,
    pub swap_instruction: WireInstruction,
    #[serde(default)]
    pub cleanup_instruction: Option<WireInstruction>,
    #[serde(default)]
    pub address_lookup_table_addresses: Vec<String>,
}

/// [`SwapInstructionsResponse`] decoded into SDK instructions
#[derive(Debug, Clone)]
pub struct SwapBundle {
    pub compute_budget: Vec<Instruction>,
    pub other: Vec<Instruction>,
    pub setup: Vec<Instruction>,
    pub swap: Instruction,
    pub cleanup: Option<Instruction>,
    pub lookup_table_addresses: Vec<Pubkey>,
}

impl SwapInstructionsResponse {
    pub fn decode(&self) -> Result<SwapBundle, AggregatorError> {
        let decode_all = |ixs: &[WireInstruction]| {
            ixs.iter()
                .map(WireInstruction::decode)
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(SwapBundle {
            compute_budget: decode_all(&self.compute_budget_instructions)?,
            other: decode_all(&self.other_instructions)?,
            setup: decode_all(&self.setup_instructions)?,
            swap: self.swap_instruction.decode()?,
            cleanup: self
                .cleanup_instruction
                .as_ref()
                .map(WireInstruction::decode)
                .transpose()?,
            lookup_table_addresses: self
                .address_lookup_table_addresses
                .iter()
                .map(|raw| parse_pubkey("addressLookupTableAddress", raw))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}
