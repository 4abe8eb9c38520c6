//! Liquidity aggregator collaborator
//!
//! The aggregator prices routes and returns the swap as an instruction
//! bundle. Its swap instruction is a black box to us: we decode program id,
//! accounts and data bytes, nothing more.

use async_trait::async_trait;
use thiserror::Error;

mod jupiter;
mod types;

pub use jupiter::JupiterClient;
pub use types::{
    PlatformFee, QuoteRequest, QuoteResponse, SwapBundle, SwapInstructionsRequest,
    SwapInstructionsResponse, WireAccountMeta, WireInstruction,
};

/// Aggregator client errors
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Timeout after {timeout_ms}ms calling {endpoint}")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Transport error calling {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Aggregator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode aggregator response: {0}")]
    Decode(String),

    #[error("Invalid instruction in aggregator bundle: {0}")]
    InvalidInstruction(String),
}

impl AggregatorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Quote and swap-instruction source
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Price a route
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, AggregatorError>;

    /// Turn a previously priced route into an instruction bundle for `userPublicKey`
    async fn swap_instructions(
        &self,
        request: &SwapInstructionsRequest,
    ) -> Result<SwapInstructionsResponse, AggregatorError>;
}
