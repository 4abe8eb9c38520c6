//! Error types for the swap transaction pipeline
//!
//! Every failure that can leave the quote-to-transaction pipeline is one of
//! the variants below. Errors are designed to be:
//! - Typed: callers branch on the variant, never on message text
//! - Retry-aware: only upstream failures are worth retrying
//! - Safe to log: no variant ever carries key material
//!
//! Collaborator errors (aggregator, ledger, stores, custody) convert into
//! [`SwapError`] via `From` so the pipeline can use `?` throughout.

use thiserror::Error;

use crate::aggregator::AggregatorError;
use crate::ledger::LedgerError;
use crate::store::StoreError;
use crate::wallet::KeyLoadError;

/// Error type for every quote and build operation
#[derive(Error, Debug)]
pub enum SwapError {
    /// Malformed or out-of-range input
    ///
    /// This includes:
    /// - Basis points outside [0, 10 000]
    /// - Claimed input mint/amount disagreeing with the quote
    /// - Unparsable public keys or amounts
    #[error("Validation error: {0}")]
    Validation(String),

    /// A quote, referral or referrer user does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The quote is past its expiry time
    #[error("Resource expired: {0}")]
    ResourceExpired(String),

    /// The request is well-formed but cannot be honoured
    ///
    /// This includes:
    /// - Total fee bps above 10 000
    /// - Referrer share exceeding the total fee
    /// - Swap modes other than exact-input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Aggregator, ledger RPC or store failure, including timeouts
    #[error("Upstream error ({service}): {message}")]
    Upstream {
        /// Which collaborator failed ("aggregator", "ledger", "store")
        service: &'static str,
        /// Failure description as reported by the collaborator
        message: String,
        /// Whether the failure was a timeout
        timed_out: bool,
    },

    /// Simulation rejected the transaction and the policy is `Gate`
    #[error("Simulation failed: {0}")]
    Simulation(String),

    /// Invariant violation inside the pipeline
    ///
    /// Signing key / fee-vault owner mismatch, an unresolved fee account
    /// that a transfer needs, or a message that cannot be compiled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwapError {
    /// Check if retrying the whole build might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::ResourceExpired(_) => "expired",
            Self::BadRequest(_) => "bad_request",
            Self::Upstream { .. } => "upstream",
            Self::Simulation(_) => "simulation",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status used by the route table
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::ResourceExpired(_) => 410,
            Self::Simulation(_) => 422,
            Self::Upstream { .. } => 502,
            Self::Internal(_) => 500,
        }
    }
}

// Convenience constructors for common error scenarios
impl SwapError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound(reason.into())
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

impl From<AggregatorError> for SwapError {
    fn from(err: AggregatorError) -> Self {
        match err {
            // A bundle we cannot decode is not something a retry will fix
            AggregatorError::InvalidInstruction(reason) => {
                Self::Internal(format!("aggregator returned an invalid instruction: {reason}"))
            }
            other => Self::Upstream {
                service: "aggregator",
                timed_out: other.is_timeout(),
                message: other.to_string(),
            },
        }
    }
}

impl From<LedgerError> for SwapError {
    fn from(err: LedgerError) -> Self {
        Self::Upstream {
            service: "ledger",
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for SwapError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(id) => {
                Self::Internal(format!("quote id collision on create: {id}"))
            }
            other => Self::Upstream {
                service: "store",
                timed_out: false,
                message: other.to_string(),
            },
        }
    }
}

impl From<KeyLoadError> for SwapError {
    fn from(err: KeyLoadError) -> Self {
        Self::Internal(format!("fee-vault authority unavailable: {err}"))
    }
}
