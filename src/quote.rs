//! Persisted quotes and the clock they expire against
//!
//! A [`Quote`] is immutable once stored. It binds an aggregator route to the
//! fee terms that were in force when it was priced, so a later build charges
//! exactly what the user was shown.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::aggregator::QuoteResponse;
use crate::tx_builder::errors::SwapError;
use crate::tx_builder::fee::BPS_DENOMINATOR;

/// Only exact-input swaps are built; the fee is a share of a known input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SwapMode {
    #[default]
    ExactIn,
    ExactOut,
}

impl SwapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactIn => "ExactIn",
            Self::ExactOut => "ExactOut",
        }
    }
}

impl FromStr for SwapMode {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ExactIn" => Ok(Self::ExactIn),
            "ExactOut" => Ok(Self::ExactOut),
            other => Err(SwapError::validation(format!("unknown swap mode '{other}'"))),
        }
    }
}

/// Which side of the trade the fee is taken from
///
/// `Input` charges the fee in the input mint against `inAmount`; `Output`
/// charges it in the output mint against the slippage-protected minimum
/// (`otherAmountThreshold`), so the user's guaranteed floor still covers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeeSide {
    #[default]
    Input,
    Output,
}

/// Referral a quote was priced under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralLink {
    pub referral_id: String,
    pub slug: String,
    /// User whose wallet receives the referrer share
    pub referrer_user_id: String,
}

/// A stored, priced route plus the fee terms it was priced with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub user_public_key: Option<String>,
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in atoms; a string on the wire so it survives JSON
    #[serde(with = "amount_string")]
    pub amount: u128,
    pub slippage_bps: u16,
    #[serde(default)]
    pub dynamic_slippage: bool,
    pub swap_mode: SwapMode,
    pub platform_fee_bps: u16,
    pub referrer_fee_bps: u16,
    #[serde(default)]
    pub referral: Option<ReferralLink>,
    /// Aggregator route, passed back verbatim at build time
    pub route: QuoteResponse,
}

impl Quote {
    /// Total fee charged on the trade; the aggregator was asked for exactly this
    pub fn total_fee_bps(&self) -> u16 {
        self.platform_fee_bps.saturating_add(self.referrer_fee_bps)
    }

    /// A quote is still usable at exactly `expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Check the fee terms a quote is allowed to carry
    pub fn validate_invariants(&self) -> Result<(), SwapError> {
        let total = u32::from(self.platform_fee_bps) + u32::from(self.referrer_fee_bps);
        if total > u32::from(BPS_DENOMINATOR) {
            return Err(SwapError::bad_request(format!(
                "quote {} carries {} total fee bps",
                self.id, total
            )));
        }
        if self.swap_mode != SwapMode::ExactIn {
            return Err(SwapError::bad_request(format!(
                "quote {} is {}; only ExactIn swaps are supported",
                self.id,
                self.swap_mode.as_str()
            )));
        }
        if self.expires_at <= self.created_at {
            return Err(SwapError::validation(format!(
                "quote {} expires before it was created",
                self.id
            )));
        }
        self.check_route()
    }

    /// The fee is charged against the route, so it must be the route that was quoted
    fn check_route(&self) -> Result<(), SwapError> {
        if self.route.input_mint != self.input_mint {
            return Err(SwapError::validation(format!(
                "quote {}: route inputMint {} does not match {}",
                self.id, self.route.input_mint, self.input_mint
            )));
        }
        if self.route.output_mint != self.output_mint {
            return Err(SwapError::validation(format!(
                "quote {}: route outputMint {} does not match {}",
                self.id, self.route.output_mint, self.output_mint
            )));
        }
        let in_amount = self
            .route
            .in_amount_atoms()
            .map_err(|e| SwapError::validation(format!("quote {}: {e}", self.id)))?;
        if in_amount != self.amount {
            return Err(SwapError::validation(format!(
                "quote {}: route inAmount {in_amount} does not match amount {}",
                self.id, self.amount
            )));
        }
        Ok(())
    }
}

/// Time source for quote expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to an instant, advanced by hand
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

pub(crate) mod amount_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| D::Error::custom(format!("amount is not an integer: '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_quote;

    #[test]
    fn test_total_fee_bps() {
        let quote = sample_quote(Utc::now());
        assert_eq!(quote.total_fee_bps(), 120);
    }

    #[test]
    fn test_expiry_boundary() {
        let created = Utc::now();
        let quote = sample_quote(created);
        assert!(!quote.is_expired(created));
        assert!(!quote.is_expired(quote.expires_at));
        assert!(quote.is_expired(quote.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_exact_out_rejected() {
        let mut quote = sample_quote(Utc::now());
        quote.swap_mode = SwapMode::ExactOut;
        assert!(matches!(
            quote.validate_invariants(),
            Err(SwapError::BadRequest(_))
        ));
    }

    #[test]
    fn test_fee_above_whole_rejected() {
        let mut quote = sample_quote(Utc::now());
        quote.platform_fee_bps = 9_000;
        quote.referrer_fee_bps = 1_001;
        assert!(matches!(
            quote.validate_invariants(),
            Err(SwapError::BadRequest(_))
        ));
    }

    #[test]
    fn test_route_must_match_quote() {
        let quote = sample_quote(Utc::now());
        assert!(quote.validate_invariants().is_ok());

        let mut inflated = quote.clone();
        inflated.route.in_amount = "100000000".to_string();
        assert!(matches!(
            inflated.validate_invariants(),
            Err(SwapError::Validation(_))
        ));

        let mut other_input = quote.clone();
        other_input.route.input_mint = crate::test_utils::USDC_MINT.to_string();
        assert!(matches!(
            other_input.validate_invariants(),
            Err(SwapError::Validation(_))
        ));

        let mut other_output = quote.clone();
        other_output.route.output_mint = crate::test_utils::WSOL_MINT.to_string();
        assert!(matches!(
            other_output.validate_invariants(),
            Err(SwapError::Validation(_))
        ));

        let mut garbled = quote;
        garbled.route.in_amount = "1e6".to_string();
        assert!(matches!(
            garbled.validate_invariants(),
            Err(SwapError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_serialized_as_string() {
        let quote = sample_quote(Utc::now());
        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(json["amount"], "1000000");
        let back: Quote = serde_json::from_value(json).unwrap();
        assert_eq!(back, quote);
    }

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        clock.advance(Duration::seconds(61));
        assert_eq!(clock.now() - start, Duration::seconds(61));
    }
}
