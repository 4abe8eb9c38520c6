//! Fee policy: integer-exact basis-point split between referrer and treasury
//!
//! `total = floor(amount * total_bps / 10_000)`,
//! `referrer = floor(amount * referrer_bps / 10_000)`,
//! `treasury = total - referrer`.
//!
//! Products are computed in `u128` with checked arithmetic so amounts above
//! the `u64` range (low-decimal tokens at large notional) never wrap.

use serde::Serialize;

use crate::aggregator::PlatformFee;
use crate::tx_builder::errors::SwapError;

/// Basis points in one whole
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Split of the fee skimmed from one trade, in token atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSplit {
    pub referrer_atoms: u64,
    pub treasury_atoms: u64,
}

impl FeeSplit {
    /// Total fee, equal to `floor(amount * total_bps / 10_000)`
    pub fn total_atoms(&self) -> u64 {
        // Both halves come from a total that fit in u64
        self.referrer_atoms.saturating_add(self.treasury_atoms)
    }

    /// True when the fee is below the token's smallest unit
    pub fn is_zero(&self) -> bool {
        self.total_atoms() == 0
    }
}

/// `floor(amount * bps / 10_000)`, or `None` on overflow
pub fn bps_of(amount: u128, bps: u16) -> Option<u128> {
    amount
        .checked_mul(u128::from(bps))?
        .checked_div(u128::from(BPS_DENOMINATOR))
}

/// Compute the referrer/treasury split for one trade
///
/// # Errors
///
/// - `Validation` if `total_fee_bps > 10_000`, or the amount is so large the
///   fee no longer fits a token amount
/// - `BadRequest` if `referrer_fee_bps > total_fee_bps`
pub fn split(
    input_atoms: u128,
    total_fee_bps: u16,
    referrer_fee_bps: u16,
) -> Result<FeeSplit, SwapError> {
    if total_fee_bps > BPS_DENOMINATOR {
        return Err(SwapError::validation(format!(
            "total fee bps {total_fee_bps} outside [0, {BPS_DENOMINATOR}]"
        )));
    }
    if referrer_fee_bps > total_fee_bps {
        return Err(SwapError::bad_request(format!(
            "referrer fee bps {referrer_fee_bps} exceeds total fee bps {total_fee_bps}"
        )));
    }

    let total = bps_of(input_atoms, total_fee_bps)
        .ok_or_else(|| SwapError::validation("input amount overflows fee arithmetic"))?;
    let referrer = bps_of(input_atoms, referrer_fee_bps)
        .ok_or_else(|| SwapError::validation("input amount overflows fee arithmetic"))?;

    let total = u64::try_from(total)
        .map_err(|_| SwapError::validation(format!("fee of {total} atoms exceeds u64 range")))?;
    // referrer <= total because referrer_fee_bps <= total_fee_bps
    let referrer = u64::try_from(referrer)
        .map_err(|_| SwapError::validation("referrer fee exceeds u64 range"))?;

    Ok(FeeSplit {
        referrer_atoms: referrer,
        treasury_atoms: total - referrer,
    })
}

/// Compare our fee against the amount the aggregator reports for the same bps
///
/// A report for a different bps value is not comparable and is ignored.
pub fn verify_reported_fee(
    split: &FeeSplit,
    total_fee_bps: u16,
    reported: Option<&PlatformFee>,
) -> Result<(), SwapError> {
    let Some(reported) = reported else {
        return Ok(());
    };
    if reported.fee_bps != total_fee_bps {
        return Ok(());
    }
    let reported_atoms: u64 = reported.amount.parse().map_err(|_| {
        SwapError::validation(format!(
            "aggregator reported unparsable fee amount '{}'",
            reported.amount
        ))
    })?;
    if reported_atoms != split.total_atoms() {
        return Err(SwapError::validation(format!(
            "fee mismatch: computed {} atoms, aggregator reported {} atoms at {} bps",
            split.total_atoms(),
            reported_atoms,
            total_fee_bps
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reference_split() {
        let split = split(1_000_000, 120, 40).unwrap();
        assert_eq!(split.referrer_atoms, 4_000);
        assert_eq!(split.treasury_atoms, 8_000);
        assert_eq!(split.total_atoms(), 12_000);
    }

    #[test]
    fn test_referrer_rounds_to_zero() {
        let split = split(100, 101, 1).unwrap();
        assert_eq!(split.referrer_atoms, 0);
        assert_eq!(split.treasury_atoms, 1);
    }

    #[test]
    fn test_zero_fee_is_valid() {
        assert!(split(1_000_000, 0, 0).unwrap().is_zero());
        // 99 * 100 / 10_000 rounds down to nothing
        assert!(split(99, 100, 50).unwrap().is_zero());
    }

    #[test]
    fn test_referrer_above_total_is_bad_request() {
        let err = split(1_000_000, 400, 500).unwrap_err();
        assert!(matches!(err, SwapError::BadRequest(_)));
    }

    #[test]
    fn test_total_above_denominator_is_validation() {
        let err = split(1_000_000, 10_001, 0).unwrap_err();
        assert!(matches!(err, SwapError::Validation(_)));
    }

    #[test]
    fn test_amount_beyond_u64() {
        // 2^70 atoms at 1 bps still needs 128-bit intermediates
        let amount: u128 = 1 << 70;
        let split = split(amount, 1, 0).unwrap();
        assert_eq!(u128::from(split.treasury_atoms), amount / 10_000);
    }

    #[test]
    fn test_fee_beyond_u64_rejected() {
        let err = split(u128::MAX / 10_000, 10_000, 0).unwrap_err();
        assert!(matches!(err, SwapError::Validation(_)));
    }

    #[test]
    fn test_verify_reported_fee() {
        let split = split(1_000_000, 120, 40).unwrap();
        let good = PlatformFee {
            amount: "12000".to_string(),
            fee_bps: 120,
        };
        assert!(verify_reported_fee(&split, 120, Some(&good)).is_ok());

        let bad = PlatformFee {
            amount: "11999".to_string(),
            fee_bps: 120,
        };
        assert!(matches!(
            verify_reported_fee(&split, 120, Some(&bad)),
            Err(SwapError::Validation(_))
        ));

        let other_bps = PlatformFee {
            amount: "1".to_string(),
            fee_bps: 50,
        };
        assert!(verify_reported_fee(&split, 120, Some(&other_bps)).is_ok());
        assert!(verify_reported_fee(&split, 120, None).is_ok());
    }

    proptest! {
        #[test]
        fn prop_conservation(
            amount in 0u128..=1_000_000_000_000_000_000u128,
            total in 0u16..=10_000u16,
            referrer_frac in 0u16..=10_000u16,
        ) {
            let referrer = ((u32::from(total) * u32::from(referrer_frac)) / 10_000) as u16;
            let split = split(amount, total, referrer).unwrap();
            let expected = amount * u128::from(total) / 10_000;
            prop_assert_eq!(u128::from(split.total_atoms()), expected);
            prop_assert_eq!(
                u128::from(split.referrer_atoms),
                amount * u128::from(referrer) / 10_000
            );
        }

        #[test]
        fn prop_referrer_never_exceeds_total(
            amount in 0u128..=1_000_000_000_000_000_000u128,
            total in 0u16..=10_000u16,
        ) {
            let split = split(amount, total, total).unwrap();
            prop_assert_eq!(split.treasury_atoms, 0);
        }
    }
}
