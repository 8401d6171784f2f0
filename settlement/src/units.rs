//! # Unit Conversion
//!
//! Human amounts (`0.01` SOL, `2.5` NEPTU) travel through the product as
//! `f64`, the same way the ledger's own RPC reports `uiAmount`. Raw amounts
//! are integer base units: lamports for SOL (9 decimals), micro-tokens for
//! NEPTU and SUDIGITAL (6 decimals).
//!
//! Conversion to raw rounds to the nearest unit. For any amount that is
//! exactly representable at the asset's precision, converting to raw and
//! back yields the same amount. Inputs are trusted internal values, so
//! nothing here fails.

use crate::config::{NEPTU_DECIMALS, SOL_DECIMALS};

fn scale(decimals: u8) -> f64 {
    10f64.powi(decimals as i32)
}

/// Converts a human amount to raw units at `decimals` precision.
///
/// Negative and NaN inputs saturate to zero.
pub fn to_raw(amount: f64, decimals: u8) -> u64 {
    (amount * scale(decimals)).round() as u64
}

/// Converts raw units at `decimals` precision to a human amount.
pub fn from_raw(raw: u64, decimals: u8) -> f64 {
    raw as f64 / scale(decimals)
}

/// SOL to lamports.
pub fn to_raw_coin(amount: f64) -> u64 {
    to_raw(amount, SOL_DECIMALS)
}

/// Lamports to SOL.
pub fn from_raw_coin(raw: u64) -> f64 {
    from_raw(raw, SOL_DECIMALS)
}

/// NEPTU to raw token units.
pub fn to_raw_token(amount: f64) -> u64 {
    to_raw(amount, NEPTU_DECIMALS)
}

/// Raw token units to NEPTU.
pub fn from_raw_token(raw: u64) -> f64 {
    from_raw(raw, NEPTU_DECIMALS)
}

/// Renders a raw amount as an exact decimal string, without float noise
/// and without trailing zeros (`1500000, 6` → `"1.5"`).
pub fn format_raw(raw: u64, decimals: u8) -> String {
    let places = decimals as usize;
    let digits = format!("{:0>width$}", raw, width = places + 1);
    let (whole, frac) = digits.split_at(digits.len() - places);
    match frac.trim_end_matches('0') {
        "" => whole.to_string(),
        frac => format!("{whole}.{frac}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_amounts() {
        assert_eq!(to_raw_coin(0.01), 10_000_000);
        assert_eq!(to_raw_coin(0.001), 1_000_000);
        assert_eq!(to_raw_coin(1.0), 1_000_000_000);
        assert_eq!(to_raw_token(10.0), 10_000_000);
        assert_eq!(to_raw_token(0.5), 500_000);
        assert_eq!(from_raw_coin(5_000_000), 0.005);
        assert_eq!(from_raw_token(2_000_000), 2.0);
    }

    #[test]
    fn rounds_to_nearest_unit() {
        assert_eq!(to_raw_token(0.000_000_4), 0);
        assert_eq!(to_raw_token(0.000_000_6), 1);
        assert_eq!(to_raw_token(1.234_567_8), 1_234_568);
    }

    #[test]
    fn negative_saturates_to_zero() {
        assert_eq!(to_raw_token(-3.0), 0);
        assert_eq!(to_raw_coin(f64::NAN), 0);
    }

    #[test]
    fn format_is_exact() {
        assert_eq!(format_raw(1_500_000, 6), "1.5");
        assert_eq!(format_raw(10_000_000, 9), "0.01");
        assert_eq!(format_raw(7, 6), "0.000007");
        assert_eq!(format_raw(3_000_000, 6), "3");
        assert_eq!(format_raw(u64::MAX, 9), "18446744073.709551615");
        assert_eq!(format_raw(42, 0), "42");
        assert_eq!(format_raw(0, 9), "0");
    }

    #[test]
    fn format_handles_scales_beyond_u128() {
        assert_eq!(format_raw(5, 40), format!("0.{}5", "0".repeat(39)));
        assert_eq!(format_raw(0, 255), "0");
        let widest = format_raw(u64::MAX, 255);
        assert_eq!(widest.len(), 2 + 255);
        assert!(widest.starts_with("0.000"));
        assert!(widest.ends_with("18446744073709551615"));
    }

    proptest! {
        #[test]
        fn coin_round_trip(raw in 0u64..1_000_000_000_000_000) {
            let amount = raw as f64 / 1e9;
            prop_assert_eq!(to_raw_coin(amount), raw);
            prop_assert_eq!(from_raw_coin(to_raw_coin(amount)), amount);
        }

        #[test]
        fn token_round_trip(raw in 0u64..1_000_000_000_000_000) {
            let amount = raw as f64 / 1e6;
            prop_assert_eq!(to_raw_token(amount), raw);
            prop_assert_eq!(from_raw_token(to_raw_token(amount)), amount);
        }

        #[test]
        fn raw_survives_format(raw in any::<u64>(), decimals in 0u8..=48) {
            let text = format_raw(raw, decimals);
            let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
            let mut digits = String::from(whole);
            digits.push_str(frac);
            digits.extend(std::iter::repeat('0').take(decimals as usize - frac.len()));
            prop_assert_eq!(digits.parse::<u128>().unwrap(), raw as u128);
        }
    }
}
