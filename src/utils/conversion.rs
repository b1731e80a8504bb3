//! Type conversion and formatting utilities.
//!
//! Raw on-chain integers are turned into decimal-scaled `BigDecimal`s here,
//! without ever passing through floating point.

use alloy::primitives::{hex, U256};
use bigdecimal::BigDecimal;
use num_traits::Zero;
use num_bigint::{BigInt, Sign};

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ============================================
// U256 Conversions
// ============================================

/// Convert an unsigned U256 into an unscaled `BigInt`.
pub fn u256_to_bigint(value: U256) -> BigInt {
    // Bytes are faster than string parsing
    let bytes: [u8; 32] = value.to_le_bytes();
    BigInt::from_bytes_le(Sign::Plus, &bytes)
}

/// Scale a raw token amount by the token's decimals.
///
/// `1_500_000` with 6 decimals becomes `1.5`. Exact, no precision is lost.
pub fn u256_to_decimal(value: U256, decimals: u8) -> BigDecimal {
    if value.is_zero() {
        return BigDecimal::zero();
    }
    BigDecimal::new(u256_to_bigint(value), decimals as i64)
}

/// Ratio `numerator / denominator` of two decimal-scaled amounts.
///
/// A zero on either side yields exactly zero.
pub fn ratio(numerator: &BigDecimal, denominator: &BigDecimal) -> BigDecimal {
    if numerator.is_zero() || denominator.is_zero() {
        return BigDecimal::zero();
    }
    numerator / denominator
}
