//! Fixed-point arithmetic primitives.
//!
//! Notionals and fees are computed with 128-bit intermediates and truncating
//! division so that rounding is deterministic and platform-independent.
//! Risk-lock reservations use the overflow-checked raw product
//! `price_q * qty_q`; overflow there maps to an `InvalidParams` rejection
//! rather than wrapping.

use crate::data::PRICE_SCALE;

const PPM: i64 = 1_000_000;

/// Computes `floor((a * b) / div)` with a 128-bit intermediate.
///
/// All operands must be non-negative and `div` positive; the simulator only
/// feeds it prices, quantities, notionals, and ppm rates, all of which are.
#[inline(always)]
pub fn mul_div_floor(a: i64, b: i64, div: i64) -> i64 {
    debug_assert!(a >= 0);
    debug_assert!(b >= 0);
    debug_assert!(div > 0);
    ((a as i128 * b as i128) / div as i128) as i64
}

/// Notional cash value of a fill: `floor(price_q * qty_q / PRICE_SCALE)`,
/// in the cash quantisation.
#[inline(always)]
pub fn notional_cash_q(price_q: i64, qty_q: i64) -> i64 {
    mul_div_floor(price_q, qty_q, PRICE_SCALE)
}

/// Fee on a notional at `fee_ppm` parts-per-million, floored.
#[inline(always)]
pub fn fee_cash_q(notional_q: i64, fee_ppm: u64) -> i64 {
    mul_div_floor(notional_q, fee_ppm as i64, PPM)
}
