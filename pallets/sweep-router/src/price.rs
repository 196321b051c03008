//! Price gate arithmetic.
//!
//! Oracle prices arrive in the oracle's own decimal precision; callers express their bounds in a
//! precision of their choosing. The gate rescales the oracle price to the caller's precision and
//! checks it against the inclusive `[min, max]` window.

use core::cmp::Ordering;

/// Rescale `price` from `from_decimals` to `to_decimals`.
///
/// Scaling down floors (precision loss is accepted). Scaling up returns `None` when the result
/// does not fit in a `u128`.
pub fn normalize_price(price: u128, from_decimals: u8, to_decimals: u8) -> Option<u128> {
  match from_decimals.cmp(&to_decimals) {
    Ordering::Equal => Some(price),
    Ordering::Greater => {
      let exponent = u32::from(from_decimals - to_decimals);
      // 10^39 exceeds u128::MAX, so an unrepresentable divisor floors every price to zero
      Some(10u128.checked_pow(exponent).map_or(0, |scale| price / scale))
    }
    Ordering::Less => {
      let exponent = u32::from(to_decimals - from_decimals);
      10u128
        .checked_pow(exponent)
        .and_then(|scale| price.checked_mul(scale))
    }
  }
}

/// Inclusive bounds check
pub fn within_bounds(price: u128, min_price: u128, max_price: u128) -> bool {
  min_price <= price && price <= max_price
}
