//! Ecosystem constants for the sweep router.
//!
//! Pallet identifiers and pricing parameters shared by the pallet, its mocks and any runtime
//! that wires it in.

/// Balance type alias for consistency across ecosystem
pub type Balance = u128;

/// Pallet identifiers for deriving pallet-owned accounts.
///
/// Used with `PalletId::into_account_truncating()` to derive the custody account that holds
/// assets in transit during a sweep.
pub mod pallet_ids {
  /// Sweep Router pallet ID (sweep-and-convert engine)
  pub const SWEEP_ROUTER_PALLET_ID: &[u8; 8] = b"swprout0";
}

/// Pricing parameters.
pub mod params {
  /// Decimal precision oracles conventionally report USD prices in.
  pub const USD_PRICE_DECIMALS: u8 = 8;
}
