use codec::{Decode, DecodeWithMemTracking, Encode, MaxEncodedLen};
use polkadot_sdk::sp_runtime::{DispatchError, DispatchResult, RuntimeDebug};
use scale_info::TypeInfo;
use scale_info::prelude::vec::Vec;

// Re-export AssetKind from primitives as the single source of truth
pub use primitives::{AssetKind, Balance};

/// Raw outcome of a call into an external collaborator: the callee's return data on success.
pub type CallResult = Result<Vec<u8>, CallError>;

/// Why a call into an external collaborator did not succeed
#[derive(Clone, PartialEq, Eq, RuntimeDebug)]
pub enum CallError {
  /// The callee dispatched and failed
  Reverted(DispatchError),
  /// The callee answered, but with a response the engine does not accept
  Rejected,
  /// No collaborator is reachable at the given account
  UnknownTarget,
}

impl From<DispatchError> for CallError {
  fn from(err: DispatchError) -> Self {
    CallError::Reverted(err)
  }
}

/// Registry holding delegated transfer rights granted through an off-chain signed payload.
///
/// Signature validation is the registry's business; the engine only relays the payload and asks
/// the registry to move funds.
pub trait AuthorizationRegistry<AccountId> {
  /// Relay an opaque authorization payload on behalf of `initiator`.
  fn relay(registry: &AccountId, initiator: &AccountId, payload: &[u8]) -> CallResult;

  /// Move `amount` of `asset` from `from` to `to` under a previously granted authorization.
  fn pull(
    registry: &AccountId,
    from: &AccountId,
    to: &AccountId,
    asset: AssetKind,
    amount: Balance,
  ) -> CallResult;
}

/// External venue performing the actual asset-to-asset conversion.
///
/// The payload is opaque to the engine; the venue is expected to take the source asset from
/// `caller` (through the allowance the engine grants) and pay the target asset back to it.
pub trait ConversionVenue<AccountId> {
  fn call(venue: &AccountId, caller: &AccountId, payload: &[u8]) -> CallResult;
}

/// Withdraws an allowance granted by `owner`, releasing whatever deposit backs it.
///
/// The fungibles approval traits can grant and spend allowances but not cancel them, so the
/// runtime supplies this through the assets pallet's own cancellation.
pub trait ApprovalRevoker<AccountId> {
  fn revoke(asset: u32, owner: &AccountId, delegate: &AccountId) -> DispatchResult;
}

/// USD price feed consulted by the price gate
pub trait PriceOracle<AccountId> {
  /// Price of `asset` together with the number of decimals it is expressed in.
  fn price_usd(oracle: &AccountId, asset: AssetKind) -> Result<(u128, u8), CallError>;
}

/// Failure isolation policy of one sweep batch
#[derive(
  Clone,
  Copy,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  MaxEncodedLen,
  PartialEq,
  RuntimeDebug,
  TypeInfo,
)]
pub enum SweepMode {
  /// Any per-asset failure aborts the whole batch and discards every effect
  Atomic,
  /// Per-asset failures are refunded, reported and skipped
  BestEffort,
}

/// Recoverable per-asset failure, reported through `Event::SweepFailed`
#[derive(
  Clone,
  Copy,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  MaxEncodedLen,
  PartialEq,
  RuntimeDebug,
  TypeInfo,
)]
pub enum SweepFailure {
  /// Oracle price unknown or outside the caller's bounds; nothing moved
  PriceOutOfRange,
  /// Initiator holds none of the asset; nothing moved
  ZeroBalance,
  /// Registry refused or failed to move the asset; nothing moved
  AuthorizationTransferFailed,
  /// No conversion payload for this asset; pulled amount refunded
  NoConversionCalldata,
  /// Venue call failed or no venue is configured; pulled amount refunded
  ConversionCallFailed,
  /// Venue succeeded but paid out nothing; pulled amount refunded
  NoTargetReceived,
}

/// Interpret the return data of a transfer-style call.
///
/// Collaborators modelled on non-standard tokens may return nothing at all; that counts as
/// success. Otherwise the leading bytes must decode to `true`.
pub fn call_returned_true(data: &[u8]) -> bool {
  if data.is_empty() {
    return true;
  }
  matches!(bool::decode(&mut &data[..]), Ok(true))
}

/// Helper for benchmarking
#[cfg(feature = "runtime-benchmarks")]
pub trait BenchmarkHelper<AccountId> {
  /// Create `asset` if needed and credit `amount` of it to `who`.
  fn fund(who: &AccountId, asset: AssetKind, amount: Balance) -> DispatchResult;
  /// Registry, venue and per-asset conversion payload able to convert `asset` into `target`.
  fn collaborators(
    asset: AssetKind,
    target: AssetKind,
    amount: Balance,
  ) -> (AccountId, AccountId, Vec<u8>);
}
