//! Sweep Router Pallet
//!
//! Consolidates an initiator's balances of many assets into one target asset in a single call,
//! using a one-time delegated authorization instead of per-asset approvals.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub use pallet::*;

pub mod price;
pub mod types;
pub use types::*;

#[cfg(test)]
pub mod mock;

#[cfg(feature = "runtime-benchmarks")]
mod benchmarking;

pub mod weights;
pub use weights::WeightInfo;

/// Log target for everything the engine reports
pub const LOG_TARGET: &str = "runtime::sweep-router";

#[frame::pallet]
pub mod pallet {
  use super::*;
  use frame::deps::{
    frame_support::{
      storage::with_storage_layer,
      traits::{
        fungible::{Inspect as NativeInspect, Mutate as NativeMutate},
        fungibles::{
          Inspect as FungiblesInspect, Mutate as FungiblesMutate,
          approvals::{Inspect as ApprovalInspect, Mutate as ApprovalMutate},
        },
        tokens::{Fortitude, Preservation},
      },
    },
    sp_runtime::{
      DispatchError,
      traits::{AccountIdConversion, Zero},
    },
  };
  use frame::prelude::*;
  use primitives::AssetInspector;

  #[pallet::config]
  pub trait Config: frame_system::Config<RuntimeEvent: From<Event<Self>>> {
    /// Tracked assets (AssetKind::Local / AssetKind::Foreign), including allowances
    type Assets: FungiblesInspect<Self::AccountId, AssetId = u32, Balance = Balance>
      + FungiblesMutate<Self::AccountId>
      + ApprovalInspect<Self::AccountId>
      + ApprovalMutate<Self::AccountId>;

    /// Native currency (AssetKind::Native) used for native payouts
    type Currency: NativeInspect<Self::AccountId, Balance = Balance>
      + NativeMutate<Self::AccountId, Balance = Balance>;

    /// Registry relaying authorization payloads and pulling initiator funds
    type Registry: AuthorizationRegistry<Self::AccountId>;

    /// Conversion venue invoked with the opaque per-asset payload
    type Venue: ConversionVenue<Self::AccountId>;

    /// USD price feed backing the price gate
    type Oracle: PriceOracle<Self::AccountId>;

    /// Cancels the venue's allowance once its conversion call returns
    type Revoker: ApprovalRevoker<Self::AccountId>;

    /// Pallet ID for deriving the custody account
    #[pallet::constant]
    type PalletId: Get<PalletId>;

    /// Native balance the custody account keeps to back allowance deposits; never paid out
    #[pallet::constant]
    type ApprovalFloat: Get<Balance>;

    /// Maximum number of assets in one sweep
    #[pallet::constant]
    type MaxAssets: Get<u32>;

    /// Maximum length of an authorization or conversion payload
    #[pallet::constant]
    type MaxPayloadLen: Get<u32>;

    /// Weight information for extrinsics
    type WeightInfo: WeightInfo;

    /// Helper for benchmarking
    #[cfg(feature = "runtime-benchmarks")]
    type BenchmarkHelper: crate::types::BenchmarkHelper<Self::AccountId>;
  }

  /// Opaque payload bounded by `MaxPayloadLen`
  pub type PayloadOf<T> = BoundedVec<u8, <T as Config>::MaxPayloadLen>;

  /// The pallet module.
  ///
  /// ## Sweep pipeline
  /// For every requested asset, in order:
  ///
  /// 1. **Price gate**: oracle price normalized to the caller's precision must lie within the
  ///    caller's `[min, max]`. Skipped entirely when no oracle is configured.
  /// 2. **Balance check**: the initiator's full current balance is the amount to pull.
  /// 3. **Pull**: the authorization registry moves that balance into the custody account.
  /// 4. **Calldata check / approve / convert**: the venue receives an allowance over the pulled
  ///    amount and is called with the asset's payload. Whatever allowance remains afterwards is
  ///    cancelled, so no spending right outlives the asset's iteration.
  /// 5. **Settle or refund**: the target-asset delta goes to the initiator, or the pulled amount
  ///    goes back.
  ///
  /// ## Failure isolation
  /// - `SweepMode::Atomic`: the first per-asset failure aborts the extrinsic, discarding every
  ///   effect of the batch.
  /// - `SweepMode::BestEffort`: the failure is reported via `SweepFailed` and the next asset is
  ///   processed.
  ///
  /// Malformed input (including a target that is also a source), a rejected authorization
  /// payload, reentrancy and any failed allowance, refund or payout abort the extrinsic in both
  /// modes.
  ///
  /// ## Approval float
  /// Allowance deposits are reserved from `ApprovalFloat`, native balance minted into the
  /// custody account at genesis. A native-target payout never dips into it.
  ///
  /// ## Safety
  /// - **Exclusion lock**: `SweepLock` is held for the whole batch; a venue calling back into
  ///   `sweep_and_convert` is rejected.
  /// - **Call isolation**: registry pulls and venue calls run in nested storage layers, so a
  ///   failed call leaves no partial effect behind.
  /// - **Delta accounting**: amounts pulled and received are measured on the custody account,
  ///   never taken from collaborator return values.
  #[pallet::pallet]
  pub struct Pallet<T>(PhantomData<T>);

  /// Account allowed to reconfigure the engine; set once at genesis
  #[pallet::storage]
  #[pallet::getter(fn controller)]
  pub type Controller<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

  /// Current conversion venue
  #[pallet::storage]
  #[pallet::getter(fn conversion_venue)]
  pub type VenueAccount<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

  /// Current price oracle; `None` disables price gating
  #[pallet::storage]
  #[pallet::getter(fn price_oracle)]
  pub type OracleAccount<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

  /// Exclusion lock, `true` only while a sweep is in flight
  #[pallet::storage]
  pub type SweepLock<T: Config> = StorageValue<_, bool, ValueQuery>;

  #[pallet::event]
  #[pallet::generate_deposit(pub(super) fn deposit_event)]
  pub enum Event<T: Config> {
    /// Asset converted and output settled to the initiator
    Swept {
      initiator: T::AccountId,
      asset: AssetKind,
      amount_in: Balance,
      target: AssetKind,
      amount_out: Balance,
    },
    /// Asset skipped; anything pulled was refunded
    SweepFailed {
      initiator: T::AccountId,
      asset: AssetKind,
      reason: SweepFailure,
    },
    /// Conversion venue replaced
    ConversionVenueSet { venue: T::AccountId },
    /// Price oracle replaced or removed
    PriceOracleSet { oracle: Option<T::AccountId> },
  }

  #[pallet::error]
  pub enum Error<T> {
    /// Caller is not the engine controller
    NotController,
    /// A sweep is already in flight
    Reentrancy,
    /// Asset, price bound and payload lists differ in length
    LengthMismatch,
    /// The native asset cannot be swept as a source
    NativeSourceAsset,
    /// The target asset is also listed as a source
    SourceIsTarget,
    /// The registry rejected the authorization payload
    AuthorizationFailed,
    /// Oracle price unknown or out of the requested range
    PriceOutOfRange,
    /// Initiator holds none of the asset
    ZeroBalance,
    /// Registry failed to move the asset
    AuthorizationTransferFailed,
    /// No conversion payload supplied for the asset
    NoConversionCalldata,
    /// Conversion venue call failed
    ConversionCallFailed,
    /// Conversion produced no target asset
    NoTargetReceived,
    /// Granting or cancelling the venue's allowance failed
    ApprovalFailed,
    /// Returning a pulled asset to the initiator failed
    RefundFailed,
    /// Paying the converted output to the initiator failed
    SettlementFailed,
    /// Paying native output to the initiator failed
    NativeTransferFailed,
  }

  impl<T> From<SweepFailure> for Error<T> {
    fn from(reason: SweepFailure) -> Self {
      match reason {
        SweepFailure::PriceOutOfRange => Error::<T>::PriceOutOfRange,
        SweepFailure::ZeroBalance => Error::<T>::ZeroBalance,
        SweepFailure::AuthorizationTransferFailed => Error::<T>::AuthorizationTransferFailed,
        SweepFailure::NoConversionCalldata => Error::<T>::NoConversionCalldata,
        SweepFailure::ConversionCallFailed => Error::<T>::ConversionCallFailed,
        SweepFailure::NoTargetReceived => Error::<T>::NoTargetReceived,
      }
    }
  }

  #[pallet::call]
  impl<T: Config> Pallet<T> {
    /// Sweep the caller's full balances of `assets` into `target`.
    ///
    /// `min_prices`, `max_prices` and `conversion_payloads` are parallel to `assets`. A
    /// non-empty `authorization` is relayed to `registry` once before any asset is touched.
    /// `target == AssetKind::Native` pays out the custody account's native balance.
    #[pallet::call_index(0)]
    #[pallet::weight(T::WeightInfo::sweep_and_convert(assets.len() as u32))]
    pub fn sweep_and_convert(
      origin: OriginFor<T>,
      registry: T::AccountId,
      authorization: PayloadOf<T>,
      assets: BoundedVec<AssetKind, T::MaxAssets>,
      min_prices: BoundedVec<u128, T::MaxAssets>,
      max_prices: BoundedVec<u128, T::MaxAssets>,
      price_decimals: u8,
      target: AssetKind,
      conversion_payloads: BoundedVec<PayloadOf<T>, T::MaxAssets>,
      mode: SweepMode,
    ) -> DispatchResult {
      let initiator = ensure_signed(origin)?;
      Self::with_sweep_lock(|| {
        let len = assets.len();
        ensure!(
          min_prices.len() == len && max_prices.len() == len && conversion_payloads.len() == len,
          Error::<T>::LengthMismatch
        );
        ensure!(
          !assets.iter().any(|asset| asset.is_native()),
          Error::<T>::NativeSourceAsset
        );
        ensure!(!assets.contains(&target), Error::<T>::SourceIsTarget);
        if !authorization.is_empty() {
          T::Registry::relay(&registry, &initiator, &authorization).map_err(|err| {
            log::warn!(
              target: LOG_TARGET,
              "authorization relay through {:?} failed: {:?}",
              registry,
              err
            );
            Error::<T>::AuthorizationFailed
          })?;
        }
        let orders = assets
          .iter()
          .zip(min_prices.iter())
          .zip(max_prices.iter())
          .zip(conversion_payloads.iter())
          .map(|(((asset, min_price), max_price), payload)| AssetOrder {
            asset: *asset,
            min_price: *min_price,
            max_price: *max_price,
            payload: payload.as_slice(),
          });
        for order in orders {
          let outcome = Self::sweep_asset(&initiator, &registry, &order, price_decimals, target)?;
          Self::report(&initiator, &order, target, outcome, mode)?;
        }
        Ok(())
      })
    }

    /// Replace the conversion venue (controller only)
    #[pallet::call_index(1)]
    #[pallet::weight(T::WeightInfo::set_conversion_venue())]
    pub fn set_conversion_venue(origin: OriginFor<T>, venue: T::AccountId) -> DispatchResult {
      Self::ensure_controller(origin)?;
      VenueAccount::<T>::put(&venue);
      Self::deposit_event(Event::ConversionVenueSet { venue });
      Ok(())
    }

    /// Replace or remove the price oracle (controller only)
    ///
    /// `None` disables price gating for every subsequent sweep.
    #[pallet::call_index(2)]
    #[pallet::weight(T::WeightInfo::set_price_oracle())]
    pub fn set_price_oracle(origin: OriginFor<T>, oracle: Option<T::AccountId>) -> DispatchResult {
      Self::ensure_controller(origin)?;
      OracleAccount::<T>::set(oracle.clone());
      Self::deposit_event(Event::PriceOracleSet { oracle });
      Ok(())
    }
  }

  #[pallet::hooks]
  impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
    fn integrity_test() {
      assert!(T::MaxAssets::get() > 0, "MaxAssets must admit at least one asset");
      assert!(T::MaxPayloadLen::get() > 0, "MaxPayloadLen must admit a payload");
    }

    #[cfg(feature = "try-runtime")]
    fn try_state(_n: BlockNumberFor<T>) -> Result<(), frame::deps::sp_runtime::TryRuntimeError> {
      ensure!(!SweepLock::<T>::get(), "sweep lock held outside of a sweep");
      ensure!(
        T::Currency::balance(&Self::account_id()) >= T::ApprovalFloat::get(),
        "custody account holds less than the approval float"
      );
      Ok(())
    }
  }

  /// One asset's slice of a sweep request
  struct AssetOrder<'a> {
    asset: AssetKind,
    min_price: u128,
    max_price: u128,
    payload: &'a [u8],
  }

  /// Terminal state of one asset's pipeline
  enum AssetOutcome {
    Swept { amount_in: Balance, amount_out: Balance },
    Failed(SweepFailure),
  }

  impl<T: Config> Pallet<T> {
    /// Custody account holding assets in transit
    pub fn account_id() -> T::AccountId {
      T::PalletId::get().into_account_truncating()
    }

    /// Oracle price of `asset` rescaled to `decimals`.
    ///
    /// `None` when no oracle is configured, the price is unknown or it cannot be represented.
    pub fn quote_price(asset: AssetKind, decimals: u8) -> Option<u128> {
      let oracle = OracleAccount::<T>::get()?;
      Self::oracle_price(&oracle, asset, decimals)
    }

    fn ensure_controller(origin: OriginFor<T>) -> DispatchResult {
      let who = ensure_signed(origin)?;
      ensure!(
        Controller::<T>::get().as_ref() == Some(&who),
        Error::<T>::NotController
      );
      Ok(())
    }

    /// Run `f` holding the exclusion lock; the lock is released on every exit path.
    fn with_sweep_lock<R>(f: impl FnOnce() -> Result<R, DispatchError>) -> Result<R, DispatchError> {
      ensure!(!SweepLock::<T>::get(), Error::<T>::Reentrancy);
      SweepLock::<T>::put(true);
      let result = f();
      SweepLock::<T>::kill();
      result
    }

    /// Emit the outcome of one asset and apply the batch's failure isolation policy.
    fn report(
      initiator: &T::AccountId,
      order: &AssetOrder<'_>,
      target: AssetKind,
      outcome: AssetOutcome,
      mode: SweepMode,
    ) -> DispatchResult {
      match outcome {
        AssetOutcome::Swept {
          amount_in,
          amount_out,
        } => {
          log::debug!(
            target: LOG_TARGET,
            "swept {} of {:?} into {} of {:?} for {:?}",
            amount_in,
            order.asset,
            amount_out,
            target,
            initiator
          );
          Self::deposit_event(Event::Swept {
            initiator: initiator.clone(),
            asset: order.asset,
            amount_in,
            target,
            amount_out,
          });
          Ok(())
        }
        AssetOutcome::Failed(reason) => {
          log::warn!(
            target: LOG_TARGET,
            "sweep of {:?} for {:?} failed: {:?} ({:?})",
            order.asset,
            initiator,
            reason,
            mode
          );
          Self::deposit_event(Event::SweepFailed {
            initiator: initiator.clone(),
            asset: order.asset,
            reason,
          });
          match mode {
            SweepMode::Atomic => Err(Error::<T>::from(reason).into()),
            SweepMode::BestEffort => Ok(()),
          }
        }
      }
    }

    /// Per-asset state machine.
    ///
    /// Recoverable failures come back as `AssetOutcome::Failed` with every pulled unit already
    /// refunded. `Err` is reserved for failures that must abort the whole extrinsic.
    fn sweep_asset(
      initiator: &T::AccountId,
      registry: &T::AccountId,
      order: &AssetOrder<'_>,
      price_decimals: u8,
      target: AssetKind,
    ) -> Result<AssetOutcome, DispatchError> {
      let source_id = order
        .asset
        .tracked_id()
        .ok_or(Error::<T>::NativeSourceAsset)?;

      if !Self::price_gate(order.asset, price_decimals, order.min_price, order.max_price) {
        return Ok(AssetOutcome::Failed(SweepFailure::PriceOutOfRange));
      }

      let balance = T::Assets::balance(source_id, initiator);
      if balance.is_zero() {
        return Ok(AssetOutcome::Failed(SweepFailure::ZeroBalance));
      }

      let engine = Self::account_id();
      let source_before = T::Assets::balance(source_id, &engine);
      if !Self::pull(registry, initiator, &engine, order.asset, balance) {
        return Ok(AssetOutcome::Failed(
          SweepFailure::AuthorizationTransferFailed,
        ));
      }
      let amount_in = T::Assets::balance(source_id, &engine).saturating_sub(source_before);
      if amount_in.is_zero() {
        return Ok(AssetOutcome::Failed(
          SweepFailure::AuthorizationTransferFailed,
        ));
      }

      if order.payload.is_empty() {
        Self::refund(initiator, &engine, source_id, amount_in)?;
        return Ok(AssetOutcome::Failed(SweepFailure::NoConversionCalldata));
      }

      let Some(venue) = VenueAccount::<T>::get() else {
        Self::refund(initiator, &engine, source_id, amount_in)?;
        return Ok(AssetOutcome::Failed(SweepFailure::ConversionCallFailed));
      };
      Self::approve_venue(source_id, &engine, &venue, amount_in)?;

      let target_before = target
        .tracked_id()
        .map_or(Zero::zero(), |target_id| T::Assets::balance(target_id, &engine));
      let conversion = with_storage_layer(|| T::Venue::call(&venue, &engine, order.payload));
      Self::revoke_venue(source_id, &engine, &venue)?;
      if let Err(err) = conversion {
        log::warn!(
          target: LOG_TARGET,
          "venue {:?} failed converting {:?}: {:?}",
          venue,
          order.asset,
          err
        );
        Self::refund(initiator, &engine, source_id, amount_in)?;
        return Ok(AssetOutcome::Failed(SweepFailure::ConversionCallFailed));
      }

      // Native output can arrive without any bookkeeping, so everything above the float is paid out
      let amount_out = match target.tracked_id() {
        Some(target_id) => T::Assets::balance(target_id, &engine).saturating_sub(target_before),
        None => T::Currency::reducible_balance(&engine, Preservation::Expendable, Fortitude::Polite)
          .saturating_sub(T::ApprovalFloat::get()),
      };
      if amount_out.is_zero() {
        Self::refund(initiator, &engine, source_id, amount_in)?;
        return Ok(AssetOutcome::Failed(SweepFailure::NoTargetReceived));
      }
      Self::settle(initiator, &engine, target, amount_out)?;

      let unconsumed = T::Assets::balance(source_id, &engine).saturating_sub(source_before);
      if !unconsumed.is_zero() {
        log::debug!(
          target: LOG_TARGET,
          "returning {} unconsumed {:?} to {:?}",
          unconsumed,
          order.asset,
          initiator
        );
        Self::refund(initiator, &engine, source_id, unconsumed)?;
      }

      Ok(AssetOutcome::Swept {
        amount_in,
        amount_out,
      })
    }

    fn price_gate(asset: AssetKind, decimals: u8, min_price: u128, max_price: u128) -> bool {
      let Some(oracle) = OracleAccount::<T>::get() else {
        return true;
      };
      Self::oracle_price(&oracle, asset, decimals)
        .is_some_and(|normalized| crate::price::within_bounds(normalized, min_price, max_price))
    }

    fn oracle_price(oracle: &T::AccountId, asset: AssetKind, decimals: u8) -> Option<u128> {
      let (raw, raw_decimals) = T::Oracle::price_usd(oracle, asset).ok()?;
      // zero means the oracle has no price for the asset
      if raw.is_zero() {
        return None;
      }
      crate::price::normalize_price(raw, raw_decimals, decimals)
    }

    /// Ask the registry to move `amount` into custody. The call is all-or-nothing.
    fn pull(
      registry: &T::AccountId,
      initiator: &T::AccountId,
      engine: &T::AccountId,
      asset: AssetKind,
      amount: Balance,
    ) -> bool {
      let outcome = with_storage_layer(|| -> Result<(), CallError> {
        let data = T::Registry::pull(registry, initiator, engine, asset, amount)?;
        ensure!(call_returned_true(&data), CallError::Rejected);
        Ok(())
      });
      if let Err(err) = &outcome {
        log::warn!(
          target: LOG_TARGET,
          "pull of {} {:?} from {:?} failed: {:?}",
          amount,
          asset,
          initiator,
          err
        );
      }
      outcome.is_ok()
    }

    /// Top the venue's allowance up to `amount`
    fn approve_venue(
      source_id: u32,
      engine: &T::AccountId,
      venue: &T::AccountId,
      amount: Balance,
    ) -> DispatchResult {
      let allowance = T::Assets::allowance(source_id, engine, venue);
      if allowance >= amount {
        return Ok(());
      }
      T::Assets::approve(source_id, engine, venue, amount - allowance).map_err(|err| {
        log::error!(
          target: LOG_TARGET,
          "approving venue {:?} for asset {} failed: {:?}",
          venue,
          source_id,
          err
        );
        Error::<T>::ApprovalFailed.into()
      })
    }

    /// Cancel whatever is left of the venue's allowance, releasing its deposit
    fn revoke_venue(source_id: u32, engine: &T::AccountId, venue: &T::AccountId) -> DispatchResult {
      // A fully spent approval is already gone
      if T::Assets::allowance(source_id, engine, venue).is_zero() {
        return Ok(());
      }
      T::Revoker::revoke(source_id, engine, venue).map_err(|err| {
        log::error!(
          target: LOG_TARGET,
          "revoking venue {:?} allowance for asset {} failed: {:?}",
          venue,
          source_id,
          err
        );
        Error::<T>::ApprovalFailed.into()
      })
    }

    fn refund(
      initiator: &T::AccountId,
      engine: &T::AccountId,
      source_id: u32,
      amount: Balance,
    ) -> DispatchResult {
      T::Assets::transfer(source_id, engine, initiator, amount, Preservation::Expendable)
        .map(|_| ())
        .map_err(|err| {
          log::error!(
            target: LOG_TARGET,
            "refund of {} of asset {} to {:?} failed: {:?}",
            amount,
            source_id,
            initiator,
            err
          );
          Error::<T>::RefundFailed.into()
        })
    }

    fn settle(
      initiator: &T::AccountId,
      engine: &T::AccountId,
      target: AssetKind,
      amount: Balance,
    ) -> DispatchResult {
      let (result, error) = match target.tracked_id() {
        Some(target_id) => (
          T::Assets::transfer(target_id, engine, initiator, amount, Preservation::Expendable),
          Error::<T>::SettlementFailed,
        ),
        None => (
          T::Currency::transfer(engine, initiator, amount, Preservation::Expendable),
          Error::<T>::NativeTransferFailed,
        ),
      };
      result.map(|_| ()).map_err(|err| {
        log::error!(
          target: LOG_TARGET,
          "payout of {} {:?} to {:?} failed: {:?}",
          amount,
          target,
          initiator,
          err
        );
        error.into()
      })
    }
  }

  #[pallet::genesis_config]
  #[derive(frame::prelude::DefaultNoBound)]
  pub struct GenesisConfig<T: Config> {
    /// Immutable controller of the engine configuration
    pub controller: Option<T::AccountId>,
    pub venue: Option<T::AccountId>,
    pub oracle: Option<T::AccountId>,
  }

  #[pallet::genesis_build]
  impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
    fn build(&self) {
      if let Some(controller) = &self.controller {
        Controller::<T>::put(controller);
      }
      if let Some(venue) = &self.venue {
        VenueAccount::<T>::put(venue);
      }
      if let Some(oracle) = &self.oracle {
        OracleAccount::<T>::put(oracle);
      }
      let account = Pallet::<T>::account_id();
      // Custody account survives zero native balance via provider reference
      frame_system::Pallet::<T>::inc_providers(&account);
      let shortfall = T::ApprovalFloat::get().saturating_sub(T::Currency::balance(&account));
      if !shortfall.is_zero() {
        T::Currency::mint_into(&account, shortfall)
          .expect("custody account must be able to hold the approval float");
      }
    }
  }
}
