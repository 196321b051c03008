extern crate alloc;

use crate::*;
use alloc::vec::Vec;
use frame::deps::frame_benchmarking::{account, v2::*};
use frame::deps::frame_support::traits::fungibles::Inspect as FungiblesInspect;
use frame::deps::frame_system::RawOrigin;
use frame::prelude::*;

/// Target asset id, kept clear of the source ids `1..=n`
const BENCH_TARGET: u32 = 1_000;
const BENCH_AMOUNT: Balance = 1_000_000;

#[benchmarks]
mod benches {
  use super::*;

  #[benchmark]
  fn sweep_and_convert(n: Linear<1, { T::MaxAssets::get() }>) -> Result<(), BenchmarkError> {
    let caller: T::AccountId = whitelisted_caller();
    let target = AssetKind::Local(BENCH_TARGET);
    T::BenchmarkHelper::fund(&caller, target, BENCH_AMOUNT)
      .map_err(|_| BenchmarkError::Stop("failed to create target asset"))?;

    let mut assets = Vec::new();
    let mut payloads = Vec::new();
    let mut registry = None;
    for id in 1..=n {
      let asset = AssetKind::Local(id);
      T::BenchmarkHelper::fund(&caller, asset, BENCH_AMOUNT)
        .map_err(|_| BenchmarkError::Stop("failed to fund source asset"))?;
      let (asset_registry, venue, payload) =
        T::BenchmarkHelper::collaborators(asset, target, BENCH_AMOUNT);
      VenueAccount::<T>::put(venue);
      registry = Some(asset_registry);
      assets.push(asset);
      payloads.push(
        PayloadOf::<T>::try_from(payload)
          .map_err(|_| BenchmarkError::Stop("conversion payload exceeds MaxPayloadLen"))?,
      );
    }
    let registry = registry.ok_or(BenchmarkError::Stop("no registry"))?;
    let authorization = PayloadOf::<T>::try_from(alloc::vec![1u8])
      .map_err(|_| BenchmarkError::Stop("authorization exceeds MaxPayloadLen"))?;
    let len = assets.len();
    let bounded = |values: Vec<u128>| {
      BoundedVec::<u128, T::MaxAssets>::try_from(values)
        .map_err(|_| BenchmarkError::Stop("too many price bounds"))
    };
    let min_prices = bounded(alloc::vec![0; len])?;
    let max_prices = bounded(alloc::vec![u128::MAX; len])?;
    let assets = BoundedVec::<AssetKind, T::MaxAssets>::try_from(assets)
      .map_err(|_| BenchmarkError::Stop("too many assets"))?;
    let payloads = BoundedVec::<PayloadOf<T>, T::MaxAssets>::try_from(payloads)
      .map_err(|_| BenchmarkError::Stop("too many payloads"))?;

    #[extrinsic_call]
    _(
      RawOrigin::Signed(caller.clone()),
      registry,
      authorization,
      assets,
      min_prices,
      max_prices,
      8,
      target,
      payloads,
      SweepMode::Atomic,
    );

    assert_eq!(T::Assets::balance(1, &caller), 0);
    assert!(!SweepLock::<T>::get());
    Ok(())
  }

  #[benchmark]
  fn set_conversion_venue() {
    let controller: T::AccountId = whitelisted_caller();
    let venue: T::AccountId = account("venue", 0, 0);
    Controller::<T>::put(&controller);

    #[extrinsic_call]
    _(RawOrigin::Signed(controller), venue.clone());

    assert_eq!(VenueAccount::<T>::get(), Some(venue));
  }

  #[benchmark]
  fn set_price_oracle() {
    let controller: T::AccountId = whitelisted_caller();
    let oracle: T::AccountId = account("oracle", 0, 0);
    Controller::<T>::put(&controller);

    #[extrinsic_call]
    _(RawOrigin::Signed(controller), Some(oracle.clone()));

    assert_eq!(OracleAccount::<T>::get(), Some(oracle));
  }

  #[cfg(test)]
  use crate::mock::{Test, new_test_ext};
  #[cfg(test)]
  impl_benchmark_test_suite!(Pallet, new_test_ext(), Test);
}
