extern crate alloc;

use crate as pallet_sweep_router;
use crate::{
  ApprovalRevoker, AuthorizationRegistry, CallError, CallResult, ConversionVenue, PriceOracle,
  SweepMode,
};
use alloc::vec::Vec;
use codec::{Decode, Encode};
use polkadot_sdk::frame_support::traits::fungible::Mutate as NativeMutate;
use polkadot_sdk::frame_support::traits::fungibles::{Mutate, approvals::Mutate as ApprovalMutate};
use polkadot_sdk::frame_support::traits::tokens::Preservation;
use polkadot_sdk::frame_support::{
  BoundedVec, PalletId, construct_runtime, derive_impl,
  traits::{ConstU32, ConstU128, Get},
};
use polkadot_sdk::frame_system;
use polkadot_sdk::sp_runtime::{
  BuildStorage, DispatchError, DispatchResult,
  testing::H256,
  traits::{BlakeTwo256, IdentityLookup},
};
use primitives::{AssetInspector, AssetKind, params::USD_PRICE_DECIMALS};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

pub const ALICE: u64 = 1;
pub const BOB: u64 = 2;
pub const CONTROLLER: u64 = 10;
pub const REGISTRY: u64 = 20;
pub const VENUE: u64 = 30;
pub const ORACLE: u64 = 40;
pub const ASSET_OWNER: u64 = 99;

pub const ASSET_A: u32 = 1;
pub const ASSET_B: u32 = 2;
pub const TARGET: u32 = 3;

pub const EXISTENTIAL_DEPOSIT: u128 = 5;
pub const APPROVAL_FLOAT: u128 = 10;

/// Authorization payload the registry refuses
pub const REJECTED_AUTHORIZATION: &[u8] = b"forged";

/// How the registry answers a pull for a given asset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullBehaviour {
  /// Moves the funds and returns an encoded `true`
  Honest,
  /// Moves the funds and returns no data at all
  Silent,
  /// Moves the funds but returns an encoded `false`
  ReportsFalse,
  /// Fails the call
  Reverts,
  /// Returns `true` without moving anything
  Hollow,
}

/// Instruction understood by the mock venue, SCALE-encoded into the conversion payload
#[derive(Clone, Debug, Encode, Decode, PartialEq, Eq)]
pub enum VenueOrder {
  /// Take `amount_in` through the allowance and pay `amount_out` of `asset_out`
  Swap {
    asset_in: AssetKind,
    amount_in: u128,
    asset_out: AssetKind,
    amount_out: u128,
  },
  /// Take `amount_in` through the allowance and pay nothing
  Swallow { asset_in: AssetKind, amount_in: u128 },
  /// Pay nothing and take nothing
  Noop,
  /// Move the input, then fail
  FailAfterTaking { asset_in: AssetKind, amount_in: u128 },
  /// Call back into the router while the outer sweep is in flight
  Reenter,
}

thread_local! {
    // Initiators whose authorization payload has been relayed
    pub static AUTHORIZED: RefCell<BTreeSet<u64>> = const { RefCell::new(BTreeSet::new()) };

    // Per-asset registry behaviour; assets not listed are pulled honestly
    pub static PULL_BEHAVIOUR: RefCell<BTreeMap<AssetKind, PullBehaviour>> = const { RefCell::new(BTreeMap::new()) };

    // Oracle prices: asset -> (price, decimals)
    pub static ORACLE_PRICES: RefCell<BTreeMap<AssetKind, (u128, u8)>> = const { RefCell::new(BTreeMap::new()) };

    // Result of the venue's attempt to re-enter the router
    pub static REENTRY_RESULT: RefCell<Option<DispatchResult>> = const { RefCell::new(None) };
}

pub fn authorize(who: u64) {
  AUTHORIZED.with(|a| a.borrow_mut().insert(who));
}

pub fn set_pull_behaviour(asset: AssetKind, behaviour: PullBehaviour) {
  PULL_BEHAVIOUR.with(|b| b.borrow_mut().insert(asset, behaviour));
}

pub fn set_oracle_price(asset: AssetKind, price: u128, decimals: u8) {
  ORACLE_PRICES.with(|p| p.borrow_mut().insert(asset, (price, decimals)));
}

pub fn reentry_result() -> Option<DispatchResult> {
  REENTRY_RESULT.with(|r| *r.borrow())
}

type Block = frame_system::mocking::MockBlock<Test>;

construct_runtime!(
  pub struct Test {
    System: frame_system,
    Balances: polkadot_sdk::pallet_balances,
    Assets: polkadot_sdk::pallet_assets,
    SweepRouter: pallet_sweep_router,
  }
);

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
  type Block = Block;
  type AccountId = u64;
  type Lookup = IdentityLookup<Self::AccountId>;
  type Hash = H256;
  type Hashing = BlakeTwo256;
  type AccountData = polkadot_sdk::pallet_balances::AccountData<u128>;
}

impl polkadot_sdk::pallet_balances::Config for Test {
  type MaxLocks = ();
  type MaxReserves = ();
  type ReserveIdentifier = [u8; 8];
  type Balance = u128;
  type DustRemoval = ();
  type RuntimeEvent = RuntimeEvent;
  type ExistentialDeposit = ConstU128<EXISTENTIAL_DEPOSIT>;
  type AccountStore = System;
  type WeightInfo = ();
  type FreezeIdentifier = ();
  type MaxFreezes = ();
  type RuntimeHoldReason = ();
  type RuntimeFreezeReason = ();
  type DoneSlashHandler = ();
}

impl polkadot_sdk::pallet_assets::Config for Test {
  type RuntimeEvent = RuntimeEvent;
  type Balance = u128;
  type AssetId = u32;
  type AssetIdParameter = u32;
  type Currency = Balances;
  type CreateOrigin = polkadot_sdk::frame_support::traits::AsEnsureOriginWithArg<
    frame_system::EnsureSigned<Self::AccountId>,
  >;
  type ForceOrigin = frame_system::EnsureRoot<Self::AccountId>;
  type AssetDeposit = ConstU128<1>;
  type AssetAccountDeposit = ConstU128<1>;
  type MetadataDepositBase = ConstU128<1>;
  type MetadataDepositPerByte = ConstU128<1>;
  type ApprovalDeposit = ConstU128<1>;
  type StringLimit = ConstU32<50>;
  type Freezer = ();
  type Extra = ();
  type ReserveData = ();
  type CallbackHandle = ();
  type WeightInfo = ();
  type RemoveItemsLimit = ConstU32<5>;
  type Holder = ();
  #[cfg(feature = "runtime-benchmarks")]
  type BenchmarkHelper = AssetBenchmarkHelper;
}

#[cfg(feature = "runtime-benchmarks")]
pub struct AssetBenchmarkHelper;

#[cfg(feature = "runtime-benchmarks")]
impl polkadot_sdk::pallet_assets::BenchmarkHelper<u32, ()> for AssetBenchmarkHelper {
  fn create_asset_id_parameter(id: u32) -> u32 {
    id
  }
  fn create_reserve_id_parameter(_id: u32) -> () {
    ()
  }
}

fn tracked(asset: AssetKind) -> Result<u32, CallError> {
  asset
    .tracked_id()
    .ok_or(CallError::Reverted(DispatchError::Other("untracked asset")))
}

pub struct MockRegistry;
impl AuthorizationRegistry<u64> for MockRegistry {
  fn relay(registry: &u64, initiator: &u64, payload: &[u8]) -> CallResult {
    if *registry != REGISTRY {
      return Err(CallError::UnknownTarget);
    }
    if payload == REJECTED_AUTHORIZATION {
      return Err(DispatchError::Other("invalid signature").into());
    }
    authorize(*initiator);
    Ok(Vec::new())
  }

  fn pull(registry: &u64, from: &u64, to: &u64, asset: AssetKind, amount: u128) -> CallResult {
    if *registry != REGISTRY {
      return Err(CallError::UnknownTarget);
    }
    if !AUTHORIZED.with(|a| a.borrow().contains(from)) {
      return Err(DispatchError::Other("no authorization").into());
    }
    let id = tracked(asset)?;
    let behaviour = PULL_BEHAVIOUR
      .with(|b| b.borrow().get(&asset).copied())
      .unwrap_or(PullBehaviour::Honest);
    let move_funds =
      || <Assets as Mutate<u64>>::transfer(id, from, to, amount, Preservation::Expendable);
    match behaviour {
      PullBehaviour::Honest => {
        move_funds()?;
        Ok(true.encode())
      }
      PullBehaviour::Silent => {
        move_funds()?;
        Ok(Vec::new())
      }
      PullBehaviour::ReportsFalse => {
        move_funds()?;
        Ok(false.encode())
      }
      PullBehaviour::Reverts => Err(DispatchError::Other("pull denied").into()),
      PullBehaviour::Hollow => Ok(true.encode()),
    }
  }
}

fn pay_out(to: &u64, asset: AssetKind, amount: u128) -> DispatchResult {
  match asset {
    AssetKind::Native => <Balances as NativeMutate<u64>>::mint_into(to, amount).map(|_| ()),
    AssetKind::Local(id) | AssetKind::Foreign(id) => {
      <Assets as Mutate<u64>>::mint_into(id, to, amount).map(|_| ())
    }
  }
}

fn take_input(caller: &u64, asset: AssetKind, amount: u128) -> Result<(), CallError> {
  let id = tracked(asset)?;
  <Assets as ApprovalMutate<u64>>::transfer_from(id, caller, &VENUE, &VENUE, amount)?;
  Ok(())
}

pub struct MockVenue;
impl ConversionVenue<u64> for MockVenue {
  fn call(venue: &u64, caller: &u64, payload: &[u8]) -> CallResult {
    if *venue != VENUE {
      return Err(CallError::UnknownTarget);
    }
    let order = VenueOrder::decode(&mut &payload[..])
      .map_err(|_| CallError::Reverted(DispatchError::Other("malformed order")))?;
    match order {
      VenueOrder::Swap {
        asset_in,
        amount_in,
        asset_out,
        amount_out,
      } => {
        take_input(caller, asset_in, amount_in)?;
        pay_out(caller, asset_out, amount_out)?;
      }
      VenueOrder::Swallow {
        asset_in,
        amount_in,
      } => take_input(caller, asset_in, amount_in)?,
      VenueOrder::Noop => {}
      VenueOrder::FailAfterTaking {
        asset_in,
        amount_in,
      } => {
        take_input(caller, asset_in, amount_in)?;
        return Err(DispatchError::Other("venue out of liquidity").into());
      }
      VenueOrder::Reenter => {
        let result = SweepRouter::sweep_and_convert(
          RuntimeOrigin::signed(VENUE),
          REGISTRY,
          payload_of(b""),
          assets_of(&[AssetKind::Local(ASSET_A)]),
          prices_of(&[0]),
          prices_of(&[u128::MAX]),
          USD_PRICE_DECIMALS,
          AssetKind::Local(TARGET),
          payloads_of(&[VenueOrder::Noop.encode()]),
          SweepMode::BestEffort,
        );
        REENTRY_RESULT.with(|r| *r.borrow_mut() = Some(result));
        result?;
      }
    }
    Ok(Vec::new())
  }
}

pub struct MockOracle;
impl PriceOracle<u64> for MockOracle {
  fn price_usd(oracle: &u64, asset: AssetKind) -> Result<(u128, u8), CallError> {
    if *oracle != ORACLE {
      return Err(CallError::UnknownTarget);
    }
    // Unlisted assets read as "price unknown"
    Ok(ORACLE_PRICES
      .with(|p| p.borrow().get(&asset).copied())
      .unwrap_or((0, USD_PRICE_DECIMALS)))
  }
}

pub struct MockRevoker;
impl ApprovalRevoker<u64> for MockRevoker {
  fn revoke(asset: u32, owner: &u64, delegate: &u64) -> DispatchResult {
    Assets::cancel_approval(RuntimeOrigin::signed(*owner), asset, *delegate)
  }
}

pub struct PalletIdStub;
impl Get<PalletId> for PalletIdStub {
  fn get() -> PalletId {
    PalletId(*primitives::ecosystem::pallet_ids::SWEEP_ROUTER_PALLET_ID)
  }
}

pub type MaxAssets = ConstU32<8>;
pub type MaxPayloadLen = ConstU32<256>;

impl pallet_sweep_router::Config for Test {
  type Assets = Assets;
  type Currency = Balances;
  type Registry = MockRegistry;
  type Venue = MockVenue;
  type Oracle = MockOracle;
  type Revoker = MockRevoker;
  type PalletId = PalletIdStub;
  type ApprovalFloat = ConstU128<APPROVAL_FLOAT>;
  type MaxAssets = MaxAssets;
  type MaxPayloadLen = MaxPayloadLen;
  type WeightInfo = ();
  #[cfg(feature = "runtime-benchmarks")]
  type BenchmarkHelper = SweepRouterBenchmarkHelper;
}

#[cfg(feature = "runtime-benchmarks")]
pub struct SweepRouterBenchmarkHelper;

#[cfg(feature = "runtime-benchmarks")]
impl crate::BenchmarkHelper<u64> for SweepRouterBenchmarkHelper {
  fn fund(who: &u64, asset: AssetKind, amount: u128) -> DispatchResult {
    use polkadot_sdk::frame_support::traits::fungibles::{Create, Inspect};
    authorize(*who);
    if let Some(id) = asset.tracked_id() {
      if !<Assets as Inspect<u64>>::asset_exists(id) {
        <Assets as Create<u64>>::create(id, ASSET_OWNER, true, 1)?;
      }
    }
    pay_out(who, asset, amount)
  }

  fn collaborators(asset: AssetKind, target: AssetKind, amount: u128) -> (u64, u64, Vec<u8>) {
    let order = VenueOrder::Swap {
      asset_in: asset,
      amount_in: amount,
      asset_out: target,
      amount_out: amount,
    };
    (REGISTRY, VENUE, order.encode())
  }
}

pub fn payload_of(bytes: &[u8]) -> BoundedVec<u8, MaxPayloadLen> {
  bytes.to_vec().try_into().expect("payload within bound")
}

pub fn assets_of(assets: &[AssetKind]) -> BoundedVec<AssetKind, MaxAssets> {
  assets.to_vec().try_into().expect("asset list within bound")
}

pub fn prices_of(prices: &[u128]) -> BoundedVec<u128, MaxAssets> {
  prices.to_vec().try_into().expect("price list within bound")
}

pub fn payloads_of(
  payloads: &[Vec<u8>],
) -> BoundedVec<BoundedVec<u8, MaxPayloadLen>, MaxAssets> {
  payloads
    .iter()
    .map(|payload| payload_of(payload))
    .collect::<Vec<_>>()
    .try_into()
    .expect("payload list within bound")
}

pub fn swap_order(asset_in: u32, amount_in: u128, asset_out: AssetKind, amount_out: u128) -> Vec<u8> {
  VenueOrder::Swap {
    asset_in: AssetKind::Local(asset_in),
    amount_in,
    asset_out,
    amount_out,
  }
  .encode()
}

pub fn new_test_ext() -> polkadot_sdk::sp_io::TestExternalities {
  let mut t = frame_system::GenesisConfig::<Test>::default()
    .build_storage()
    .unwrap();

  polkadot_sdk::pallet_assets::GenesisConfig::<Test> {
    // (id, owner, is_sufficient, min_balance)
    assets: alloc::vec![
      (ASSET_A, ASSET_OWNER, true, 1),
      (ASSET_B, ASSET_OWNER, true, 1),
      (TARGET, ASSET_OWNER, true, 1),
    ],
    metadata: alloc::vec![],
    accounts: alloc::vec![(ASSET_A, ALICE, 1_000), (ASSET_B, ALICE, 500)],
    reserves: alloc::vec![],
    next_asset_id: None,
  }
  .assimilate_storage(&mut t)
  .unwrap();

  pallet_sweep_router::GenesisConfig::<Test> {
    controller: Some(CONTROLLER),
    venue: Some(VENUE),
    oracle: None,
  }
  .assimilate_storage(&mut t)
  .unwrap();

  // Reset State
  AUTHORIZED.with(|a| a.borrow_mut().clear());
  PULL_BEHAVIOUR.with(|b| b.borrow_mut().clear());
  ORACLE_PRICES.with(|p| p.borrow_mut().clear());
  REENTRY_RESULT.with(|r| *r.borrow_mut() = None);

  let mut ext: polkadot_sdk::sp_io::TestExternalities = t.into();
  ext.execute_with(|| System::set_block_number(1));
  ext
}
