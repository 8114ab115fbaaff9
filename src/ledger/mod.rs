//! Pool Ledger - pools, staker positions and unit accounting
//!
//! The ledger is the only writer of `pool:` and `staker:` keys.

pub mod pool;
pub mod staker;
pub mod units;

pub use pool::{Pool, PoolStatus};
pub use staker::{StakeOutcome, StakerPosition, WithdrawOutcome};
pub use units::MAX_WITHDRAW_BASIS_POINTS;

use tracing::{debug, info};

use crate::common::{Address, Amount, Asset};
use crate::error::{SettlementError, SettlementResult};
use crate::store::{self, KvStore};

pub fn pool_key(asset: &Asset) -> String {
    format!("pool:{}", asset)
}

pub fn staker_key(asset: &Asset, address: &Address) -> String {
    format!("staker:{}:{}", asset, address)
}

#[derive(Debug, Clone)]
pub struct PoolLedger {
    base_asset: Asset,
}

impl PoolLedger {
    pub fn new(base_asset: Asset) -> Self {
        Self { base_asset }
    }

    pub fn base_asset(&self) -> &Asset {
        &self.base_asset
    }

    // ============================================
    // POOLS
    // ============================================

    pub fn get_pool(&self, store: &dyn KvStore, asset: &Asset) -> SettlementResult<Option<Pool>> {
        store::read(store, &pool_key(asset))
    }

    /// Like `get_pool` but a missing pool is `NotFound`
    pub fn pool(&self, store: &dyn KvStore, asset: &Asset) -> SettlementResult<Pool> {
        self.get_pool(store, asset)?
            .ok_or_else(|| SettlementError::NotFound(format!("pool {}", asset)))
    }

    pub fn save_pool(&self, store: &mut dyn KvStore, pool: &Pool) -> SettlementResult<()> {
        store::write(store, &pool_key(&pool.asset), pool)
    }

    /// All pools in canonical asset order
    pub fn list_pools(&self, store: &dyn KvStore) -> SettlementResult<Vec<Pool>> {
        let mut pools: Vec<Pool> = store::read_prefix(store, "pool:")?
            .into_iter()
            .map(|(_, pool)| pool)
            .collect();
        pools.sort_by(|a: &Pool, b: &Pool| a.asset.cmp(&b.asset));
        Ok(pools)
    }

    pub fn create_pool(
        &self,
        store: &mut dyn KvStore,
        asset: &Asset,
        status: PoolStatus,
    ) -> SettlementResult<Pool> {
        if asset == &self.base_asset {
            return Err(SettlementError::validation(format!(
                "{} is the base asset and can't have a pool",
                asset
            )));
        }
        if self.get_pool(store, asset)?.is_some() {
            return Err(SettlementError::AlreadyExists(format!("pool {}", asset)));
        }

        let pool = Pool::new(asset.clone(), status);
        self.save_pool(store, &pool)?;
        info!("Pool created: {} ({})", asset, status);
        Ok(pool)
    }

    pub fn set_status(
        &self,
        store: &mut dyn KvStore,
        asset: &Asset,
        status: PoolStatus,
    ) -> SettlementResult<Pool> {
        let mut pool = self.pool(store, asset)?;
        let previous = pool.status;
        pool.status = status;
        self.save_pool(store, &pool)?;
        info!("Pool status: {} {} -> {}", asset, previous, status);
        Ok(pool)
    }

    // ============================================
    // LIQUIDITY
    // ============================================

    pub fn stake(
        &self,
        store: &mut dyn KvStore,
        asset: &Asset,
        base: Amount,
        asset_amount: Amount,
        staker: &Address,
    ) -> SettlementResult<StakeOutcome> {
        let mut pool = self.pool(store, asset)?;
        pool.ensure(PoolStatus::allows_stake, "stake")?;
        if base.is_zero() && asset_amount.is_zero() {
            return Err(SettlementError::validation("stake of zero base and zero asset"));
        }

        let units = units::stake_units(
            pool.pool_units,
            pool.balance_base,
            pool.balance_asset,
            base,
            asset_amount,
        )?;
        if units == 0 {
            return Err(SettlementError::validation(format!(
                "stake of {} base / {} asset mints no units",
                base, asset_amount
            )));
        }

        debug!("Pre-stake: {}", pool);
        pool.balance_base = pool.balance_base.checked_add(base)?;
        pool.balance_asset = pool.balance_asset.checked_add(asset_amount)?;
        pool.pool_units = pool
            .pool_units
            .checked_add(units)
            .ok_or(SettlementError::Overflow)?;

        let mut position = self
            .staker(store, asset, staker)?
            .unwrap_or_else(|| StakerPosition {
                asset: asset.clone(),
                address: staker.clone(),
                units: 0,
            });
        position.units = position
            .units
            .checked_add(units)
            .ok_or(SettlementError::Overflow)?;

        self.save_pool(store, &pool)?;
        store::write(store, &staker_key(asset, staker), &position)?;
        debug!("Post-stake: {}", pool);
        info!("Staked {} base / {} asset into {} for {} units", base, asset_amount, asset, units);

        Ok(StakeOutcome {
            units,
            pool_units: pool.pool_units,
        })
    }

    pub fn withdraw(
        &self,
        store: &mut dyn KvStore,
        asset: &Asset,
        staker: &Address,
        basis_points: u64,
    ) -> SettlementResult<WithdrawOutcome> {
        let mut pool = self.pool(store, asset)?;
        pool.ensure(PoolStatus::allows_withdraw, "withdraw")?;

        let mut position = self
            .staker(store, asset, staker)?
            .ok_or_else(|| SettlementError::NoPosition {
                asset: asset.to_string(),
                address: staker.to_string(),
            })?;

        let redeemed = units::redeem_units(position.units, basis_points)?;
        if redeemed == 0 {
            return Err(SettlementError::validation(format!(
                "withdraw of {} bps from {} units redeems nothing",
                basis_points, position.units
            )));
        }

        let base = units::share_of(pool.balance_base, redeemed, pool.pool_units)?;
        let asset_amount = units::share_of(pool.balance_asset, redeemed, pool.pool_units)?;

        debug!("Pre-withdraw: {}", pool);
        pool.balance_base = pool.balance_base.checked_sub(base)?;
        pool.balance_asset = pool.balance_asset.checked_sub(asset_amount)?;
        pool.pool_units = pool
            .pool_units
            .checked_sub(redeemed)
            .ok_or(SettlementError::Overflow)?;
        position.units -= redeemed;

        self.save_pool(store, &pool)?;
        let key = staker_key(asset, staker);
        if position.units == 0 {
            store.delete(&key);
        } else {
            store::write(store, &key, &position)?;
        }
        debug!("Post-withdraw: {}", pool);
        info!(
            "Withdrew {} units from {}: {} base / {} asset",
            redeemed, asset, base, asset_amount
        );

        Ok(WithdrawOutcome {
            units: redeemed,
            base,
            asset: asset_amount,
        })
    }

    /// Withdraw every staker in full and suspend the pool. Returns each
    /// staker's payout in staker order.
    pub fn end_pool(
        &self,
        store: &mut dyn KvStore,
        asset: &Asset,
    ) -> SettlementResult<Vec<(Address, WithdrawOutcome)>> {
        self.pool(store, asset)?
            .ensure(PoolStatus::allows_withdraw, "end")?;

        let mut payouts = Vec::new();
        for position in self.list_stakers(store, asset)? {
            let out = self.withdraw(store, asset, &position.address, MAX_WITHDRAW_BASIS_POINTS)?;
            payouts.push((position.address, out));
        }
        self.set_status(store, asset, PoolStatus::Suspended)?;
        info!("Pool {} ended with {} stakers withdrawn", asset, payouts.len());
        Ok(payouts)
    }

    /// Deposit into the reserves without minting units
    pub fn add_liquidity(
        &self,
        store: &mut dyn KvStore,
        asset: &Asset,
        base: Amount,
        asset_amount: Amount,
    ) -> SettlementResult<Pool> {
        let mut pool = self.pool(store, asset)?;
        pool.ensure(PoolStatus::allows_withdraw, "add")?;
        if base.is_zero() && asset_amount.is_zero() {
            return Err(SettlementError::validation("add of zero base and zero asset"));
        }
        if pool.is_empty() {
            return Err(SettlementError::validation(format!(
                "pool {} has no stakers to add liquidity for",
                asset
            )));
        }

        pool.balance_base = pool.balance_base.checked_add(base)?;
        pool.balance_asset = pool.balance_asset.checked_add(asset_amount)?;
        self.save_pool(store, &pool)?;
        info!("Added {} base / {} asset to {}", base, asset_amount, asset);
        Ok(pool)
    }

    // ============================================
    // STAKERS
    // ============================================

    pub fn staker(
        &self,
        store: &dyn KvStore,
        asset: &Asset,
        address: &Address,
    ) -> SettlementResult<Option<StakerPosition>> {
        store::read(store, &staker_key(asset, address))
    }

    pub fn list_stakers(&self, store: &dyn KvStore, asset: &Asset) -> SettlementResult<Vec<StakerPosition>> {
        Ok(store::read_prefix(store, &format!("staker:{}:", asset))?
            .into_iter()
            .map(|(_, position)| position)
            .collect())
    }
}
