//! Swap Engine
//!
//! Routes a swap through one pool (base <-> asset) or two pools
//! (asset -> base -> asset). Every hop is priced on an in-memory copy of its
//! pool; pools are written back only after the whole route and the caller's
//! limit have passed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::pricing::{self, SwapQuote};
use crate::common::{Amount, Asset};
use crate::error::{SettlementError, SettlementResult};
use crate::ledger::{Pool, PoolLedger, PoolStatus};
use crate::store::KvStore;

/// Slip ceilings from admin config, in basis points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapLimits {
    pub trade_slip_bps: Option<u64>,
    pub pool_slip_bps: Option<u64>,
}

/// One priced hop through one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapHop {
    pub pool: Asset,
    pub source: Asset,
    pub target: Asset,
    pub quote: SwapQuote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOutcome {
    pub source: Asset,
    pub target: Asset,
    pub input: Amount,
    pub emitted: Amount,
    pub hops: Vec<SwapHop>,
}

impl SwapOutcome {
    pub fn liquidity_fee(&self) -> Amount {
        self.hops
            .iter()
            .fold(Amount::ZERO, |acc, hop| acc.saturating_add(hop.quote.liquidity_fee))
    }

    pub fn trade_slip_bps(&self) -> u64 {
        self.hops.iter().map(|h| h.quote.trade_slip_bps).sum()
    }
}

#[derive(Debug, Clone)]
pub struct SwapEngine {
    ledger: PoolLedger,
}

impl SwapEngine {
    pub fn new(ledger: PoolLedger) -> Self {
        Self { ledger }
    }

    fn base(&self) -> &Asset {
        self.ledger.base_asset()
    }

    /// Price one hop against `pool` and apply it to the copy
    pub fn swap_one(
        &self,
        pool: &mut Pool,
        source: &Asset,
        amount: Amount,
        limits: SwapLimits,
    ) -> SettlementResult<SwapHop> {
        pool.ensure(PoolStatus::allows_swap, "swap")?;

        let base_in = source == self.base();
        let (input_reserve, output_reserve) = if base_in {
            (pool.balance_base, pool.balance_asset)
        } else {
            (pool.balance_asset, pool.balance_base)
        };

        let quote = pricing::quote(amount, input_reserve, output_reserve)?;

        if let Some(max) = limits.trade_slip_bps {
            if quote.trade_slip_bps > max {
                return Err(SettlementError::validation(format!(
                    "trade slip {} bps is over the limit of {} bps",
                    quote.trade_slip_bps, max
                )));
            }
        }
        if let Some(max) = limits.pool_slip_bps {
            if quote.pool_slip_bps > max {
                return Err(SettlementError::validation(format!(
                    "pool slip {} bps is over the limit of {} bps",
                    quote.pool_slip_bps, max
                )));
            }
        }

        debug!("Pre-Pool: {}Base {}Asset", pool.balance_base, pool.balance_asset);
        let target = if base_in {
            pool.balance_base = quote.new_input_reserve;
            pool.balance_asset = quote.new_output_reserve;
            pool.asset.clone()
        } else {
            pool.balance_asset = quote.new_input_reserve;
            pool.balance_base = quote.new_output_reserve;
            self.base().clone()
        };
        debug!(
            "Post-swap: {}Base {}Asset, emitted {}",
            pool.balance_base, pool.balance_asset, quote.emitted
        );

        Ok(SwapHop {
            pool: pool.asset.clone(),
            source: source.clone(),
            target,
            quote,
        })
    }

    /// Load the pools a route touches
    fn route(&self, store: &dyn KvStore, source: &Asset, target: &Asset) -> SettlementResult<Vec<Pool>> {
        if source == target {
            return Err(SettlementError::validation(format!(
                "swap source and target are both {}",
                source
            )));
        }
        if source == self.base() {
            Ok(vec![self.ledger.pool(store, target)?])
        } else if target == self.base() {
            Ok(vec![self.ledger.pool(store, source)?])
        } else {
            Ok(vec![self.ledger.pool(store, source)?, self.ledger.pool(store, target)?])
        }
    }

    fn run(
        &self,
        pools: &mut [Pool],
        source: &Asset,
        target: &Asset,
        amount: Amount,
        limits: SwapLimits,
    ) -> SettlementResult<SwapOutcome> {
        let mut hops = Vec::with_capacity(pools.len());
        let mut hop_source = source.clone();
        let mut hop_amount = amount;
        for pool in pools.iter_mut() {
            let hop = self.swap_one(pool, &hop_source, hop_amount, limits)?;
            hop_source = hop.target.clone();
            hop_amount = hop.quote.emitted;
            hops.push(hop);
        }
        Ok(SwapOutcome {
            source: source.clone(),
            target: target.clone(),
            input: amount,
            emitted: hop_amount,
            hops,
        })
    }

    /// Price a swap without touching the store
    pub fn quote(
        &self,
        store: &dyn KvStore,
        source: &Asset,
        target: &Asset,
        amount: Amount,
        limits: SwapLimits,
    ) -> SettlementResult<SwapOutcome> {
        let mut pools = self.route(store, source, target)?;
        self.run(&mut pools, source, target, amount, limits)
    }

    /// Execute a swap. `limit` is the minimum acceptable output; when it is
    /// not met no pool is written.
    pub fn swap(
        &self,
        store: &mut dyn KvStore,
        source: &Asset,
        target: &Asset,
        amount: Amount,
        limit: Option<Amount>,
        limits: SwapLimits,
    ) -> SettlementResult<SwapOutcome> {
        let mut pools = self.route(store, source, target)?;
        let outcome = self.run(&mut pools, source, target, amount, limits)?;

        if let Some(limit) = limit {
            if outcome.emitted < limit {
                return Err(SettlementError::PriceProtection {
                    emitted: outcome.emitted,
                    limit,
                });
            }
        }

        for pool in &pools {
            self.ledger.save_pool(store, pool)?;
        }
        info!(
            "Swapped {} {} -> {} {} ({} hop{})",
            amount,
            source,
            outcome.emitted,
            target,
            outcome.hops.len(),
            if outcome.hops.len() == 1 { "" } else { "s" }
        );
        Ok(outcome)
    }
}
