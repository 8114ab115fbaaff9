//! Inbound Dispatcher
//!
//! Turns one observed inbound transaction into ledger changes. Each command
//! runs inside its own `Transaction`; when it fails the overlay is dropped
//! and the refund is recorded against the untouched state.
//!
//! Outcome policy:
//! - value-bearing failure: refund event (status refunded) + payout back to the sender
//! - unauthorized relayer: accepted, nothing changes
//! - structural failure with nothing to return: reported as `Failed`

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::admin::{AdminConfigStore, AdminKey};
use crate::common::{sum_of, Address, Amount, Asset, Chain, Coin, TxId};
use crate::config::Config;
use crate::error::{SettlementError, SettlementResult};
use crate::events::{EventDetail, EventKind, EventLedger};
use crate::ledger::{PoolLedger, PoolStatus, WithdrawOutcome, MAX_WITHDRAW_BASIS_POINTS};
use crate::memo::{parse_memo, AdminMemo, Memo};
use crate::outbound::OutboundQueue;
use crate::store::{KvStore, Transaction};
use crate::swap::SwapEngine;
use crate::tracker::{Tracker, TxInRecord, TxInStatus};

/// An inbound transaction as delivered by the observation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundTx {
    pub in_hash: TxId,
    pub sender: Address,
    pub observed_pool_address: Address,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub coins: Vec<Coin>,
    /// Height on the external chain
    #[serde(default)]
    pub block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Accepted { event: Option<u64> },
    Refunded { reason: String, event: u64 },
    Failed(SettlementError),
}

impl TxOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TxOutcome::Accepted { .. } => "accepted",
            TxOutcome::Refunded { .. } => "refunded",
            TxOutcome::Failed(_) => "failed",
        }
    }
}

/// What a successful command left behind
struct Executed {
    event: Option<u64>,
    status: TxInStatus,
}

pub struct Handler {
    default_chain: Chain,
    default_withdraw_bps: u64,
    ledger: PoolLedger,
    swaps: SwapEngine,
    outbound: OutboundQueue,
    events: EventLedger,
    admin: AdminConfigStore,
    tracker: Tracker,
}

impl Handler {
    pub fn new(config: &Config) -> SettlementResult<Self> {
        let ledger = PoolLedger::new(config.base_asset()?);
        Ok(Self {
            default_chain: config.default_chain()?,
            default_withdraw_bps: config.default_withdraw_basis_points,
            swaps: SwapEngine::new(ledger.clone()),
            ledger,
            outbound: OutboundQueue::new(config.outbound_delay, config.relayers()?),
            events: EventLedger,
            admin: AdminConfigStore::new(config.trusted()?, config.pool_address()?),
            tracker: Tracker,
        })
    }

    pub fn ledger(&self) -> &PoolLedger {
        &self.ledger
    }

    pub fn swaps(&self) -> &SwapEngine {
        &self.swaps
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    pub fn events(&self) -> &EventLedger {
        &self.events
    }

    pub fn admin(&self) -> &AdminConfigStore {
        &self.admin
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn base_asset(&self) -> &Asset {
        self.ledger.base_asset()
    }

    /// Process one inbound at block `height`. Only storage failures while
    /// recording the outcome are returned as `Err`.
    pub fn handle(&self, store: &mut dyn KvStore, height: u64, tx: &InboundTx) -> SettlementResult<TxOutcome> {
        if self.tracker.get(store, &tx.in_hash)?.is_some() {
            warn!("Duplicate inbound {} ignored", tx.in_hash);
            return Ok(TxOutcome::Failed(SettlementError::AlreadyExists(format!(
                "tx {}",
                tx.in_hash
            ))));
        }
        self.tracker.observe_in(store, tx.block_height)?;

        let memo = parse_memo(&tx.memo, &self.default_chain);
        debug!("Inbound {} from {}: {} ({} coins)", tx.in_hash, tx.sender, memo.kind(), tx.coins.len());

        let result = match self.check_pool_address(store, tx, &memo) {
            Ok(()) => {
                let mut scoped = Transaction::new(store);
                match self.execute(&mut scoped, height, tx, &memo) {
                    Ok(done) => {
                        scoped.commit();
                        Ok(done)
                    }
                    Err(err) => {
                        scoped.discard();
                        Err(err)
                    }
                }
            }
            Err(err) => Err(err),
        };

        let (outcome, status) = match result {
            Ok(done) => (TxOutcome::Accepted { event: done.event }, done.status),
            Err(SettlementError::Unauthorized(who)) => {
                warn!("Unauthorized {} from {} ignored", memo.kind(), who);
                (TxOutcome::Accepted { event: None }, TxInStatus::Done)
            }
            Err(err) if Self::takes_refund_path(tx, &memo, &err) => {
                info!("Refunding {}: {}", tx.in_hash, err);
                let event = self.refund(store, height, tx, &memo, &err)?;
                (
                    TxOutcome::Refunded {
                        reason: err.to_string(),
                        event,
                    },
                    TxInStatus::Refunded,
                )
            }
            Err(err) => {
                warn!("Inbound {} failed: {}", tx.in_hash, err);
                (TxOutcome::Failed(err), TxInStatus::Done)
            }
        };

        self.tracker.put(
            store,
            &TxInRecord {
                in_hash: tx.in_hash.clone(),
                memo: tx.memo.clone(),
                sender: tx.sender.clone(),
                status,
                out_hash: None,
            },
        )?;
        Ok(outcome)
    }

    fn takes_refund_path(tx: &InboundTx, memo: &Memo, err: &SettlementError) -> bool {
        if matches!(memo, Memo::Outbound { .. }) {
            return false;
        }
        if !tx.coins.is_empty() {
            return true;
        }
        !err.is_structural()
            && matches!(
                memo,
                Memo::Swap { .. }
                    | Memo::Stake { .. }
                    | Memo::Withdraw { .. }
                    | Memo::Add { .. }
                    | Memo::Unrecognized { .. }
            )
    }

    fn check_pool_address(&self, store: &dyn KvStore, tx: &InboundTx, memo: &Memo) -> SettlementResult<()> {
        if matches!(memo, Memo::Outbound { .. }) {
            return Ok(());
        }
        let expected = self.admin.pool_address(store)?;
        if tx.observed_pool_address != expected {
            return Err(SettlementError::validation(format!(
                "sent to {}, current pool address is {}",
                tx.observed_pool_address, expected
            )));
        }
        Ok(())
    }

    fn execute(&self, store: &mut dyn KvStore, height: u64, tx: &InboundTx, memo: &Memo) -> SettlementResult<Executed> {
        match memo {
            Memo::Create { asset } => {
                let status = self.admin.default_pool_status(store)?;
                self.ledger.create_pool(store, asset, status)?;
                self.return_attached(store, height, tx)
            }
            Memo::Stake { asset } => self.stake(store, height, tx, asset),
            Memo::Withdraw { asset, basis_points } => {
                self.withdraw(store, height, tx, asset, basis_points.unwrap_or(self.default_withdraw_bps))
            }
            Memo::Swap {
                target,
                destination,
                limit,
            } => self.swap(store, height, tx, target, destination.as_ref(), *limit),
            Memo::Add { asset } => self.add(store, height, tx, asset),
            Memo::Gas => self.gas(store, height, tx),
            Memo::Outbound { height: out_height } => self.confirm_outbound(store, tx, *out_height),
            Memo::EndPool { asset } => self.end_pool(store, height, tx, asset),
            Memo::Admin(admin) => self.admin_command(store, height, tx, admin),
            Memo::Unrecognized { reason } => Err(SettlementError::Validation(reason.clone())),
        }
    }

    // ============================================
    // COMMANDS
    // ============================================

    /// Sum coins into (base, asset), rejecting anything else
    fn split_coins(&self, coins: &[Coin], asset: &Asset) -> SettlementResult<(Amount, Amount)> {
        if let Some(stray) = coins
            .iter()
            .find(|c| &c.asset != asset && &c.asset != self.base_asset())
        {
            return Err(SettlementError::validation(format!(
                "{} doesn't belong in pool {}",
                stray.asset, asset
            )));
        }
        Ok((sum_of(coins, self.base_asset())?, sum_of(coins, asset)?))
    }

    fn stake(&self, store: &mut dyn KvStore, height: u64, tx: &InboundTx, asset: &Asset) -> SettlementResult<Executed> {
        let (base, asset_amount) = self.split_coins(&tx.coins, asset)?;
        let out = self.ledger.stake(store, asset, base, asset_amount, &tx.sender)?;
        let id = self.events.append(
            store,
            EventKind::Stake,
            Some(asset.clone()),
            &tx.in_hash,
            height,
            EventDetail::Stake {
                base,
                asset: asset_amount,
                units: out.units,
            },
        )?;
        self.events.complete(store, id, &[])?;
        Ok(Executed {
            event: Some(id),
            status: TxInStatus::Done,
        })
    }

    fn withdraw(
        &self,
        store: &mut dyn KvStore,
        height: u64,
        tx: &InboundTx,
        asset: &Asset,
        basis_points: u64,
    ) -> SettlementResult<Executed> {
        let out = self.ledger.withdraw(store, asset, &tx.sender, basis_points)?;
        let id = self.events.append(
            store,
            EventKind::Unstake,
            Some(asset.clone()),
            &tx.in_hash,
            height,
            EventDetail::Unstake {
                basis_points,
                units: out.units,
                base: out.base,
                asset: out.asset,
            },
        )?;

        let mut scheduled = self.pay_out(store, height, tx, &tx.sender, asset, &out)?;
        scheduled += self.return_coins(store, height, tx, &tx.sender)?;

        if scheduled == 0 {
            self.events.complete(store, id, &[])?;
        }
        Ok(Executed {
            event: Some(id),
            status: if scheduled == 0 { TxInStatus::Done } else { TxInStatus::Processed },
        })
    }

    /// Queue both sides of a withdraw to `to`; returns how many were queued
    fn pay_out(
        &self,
        store: &mut dyn KvStore,
        height: u64,
        tx: &InboundTx,
        to: &Address,
        asset: &Asset,
        out: &WithdrawOutcome,
    ) -> SettlementResult<usize> {
        let mut scheduled = 0;
        for coin in [
            Coin::new(self.base_asset().clone(), out.base),
            Coin::new(asset.clone(), out.asset),
        ] {
            if self.outbound.schedule(store, height, to, &coin, &tx.in_hash)?.is_some() {
                scheduled += 1;
            }
        }
        Ok(scheduled)
    }

    /// Operator shutdown of a pool: every staker is withdrawn in full and
    /// paid out, then the pool is suspended
    fn end_pool(&self, store: &mut dyn KvStore, height: u64, tx: &InboundTx, asset: &Asset) -> SettlementResult<Executed> {
        if !self.admin.is_trusted(&tx.sender) {
            warn!("End of pool {} from untrusted {} dropped", asset, tx.sender);
            return self.return_attached(store, height, tx);
        }

        let payouts = self.ledger.end_pool(store, asset)?;
        self.admin.set(
            store,
            &AdminKey::PoolStatus(asset.clone()),
            &PoolStatus::Suspended.to_string(),
            &tx.sender,
        )?;

        let mut scheduled = 0;
        let mut last = None;
        for (staker, out) in &payouts {
            let id = self.events.append(
                store,
                EventKind::Unstake,
                Some(asset.clone()),
                &tx.in_hash,
                height,
                EventDetail::Unstake {
                    basis_points: MAX_WITHDRAW_BASIS_POINTS,
                    units: out.units,
                    base: out.base,
                    asset: out.asset,
                },
            )?;
            let paid = self.pay_out(store, height, tx, staker, asset, out)?;
            if paid == 0 {
                self.events.complete(store, id, &[])?;
            }
            scheduled += paid;
            last = Some(id);
        }
        scheduled += self.return_coins(store, height, tx, &tx.sender)?;
        info!("Pool {} ended, {} stakers paid out", asset, payouts.len());

        Ok(Executed {
            event: last,
            status: if scheduled == 0 { TxInStatus::Done } else { TxInStatus::Processed },
        })
    }

    fn swap(
        &self,
        store: &mut dyn KvStore,
        height: u64,
        tx: &InboundTx,
        target: &Asset,
        destination: Option<&Address>,
        limit: Option<Amount>,
    ) -> SettlementResult<Executed> {
        let coin = match tx.coins.as_slice() {
            [coin] => coin,
            coins => {
                return Err(SettlementError::validation(format!(
                    "swap needs exactly one coin, got {}",
                    coins.len()
                )))
            }
        };
        let to = destination.unwrap_or(&tx.sender);
        let limits = self.admin.swap_limits(store)?;
        let out = self
            .swaps
            .swap(store, &coin.asset, target, coin.amount, limit, limits)?;

        let pool = out.hops.first().map(|hop| hop.pool.clone());
        let id = self.events.append(
            store,
            EventKind::Swap,
            pool,
            &tx.in_hash,
            height,
            EventDetail::Swap {
                source: coin.clone(),
                target: Coin::new(target.clone(), out.emitted),
                liquidity_fee: out.liquidity_fee(),
                trade_slip_bps: out.trade_slip_bps(),
                pool_slip_bps: out
                    .hops
                    .iter()
                    .map(|h| h.quote.pool_slip_bps)
                    .max()
                    .unwrap_or(0),
            },
        )?;
        self.outbound.schedule(
            store,
            height,
            to,
            &Coin::new(target.clone(), out.emitted),
            &tx.in_hash,
        )?;
        Ok(Executed {
            event: Some(id),
            status: TxInStatus::Processed,
        })
    }

    fn add(&self, store: &mut dyn KvStore, height: u64, tx: &InboundTx, asset: &Asset) -> SettlementResult<Executed> {
        let (base, asset_amount) = self.split_coins(&tx.coins, asset)?;
        self.ledger.add_liquidity(store, asset, base, asset_amount)?;
        let id = self.events.append(
            store,
            EventKind::Add,
            Some(asset.clone()),
            &tx.in_hash,
            height,
            EventDetail::Add {
                base,
                asset: asset_amount,
            },
        )?;
        self.events.complete(store, id, &[])?;
        Ok(Executed {
            event: Some(id),
            status: TxInStatus::Done,
        })
    }

    /// Gas reimbursement: only native gas coins, credited to their pool when
    /// it has depth
    fn gas(&self, store: &mut dyn KvStore, height: u64, tx: &InboundTx) -> SettlementResult<Executed> {
        if tx.coins.is_empty() {
            return Err(SettlementError::validation("gas memo carries no coins"));
        }
        if let Some(coin) = tx.coins.iter().find(|c| !c.asset.is_gas_asset()) {
            return Err(SettlementError::validation(format!(
                "{} is not a gas asset",
                coin.asset
            )));
        }

        let mut credited = None;
        for coin in &tx.coins {
            match self.ledger.get_pool(store, &coin.asset)? {
                Some(pool) if !pool.is_empty() && pool.status != PoolStatus::Suspended => {
                    self.ledger
                        .add_liquidity(store, &coin.asset, Amount::ZERO, coin.amount)?;
                    credited = Some(coin.asset.clone());
                }
                _ => debug!("Gas {} recorded without a pool to credit", coin),
            }
        }

        let id = self.events.append(
            store,
            EventKind::Gas,
            credited,
            &tx.in_hash,
            height,
            EventDetail::Gas {
                coins: tx.coins.clone(),
            },
        )?;
        self.events.complete(store, id, &[])?;
        Ok(Executed {
            event: Some(id),
            status: TxInStatus::Done,
        })
    }

    fn confirm_outbound(&self, store: &mut dyn KvStore, tx: &InboundTx, out_height: u64) -> SettlementResult<Executed> {
        let current = self.admin.pool_address(store)?;
        let pool_address = match self.admin.previous_pool_address(store)? {
            Some(previous) if previous == tx.sender => previous,
            _ => current,
        };

        let settled = self
            .outbound
            .confirm(store, out_height, &tx.in_hash, &tx.sender, &pool_address)?;
        for in_hash in &settled {
            self.events.complete_by_in_hash(store, in_hash, &tx.in_hash)?;
            self.tracker.settle(store, in_hash, &tx.in_hash)?;
        }
        if !settled.is_empty() {
            self.tracker.sign_out(store, out_height)?;
        }
        Ok(Executed {
            event: None,
            status: TxInStatus::Done,
        })
    }

    fn admin_command(
        &self,
        store: &mut dyn KvStore,
        height: u64,
        tx: &InboundTx,
        command: &AdminMemo,
    ) -> SettlementResult<Executed> {
        match command {
            AdminMemo::Key { key, value } => {
                self.admin.set(store, key, value, &tx.sender)?;
            }
            AdminMemo::PoolStatus { asset, status } => {
                if self.admin.is_trusted(&tx.sender) {
                    self.ledger.set_status(store, asset, *status)?;
                    self.admin.set(
                        store,
                        &AdminKey::PoolStatus(asset.clone()),
                        &status.to_string(),
                        &tx.sender,
                    )?;
                } else {
                    warn!("Pool status {} -> {} from untrusted {} dropped", asset, status, tx.sender);
                }
            }
            AdminMemo::Invalid { reason } => {
                if self.admin.is_trusted(&tx.sender) {
                    return Err(SettlementError::Validation(reason.clone()));
                }
                warn!("Malformed admin memo from untrusted {} dropped: {}", tx.sender, reason);
            }
        }
        self.return_attached(store, height, tx)
    }

    // ============================================
    // REFUNDS
    // ============================================

    /// Send back the coins of a command that didn't consume them
    fn return_attached(&self, store: &mut dyn KvStore, height: u64, tx: &InboundTx) -> SettlementResult<Executed> {
        let scheduled = self.return_coins(store, height, tx, &tx.sender)?;
        Ok(Executed {
            event: None,
            status: if scheduled == 0 { TxInStatus::Done } else { TxInStatus::Processed },
        })
    }

    /// Record a refund event and pay the coins back to the sender
    fn refund(
        &self,
        store: &mut dyn KvStore,
        height: u64,
        tx: &InboundTx,
        memo: &Memo,
        err: &SettlementError,
    ) -> SettlementResult<u64> {
        let id = self.events.append(
            store,
            EventKind::Refund,
            memo.asset().cloned(),
            &tx.in_hash,
            height,
            EventDetail::Refund {
                reason: err.to_string(),
                coins: tx.coins.clone(),
            },
        )?;
        self.events.refund(store, id)?;
        self.return_coins(store, height, tx, &tx.sender)?;
        Ok(id)
    }

    /// Minimum refund amount expressed in `asset`, at its pool price. A fee
    /// too large for an amount saturates, so nothing of that coin is paid.
    fn refund_fee(&self, store: &dyn KvStore, asset: &Asset) -> SettlementResult<Amount> {
        let mrra = self.admin.min_refund(store)?;
        if mrra.is_zero() || asset == self.base_asset() {
            return Ok(mrra);
        }
        match self.ledger.get_pool(store, asset)? {
            Some(pool) if !pool.is_empty() && !pool.balance_base.is_zero() => Ok(mrra
                .mul_div(pool.balance_asset.raw(), pool.balance_base.raw())
                .unwrap_or(Amount::new(u64::MAX))),
            _ => Ok(Amount::ZERO),
        }
    }

    /// Queue every attached coin back to `to`, less the minimum refund fee.
    /// Returns how many payouts were queued.
    fn return_coins(&self, store: &mut dyn KvStore, height: u64, tx: &InboundTx, to: &Address) -> SettlementResult<usize> {
        let mut scheduled = 0;
        for coin in &tx.coins {
            let fee = self.refund_fee(store, &coin.asset)?;
            let amount = coin.amount.saturating_sub(fee);
            if amount.is_zero() {
                debug!("Refund of {} is below the minimum, not paid", coin);
                continue;
            }
            let refund = Coin::new(coin.asset.clone(), amount);
            if self.outbound.schedule(store, height, to, &refund, &tx.in_hash)?.is_some() {
                scheduled += 1;
            }
        }
        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventStatus;
    use crate::outbound::OutboundStatus;
    use crate::store::MemStore;

    const TRUSTED: &str = "bnb1lejrrtta9cgr49fuh7ktu3sddhe0ff7wenlpn6";
    const SENDER: &str = "bnb1xlvns0n2mxh77mzaspn2hgav4rr4m8eerfju38";
    const DEST: &str = "bnb1ntqj0v0sv62ut0ehxt7jqh7lenfrd3hmfws0aq";

    fn hash(n: u64) -> TxId {
        TxId::new(&format!("{:064X}", n)).unwrap()
    }

    fn coin(asset: &str, amount: u64) -> Coin {
        Coin::new(asset.parse().unwrap(), Amount::new(amount))
    }

    fn tx(n: u64, sender: &str, memo: &str, coins: Vec<Coin>) -> InboundTx {
        InboundTx {
            in_hash: hash(n),
            sender: Address::new(sender).unwrap(),
            observed_pool_address: Address::new(TRUSTED).unwrap(),
            memo: memo.to_string(),
            coins,
            block_height: n,
        }
    }

    fn tcan() -> Asset {
        "BNB.TCAN-014".parse().unwrap()
    }

    /// Pool TCAN-014 enabled and staked with the reference deposit
    fn setup() -> (Handler, MemStore) {
        let handler = Handler::new(&Config::default()).unwrap();
        let mut store = MemStore::new();
        let steps = [
            tx(1, SENDER, "create:TCAN-014", vec![]),
            tx(2, TRUSTED, "ADMIN:POOLSTATUS:TCAN-014:Enabled", vec![]),
            tx(
                3,
                SENDER,
                "stake:TCAN-014",
                vec![coin("BNB.RUNE-B1A", 2_349_500_000), coin("BNB.TCAN-014", 334_850_000)],
            ),
        ];
        for t in &steps {
            let outcome = handler.handle(&mut store, 1, t).unwrap();
            assert!(matches!(outcome, TxOutcome::Accepted { .. }), "{:?}", outcome);
        }
        (handler, store)
    }

    #[test]
    fn test_stake_records_completed_event() {
        let (handler, store) = setup();
        let pool = handler.ledger().pool(&store, &tcan()).unwrap();
        assert_eq!(pool.status, PoolStatus::Enabled);
        assert_eq!(pool.pool_units, 1_342_175_000);

        let events = handler.events().list_from(&store, 1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Stake);
        assert_eq!(events[0].status, EventStatus::Completed);
        assert_eq!(
            handler.tracker().get(&store, &hash(3)).unwrap().unwrap().status,
            TxInStatus::Done
        );
    }

    #[test]
    fn test_swap_schedules_payout_to_destination() {
        let (handler, mut store) = setup();
        let memo = format!("swap:RUNE-B1A:{}:124958592", DEST);
        let outcome = handler
            .handle(&mut store, 5, &tx(10, SENDER, &memo, vec![coin("BNB.TCAN-014", 20_000_000)]))
            .unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { event: Some(2) });

        let batch = handler.outbound().batch(&store, 6).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].to_address.as_str(), DEST);
        assert_eq!(batch[0].amount, Amount::new(124_958_593));
        assert_eq!(batch[0].asset.to_string(), "BNB.RUNE-B1A");

        let event = handler.events().get(&store, 2).unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.pool, Some(tcan()));
    }

    #[test]
    fn test_strict_limit_refunds_without_touching_pool() {
        let (handler, mut store) = setup();
        let before = handler.ledger().pool(&store, &tcan()).unwrap();
        let events_before = handler.events().last_id(&store).unwrap();

        let memo = format!("swap:RUNE-B1A:{}:124958594", DEST);
        let outcome = handler
            .handle(&mut store, 5, &tx(11, SENDER, &memo, vec![coin("BNB.TCAN-014", 20_000_000)]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Refunded { .. }));

        assert_eq!(handler.ledger().pool(&store, &tcan()).unwrap(), before);
        let new_events = handler.events().list_from(&store, events_before + 1).unwrap();
        assert_eq!(new_events.len(), 1);
        assert_eq!(new_events[0].kind, EventKind::Refund);
        assert_eq!(new_events[0].status, EventStatus::Refunded);

        // the input goes back to the sender, not the swap destination
        let batch = handler.outbound().batch(&store, 6).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].to_address.as_str(), SENDER);
        assert_eq!(batch[0].amount, Amount::new(20_000_000));
        assert_eq!(
            handler.tracker().get(&store, &hash(11)).unwrap().unwrap().status,
            TxInStatus::Refunded
        );
    }

    #[test]
    fn test_swap_on_bootstrap_pool_is_refunded() {
        let handler = Handler::new(&Config::default()).unwrap();
        let mut store = MemStore::new();
        handler.handle(&mut store, 1, &tx(1, SENDER, "create:TCAN-014", vec![])).unwrap();
        handler
            .handle(
                &mut store,
                1,
                &tx(2, SENDER, "stake:TCAN-014", vec![coin("BNB.RUNE-B1A", 1_000), coin("BNB.TCAN-014", 1_000)]),
            )
            .unwrap();
        let outcome = handler
            .handle(&mut store, 2, &tx(3, SENDER, "swap:RUNE-B1A", vec![coin("BNB.TCAN-014", 10)]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Refunded { .. }));
    }

    #[test]
    fn test_duplicate_inbound_is_rejected() {
        let (handler, mut store) = setup();
        let again = tx(3, SENDER, "stake:TCAN-014", vec![coin("BNB.RUNE-B1A", 1)]);
        let outcome = handler.handle(&mut store, 2, &again).unwrap();
        assert!(matches!(outcome, TxOutcome::Failed(SettlementError::AlreadyExists(_))));
    }

    #[test]
    fn test_duplicate_create_without_coins_fails() {
        let (handler, mut store) = setup();
        let outcome = handler
            .handle(&mut store, 2, &tx(20, SENDER, "create:TCAN-014", vec![]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Failed(SettlementError::AlreadyExists(_))));
        assert_eq!(handler.ledger().list_pools(&store).unwrap().len(), 1);
    }

    #[test]
    fn test_wrong_pool_address_is_refunded() {
        let (handler, mut store) = setup();
        let mut t = tx(21, SENDER, "add:TCAN-014", vec![coin("BNB.RUNE-B1A", 500)]);
        t.observed_pool_address = Address::new("bnb1somewhereelse").unwrap();
        let before = handler.ledger().pool(&store, &tcan()).unwrap();

        let outcome = handler.handle(&mut store, 2, &t).unwrap();
        assert!(matches!(outcome, TxOutcome::Refunded { .. }));
        assert_eq!(handler.ledger().pool(&store, &tcan()).unwrap(), before);
    }

    #[test]
    fn test_unrecognized_memo_goes_down_refund_path() {
        let (handler, mut store) = setup();
        let outcome = handler
            .handle(&mut store, 2, &tx(22, SENDER, "hello world", vec![coin("BNB.BNB", 7)]))
            .unwrap();
        match outcome {
            TxOutcome::Refunded { event, .. } => {
                let ev = handler.events().get(&store, event).unwrap().unwrap();
                assert_eq!(ev.kind, EventKind::Refund);
                assert_eq!(ev.pool, None);
            }
            other => panic!("expected refund, got {:?}", other),
        }
        assert_eq!(handler.outbound().batch(&store, 3).unwrap()[0].amount, Amount::new(7));
    }

    // Intentional: an untrusted admin write reports success and changes nothing.
    #[test]
    fn test_untrusted_admin_is_silently_accepted() {
        let (handler, mut store) = setup();
        let outcome = handler
            .handle(&mut store, 2, &tx(23, SENDER, "ADMIN:KEY:TSL:15", vec![]))
            .unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { event: None });
        assert_eq!(handler.admin().get(&store, &AdminKey::Tsl).unwrap(), None);

        let outcome = handler
            .handle(&mut store, 2, &tx(24, SENDER, "ADMIN:POOLSTATUS:TCAN-014:Suspended", vec![]))
            .unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { event: None });
        assert_eq!(
            handler.ledger().pool(&store, &tcan()).unwrap().status,
            PoolStatus::Enabled
        );

        handler
            .handle(&mut store, 2, &tx(25, TRUSTED, "ADMIN:KEY:TSL:15", vec![]))
            .unwrap();
        assert_eq!(handler.admin().get(&store, &AdminKey::Tsl).unwrap(), Some("15".to_string()));
    }

    #[test]
    fn test_outbound_confirmation_closes_the_swap() {
        let (handler, mut store) = setup();
        let memo = format!("swap:RUNE-B1A:{}", DEST);
        handler
            .handle(&mut store, 5, &tx(30, SENDER, &memo, vec![coin("BNB.TCAN-014", 20_000_000)]))
            .unwrap();

        let outcome = handler
            .handle(&mut store, 6, &tx(31, TRUSTED, "outbound:6", vec![]))
            .unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { event: None });

        let batch = handler.outbound().batch(&store, 6).unwrap();
        assert_eq!(batch[0].status, OutboundStatus::Sent);
        assert_eq!(batch[0].out_hash, Some(hash(31)));

        let event = handler.events().get(&store, 2).unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Completed);
        assert_eq!(event.out_hashes, vec![hash(31)]);

        let record = handler.tracker().get(&store, &hash(30)).unwrap().unwrap();
        assert_eq!(record.status, TxInStatus::Done);
        assert_eq!(record.out_hash, Some(hash(31)));
        assert_eq!(handler.tracker().heights(&store).unwrap().last_signed_out, 6);
    }

    #[test]
    fn test_outbound_from_stranger_changes_nothing() {
        let (handler, mut store) = setup();
        let memo = format!("swap:RUNE-B1A:{}", DEST);
        handler
            .handle(&mut store, 5, &tx(30, SENDER, &memo, vec![coin("BNB.TCAN-014", 20_000_000)]))
            .unwrap();

        let outcome = handler
            .handle(&mut store, 6, &tx(32, SENDER, "outbound:6", vec![]))
            .unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { event: None });
        assert_eq!(handler.outbound().batch(&store, 6).unwrap()[0].status, OutboundStatus::Pending);
        assert_eq!(
            handler.events().get(&store, 2).unwrap().unwrap().status,
            EventStatus::Pending
        );
    }

    #[test]
    fn test_outbound_on_empty_height_is_noop() {
        let (handler, mut store) = setup();
        let events_before = handler.events().len(&store).unwrap();
        let pool_before = handler.ledger().pool(&store, &tcan()).unwrap();

        let outcome = handler
            .handle(&mut store, 6, &tx(33, TRUSTED, "outbound:77", vec![]))
            .unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { event: None });
        assert_eq!(handler.events().len(&store).unwrap(), events_before);
        assert_eq!(handler.ledger().pool(&store, &tcan()).unwrap(), pool_before);
    }

    #[test]
    fn test_withdraw_pays_out_both_sides() {
        let (handler, mut store) = setup();
        let outcome = handler
            .handle(&mut store, 8, &tx(40, SENDER, "withdraw:TCAN-014", vec![]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Accepted { event: Some(_) }));

        let batch = handler.outbound().batch(&store, 9).unwrap();
        let amounts: Vec<u64> = batch.iter().map(|e| e.amount.raw()).collect();
        assert_eq!(amounts, vec![2_349_500_000, 334_850_000]);
        assert!(handler.ledger().list_stakers(&store, &tcan()).unwrap().is_empty());

        // nothing left to withdraw, and no coins to return
        let outcome = handler
            .handle(&mut store, 8, &tx(41, SENDER, "withdraw:TCAN-014", vec![]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Failed(SettlementError::NoPosition { .. })));
    }

    #[test]
    fn test_refund_deducts_minimum_refund_amount() {
        let (handler, mut store) = setup();
        handler
            .handle(&mut store, 2, &tx(50, TRUSTED, "ADMIN:KEY:MRRA:100000000", vec![]))
            .unwrap();
        let outcome = handler
            .handle(
                &mut store,
                2,
                &tx(
                    51,
                    SENDER,
                    "swap:BNB.NOPE-000",
                    vec![coin("BNB.RUNE-B1A", 300_000_000)],
                ),
            )
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Refunded { .. }));
        let batch = handler.outbound().batch(&store, 3).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].amount, Amount::new(200_000_000));

        // below the minimum: recorded, not paid
        let outcome = handler
            .handle(&mut store, 4, &tx(52, SENDER, "nonsense", vec![coin("BNB.RUNE-B1A", 50)]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Refunded { .. }));
        assert!(handler.outbound().batch(&store, 5).unwrap().is_empty());
    }

    #[test]
    fn test_refund_fee_converts_at_pool_price() {
        let (handler, mut store) = setup();
        let shib = "BNB.SHIB-1A2";
        for t in [
            tx(80, TRUSTED, "ADMIN:KEY:MRRA:100000000", vec![]),
            tx(81, SENDER, "create:SHIB-1A2", vec![]),
            tx(
                82,
                SENDER,
                "stake:SHIB-1A2",
                vec![coin("BNB.RUNE-B1A", 1_000), coin(shib, 1_000_000_000_000_000_000)],
            ),
        ] {
            let outcome = handler.handle(&mut store, 2, &t).unwrap();
            assert!(matches!(outcome, TxOutcome::Accepted { .. }), "{:?}", outcome);
        }

        // 1 RUNE at 334,850,000 TCAN / 2,349,500,000 RUNE
        let outcome = handler
            .handle(&mut store, 4, &tx(83, SENDER, "nonsense", vec![coin("BNB.TCAN-014", 100_000_000)]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Refunded { .. }));

        // the fee in SHIB doesn't fit an amount: recorded, not paid
        let outcome = handler
            .handle(&mut store, 4, &tx(84, SENDER, "nonsense", vec![coin(shib, 5)]))
            .unwrap();
        match outcome {
            TxOutcome::Refunded { event, .. } => {
                let ev = handler.events().get(&store, event).unwrap().unwrap();
                assert_eq!(ev.status, EventStatus::Refunded);
            }
            other => panic!("expected refund, got {:?}", other),
        }

        let batch = handler.outbound().batch(&store, 5).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].asset, tcan());
        assert_eq!(batch[0].amount, Amount::new(100_000_000 - 14_251_968));
    }

    #[test]
    fn test_pool_slip_limit_refunds_swap() {
        let (handler, mut store) = setup();
        let before = handler.ledger().pool(&store, &tcan()).unwrap();
        handler
            .handle(&mut store, 2, &tx(90, TRUSTED, "ADMIN:KEY:GSL:1191", vec![]))
            .unwrap();

        let outcome = handler
            .handle(&mut store, 3, &tx(91, SENDER, "swap:RUNE-B1A", vec![coin("BNB.TCAN-014", 20_000_000)]))
            .unwrap();
        match outcome {
            TxOutcome::Refunded { reason, .. } => assert!(reason.contains("pool slip"), "{}", reason),
            other => panic!("expected refund, got {:?}", other),
        }
        assert_eq!(handler.ledger().pool(&store, &tcan()).unwrap(), before);

        handler
            .handle(&mut store, 4, &tx(92, TRUSTED, "ADMIN:KEY:GSL:1192", vec![]))
            .unwrap();
        let outcome = handler
            .handle(&mut store, 5, &tx(93, SENDER, "swap:RUNE-B1A", vec![coin("BNB.TCAN-014", 20_000_000)]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Accepted { event: Some(_) }));
    }

    #[test]
    fn test_double_swap_short_of_limit_leaves_both_pools() {
        let (handler, mut store) = setup();
        let lok: Asset = "BNB.LOK-3C0".parse().unwrap();
        for t in [
            tx(100, SENDER, "create:LOK-3C0", vec![]),
            tx(101, TRUSTED, "ADMIN:POOLSTATUS:LOK-3C0:Enabled", vec![]),
            tx(
                102,
                SENDER,
                "stake:LOK-3C0",
                vec![coin("BNB.RUNE-B1A", 1_000_000_000), coin("BNB.LOK-3C0", 4_000_000_000)],
            ),
        ] {
            handler.handle(&mut store, 2, &t).unwrap();
        }
        let tcan_before = handler.ledger().pool(&store, &tcan()).unwrap();
        let lok_before = handler.ledger().pool(&store, &lok).unwrap();

        let limits = handler.admin().swap_limits(&store).unwrap();
        let quote = handler
            .swaps()
            .quote(&store, &tcan(), &lok, Amount::new(20_000_000), limits)
            .unwrap();
        assert_eq!(quote.hops.len(), 2);

        // the first hop clears, the final output misses by one unit
        let memo = format!("swap:LOK-3C0:{}:{}", DEST, quote.emitted.raw() + 1);
        let outcome = handler
            .handle(&mut store, 3, &tx(103, SENDER, &memo, vec![coin("BNB.TCAN-014", 20_000_000)]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Refunded { .. }));
        assert_eq!(handler.ledger().pool(&store, &tcan()).unwrap(), tcan_before);
        assert_eq!(handler.ledger().pool(&store, &lok).unwrap(), lok_before);

        let batch = handler.outbound().batch(&store, 4).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].to_address.as_str(), SENDER);
        assert_eq!(batch[0].asset, tcan());
    }

    #[test]
    fn test_confirmation_from_rotated_out_pool_address() {
        let (handler, mut store) = setup();
        let memo = format!("swap:RUNE-B1A:{}", DEST);
        handler
            .handle(&mut store, 5, &tx(110, SENDER, &memo, vec![coin("BNB.TCAN-014", 20_000_000)]))
            .unwrap();
        handler
            .handle(&mut store, 5, &tx(111, TRUSTED, "ADMIN:KEY:PoolAddress:bnb1nextpooladdress", vec![]))
            .unwrap();
        assert_eq!(handler.admin().pool_address(&store).unwrap().as_str(), "bnb1nextpooladdress");

        // the old address still signs for what it queued
        let outcome = handler
            .handle(&mut store, 6, &tx(112, TRUSTED, "outbound:6", vec![]))
            .unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { event: None });
        let batch = handler.outbound().batch(&store, 6).unwrap();
        assert_eq!(batch[0].status, OutboundStatus::Sent);
        assert_eq!(batch[0].out_hash, Some(hash(112)));
        assert_eq!(
            handler.tracker().get(&store, &hash(110)).unwrap().unwrap().status,
            TxInStatus::Done
        );
    }

    #[test]
    fn test_end_pool_pays_out_every_staker() {
        let (handler, mut store) = setup();
        handler
            .handle(
                &mut store,
                2,
                &tx(120, DEST, "stake:TCAN-014", vec![coin("BNB.RUNE-B1A", 1_000_000_000), coin("BNB.TCAN-014", 142_519_685)]),
            )
            .unwrap();
        let before = handler.ledger().pool(&store, &tcan()).unwrap();
        let events_before = handler.events().last_id(&store).unwrap();

        let outcome = handler
            .handle(&mut store, 7, &tx(121, SENDER, "endpool:TCAN-014", vec![]))
            .unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { event: None });
        assert_eq!(handler.ledger().pool(&store, &tcan()).unwrap(), before);

        let outcome = handler
            .handle(&mut store, 7, &tx(122, TRUSTED, "endpool:TCAN-014", vec![]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Accepted { event: Some(_) }));

        let pool = handler.ledger().pool(&store, &tcan()).unwrap();
        assert_eq!(pool.status, PoolStatus::Suspended);
        assert!(pool.is_empty());
        assert!(handler.ledger().list_stakers(&store, &tcan()).unwrap().is_empty());
        assert_eq!(
            handler
                .admin()
                .get(&store, &AdminKey::PoolStatus(tcan()))
                .unwrap(),
            Some("Suspended".to_string())
        );

        let unstakes = handler.events().list_from(&store, events_before + 1).unwrap();
        assert_eq!(unstakes.len(), 2);
        assert!(unstakes.iter().all(|e| e.kind == EventKind::Unstake && e.status == EventStatus::Pending));

        let batch = handler.outbound().batch(&store, 8).unwrap();
        assert_eq!(batch.len(), 4);
        let paid = |asset: &Asset| -> u64 { batch.iter().filter(|e| &e.asset == asset).map(|e| e.amount.raw()).sum() };
        assert_eq!(paid(handler.base_asset()), before.balance_base.raw());
        assert_eq!(paid(&tcan()), before.balance_asset.raw());
        let mut recipients: Vec<&str> = batch.iter().map(|e| e.to_address.as_str()).collect();
        recipients.dedup();
        assert_eq!(recipients.len(), 2);

        handler
            .handle(&mut store, 8, &tx(123, TRUSTED, "outbound:8", vec![]))
            .unwrap();
        let settled = handler.events().list_from(&store, events_before + 1).unwrap();
        assert!(settled.iter().all(|e| e.status == EventStatus::Completed));
    }

    #[test]
    fn test_malformed_admin_memo_from_stranger_is_dropped() {
        let (handler, mut store) = setup();
        let events_before = handler.events().last_id(&store).unwrap();

        let outcome = handler
            .handle(&mut store, 2, &tx(130, SENDER, "ADMIN:KEY:WHAT:1", vec![]))
            .unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { event: None });
        assert_eq!(handler.events().last_id(&store).unwrap(), events_before);

        let outcome = handler
            .handle(&mut store, 2, &tx(131, TRUSTED, "ADMIN:KEY:WHAT:1", vec![]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Failed(SettlementError::Validation(_))));
        assert_eq!(handler.events().last_id(&store).unwrap(), events_before);
    }

    #[test]
    fn test_gas_accepts_only_gas_coins() {
        let (handler, mut store) = setup();
        let outcome = handler
            .handle(&mut store, 2, &tx(60, SENDER, "GAS", vec![coin("BNB.BNB", 37_500)]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Accepted { event: Some(_) }));

        let outcome = handler
            .handle(&mut store, 2, &tx(61, SENDER, "GAS", vec![coin("BNB.TCAN-014", 5)]))
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Refunded { .. }));
    }

    #[test]
    fn test_failed_command_leaves_no_partial_writes() {
        let (handler, mut store) = setup();
        // stray coin makes the stake fail after parsing
        let before = handler.ledger().pool(&store, &tcan()).unwrap();
        let outcome = handler
            .handle(
                &mut store,
                2,
                &tx(70, SENDER, "stake:TCAN-014", vec![coin("BNB.RUNE-B1A", 100), coin("BNB.BNB", 1)]),
            )
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Refunded { .. }));
        assert_eq!(handler.ledger().pool(&store, &tcan()).unwrap(), before);
        assert_eq!(handler.outbound().batch(&store, 3).unwrap().len(), 2);
    }
}
