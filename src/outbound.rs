//! Outbound Queue
//!
//! Payouts are batched under `outbound:<height>` where height is the block
//! that scheduled them plus a fixed delay. A relayer confirms a whole batch
//! with `outbound:<height>`; entries are marked sent and kept for audit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::common::{Address, Amount, Asset, Chain, Coin, TxId};
use crate::error::{SettlementError, SettlementResult};
use crate::store::{self, KvStore};

const PENDING_COUNT_KEY: &str = "meta:pending_outbound";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundStatus {
    Pending,
    Sent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEntry {
    pub height: u64,
    pub target_chain: Chain,
    pub to_address: Address,
    pub asset: Asset,
    pub amount: Amount,
    pub in_hash: TxId,
    pub out_hash: Option<TxId>,
    pub status: OutboundStatus,
}

/// What the broadcast layer is asked to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub height: u64,
    pub target_chain: Chain,
    pub to_address: Address,
    pub asset: Asset,
    pub amount: Amount,
    pub in_hash: TxId,
}

impl From<&OutboundEntry> for OutboundRequest {
    fn from(entry: &OutboundEntry) -> Self {
        Self {
            height: entry.height,
            target_chain: entry.target_chain.clone(),
            to_address: entry.to_address.clone(),
            asset: entry.asset.clone(),
            amount: entry.amount,
            in_hash: entry.in_hash.clone(),
        }
    }
}

pub fn outbound_key(height: u64) -> String {
    format!("outbound:{:020}", height)
}

#[derive(Debug, Clone)]
pub struct OutboundQueue {
    delay: u64,
    relayers: BTreeSet<Address>,
}

impl OutboundQueue {
    pub fn new(delay: u64, relayers: impl IntoIterator<Item = Address>) -> Self {
        Self {
            delay,
            relayers: relayers.into_iter().collect(),
        }
    }

    /// Height a payout scheduled while processing `height` lands on
    pub fn target_height(&self, height: u64) -> u64 {
        height.saturating_add(self.delay)
    }

    pub fn batch(&self, store: &dyn KvStore, height: u64) -> SettlementResult<Vec<OutboundEntry>> {
        Ok(store::read(store, &outbound_key(height))?.unwrap_or_default())
    }

    pub fn pending_count(&self, store: &dyn KvStore) -> SettlementResult<u64> {
        Ok(store::read(store, PENDING_COUNT_KEY)?.unwrap_or(0))
    }

    fn set_pending_count(&self, store: &mut dyn KvStore, count: u64) -> SettlementResult<()> {
        store::write(store, PENDING_COUNT_KEY, &count)
    }

    /// Queue `coin` for `to`. Zero amounts are not queued.
    pub fn schedule(
        &self,
        store: &mut dyn KvStore,
        height: u64,
        to: &Address,
        coin: &Coin,
        in_hash: &TxId,
    ) -> SettlementResult<Option<OutboundEntry>> {
        if coin.amount.is_zero() {
            debug!("Skipping zero payout of {} to {}", coin.asset, to);
            return Ok(None);
        }

        let target = self.target_height(height);
        let entry = OutboundEntry {
            height: target,
            target_chain: coin.asset.chain.clone(),
            to_address: to.clone(),
            asset: coin.asset.clone(),
            amount: coin.amount,
            in_hash: in_hash.clone(),
            out_hash: None,
            status: OutboundStatus::Pending,
        };

        let mut batch = self.batch(store, target)?;
        batch.push(entry.clone());
        store::write(store, &outbound_key(target), &batch)?;
        let pending = self.pending_count(store)?;
        self.set_pending_count(store, pending.saturating_add(1))?;

        info!("Outbound @{}: {} to {} (in {})", target, coin, to, in_hash);
        Ok(Some(entry))
    }

    pub fn is_relayer(&self, address: &Address, pool_address: &Address) -> bool {
        address == pool_address || self.relayers.contains(address)
    }

    /// Mark the pending entries at `height` as sent with `out_hash` and
    /// return the distinct inbound hashes they settle. Nothing pending at
    /// `height` is a no-op.
    pub fn confirm(
        &self,
        store: &mut dyn KvStore,
        height: u64,
        out_hash: &TxId,
        relayer: &Address,
        pool_address: &Address,
    ) -> SettlementResult<Vec<TxId>> {
        if !self.is_relayer(relayer, pool_address) {
            return Err(SettlementError::Unauthorized(relayer.to_string()));
        }

        let mut batch = self.batch(store, height)?;
        let mut settled: Vec<TxId> = Vec::new();
        let mut sent = 0u64;
        for entry in batch.iter_mut().filter(|e| e.status == OutboundStatus::Pending) {
            entry.status = OutboundStatus::Sent;
            sent += 1;
            entry.out_hash = Some(out_hash.clone());
            if !settled.contains(&entry.in_hash) {
                settled.push(entry.in_hash.clone());
            }
        }

        if settled.is_empty() {
            warn!("Outbound confirmation for height {} matched nothing", height);
            return Ok(settled);
        }

        store::write(store, &outbound_key(height), &batch)?;
        let pending = self.pending_count(store)?;
        self.set_pending_count(store, pending.saturating_sub(sent))?;

        info!("Outbound @{} sent as {} ({} in-hashes)", height, out_hash, settled.len());
        Ok(settled)
    }
}
