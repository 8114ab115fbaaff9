//! Event Ledger
//!
//! Append-only audit log. Ids come from a persisted counter (`meta:last_event_id`)
//! and are never reused, so `event:<id>` keys are zero padded to scan in
//! insertion order. `eventidx:<in_hash>` lists the ids an inbound produced.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::common::{Amount, Asset, Coin, TxId};
use crate::error::{SettlementError, SettlementResult};
use crate::store::{self, KvStore};

const LAST_EVENT_ID_KEY: &str = "meta:last_event_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Stake,
    Unstake,
    Swap,
    Add,
    Refund,
    Gas,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Stake => "stake",
            EventKind::Unstake => "unstake",
            EventKind::Swap => "swap",
            EventKind::Add => "add",
            EventKind::Refund => "refund",
            EventKind::Gas => "gas",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Completed,
    Refunded,
}

/// Per-kind payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventDetail {
    Stake {
        base: Amount,
        asset: Amount,
        units: u64,
    },
    Unstake {
        basis_points: u64,
        units: u64,
        base: Amount,
        asset: Amount,
    },
    Swap {
        source: Coin,
        target: Coin,
        liquidity_fee: Amount,
        trade_slip_bps: u64,
        pool_slip_bps: u64,
    },
    Add {
        base: Amount,
        asset: Amount,
    },
    Gas {
        coins: Vec<Coin>,
    },
    Refund {
        reason: String,
        coins: Vec<Coin>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub kind: EventKind,
    pub pool: Option<Asset>,
    pub in_hash: TxId,
    pub out_hashes: Vec<TxId>,
    pub status: EventStatus,
    pub height: u64,
    pub detail: EventDetail,
}

pub fn event_key(id: u64) -> String {
    format!("event:{:020}", id)
}

fn index_key(in_hash: &TxId) -> String {
    format!("eventidx:{}", in_hash)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventLedger;

impl EventLedger {
    pub fn last_id(&self, store: &dyn KvStore) -> SettlementResult<u64> {
        Ok(store::read(store, LAST_EVENT_ID_KEY)?.unwrap_or(0))
    }

    /// Record a pending event and return its id
    pub fn append(
        &self,
        store: &mut dyn KvStore,
        kind: EventKind,
        pool: Option<Asset>,
        in_hash: &TxId,
        height: u64,
        detail: EventDetail,
    ) -> SettlementResult<u64> {
        let id = self
            .last_id(store)?
            .checked_add(1)
            .ok_or(SettlementError::Overflow)?;
        let event = Event {
            id,
            kind,
            pool,
            in_hash: in_hash.clone(),
            out_hashes: Vec::new(),
            status: EventStatus::Pending,
            height,
            detail,
        };
        store::write(store, &event_key(id), &event)?;
        store::write(store, LAST_EVENT_ID_KEY, &id)?;

        let mut ids = self.ids_for(store, in_hash)?;
        ids.push(id);
        store::write(store, &index_key(in_hash), &ids)?;

        debug!("Event #{} {} for {}", id, kind, in_hash);
        Ok(id)
    }

    pub fn get(&self, store: &dyn KvStore, id: u64) -> SettlementResult<Option<Event>> {
        store::read(store, &event_key(id))
    }

    fn existing(&self, store: &dyn KvStore, id: u64) -> SettlementResult<Event> {
        self.get(store, id)?
            .ok_or_else(|| SettlementError::NotFound(format!("event {}", id)))
    }

    /// Mark an event completed and attach its outbound hashes
    pub fn complete(&self, store: &mut dyn KvStore, id: u64, out_hashes: &[TxId]) -> SettlementResult<Event> {
        let mut event = self.existing(store, id)?;
        for hash in out_hashes {
            if !event.out_hashes.contains(hash) {
                event.out_hashes.push(hash.clone());
            }
        }
        if event.status == EventStatus::Pending {
            event.status = EventStatus::Completed;
        }
        store::write(store, &event_key(id), &event)?;
        Ok(event)
    }

    pub fn refund(&self, store: &mut dyn KvStore, id: u64) -> SettlementResult<Event> {
        let mut event = self.existing(store, id)?;
        event.status = EventStatus::Refunded;
        store::write(store, &event_key(id), &event)?;
        Ok(event)
    }

    /// Close every event of `in_hash` with `out_hash`. Refunded events keep
    /// their status and only gain the hash. Returns the touched ids.
    pub fn complete_by_in_hash(
        &self,
        store: &mut dyn KvStore,
        in_hash: &TxId,
        out_hash: &TxId,
    ) -> SettlementResult<Vec<u64>> {
        let ids = self.ids_for(store, in_hash)?;
        for id in &ids {
            self.complete(store, *id, std::slice::from_ref(out_hash))?;
        }
        Ok(ids)
    }

    pub fn ids_for(&self, store: &dyn KvStore, in_hash: &TxId) -> SettlementResult<Vec<u64>> {
        Ok(store::read(store, &index_key(in_hash))?.unwrap_or_default())
    }

    /// Events with id >= `from`, in insertion order
    pub fn list_from(&self, store: &dyn KvStore, from: u64) -> SettlementResult<Vec<Event>> {
        let last = self.last_id(store)?;
        let mut events = Vec::new();
        for id in from.max(1)..=last {
            if let Some(event) = self.get(store, id)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub fn len(&self, store: &dyn KvStore) -> SettlementResult<usize> {
        Ok(store.scan_prefix("event:").len())
    }
}
