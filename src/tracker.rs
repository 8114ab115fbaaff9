//! Inbound transaction records and chain heights
//!
//! Every accepted inbound hash gets a `txin:<hash>` record so a duplicate
//! observation can be rejected and clients can ask for a transaction's status.

use serde::{Deserialize, Serialize};

use crate::common::{Address, TxId};
use crate::error::SettlementResult;
use crate::store::{self, KvStore};

const LAST_OBSERVED_IN_KEY: &str = "meta:last_observed_in";
const LAST_SIGNED_OUT_KEY: &str = "meta:last_signed_out";
const STATECHAIN_KEY: &str = "meta:statechain";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxInStatus {
    /// Handled, payouts (if any) still outstanding
    Processed,
    /// Every payout confirmed, or none owed
    Done,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInRecord {
    pub in_hash: TxId,
    pub memo: String,
    pub sender: Address,
    pub status: TxInStatus,
    pub out_hash: Option<TxId>,
}

/// Last heights seen on each side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heights {
    /// Highest external block an inbound was observed at
    pub last_observed_in: u64,
    /// Highest outbound height confirmed by a relayer
    pub last_signed_out: u64,
    /// Last block this engine committed
    pub statechain: u64,
}

fn txin_key(hash: &TxId) -> String {
    format!("txin:{}", hash)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Tracker;

impl Tracker {
    pub fn get(&self, store: &dyn KvStore, hash: &TxId) -> SettlementResult<Option<TxInRecord>> {
        store::read(store, &txin_key(hash))
    }

    pub fn put(&self, store: &mut dyn KvStore, record: &TxInRecord) -> SettlementResult<()> {
        store::write(store, &txin_key(&record.in_hash), record)
    }

    /// Mark an inbound settled by `out_hash`. Refunded records keep their
    /// status. Unknown hashes are ignored.
    pub fn settle(&self, store: &mut dyn KvStore, hash: &TxId, out_hash: &TxId) -> SettlementResult<()> {
        if let Some(mut record) = self.get(store, hash)? {
            if record.status == TxInStatus::Processed {
                record.status = TxInStatus::Done;
            }
            record.out_hash = Some(out_hash.clone());
            self.put(store, &record)?;
        }
        Ok(())
    }

    pub fn heights(&self, store: &dyn KvStore) -> SettlementResult<Heights> {
        Ok(Heights {
            last_observed_in: store::read(store, LAST_OBSERVED_IN_KEY)?.unwrap_or(0),
            last_signed_out: store::read(store, LAST_SIGNED_OUT_KEY)?.unwrap_or(0),
            statechain: store::read(store, STATECHAIN_KEY)?.unwrap_or(0),
        })
    }

    fn raise(&self, store: &mut dyn KvStore, key: &str, height: u64) -> SettlementResult<()> {
        let current: u64 = store::read(store, key)?.unwrap_or(0);
        if height > current {
            store::write(store, key, &height)?;
        }
        Ok(())
    }

    pub fn observe_in(&self, store: &mut dyn KvStore, height: u64) -> SettlementResult<()> {
        self.raise(store, LAST_OBSERVED_IN_KEY, height)
    }

    pub fn sign_out(&self, store: &mut dyn KvStore, height: u64) -> SettlementResult<()> {
        self.raise(store, LAST_SIGNED_OUT_KEY, height)
    }

    pub fn commit_block(&self, store: &mut dyn KvStore, height: u64) -> SettlementResult<()> {
        self.raise(store, STATECHAIN_KEY, height)
    }
}
