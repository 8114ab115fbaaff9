//! Read-only view over one committed block
//!
//! A `QueryView` holds the snapshot `Arc` it was created from; blocks
//! committed afterwards are not visible through it.

use std::sync::Arc;

use crate::admin::AdminKey;
use crate::common::{Address, Amount, Asset, TxId};
use crate::error::SettlementResult;
use crate::events::Event;
use crate::handler::Handler;
use crate::ledger::{Pool, StakerPosition};
use crate::outbound::OutboundEntry;
use crate::store::MemStore;
use crate::swap::SwapOutcome;
use crate::tracker::{Heights, TxInRecord};

#[derive(Clone)]
pub struct QueryView {
    store: Arc<MemStore>,
    handler: Arc<Handler>,
}

impl QueryView {
    pub(crate) fn new(store: Arc<MemStore>, handler: Arc<Handler>) -> Self {
        Self { store, handler }
    }

    pub fn pool(&self, asset: &Asset) -> SettlementResult<Pool> {
        self.handler.ledger().pool(self.store.as_ref(), asset)
    }

    pub fn pools(&self) -> SettlementResult<Vec<Pool>> {
        self.handler.ledger().list_pools(self.store.as_ref())
    }

    pub fn stakers(&self, asset: &Asset) -> SettlementResult<Vec<StakerPosition>> {
        self.handler.ledger().list_stakers(self.store.as_ref(), asset)
    }

    pub fn staker(&self, asset: &Asset, address: &Address) -> SettlementResult<Option<StakerPosition>> {
        self.handler.ledger().staker(self.store.as_ref(), asset, address)
    }

    /// Events with id >= `from`
    pub fn events_from(&self, from: u64) -> SettlementResult<Vec<Event>> {
        self.handler.events().list_from(self.store.as_ref(), from)
    }

    pub fn admin_value(&self, key: &AdminKey) -> SettlementResult<Option<String>> {
        self.handler.admin().get(self.store.as_ref(), key)
    }

    pub fn outbound_batch(&self, height: u64) -> SettlementResult<Vec<OutboundEntry>> {
        self.handler.outbound().batch(self.store.as_ref(), height)
    }

    pub fn pending_outbound_count(&self) -> SettlementResult<u64> {
        self.handler.outbound().pending_count(self.store.as_ref())
    }

    pub fn heights(&self) -> SettlementResult<Heights> {
        self.handler.tracker().heights(self.store.as_ref())
    }

    /// Status of an inbound transaction
    pub fn tx(&self, in_hash: &TxId) -> SettlementResult<Option<TxInRecord>> {
        self.handler.tracker().get(self.store.as_ref(), in_hash)
    }

    /// Price a swap under the current slip limits without executing it
    pub fn quote(&self, source: &Asset, target: &Asset, amount: Amount) -> SettlementResult<SwapOutcome> {
        let store = self.store.as_ref();
        let limits = self.handler.admin().swap_limits(store)?;
        self.handler.swaps().quote(store, source, target, amount, limits)
    }
}
