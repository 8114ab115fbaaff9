//! Settlement Engine
//!
//! Applies blocks of inbound transactions. One writer at a time works on a
//! private copy of the committed state; the copy replaces the snapshot only
//! once the whole block went through, so readers see block boundaries and
//! nothing in between.

use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{SettlementError, SettlementResult};
use crate::handler::{Handler, InboundTx, TxOutcome};
use crate::outbound::{OutboundRequest, OutboundStatus};
use crate::query::QueryView;
use crate::store::MemStore;

/// Result of one processed block
#[derive(Debug, Clone)]
pub struct BlockReceipt {
    pub height: u64,
    /// One outcome per inbound, in block order
    pub outcomes: Vec<TxOutcome>,
    /// Payouts due at this height, for the relayers to sign
    pub outbound: Vec<OutboundRequest>,
    pub pending_outbound: u64,
}

impl BlockReceipt {
    pub fn count(&self, label: &str) -> usize {
        self.outcomes.iter().filter(|o| o.label() == label).count()
    }
}

pub struct SettlementEngine {
    handler: Arc<Handler>,
    committed: RwLock<Arc<MemStore>>,
    writer: Mutex<()>,
}

fn poisoned(what: &str) -> SettlementError {
    SettlementError::Storage(format!("{} lock poisoned", what))
}

impl SettlementEngine {
    pub fn new(config: &Config) -> SettlementResult<Self> {
        Self::with_store(config, MemStore::new())
    }

    /// Start from previously committed state
    pub fn with_store(config: &Config, store: MemStore) -> SettlementResult<Self> {
        Ok(Self {
            handler: Arc::new(Handler::new(config)?),
            committed: RwLock::new(Arc::new(store)),
            writer: Mutex::new(()),
        })
    }

    fn current(&self) -> SettlementResult<Arc<MemStore>> {
        Ok(Arc::clone(&*self.committed.read().map_err(|_| poisoned("snapshot"))?))
    }

    /// Read-only view of the last committed block
    pub fn snapshot(&self) -> SettlementResult<QueryView> {
        Ok(QueryView::new(self.current()?, Arc::clone(&self.handler)))
    }

    /// Apply `txs` in order as block `height`. Heights must strictly
    /// increase. On `Err` nothing from the block is committed.
    pub fn process_block(&self, height: u64, txs: &[InboundTx]) -> SettlementResult<BlockReceipt> {
        let _writer = self.writer.lock().map_err(|_| poisoned("writer"))?;

        let mut working = MemStore::clone(&*self.current()?);
        let tracker = self.handler.tracker();
        let last = tracker.heights(&working)?.statechain;
        if height <= last {
            return Err(SettlementError::validation(format!(
                "block {} is not above last committed block {}",
                height, last
            )));
        }

        debug!("Block {}: {} inbound", height, txs.len());
        let mut outcomes = Vec::with_capacity(txs.len());
        for tx in txs {
            outcomes.push(self.handler.handle(&mut working, height, tx)?);
        }
        tracker.commit_block(&mut working, height)?;

        let outbound: Vec<OutboundRequest> = self
            .handler
            .outbound()
            .batch(&working, height)?
            .iter()
            .filter(|e| e.status == OutboundStatus::Pending)
            .map(OutboundRequest::from)
            .collect();
        let pending_outbound = self.handler.outbound().pending_count(&working)?;

        *self.committed.write().map_err(|_| poisoned("snapshot"))? = Arc::new(working);

        let receipt = BlockReceipt {
            height,
            outcomes,
            outbound,
            pending_outbound,
        };
        info!(
            "Block {} committed: {} accepted, {} refunded, {} failed, {} due, {} pending outbound",
            height,
            receipt.count("accepted"),
            receipt.count("refunded"),
            receipt.count("failed"),
            receipt.outbound.len(),
            pending_outbound
        );
        if receipt.count("failed") > 0 {
            warn!("Block {} carried {} failed inbound", height, receipt.count("failed"));
        }
        Ok(receipt)
    }
}
