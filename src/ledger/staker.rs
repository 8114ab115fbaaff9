use serde::{Deserialize, Serialize};

use crate::common::{Address, Amount, Asset};

/// One staker's share of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerPosition {
    pub asset: Asset,
    pub address: Address,
    pub units: u64,
}

/// Outcome of a stake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeOutcome {
    pub units: u64,
    pub pool_units: u64,
}

/// Outcome of a withdraw; the payouts are owed to the staker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawOutcome {
    pub units: u64,
    pub base: Amount,
    pub asset: Amount,
}
