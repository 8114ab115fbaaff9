use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Amount, Asset};

/// An amount of one asset attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub asset: Asset,
    pub amount: Amount,
}

impl Coin {
    pub fn new(asset: Asset, amount: Amount) -> Self {
        Self { asset, amount }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.asset)
    }
}

/// Total attached amount of `asset` across a coin list
pub fn sum_of(coins: &[Coin], asset: &Asset) -> crate::error::SettlementResult<Amount> {
    coins
        .iter()
        .filter(|c| &c.asset == asset)
        .try_fold(Amount::ZERO, |acc, c| acc.checked_add(c.amount))
}
