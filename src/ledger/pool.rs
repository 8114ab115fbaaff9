//! Pool record and status
//!
//! | Status       | Swap | Stake | Withdraw |
//! |--------------|------|-------|----------|
//! | Bootstrap    | no   | yes   | yes      |
//! | Enabled      | yes  | yes   | yes      |
//! | Bootstrapped | no   | no    | yes      |
//! | Suspended    | no   | no    | no       |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::{Amount, Asset};
use crate::error::{SettlementError, SettlementResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolStatus {
    Bootstrap,
    Enabled,
    Bootstrapped,
    Suspended,
}

impl Default for PoolStatus {
    fn default() -> Self {
        PoolStatus::Bootstrap
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolStatus::Bootstrap => write!(f, "Bootstrap"),
            PoolStatus::Enabled => write!(f, "Enabled"),
            PoolStatus::Bootstrapped => write!(f, "Bootstrapped"),
            PoolStatus::Suspended => write!(f, "Suspended"),
        }
    }
}

impl FromStr for PoolStatus {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bootstrap" => Ok(PoolStatus::Bootstrap),
            "enabled" | "enable" | "active" => Ok(PoolStatus::Enabled),
            "bootstrapped" => Ok(PoolStatus::Bootstrapped),
            "suspended" | "suspend" => Ok(PoolStatus::Suspended),
            other => Err(SettlementError::validation(format!(
                "pool status {:?} is invalid",
                other
            ))),
        }
    }
}

impl PoolStatus {
    pub fn allows_swap(self) -> bool {
        self == PoolStatus::Enabled
    }

    pub fn allows_stake(self) -> bool {
        matches!(self, PoolStatus::Bootstrap | PoolStatus::Enabled)
    }

    pub fn allows_withdraw(self) -> bool {
        self != PoolStatus::Suspended
    }
}

/// Liquidity reserve of one asset against the base asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub asset: Asset,
    pub balance_base: Amount,
    pub balance_asset: Amount,
    pub pool_units: u64,
    pub status: PoolStatus,
}

impl Pool {
    pub fn new(asset: Asset, status: PoolStatus) -> Self {
        Self {
            asset,
            balance_base: Amount::ZERO,
            balance_asset: Amount::ZERO,
            pool_units: 0,
            status,
        }
    }

    /// No units issued and nothing deposited
    pub fn is_empty(&self) -> bool {
        self.pool_units == 0
    }

    /// Fail with `InvalidStatus` unless `allowed` holds for the current status
    pub fn ensure(&self, allowed: fn(PoolStatus) -> bool, action: &'static str) -> SettlementResult<()> {
        if allowed(self.status) {
            Ok(())
        } else {
            Err(SettlementError::InvalidStatus {
                asset: self.asset.to_string(),
                status: self.status,
                action,
            })
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] base={} asset={} units={}",
            self.asset, self.status, self.balance_base, self.balance_asset, self.pool_units
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("ACTIVE".parse::<PoolStatus>().unwrap(), PoolStatus::Enabled);
        assert_eq!("enabled".parse::<PoolStatus>().unwrap(), PoolStatus::Enabled);
        assert_eq!("Bootstrap".parse::<PoolStatus>().unwrap(), PoolStatus::Bootstrap);
        assert_eq!("suspend".parse::<PoolStatus>().unwrap(), PoolStatus::Suspended);
        assert!("paused".parse::<PoolStatus>().is_err());
    }

    #[test]
    fn test_status_permissions() {
        assert!(!PoolStatus::Bootstrap.allows_swap());
        assert!(PoolStatus::Bootstrap.allows_stake());
        assert!(PoolStatus::Enabled.allows_swap());
        assert!(!PoolStatus::Bootstrapped.allows_stake());
        assert!(PoolStatus::Bootstrapped.allows_withdraw());
        assert!(!PoolStatus::Suspended.allows_withdraw());
    }

    #[test]
    fn test_ensure_reports_status() {
        let pool = Pool::new("BNB.TCAN-014".parse().unwrap(), PoolStatus::Bootstrap);
        let err = pool.ensure(PoolStatus::allows_swap, "swap").unwrap_err();
        assert_eq!(
            err.to_string(),
            "pool BNB.TCAN-014 is in Bootstrap status, can't swap"
        );
        assert!(pool.ensure(PoolStatus::allows_stake, "stake").is_ok());
    }
}
