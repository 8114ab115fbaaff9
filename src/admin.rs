//! Admin Config Store
//!
//! Tunables written by `ADMIN:` memos. Only senders in the configured trusted
//! set can write; a write from anyone else is dropped without an error and
//! the stored value stays as it was.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::common::{Address, Amount, Asset};
use crate::error::{SettlementError, SettlementResult};
use crate::ledger::PoolStatus;
use crate::store::{self, KvStore};
use crate::swap::SwapLimits;

const PREVIOUS_POOL_ADDRESS_KEY: &str = "meta:previous_pool_address";

// ============================================
// KEYS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdminKey {
    /// Trade slip limit in basis points
    Tsl,
    /// Pool slip limit in basis points
    Gsl,
    /// Address inbound transactions must be sent to
    PoolAddress,
    /// Minimum refund amount, deducted from every refunded coin
    Mrra,
    /// Status a new pool starts in
    DefaultPoolStatus,
    /// Status record of one pool (`<ASSET>:POOLSTATUS`)
    PoolStatus(Asset),
}

impl AdminKey {
    pub fn storage_key(&self) -> String {
        match self {
            AdminKey::Tsl => "TSL".to_string(),
            AdminKey::Gsl => "GSL".to_string(),
            AdminKey::PoolAddress => "PoolAddress".to_string(),
            AdminKey::Mrra => "MRRA".to_string(),
            AdminKey::DefaultPoolStatus => "DefaultPoolStatus".to_string(),
            AdminKey::PoolStatus(asset) => format!("{}:POOLSTATUS", asset),
        }
    }

    /// Normalise and check a value before it is stored
    pub fn validate(&self, value: &str) -> SettlementResult<String> {
        let value = value.trim();
        match self {
            AdminKey::Tsl | AdminKey::Gsl => {
                let bps: u64 = value.parse().map_err(|_| {
                    SettlementError::validation(format!("{} must be basis points, got {:?}", self, value))
                })?;
                if bps > 10_000 {
                    return Err(SettlementError::validation(format!(
                        "{} of {} bps is over 10000",
                        self, bps
                    )));
                }
                Ok(bps.to_string())
            }
            AdminKey::PoolAddress => Ok(Address::new(value)?.to_string()),
            AdminKey::Mrra => Ok(value.parse::<Amount>()?.to_string()),
            AdminKey::DefaultPoolStatus | AdminKey::PoolStatus(_) => {
                Ok(value.parse::<PoolStatus>()?.to_string())
            }
        }
    }
}

impl fmt::Display for AdminKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

impl FromStr for AdminKey {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tsl" => Ok(AdminKey::Tsl),
            "gsl" => Ok(AdminKey::Gsl),
            "pooladdress" => Ok(AdminKey::PoolAddress),
            "mrra" => Ok(AdminKey::Mrra),
            "defaultpoolstatus" => Ok(AdminKey::DefaultPoolStatus),
            other => Err(SettlementError::validation(format!("admin key {:?} is unknown", other))),
        }
    }
}

/// Stored config value and who wrote it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminEntry {
    pub key: String,
    pub value: String,
    pub address: Address,
}

fn config_key(key: &AdminKey) -> String {
    format!("config:{}", key.storage_key())
}

// ============================================
// STORE
// ============================================

#[derive(Debug, Clone)]
pub struct AdminConfigStore {
    trusted: BTreeSet<Address>,
    default_pool_address: Address,
}

impl AdminConfigStore {
    pub fn new(trusted: impl IntoIterator<Item = Address>, default_pool_address: Address) -> Self {
        Self {
            trusted: trusted.into_iter().collect(),
            default_pool_address,
        }
    }

    pub fn is_trusted(&self, address: &Address) -> bool {
        self.trusted.contains(address)
    }

    /// Write `value` under `key`. Returns `Ok(false)` when the sender is not
    /// trusted and nothing was written.
    pub fn set(
        &self,
        store: &mut dyn KvStore,
        key: &AdminKey,
        value: &str,
        sender: &Address,
    ) -> SettlementResult<bool> {
        if !self.is_trusted(sender) {
            warn!("Admin write {}={} from untrusted {} dropped", key, value, sender);
            return Ok(false);
        }

        let value = key.validate(value)?;
        if key == &AdminKey::PoolAddress {
            let current = self.pool_address(store)?;
            if current.as_str() != value {
                store::write(store, PREVIOUS_POOL_ADDRESS_KEY, &current)?;
            }
        }

        let entry = AdminEntry {
            key: key.storage_key(),
            value: value.clone(),
            address: sender.clone(),
        };
        store::write(store, &config_key(key), &entry)?;
        info!("Admin config {} = {} (by {})", key, value, sender);
        Ok(true)
    }

    pub fn entry(&self, store: &dyn KvStore, key: &AdminKey) -> SettlementResult<Option<AdminEntry>> {
        store::read(store, &config_key(key))
    }

    /// Stored value, or the key's default when nothing was written
    pub fn get(&self, store: &dyn KvStore, key: &AdminKey) -> SettlementResult<Option<String>> {
        if let Some(entry) = self.entry(store, key)? {
            return Ok(Some(entry.value));
        }
        Ok(match key {
            AdminKey::Tsl | AdminKey::Gsl | AdminKey::PoolStatus(_) => None,
            AdminKey::PoolAddress => Some(self.default_pool_address.to_string()),
            AdminKey::Mrra => Some(Amount::ZERO.to_string()),
            AdminKey::DefaultPoolStatus => Some(PoolStatus::Bootstrap.to_string()),
        })
    }

    fn parsed<T: FromStr>(&self, store: &dyn KvStore, key: &AdminKey) -> SettlementResult<Option<T>> {
        match self.get(store, key)? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| SettlementError::Storage(format!("config {} holds {:?}", key, raw))),
            None => Ok(None),
        }
    }

    pub fn swap_limits(&self, store: &dyn KvStore) -> SettlementResult<SwapLimits> {
        Ok(SwapLimits {
            trade_slip_bps: self.parsed(store, &AdminKey::Tsl)?,
            pool_slip_bps: self.parsed(store, &AdminKey::Gsl)?,
        })
    }

    pub fn pool_address(&self, store: &dyn KvStore) -> SettlementResult<Address> {
        Ok(self
            .parsed(store, &AdminKey::PoolAddress)?
            .unwrap_or_else(|| self.default_pool_address.clone()))
    }

    /// Pool address before the last rotation, still accepted for confirmations
    pub fn previous_pool_address(&self, store: &dyn KvStore) -> SettlementResult<Option<Address>> {
        store::read(store, PREVIOUS_POOL_ADDRESS_KEY)
    }

    pub fn min_refund(&self, store: &dyn KvStore) -> SettlementResult<Amount> {
        Ok(self.parsed(store, &AdminKey::Mrra)?.unwrap_or(Amount::ZERO))
    }

    pub fn default_pool_status(&self, store: &dyn KvStore) -> SettlementResult<PoolStatus> {
        Ok(self
            .parsed(store, &AdminKey::DefaultPoolStatus)?
            .unwrap_or_default())
    }
}
