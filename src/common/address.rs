//! External chain addresses and transaction ids

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SettlementError, SettlementResult};

/// Address on a connected chain (bech32 style, not checksummed here)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(raw: &str) -> SettlementResult<Self> {
        let raw = raw.trim();
        if !(3..=90).contains(&raw.len()) || !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(SettlementError::validation(format!("address {:?} is invalid", raw)));
        }
        Ok(Address(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = SettlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::new(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> String {
        address.0
    }
}

/// 32-byte transaction hash, upper-case hex
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxId(String);

impl TxId {
    pub fn new(raw: &str) -> SettlementResult<Self> {
        let raw = raw.trim();
        let bytes = hex::decode(raw)
            .map_err(|e| SettlementError::validation(format!("tx id {:?}: {}", raw, e)))?;
        if bytes.len() != 32 {
            return Err(SettlementError::validation(format!(
                "tx id must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(TxId(hex::encode_upper(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TxId {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TxId::new(s)
    }
}

impl TryFrom<String> for TxId {
    type Error = SettlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TxId::new(&value)
    }
}

impl From<TxId> for String {
    fn from(id: TxId) -> String {
        id.0
    }
}
