//! Settlement Errors
//!
//! Every failure the core can produce. None of them is fatal: the dispatcher
//! turns value-bearing failures into refunds and reports structural ones back
//! to the submitting layer.

use thiserror::Error;

use crate::common::Amount;
use crate::ledger::PoolStatus;

/// Error during settlement operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// Malformed memo, asset, address or amount
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Sender is not in the trusted set for an admin or relayer command
    #[error("{0} is not authorized")]
    Unauthorized(String),

    /// Swap output fell below the caller's limit
    #[error("emitted {emitted} is less than price limit {limit}")]
    PriceProtection { emitted: Amount, limit: Amount },

    #[error("{address} has no position in pool {asset}")]
    NoPosition { asset: String, address: String },

    #[error("pool {asset} is in {status} status, can't {action}")]
    InvalidStatus {
        asset: String,
        status: PoolStatus,
        action: &'static str,
    },

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SettlementError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SettlementError::Validation(msg.into())
    }

    /// Errors that describe an impossible request rather than a bad payment
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SettlementError::AlreadyExists(_)
                | SettlementError::NotFound(_)
                | SettlementError::NoPosition { .. }
        )
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(err: serde_json::Error) -> Self {
        SettlementError::Storage(err.to_string())
    }
}

/// Result type for settlement operations
pub type SettlementResult<T> = Result<T, SettlementError>;
