//! Memo-driven settlement engine
//!
//! Liquidity pools pairing one base asset against many others. Inbound
//! transactions carry a short text memo naming the command (create, stake,
//! withdraw, swap, add, gas, outbound confirmation or admin write); the
//! engine applies them in block order, records events, and queues the
//! payouts relayers have to sign on the external chain.

pub mod admin;
pub mod common;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod handler;
pub mod ledger;
pub mod memo;
pub mod outbound;
pub mod query;
pub mod store;
pub mod swap;
pub mod tracker;

pub use config::Config;
pub use engine::{BlockReceipt, SettlementEngine};
pub use error::{SettlementError, SettlementResult};
pub use handler::{InboundTx, TxOutcome};
pub use query::QueryView;
