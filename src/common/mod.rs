//! Common Module - identifiers and amounts shared by every component

pub mod address;
pub mod amount;
pub mod asset;
pub mod coin;

pub use address::{Address, TxId};
pub use amount::{mul_div_down, Amount, DECIMALS, ONE};
pub use asset::{Asset, Chain, DEFAULT_CHAIN};
pub use coin::{sum_of, Coin};
