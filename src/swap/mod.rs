//! Swap Module - constant product pricing and routing

pub mod engine;
pub mod pricing;

pub use engine::{SwapEngine, SwapHop, SwapLimits, SwapOutcome};
pub use pricing::SwapQuote;
