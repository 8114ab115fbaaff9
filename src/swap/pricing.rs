//! Swap pricing
//!
//! `X` is the input-side reserve, `Y` the output-side reserve, `x` the input.
//!
//! ```text
//! emission      = x * X * Y / (x + X)^2
//! liquidity fee = x^2 * Y   / (x + X)^2
//! trade slip    = x * (2X + x) / X^2
//! pool slip     = x * (x^2 + 2xX + 2X^2) / (X * (x^2 + xX + X^2))
//! output slip   = x / (x + X)
//! ```
//!
//! Products of three u64 values fit in U256, so nothing here can overflow
//! before the final narrowing back to u64.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::common::Amount;
use crate::error::{SettlementError, SettlementResult};

/// Basis point scale for slips
pub const BPS: u64 = 10_000;

/// Result of pricing one hop, before anything is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub input: Amount,
    pub emitted: Amount,
    pub liquidity_fee: Amount,
    pub trade_slip_bps: u64,
    pub pool_slip_bps: u64,
    pub output_slip_bps: u64,
    /// Reserves after the swap, input side then output side
    pub new_input_reserve: Amount,
    pub new_output_reserve: Amount,
}

fn u(v: Amount) -> U256 {
    U256::from(v.raw())
}

fn narrow(v: U256) -> SettlementResult<u64> {
    u64::try_from(v).map_err(|_| SettlementError::Overflow)
}

fn div(num: U256, den: U256) -> SettlementResult<U256> {
    if den.is_zero() {
        return Err(SettlementError::Overflow);
    }
    Ok(num / den)
}

/// `x * X * Y / (x + X)^2`
pub fn emission(x: Amount, input_reserve: Amount, output_reserve: Amount) -> SettlementResult<Amount> {
    let (x, xr, yr) = (u(x), u(input_reserve), u(output_reserve));
    let s = x + xr;
    narrow(div(x * xr * yr, s * s)?).map(Amount::new)
}

/// `x^2 * Y / (x + X)^2`
pub fn liquidity_fee(x: Amount, input_reserve: Amount, output_reserve: Amount) -> SettlementResult<Amount> {
    let (x, xr, yr) = (u(x), u(input_reserve), u(output_reserve));
    let s = x + xr;
    narrow(div(x * x * yr, s * s)?).map(Amount::new)
}

pub fn trade_slip_bps(x: Amount, input_reserve: Amount) -> SettlementResult<u64> {
    let (x, xr) = (u(x), u(input_reserve));
    narrow(div(x * (xr + xr + x) * U256::from(BPS), xr * xr)?)
}

pub fn pool_slip_bps(x: Amount, input_reserve: Amount) -> SettlementResult<u64> {
    let (x, xr) = (u(x), u(input_reserve));
    let x2 = x * x;
    let xr2 = xr * xr;
    let num = x * (x2 + U256::from(2u64) * x * xr + U256::from(2u64) * xr2);
    let den = xr * (x2 + x * xr + xr2);
    narrow(div(num * U256::from(BPS), den)?)
}

pub fn output_slip_bps(x: Amount, input_reserve: Amount) -> SettlementResult<u64> {
    let (x, xr) = (u(x), u(input_reserve));
    narrow(div(x * U256::from(BPS), x + xr)?)
}

/// Price a swap of `x` against the reserves. Refuses zero input, empty
/// reserves and any swap that would emit nothing or drain the output side.
pub fn quote(x: Amount, input_reserve: Amount, output_reserve: Amount) -> SettlementResult<SwapQuote> {
    if x.is_zero() {
        return Err(SettlementError::validation("swap amount is zero"));
    }
    if input_reserve.is_zero() || output_reserve.is_zero() {
        return Err(SettlementError::validation("pool has no depth to swap against"));
    }

    let emitted = emission(x, input_reserve, output_reserve)?;
    if emitted.is_zero() {
        return Err(SettlementError::validation(format!("swap of {} emits nothing", x)));
    }
    if emitted >= output_reserve {
        return Err(SettlementError::validation(format!(
            "emission {} would drain reserve {}",
            emitted, output_reserve
        )));
    }

    Ok(SwapQuote {
        input: x,
        emitted,
        liquidity_fee: liquidity_fee(x, input_reserve, output_reserve)?,
        trade_slip_bps: trade_slip_bps(x, input_reserve)?,
        pool_slip_bps: pool_slip_bps(x, input_reserve)?,
        output_slip_bps: output_slip_bps(x, input_reserve)?,
        new_input_reserve: input_reserve.checked_add(x)?,
        new_output_reserve: output_reserve.checked_sub(emitted)?,
    })
}
