//! Stake unit math
//!
//! All values are integers; every division truncates toward zero.

use crate::common::{mul_div_down, Amount};
use crate::error::{SettlementError, SettlementResult};

/// Basis points in a full withdrawal
pub const MAX_WITHDRAW_BASIS_POINTS: u64 = 10_000;

/// Units for a deposit of `r` base and `a` asset.
///
/// Empty pool: `((R+A)(rA+Ra)) / 4RA` on post-deposit balances, which for a
/// first deposit (`R = r`, `A = a`) is `(r + a) / 2`.
/// Otherwise the smaller of the two proportional shares of `pool_units`.
pub fn stake_units(
    pool_units: u64,
    balance_base: Amount,
    balance_asset: Amount,
    r: Amount,
    a: Amount,
) -> SettlementResult<u64> {
    if pool_units == 0 {
        if r.is_zero() || a.is_zero() {
            return Err(SettlementError::validation(
                "first stake must deposit both sides",
            ));
        }
        let units = (r.raw() as u128 + a.raw() as u128) / 2;
        return u64::try_from(units).map_err(|_| SettlementError::Overflow);
    }

    let p = pool_units as u128;
    let by_base = mul_div_down(r.raw() as u128, p, balance_base.raw() as u128);
    let by_asset = mul_div_down(a.raw() as u128, p, balance_asset.raw() as u128);
    let units = match (by_base, by_asset) {
        (Some(b), Some(s)) => b.min(s),
        _ => return Err(SettlementError::Overflow),
    };
    u64::try_from(units).map_err(|_| SettlementError::Overflow)
}

/// Units redeemed by withdrawing `basis_points` of a position
pub fn redeem_units(position_units: u64, basis_points: u64) -> SettlementResult<u64> {
    if basis_points == 0 || basis_points > MAX_WITHDRAW_BASIS_POINTS {
        return Err(SettlementError::validation(format!(
            "withdraw basis points must be in 1..={}, got {}",
            MAX_WITHDRAW_BASIS_POINTS, basis_points
        )));
    }
    mul_div_down(
        position_units as u128,
        basis_points as u128,
        MAX_WITHDRAW_BASIS_POINTS as u128,
    )
    .and_then(|v| u64::try_from(v).ok())
    .ok_or(SettlementError::Overflow)
}

/// Pro-rata share of `balance` for `units` out of `pool_units`
pub fn share_of(balance: Amount, units: u64, pool_units: u64) -> SettlementResult<Amount> {
    balance.mul_div(units, pool_units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_deposit_units() {
        let units = stake_units(
            0,
            Amount::ZERO,
            Amount::ZERO,
            Amount::new(2_349_500_000),
            Amount::new(334_850_000),
        )
        .unwrap();
        assert_eq!(units, 1_342_175_000);
    }

    #[test]
    fn test_first_deposit_needs_both_sides() {
        assert!(stake_units(0, Amount::ZERO, Amount::ZERO, Amount::new(5), Amount::ZERO).is_err());
        assert!(stake_units(0, Amount::ZERO, Amount::ZERO, Amount::ZERO, Amount::new(5)).is_err());
    }

    #[test]
    fn test_proportional_units_take_the_smaller_side() {
        // pool: 1000 base / 100 asset / 500 units
        let units = stake_units(500, Amount::new(1000), Amount::new(100), Amount::new(100), Amount::new(20))
            .unwrap();
        // base share 100*500/1000 = 50, asset share 20*500/100 = 100
        assert_eq!(units, 50);
    }

    #[test]
    fn test_redeem_units_bounds() {
        assert_eq!(redeem_units(1000, 10_000).unwrap(), 1000);
        assert_eq!(redeem_units(1000, 5_000).unwrap(), 500);
        assert_eq!(redeem_units(3, 5_000).unwrap(), 1);
        assert!(redeem_units(1000, 0).is_err());
        assert!(redeem_units(1000, 10_001).is_err());
    }

    #[test]
    fn test_share_truncates() {
        assert_eq!(share_of(Amount::new(10), 1, 3).unwrap(), Amount::new(3));
        assert!(share_of(Amount::new(10), 1, 0).is_err());
    }
}
