// pool-core/src/types.rs

use crate::{CoreError, CoreResult};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Timestamp in Unix epoch seconds
pub type Timestamp = u64;

/// Nano-units per coin
pub const NANO_PER_COIN: u64 = 1_000_000_000;

/// Denominator of a validator's requested reward share (u8 numerator)
pub const VALIDATOR_SHARE_BASE: u64 = 255;

/// Denominator of the pool's governance reward share (u16 numerator)
pub const REWARD_SHARE_BASE: u64 = 65_536;

/// Coin or token amount in nano-units (arbitrary precision)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_nano(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    pub fn from_coins(coins: u64) -> Self {
        Self(BigUint::from(coins) * BigUint::from(NANO_PER_COIN))
    }

    /// Parse a decimal coin string such as `"152.7"` (at most nine
    /// fractional digits).
    pub fn parse_coins(s: &str) -> CoreResult<Self> {
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };

        if frac_part.len() > 9 || (int_part.is_empty() && frac_part.is_empty()) {
            return Err(CoreError::InvalidAmount(s.to_string()));
        }

        let int_value = if int_part.is_empty() {
            BigUint::zero()
        } else {
            BigUint::from_str(int_part).map_err(|_| CoreError::InvalidAmount(s.to_string()))?
        };

        let frac_value = if frac_part.is_empty() {
            0u64
        } else {
            let padded = format!("{:0<9}", frac_part);
            padded.parse::<u64>().map_err(|_| CoreError::InvalidAmount(s.to_string()))?
        };

        Ok(Self(int_value * BigUint::from(NANO_PER_COIN) + BigUint::from(frac_value)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        Some(Amount(&self.0 + &other.0))
    }

    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if self.0 < other.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }

    pub fn saturating_sub(&self, other: &Amount) -> Amount {
        self.checked_sub(other).unwrap_or_else(Amount::zero)
    }

    /// `self * numerator / denominator`, rounded down
    pub fn mul_div(&self, numerator: &Amount, denominator: &Amount) -> Option<Amount> {
        if denominator.is_zero() {
            return None;
        }
        Some(Amount(&self.0 * &numerator.0 / &denominator.0))
    }

    /// `self * numerator / denominator` with machine-word ratio, rounded down
    pub fn mul_ratio(&self, numerator: u64, denominator: u64) -> Option<Amount> {
        if denominator == 0 {
            return None;
        }
        Some(Amount(&self.0 * BigUint::from(numerator) / BigUint::from(denominator)))
    }

    pub fn to_nano_u128(&self) -> Option<u128> {
        self.0.to_u128()
    }

    /// Lossy conversion for ratios and log output
    pub fn to_decimal(&self) -> Decimal {
        let coins = self.to_nano_u128()
            .and_then(|n| i128::try_from(n).ok())
            .and_then(|n| Decimal::try_from_i128_with_scale(n, 9).ok());
        coins.unwrap_or(Decimal::MAX)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(self.0 - other.0)
    }
}

impl<'a> std::iter::Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, a| Amount(acc.0 + &a.0))
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, a| acc + a)
    }
}

impl std::fmt::Display for Amount {
    /// Formats as decimal coins, e.g. `152.7`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nano = BigUint::from(NANO_PER_COIN);
        let whole = &self.0 / &nano;
        let frac = (&self.0 % &nano).to_u64().unwrap_or(0);
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let digits = format!("{:09}", frac);
            write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_coins(s)
    }
}

/// Exchange rate between coins and pool tokens
pub fn exchange_rate(valuation: &Amount, total_tokens: &Amount) -> Decimal {
    if total_tokens.is_zero() {
        return Decimal::ONE;
    }
    let tokens = total_tokens.to_decimal();
    if tokens.is_zero() {
        return Decimal::ONE;
    }
    valuation.to_decimal().checked_div(tokens).unwrap_or(Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_arithmetic() {
        let a = Amount::from_nano(100);
        let b = Amount::from_nano(50);

        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum, Amount::from_nano(150));
        assert_eq!(sum.checked_sub(&b).unwrap(), Amount::from_nano(100));
    }

    #[test]
    fn test_amount_underflow() {
        let a = Amount::from_nano(50);
        let b = Amount::from_nano(100);

        assert!(a.checked_sub(&b).is_none());
        assert!(a.saturating_sub(&b).is_zero());
    }

    #[test]
    fn test_parse_coins() {
        assert_eq!(Amount::parse_coins("152.7").unwrap(), Amount::from_nano(152_700_000_000));
        assert_eq!(Amount::parse_coins("0.01").unwrap(), Amount::from_nano(10_000_000));
        assert_eq!(Amount::parse_coins("300000").unwrap(), Amount::from_coins(300_000));
        assert!(Amount::parse_coins("1.0000000001").is_err());
        assert!(Amount::parse_coins("abc").is_err());
    }

    #[test]
    fn test_display_coins() {
        assert_eq!(Amount::parse_coins("152.7").unwrap().to_string(), "152.7");
        assert_eq!(Amount::from_coins(10).to_string(), "10");
    }

    #[test]
    fn test_mul_div_rounds_down() {
        let a = Amount::from_nano(10);
        assert_eq!(a.mul_div(&Amount::from_nano(1), &Amount::from_nano(3)), Some(Amount::from_nano(3)));
        assert_eq!(a.mul_div(&Amount::from_nano(1), &Amount::zero()), None);
        assert_eq!(a.mul_ratio(102, VALIDATOR_SHARE_BASE), Some(Amount::from_nano(4)));
    }

    #[test]
    fn test_exchange_rate() {
        assert_eq!(exchange_rate(&Amount::zero(), &Amount::zero()), Decimal::ONE);
        let rate = exchange_rate(&Amount::from_coins(20), &Amount::from_coins(10));
        assert_eq!(rate, Decimal::from(2));
    }
}
