use crate::constants::REWARD_TOKEN_DECIMALS;
use crate::error::{RewardError, RewardResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point amount: `raw` native units at `decimals` precision. Used both
/// for on-chain reward-token quantities (`decimals = 18`) and for
/// USD-denominated figures (`decimals = USD_DECIMALS`) — the spec's "integers
/// where amounts are native chain units, decimals where USD-denominated" is
/// the same representation with a different decimals convention, so
/// arithmetic stays exact in both domains and never touches a float.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenAmount {
    pub raw: u128,
    pub decimals: u8,
}

impl Default for TokenAmount {
    fn default() -> Self {
        Self::zero(REWARD_TOKEN_DECIMALS)
    }
}

impl TokenAmount {
    pub fn from_raw(raw: u128, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn from_decimal(s: &str, decimals: u8) -> RewardResult<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 2 {
            return Err(RewardError::Amount("invalid decimal format".into()));
        }

        let whole: u128 = parts[0]
            .parse()
            .map_err(|_| RewardError::Amount("invalid whole part".into()))?;

        let frac = if parts.len() == 2 {
            let frac_str = parts[1];
            if frac_str.len() > decimals as usize {
                return Err(RewardError::Amount("too many decimal places".into()));
            }
            let padded = format!("{:0<width$}", frac_str, width = decimals as usize);
            padded
                .parse::<u128>()
                .map_err(|_| RewardError::Amount("invalid fractional part".into()))?
        } else {
            0
        };

        let multiplier = 10u128.pow(decimals as u32);
        let raw = whole
            .checked_mul(multiplier)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| RewardError::Amount("amount overflow".into()))?;

        Ok(Self { raw, decimals })
    }

    pub fn to_decimal(&self) -> String {
        let multiplier = 10u128.pow(self.decimals as u32);
        let whole = self.raw / multiplier;
        let frac = self.raw % multiplier;

        if frac == 0 {
            whole.to_string()
        } else {
            let frac_str = format!("{:0>width$}", frac, width = self.decimals as usize);
            let trimmed = frac_str.trim_end_matches('0');
            format!("{}.{}", whole, trimmed)
        }
    }

    pub fn native(amount: &str) -> RewardResult<Self> {
        Self::from_decimal(amount, REWARD_TOKEN_DECIMALS)
    }

    pub fn zero(decimals: u8) -> Self {
        Self { raw: 0, decimals }
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        if self.decimals != other.decimals {
            return None;
        }
        self.raw.checked_add(other.raw).map(|raw| Self {
            raw,
            decimals: self.decimals,
        })
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        if self.decimals != other.decimals {
            return None;
        }
        self.raw.checked_sub(other.raw).map(|raw| Self {
            raw,
            decimals: self.decimals,
        })
    }

    pub fn as_f64(&self) -> f64 {
        self.raw as f64 / 10f64.powi(self.decimals as i32)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_round_trip() {
        let amount = TokenAmount::native("100.5").unwrap();
        assert_eq!(amount.to_decimal(), "100.5");

        let zero = TokenAmount::zero(18);
        assert!(zero.is_zero());

        let sum = amount.checked_add(&TokenAmount::native("0.5").unwrap()).unwrap();
        assert_eq!(sum.to_decimal(), "101");
    }

    #[test]
    fn mismatched_decimals_reject_arithmetic() {
        let a = TokenAmount::from_raw(100, 18);
        let b = TokenAmount::from_raw(100, 6);
        assert!(a.checked_add(&b).is_none());
    }

    #[test]
    fn rejects_too_many_fractional_digits() {
        assert!(TokenAmount::from_decimal("1.1234567890123456789", 18).is_err());
    }
}
