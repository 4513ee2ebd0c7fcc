//! Monetary amounts using decimal arithmetic.
//!
//! The shop sells in a single currency, so `Money` carries only an amount.
//! Amounts are rounded to two decimal places on construction and can never be
//! negative; the database mirrors this with `NUMERIC(12,2) CHECK (>= 0)`.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};

/// Errors that can occur when constructing [`Money`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is below zero.
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    /// A multiplication overflowed.
    #[error("amount overflow")]
    Overflow,
}

/// A non-negative amount with two decimal places.
///
/// ```
/// use rust_decimal::Decimal;
/// use vitrina_core::Money;
///
/// let price = Money::new(Decimal::new(19_995, 3)).unwrap();
/// assert_eq!(price.to_string(), "20.00");
/// assert_eq!(price.times(3).unwrap().to_string(), "60.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new amount, rounding half away from zero to cents.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` if the amount is below zero.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative(amount));
        }
        let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        Ok(Self(rounded))
    }

    /// Create an amount from whole cents.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` if `cents` is below zero.
    pub fn from_cents(cents: i64) -> Result<Self, MoneyError> {
        Self::new(Decimal::new(cents, 2))
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether this amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiply by a quantity (line totals).
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the result does not fit.
    pub fn times(&self, quantity: u32) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_to_cents() {
        let m = Money::new(Decimal::new(1_005, 3)).unwrap();
        assert_eq!(m.amount(), Decimal::new(101, 2));
    }

    #[test]
    fn test_rejects_negative() {
        assert!(matches!(
            Money::new(Decimal::new(-1, 2)),
            Err(MoneyError::Negative(_))
        ));
        assert!(Money::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_sum_and_times() {
        let a = Money::from_cents(1_250).unwrap();
        let b = Money::from_cents(750).unwrap();
        let total: Money = [a, b, a.times(2).unwrap()].into_iter().sum();
        assert_eq!(total.to_string(), "45.00");
    }

    #[test]
    fn test_deserialize_accepts_string_and_number() {
        let from_str: Money = serde_json::from_str("\"1500.5\"").unwrap();
        assert_eq!(serde_json::to_string(&from_str).unwrap(), "\"1500.50\"");
        let from_num: Money = serde_json::from_str("99").unwrap();
        assert_eq!(from_num.to_string(), "99.00");
        assert!(serde_json::from_str::<Money>("\"-3\"").is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let m = Money::from_cents(199).unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"1.99\"");
    }
}
