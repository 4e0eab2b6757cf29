//! Amount type for handling sterling values with optional pound signs.
//!
//! This module provides the `Amount` type which wraps `Decimal` and handles parsing values that
//! may or may not include a pound sign and thousands separators, as council spending files do.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Represents a sterling amount.
///
/// All arithmetic is done on the underlying `Decimal`, so sums are exact to the penny. The
/// `Display` form always uses a pound sign and thousands separators, e.g. `-£60,000.00`.
///
/// # Examples
///
/// ```
/// # use council_spend_audit::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("£1,250.50").unwrap();
/// let b = Amount::from_str("1250.5").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "£1,250.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    pub const ZERO: Amount = Amount::new(Decimal::ZERO);

    /// Creates a new Amount from a Decimal value.
    pub const fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Creates an Amount from a whole number of pounds.
    pub fn pounds(pounds: i64) -> Self {
        Self::new(Decimal::from(pounds))
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Lossy conversion for statistics. Money itself is never summed as `f64`.
    pub fn to_f64(&self) -> f64 {
        self.value.to_f64().unwrap_or_default()
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.value.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.value.is_sign_negative()
    }

    /// Multiplies by a rate such as `0.08`, rounding to the penny.
    pub fn scale(&self, rate: Decimal) -> Self {
        Self::new((self.value * rate).round_dp(2))
    }
}

/// An error that can occur when parsing strings into `Amount` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        // Negative values appear as "-£50.00", "£-50.00" or "(£50.00)" in published ledgers.
        let (negative, body) = if let Some(inner) = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
        {
            (true, inner.trim())
        } else if let Some(rest) = trimmed.strip_prefix('-') {
            (true, rest)
        } else {
            (false, trimmed)
        };

        let without_pound = body.strip_prefix('£').unwrap_or(body);
        let (negative, digits) = match without_pound.strip_prefix('-') {
            Some(rest) => (!negative, rest),
            None => (negative, without_pound),
        };
        let without_commas = digits.replace(',', "");

        let value = Decimal::from_str(without_commas.trim()).map_err(AmountError)?;
        Ok(Amount::new(if negative { -value } else { value }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let num = self.value.abs().round_dp(2);
        write!(
            f,
            "{sign}£{}",
            format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
        )
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Plain decimal string so that consumers never lose precision.
        serializer.serialize_str(&self.value.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(Decimal),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Amount::from_str(&s).map_err(serde::de::Error::custom),
            Raw::Number(d) => Ok(Amount::new(d)),
        }
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        Amount::new(self.value + rhs.value)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount::new(self.value - rhs.value)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_with_pound_sign() {
        let amount = Amount::from_str("£50.00").unwrap();
        assert_eq!(amount.value(), dec("50.00"));
    }

    #[test]
    fn test_parse_negative_forms() {
        assert_eq!(Amount::from_str("-£50.00").unwrap().value(), dec("-50"));
        assert_eq!(Amount::from_str("£-50.00").unwrap().value(), dec("-50"));
        assert_eq!(Amount::from_str("(£1,050.00)").unwrap().value(), dec("-1050"));
    }

    #[test]
    fn test_parse_with_commas() {
        let amount = Amount::from_str("£1,234,567.89").unwrap();
        assert_eq!(amount.value(), dec("1234567.89"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Amount::from_str("").is_err());
        assert!(Amount::from_str("twelve pounds").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::new(dec("50")).to_string(), "£50.00");
        assert_eq!(Amount::new(dec("-60000")).to_string(), "-£60,000.00");
        assert_eq!(Amount::ZERO.to_string(), "£0.00");
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&Amount::new(dec("1000.50"))).unwrap();
        assert_eq!(json, "\"1000.50\"");
        let from_text: Amount = serde_json::from_str("\"£1,000.50\"").unwrap();
        let from_number: Amount = serde_json::from_str("1000.5").unwrap();
        assert_eq!(from_text, from_number);
    }

    #[test]
    fn test_sum_and_scale() {
        let total: Amount = [Amount::pounds(100), Amount::pounds(250)].iter().sum();
        assert_eq!(total, Amount::pounds(350));
        assert_eq!(Amount::pounds(1000).scale(dec("0.08")), Amount::pounds(80));
        assert!(Amount::pounds(-1).is_negative());
        assert!(!Amount::ZERO.is_negative());
    }
}
