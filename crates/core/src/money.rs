//! Fixed-point money and currency codes.

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Non-negative amount of money with exactly two fractional digits.
///
/// Mirrors a `NUMERIC(12, 2)` column: inputs are rounded half away from zero
/// to cents and must fit in twelve digits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Fractional digits kept on every amount.
    pub const SCALE: u32 = 2;

    /// Largest representable amount (`9_999_999_999.99`).
    pub const MAX: Money = Money(Decimal::from_parts(3_567_587_327, 232, 0, false, 2));

    pub fn zero() -> Self {
        Self(Decimal::new(0, Self::SCALE))
    }

    /// Build an amount, rounding to cents.
    pub fn new(value: Decimal) -> DomainResult<Self> {
        let mut rounded = value.round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(Self::SCALE);

        if rounded.is_sign_negative() && !rounded.is_zero() {
            return Err(DomainError::validation(format!("amount must not be negative (got {value})")));
        }
        if rounded > Self::MAX.0 {
            return Err(DomainError::validation(format!("amount {value} exceeds {}", Self::MAX)));
        }
        // Normalize -0.00 to 0.00.
        rounded.set_sign_positive(true);
        Ok(Self(rounded))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `self - rhs`, or `None` if the result would be negative.
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        let diff = self.0.checked_sub(rhs.0)?;
        if diff.is_sign_negative() && !diff.is_zero() {
            return None;
        }
        Self::new(diff).ok()
    }

    /// `self + rhs`, or `None` if the result exceeds [`Money::MAX`].
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        let sum = self.0.checked_add(rhs.0)?;
        Self::new(sum).ok()
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl ValueObject for Money {}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("invalid amount '{s}': {e}")))?;
        Self::new(value)
    }
}

/// ISO-4217 style currency code: three uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub const DEFAULT: &'static str = "MXN";

    pub fn new(code: impl Into<String>) -> DomainResult<Self> {
        let code = code.into();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency must be three uppercase letters (got '{code}')"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl ValueObject for CurrencyCode {}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}
