//! Monetary types for the wallet ledger.
//!
//! All balances are fixed-point integers of minor currency units (cents for
//! USD). Decimals only appear at the edges, when converting amounts typed by
//! an operator or reported by a payment processor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;

use crate::error::{LedgerError, Result};

/// An amount in minor currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// Create from minor units.
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Get the value in minor units.
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Check if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Check if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Addition that maps overflow to [`LedgerError::AmountOverflow`].
    pub fn try_add(self, other: Amount) -> Result<Amount> {
        self.checked_add(other).ok_or(LedgerError::AmountOverflow)
    }

    /// Subtraction that maps overflow to [`LedgerError::AmountOverflow`].
    pub fn try_sub(self, other: Amount) -> Result<Amount> {
        self.checked_sub(other).ok_or(LedgerError::AmountOverflow)
    }

    /// Require a strictly positive amount.
    pub fn ensure_positive(self) -> Result<Amount> {
        if self.is_positive() {
            Ok(self)
        } else {
            Err(LedgerError::InvalidAmount(self))
        }
    }

    /// Portion of this amount expressed in basis points, rounded down.
    pub fn basis_points(self, bps: u32) -> Amount {
        let scaled = i128::from(self.0) * i128::from(bps) / 10_000;
        // bps <= 10_000 keeps this within i64; larger rates saturate.
        Amount(scaled.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }

    /// Convert a major-unit decimal (e.g. `12.50`) into minor units.
    ///
    /// Fails when the value has more fractional digits than the currency
    /// allows or does not fit in 64 bits.
    pub fn from_major(value: Decimal, currency: &Currency) -> Result<Amount> {
        let scale = Decimal::from(10i64.pow(currency.decimal_places()));
        let minor = value
            .checked_mul(scale)
            .ok_or(LedgerError::AmountOverflow)?;
        if minor.fract() != Decimal::ZERO {
            return Err(LedgerError::InvalidPrecision {
                value: value.to_string(),
                currency: currency.clone(),
            });
        }
        let minor: i64 = minor
            .trunc()
            .try_into()
            .map_err(|_| LedgerError::AmountOverflow)?;
        Ok(Amount(minor))
    }

    /// Convert to a major-unit decimal for display.
    pub fn to_major(&self, currency: &Currency) -> Decimal {
        Decimal::new(self.0, currency.decimal_places())
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        Amount(-self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Amount {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

/// An amount paired with its currency, for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Minor units.
    pub amount: Amount,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(amount: Amount, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Parse a major-unit string such as `"12.50"`.
    pub fn parse(value: &str, currency: Currency) -> Result<Self> {
        let decimal: Decimal = value
            .trim()
            .parse()
            .map_err(|_| LedgerError::InvalidPrecision {
                value: value.to_string(),
                currency: currency.clone(),
            })?;
        let amount = Amount::from_major(decimal, &currency)?;
        Ok(Self { amount, currency })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount.to_major(&self.currency), self.currency)
    }
}

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Get the standard decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            _ => 2,
        }
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn jpy() -> Self {
        Self::new("JPY")
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
