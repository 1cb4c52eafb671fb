//! Decimal money values parsed from and formatted to display strings.
//!
//! The commerce backend reports cart aggregates as pre-formatted strings
//! (`"$49.99"`, `"1,299.00"`, `"&#36;5.00"`) and shipping costs as bare numeric
//! strings (`"10.00"`). [`Price`] parses either form into a [`Decimal`] so the
//! checkout can do arithmetic without floating point, and formats results back
//! into the same display shape.

use core::fmt;
use core::ops::{Add, Sub};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input contained no digits.
    #[error("price string contains no amount: {0:?}")]
    NoAmount(String),
    /// The numeric part could not be parsed as a decimal.
    #[error("invalid price amount {input:?}: {reason}")]
    InvalidAmount {
        /// The original input.
        input: String,
        /// Parser error message.
        reason: String,
    },
}

/// ISO 4217 currency codes supported by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Display symbol used when formatting prices.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// Three-letter ISO code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }

    /// Lowercase ISO code, as payment processors expect it.
    #[must_use]
    pub fn lowercase_code(self) -> String {
        self.code().to_ascii_lowercase()
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Create a price from an amount in minor units (cents).
    #[must_use]
    pub fn from_minor_units(minor: i64, currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::new(minor, 2), currency_code)
    }

    /// Parse a backend display string such as `"$1,299.00"` or `"10.00"`.
    ///
    /// Currency symbols, HTML entities, thousands separators and whitespace are
    /// ignored; a leading `-` anywhere before the digits marks a negative value.
    ///
    /// # Errors
    ///
    /// Returns an error if no digits are present or the remaining numeric text
    /// is not a valid decimal.
    pub fn parse_display(input: &str, currency_code: CurrencyCode) -> Result<Self, PriceError> {
        let decoded = decode_entities(input);
        let negative = decoded
            .find(|c: char| c.is_ascii_digit())
            .is_some_and(|first_digit| decoded[..first_digit].contains('-'));

        let numeric: String = decoded
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        if !numeric.chars().any(|c| c.is_ascii_digit()) {
            return Err(PriceError::NoAmount(input.to_owned()));
        }

        let amount = Decimal::from_str(&numeric).map_err(|e| PriceError::InvalidAmount {
            input: input.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self::new(
            if negative { -amount } else { amount },
            currency_code,
        ))
    }

    /// Amount rounded half-up to two decimal places.
    #[must_use]
    pub fn rounded(&self) -> Decimal {
        self.amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Amount in minor units (cents), as payment processors expect it.
    ///
    /// Returns `None` when the amount does not fit in an `i64`.
    #[must_use]
    pub fn minor_units(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;
        (self.rounded() * Decimal::ONE_HUNDRED).trunc().to_i64()
    }

    /// Format for display (e.g., `"$59.99"`, `"-$5.00"`).
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = self.rounded();
        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        format!(
            "{sign}{}{:.2}",
            self.currency_code.symbol(),
            rounded.abs()
        )
    }

    /// Format as a bare decimal string (e.g., `"59.99"`).
    #[must_use]
    pub fn plain(&self) -> String {
        format!("{:.2}", self.rounded())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.amount + rhs.amount, self.currency_code)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.amount - rhs.amount, self.currency_code)
    }
}

/// Decode the numeric HTML entities WordPress-style backends emit for symbols.
fn decode_entities(input: &str) -> String {
    input
        .replace("&#36;", "$")
        .replace("&#8364;", "€")
        .replace("&pound;", "£")
        .replace("&nbsp;", " ")
        .replace("&#8211;", "-")
}
