//! Money, currency and mass arithmetic.
//!
//! Amounts are integer minor units and masses are integer grams, so totals
//! are computed exactly and rounded once.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Grams in one kilogram.
pub const GRAMS_PER_KG: i64 = 1000;

/// Money amount in the currency's minor unit (paise, cents).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    minor_units: i64,
}

impl Money {
    /// Creates an amount from minor units.
    pub fn from_minor_units(minor_units: i64) -> Self {
        Self { minor_units }
    }

    /// Converts a major-unit amount (e.g. `12.5` rupees) to minor units,
    /// rounding half away from zero.
    pub fn from_major(value: f64, currency: Currency) -> Result<Self, ValidationError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidAmount { value });
        }
        let scaled = (value * currency.minor_units_per_major() as f64).round();
        if scaled > i64::MAX as f64 {
            return Err(ValidationError::AmountOverflow);
        }
        Ok(Self {
            minor_units: scaled as i64,
        })
    }

    pub fn zero() -> Self {
        Self { minor_units: 0 }
    }

    /// Returns the amount in minor units.
    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    /// Returns the amount in major units, for display.
    pub fn as_major(&self, currency: Currency) -> f64 {
        self.minor_units as f64 / currency.minor_units_per_major() as f64
    }

    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let abs = self.minor_units.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Settlement currency.
///
/// All supported currencies have a minor unit of 1/100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Inr,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }

    pub fn minor_units_per_major(&self) -> i64 {
        100
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::Inr),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            _ => Err(ValidationError::UnsupportedCurrency {
                code: s.to_string(),
            }),
        }
    }
}

/// A mass of waste or compost, stored as whole grams.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity {
    grams: i64,
}

impl Quantity {
    /// Creates a quantity from grams. Negative values are rejected.
    pub fn from_grams(grams: i64) -> Result<Self, ValidationError> {
        if grams < 0 {
            return Err(ValidationError::InvalidQuantity {
                value: grams as f64 / GRAMS_PER_KG as f64,
            });
        }
        Ok(Self { grams })
    }

    /// Converts kilograms to grams, rounding half up.
    pub fn from_kg(kg: f64) -> Result<Self, ValidationError> {
        if !kg.is_finite() || kg < 0.0 {
            return Err(ValidationError::InvalidQuantity { value: kg });
        }
        let grams = (kg * GRAMS_PER_KG as f64).round();
        if grams > i64::MAX as f64 {
            return Err(ValidationError::InvalidQuantity { value: kg });
        }
        Ok(Self {
            grams: grams as i64,
        })
    }

    /// Like [`Quantity::from_kg`] but also rejects zero.
    pub fn positive_from_kg(kg: f64) -> Result<Self, ValidationError> {
        let quantity = Self::from_kg(kg)?;
        if !quantity.is_positive() {
            return Err(ValidationError::NonPositiveQuantity);
        }
        Ok(quantity)
    }

    pub fn zero() -> Self {
        Self { grams: 0 }
    }

    pub fn grams(&self) -> i64 {
        self.grams
    }

    pub fn as_kg(&self) -> f64 {
        self.grams as f64 / GRAMS_PER_KG as f64
    }

    pub fn is_positive(&self) -> bool {
        self.grams > 0
    }

    /// Subtracts `other`, returning `None` if the result would be negative.
    pub fn checked_sub(&self, other: Quantity) -> Option<Quantity> {
        self.grams
            .checked_sub(other.grams)
            .filter(|grams| *grams >= 0)
            .map(|grams| Quantity { grams })
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} kg", self.as_kg())
    }
}

/// Price of `quantity` at `price_per_kg`, rounded half up to the minor unit.
pub fn total_price(quantity: Quantity, price_per_kg: Money) -> Result<Money, ValidationError> {
    let product = i128::from(quantity.grams()) * i128::from(price_per_kg.minor_units());
    let half = i128::from(GRAMS_PER_KG / 2);
    let rounded = (product + half).div_euclid(i128::from(GRAMS_PER_KG));
    i64::try_from(rounded)
        .map(Money::from_minor_units)
        .map_err(|_| ValidationError::AmountOverflow)
}
