//! Monetary types for the wallet ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Currency code, e.g. `USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Check the code is a plausible currency code (ASCII letters only).
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= 10 && self.0.chars().all(|c| c.is_ascii_alphabetic())
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn rub() -> Self {
        Self::new("RUB")
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

impl From<String> for Currency {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Balance snapshot of an account: one entry per currency held.
pub type AccountWallets = BTreeMap<Currency, Decimal>;

/// Error when a rate table contains a rate that is not strictly positive.
#[derive(Debug, Clone)]
pub struct InvalidRateError {
    pub currency: Currency,
    pub rate: Decimal,
}

impl fmt::Display for InvalidRateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid rate for {}: {} (rates must be positive)",
            self.currency, self.rate
        )
    }
}

impl std::error::Error for InvalidRateError {}

/// Exchange rates of every known currency relative to a common base.
///
/// Tables are immutable once built; a refresh replaces the whole table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HashMap<Currency, Decimal>", into = "HashMap<Currency, Decimal>")]
pub struct RateTable {
    rates: HashMap<Currency, Decimal>,
}

impl RateTable {
    /// Build a table, rejecting non-positive rates.
    pub fn new(rates: HashMap<Currency, Decimal>) -> Result<Self, InvalidRateError> {
        if let Some((currency, rate)) = rates.iter().find(|(_, rate)| **rate <= Decimal::ZERO) {
            return Err(InvalidRateError {
                currency: currency.clone(),
                rate: *rate,
            });
        }
        Ok(Self { rates })
    }

    /// Build a table from `(code, rate)` pairs.
    pub fn from_pairs<I, C>(pairs: I) -> Result<Self, InvalidRateError>
    where
        I: IntoIterator<Item = (C, Decimal)>,
        C: Into<Currency>,
    {
        Self::new(pairs.into_iter().map(|(c, r)| (c.into(), r)).collect())
    }

    /// Rate of a currency relative to the base.
    pub fn get(&self, currency: &Currency) -> Option<Decimal> {
        self.rates.get(currency).copied()
    }

    /// Whether the currency is known.
    pub fn contains(&self, currency: &Currency) -> bool {
        self.rates.contains_key(currency)
    }

    /// Conversion rate from `from` into `to`: `rate(to) / rate(from)`.
    ///
    /// `None` when either currency is unknown or the quotient does not fit
    /// a decimal.
    pub fn rate(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        let from_rate = self.get(from)?;
        let to_rate = self.get(to)?;
        to_rate.checked_div(from_rate)
    }

    /// Number of currencies in the table.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Iterate over `(currency, rate)` entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &Decimal)> {
        self.rates.iter()
    }
}

impl TryFrom<HashMap<Currency, Decimal>> for RateTable {
    type Error = InvalidRateError;

    fn try_from(rates: HashMap<Currency, Decimal>) -> Result<Self, Self::Error> {
        Self::new(rates)
    }
}

impl From<RateTable> for HashMap<Currency, Decimal> {
    fn from(table: RateTable) -> Self {
        table.rates
    }
}
