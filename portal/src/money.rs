//! Typed money amounts.
//!
//! Every amount the portal stores or sends to the payment gateway is an integer number of minor
//! units (pence, cents) tagged with its [`Currency`]. Display strings such as `"£150"` are only
//! produced from a [`Money`] for presentation, and parsed back exactly once, strictly, when an
//! admin quotes a budget on approval.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors produced when reading a display amount
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount is empty")]
    Empty,

    #[error("'{0}' is not a valid amount")]
    Malformed(String),

    #[error("'{0}' has more than two decimal places")]
    TooPrecise(String),

    #[error("amount is too large")]
    Overflow,

    #[error("unsupported currency '{0}'")]
    UnknownCurrency(String),

    #[error("currency symbol and code disagree in '{0}'")]
    CurrencyMismatch(String),
}

/// Currencies the agency invoices in. Stored and sent to the gateway as lowercase ISO codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    Gbp,
    Usd,
    Eur,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Gbp => "gbp",
            Currency::Usd => "usd",
            Currency::Eur => "eur",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Gbp => "£",
            Currency::Usd => "$",
            Currency::Eur => "€",
        }
    }

    /// Smallest charge the payment gateway accepts, in minor units
    pub fn minimum_charge(&self) -> i64 {
        match self {
            Currency::Gbp => 30,
            Currency::Usd | Currency::Eur => 50,
        }
    }

    fn from_symbol(c: char) -> Option<Self> {
        match c {
            '£' => Some(Currency::Gbp),
            '$' => Some(Currency::Usd),
            '€' => Some(Currency::Eur),
            _ => None,
        }
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gbp" => Ok(Currency::Gbp),
            "usd" => Ok(Currency::Usd),
            "eur" => Ok(Currency::Eur),
            _ => Err(MoneyError::UnknownCurrency(s.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code().to_ascii_uppercase())
    }
}

/// An amount in minor units of a currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount_minor: i64, currency: Currency) -> Self {
        Self { amount_minor, currency }
    }

    /// Parse a display amount such as `£150`, `£1,250.50`, `150 GBP` or `150.5`.
    ///
    /// Accepts an optional leading currency symbol and/or an ISO code before or after the number,
    /// digits with correctly placed thousands separators, and at most two decimal places.
    /// Ranges, words and any other free text are rejected rather than guessed at.
    pub fn parse_display(input: &str, default_currency: Currency) -> Result<Self, MoneyError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MoneyError::Empty);
        }

        let mut rest = trimmed;
        let mut symbol_currency = None;
        if let Some(first) = rest.chars().next()
            && let Some(currency) = Currency::from_symbol(first)
        {
            symbol_currency = Some(currency);
            rest = rest[first.len_utf8()..].trim_start();
        }

        let (number, code_currency) = split_iso_code(rest)?;

        let currency = match (symbol_currency, code_currency) {
            (Some(a), Some(b)) if a != b => return Err(MoneyError::CurrencyMismatch(trimmed.to_string())),
            (Some(c), _) | (None, Some(c)) => c,
            (None, None) => default_currency,
        };

        let amount_minor = parse_minor_units(number, trimmed)?;
        Ok(Self { amount_minor, currency })
    }

    /// Split into two parts: `floor(amount / 2)` and the remainder. The parts always sum to the
    /// original amount.
    pub fn split_evenly(self) -> (Money, Money) {
        let first = self.amount_minor.div_euclid(2);
        (
            Money::new(first, self.currency),
            Money::new(self.amount_minor - first, self.currency),
        )
    }

    pub fn is_positive(&self) -> bool {
        self.amount_minor > 0
    }
}

impl fmt::Display for Money {
    /// `£150` for whole amounts, `£1,250.50` otherwise
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount_minor < 0 { "-" } else { "" };
        let abs = self.amount_minor.unsigned_abs();
        let major = group_thousands(abs / 100);
        let minor = abs % 100;
        if minor == 0 {
            write!(f, "{sign}{}{major}", self.currency.symbol())
        } else {
            write!(f, "{sign}{}{major}.{minor:02}", self.currency.symbol())
        }
    }
}

fn split_iso_code(s: &str) -> Result<(&str, Option<Currency>), MoneyError> {
    let is_code = |t: &str| t.len() == 3 && t.chars().all(|c| c.is_ascii_alphabetic());

    if let Some((head, tail)) = s.rsplit_once(char::is_whitespace)
        && is_code(tail)
    {
        return Ok((head.trim_end(), Some(tail.parse()?)));
    }
    if let Some((head, tail)) = s.split_once(char::is_whitespace)
        && is_code(head)
    {
        return Ok((tail.trim_start(), Some(head.parse()?)));
    }
    Ok((s, None))
}

fn parse_minor_units(number: &str, original: &str) -> Result<i64, MoneyError> {
    let malformed = || MoneyError::Malformed(original.to_string());
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (number, None),
    };

    let digits = if whole.contains(',') {
        let mut groups = whole.split(',');
        let leading = groups.next().unwrap_or_default();
        if !all_digits(leading) || leading.len() > 3 {
            return Err(malformed());
        }
        for group in groups {
            if group.len() != 3 || !all_digits(group) {
                return Err(malformed());
            }
        }
        whole.replace(',', "")
    } else if all_digits(whole) {
        whole.to_string()
    } else {
        return Err(malformed());
    };

    let major: i64 = digits.parse().map_err(|_| MoneyError::Overflow)?;

    let minor = match fraction {
        None => 0,
        Some(f) if !all_digits(f) => return Err(malformed()),
        Some(f) if f.len() > 2 => return Err(MoneyError::TooPrecise(original.to_string())),
        Some(f) if f.len() == 1 => f.parse::<i64>().map_err(|_| malformed())? * 10,
        Some(f) => f.parse::<i64>().map_err(|_| malformed())?,
    };

    major.checked_mul(100).and_then(|m| m.checked_add(minor)).ok_or(MoneyError::Overflow)
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
