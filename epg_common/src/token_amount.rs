use std::{cmp::Ordering, fmt::Display};

use ethers::types::U256;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::currency::Currency;

/// The largest number of decimal places a [`Decimal`] can carry. Currencies with more decimals than this cannot be
/// converted to or from base units.
pub const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Cannot combine amounts in different currencies: {left} and {right}")]
    CurrencyMismatch { left: String, right: String },
    #[error("Cannot convert amount in {currency}: {reason}")]
    Conversion { currency: String, reason: String },
    #[error("Arithmetic overflow")]
    Overflow,
}

impl AmountError {
    fn mismatch(left: &Currency, right: &Currency) -> Self {
        Self::CurrencyMismatch { left: left.to_string(), right: right.to_string() }
    }

    fn conversion<S: Into<String>>(currency: &Currency, reason: S) -> Self {
        Self::Conversion { currency: currency.to_string(), reason: reason.into() }
    }
}

//--------------------------------------     TokenAmount       -------------------------------------------------------
/// An amount of a specific currency.
///
/// Arithmetic and ordering between two `TokenAmount`s are only defined when both sides carry the same [`Currency`];
/// every such operation returns [`AmountError::CurrencyMismatch`] otherwise. Equality (`==`) is simply "same currency
/// and numerically equal amount", so comparing amounts of different currencies with `==` yields `false` rather than
/// an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub amount: Decimal,
    pub currency: Currency,
}

impl TokenAmount {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_native(&self) -> bool {
        self.currency.is_native()
    }

    pub fn negated(&self) -> Self {
        Self::new(-self.amount, self.currency.clone())
    }

    fn same_currency(&self, other: &Self) -> Result<(), AmountError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(AmountError::mismatch(&self.currency, &other.currency))
        }
    }

    pub fn checked_add(&self, other: &Self) -> Result<Self, AmountError> {
        self.same_currency(other)?;
        let amount = self.amount.checked_add(other.amount).ok_or(AmountError::Overflow)?;
        Ok(Self::new(amount, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Self) -> Result<Self, AmountError> {
        self.same_currency(other)?;
        let amount = self.amount.checked_sub(other.amount).ok_or(AmountError::Overflow)?;
        Ok(Self::new(amount, self.currency.clone()))
    }

    /// Scales the amount, keeping the currency.
    pub fn multiply_by(&self, factor: Decimal) -> Result<Self, AmountError> {
        let amount = self.amount.checked_mul(factor).ok_or(AmountError::Overflow)?;
        Ok(Self::new(amount, self.currency.clone()))
    }

    pub fn try_cmp(&self, other: &Self) -> Result<Ordering, AmountError> {
        self.same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    pub fn try_lt(&self, other: &Self) -> Result<bool, AmountError> {
        self.try_cmp(other).map(Ordering::is_lt)
    }

    pub fn try_le(&self, other: &Self) -> Result<bool, AmountError> {
        self.try_cmp(other).map(Ordering::is_le)
    }

    pub fn try_gt(&self, other: &Self) -> Result<bool, AmountError> {
        self.try_cmp(other).map(Ordering::is_gt)
    }

    pub fn try_ge(&self, other: &Self) -> Result<bool, AmountError> {
        self.try_cmp(other).map(Ordering::is_ge)
    }

    /// Converts the amount into the integer number of base units (e.g. wei), truncating any digits beyond the
    /// currency's precision toward zero.
    pub fn to_base_units(&self) -> Result<U256, AmountError> {
        let decimals = self.currency.decimals;
        if decimals > MAX_DECIMALS {
            return Err(AmountError::conversion(&self.currency, format!("{decimals} decimals is not supported")));
        }
        if self.amount < Decimal::ZERO {
            return Err(AmountError::conversion(&self.currency, format!("{} is negative", self.amount)));
        }
        let mut scaled = self.amount.round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
        scaled.rescale(decimals);
        if scaled.scale() != decimals {
            return Err(AmountError::conversion(
                &self.currency,
                format!("{} has too many digits to express in base units", self.amount),
            ));
        }
        let mantissa = u128::try_from(scaled.mantissa())
            .map_err(|e| AmountError::conversion(&self.currency, e.to_string()))?;
        Ok(U256::from(mantissa))
    }

    /// The inverse of [`TokenAmount::to_base_units`].
    pub fn from_base_units(currency: Currency, value: U256) -> Result<Self, AmountError> {
        let decimals = currency.decimals;
        if decimals > MAX_DECIMALS {
            return Err(AmountError::conversion(&currency, format!("{decimals} decimals is not supported")));
        }
        if value > U256::from(u128::MAX) {
            return Err(AmountError::conversion(&currency, format!("{value} base units is out of range")));
        }
        let mantissa = i128::try_from(value.as_u128())
            .map_err(|_| AmountError::conversion(&currency, format!("{value} base units is out of range")))?;
        let amount = Decimal::try_from_i128_with_scale(mantissa, decimals)
            .map_err(|e| AmountError::conversion(&currency, format!("{value} base units: {e}")))?;
        Ok(Self::new(amount.normalize(), currency))
    }

    /// Sums the entries denominated in `currency`, ignoring everything else. An empty selection sums to zero.
    pub fn aggregate<'a, I>(entries: I, currency: &Currency) -> Self
    where I: IntoIterator<Item = &'a TokenAmount> {
        let amount = entries
            .into_iter()
            .filter(|e| &e.currency == currency)
            .fold(Decimal::ZERO, |acc, e| acc.saturating_add(e.amount));
        Self::new(amount, currency.clone())
    }

    /// The base-unit value as a `0x`-prefixed hex string.
    pub fn as_hex(&self) -> Result<String, AmountError> {
        self.to_base_units().map(|v| format!("{v:#x}"))
    }

    pub fn formatted(&self) -> String {
        format!("{} {}", self.amount.normalize(), self.currency.code)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.formatted())
    }
}
