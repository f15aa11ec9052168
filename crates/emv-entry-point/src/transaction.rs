//! Transaction data: amounts, currency, type and timestamp

use crate::error::EntryPointError;
use chrono::{DateTime, Datelike, Timelike, Utc};
use emv_common::encode_bcd;
use std::fmt;

/// Largest amount representable in an n12 data element
pub const MAX_AMOUNT: i64 = 999_999_999_999;

/// Transaction type (tag 9C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Purchase,
    Cash,
    Cashback,
    Refund,
}

impl TransactionType {
    /// Value of tag 9C
    pub fn code(&self) -> u8 {
        match self {
            TransactionType::Purchase => 0x00,
            TransactionType::Cash => 0x01,
            TransactionType::Cashback => 0x09,
            TransactionType::Refund => 0x20,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Cash => "CASH",
            TransactionType::Cashback => "CASHBACK",
            TransactionType::Refund => "REFUND",
        };
        f.write_str(name)
    }
}

/// ISO 4217 currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Currency {
    numeric_code: u16,
    exponent: u8,
}

impl Currency {
    pub const EUR: Currency = Currency::new(978, 2);
    pub const USD: Currency = Currency::new(840, 2);
    pub const GBP: Currency = Currency::new(826, 2);
    pub const BGN: Currency = Currency::new(975, 2);
    pub const JPY: Currency = Currency::new(392, 0);

    pub const fn new(numeric_code: u16, exponent: u8) -> Self {
        Self {
            numeric_code,
            exponent,
        }
    }

    pub fn numeric_code(&self) -> u16 {
        self.numeric_code
    }

    pub fn exponent(&self) -> u8 {
        self.exponent
    }

    /// One major unit expressed in minor units (100 for EUR, 1 for JPY)
    ///
    /// Saturates for exponents past 18, which no amount can reach.
    pub fn single_unit(&self) -> i64 {
        10i64.checked_pow(self.exponent as u32).unwrap_or(i64::MAX)
    }
}

/// ISO 3166 numeric country code (tag 9F1A)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountryCode(pub u16);

/// Terminal type (tag 9F35), e.g. `0x22` for an attended online-capable terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminalType(pub u8);

/// The transaction being attempted
///
/// For cashback the authorized amount already includes the other amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionData {
    amount_authorized: i64,
    amount_other: i64,
    currency: Currency,
    transaction_type: TransactionType,
}

impl TransactionData {
    pub fn new(
        amount_authorized: i64,
        amount_other: i64,
        currency: Currency,
        transaction_type: TransactionType,
    ) -> Result<Self, EntryPointError> {
        check_amounts(amount_authorized, amount_other, transaction_type)?;

        let amount_authorized = if transaction_type == TransactionType::Cashback {
            amount_authorized.checked_add(amount_other).ok_or_else(|| {
                EntryPointError::InvalidArgument(format!("amount exceeds {}", MAX_AMOUNT))
            })?
        } else {
            amount_authorized
        };

        if amount_authorized > MAX_AMOUNT || amount_other > MAX_AMOUNT {
            return Err(EntryPointError::InvalidArgument(format!(
                "amount exceeds {}",
                MAX_AMOUNT
            )));
        }

        Ok(Self {
            amount_authorized,
            amount_other,
            currency,
            transaction_type,
        })
    }

    pub fn amount_authorized(&self) -> i64 {
        self.amount_authorized
    }

    pub fn amount_other(&self) -> i64 {
        self.amount_other
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }
}

/// Amount preconditions shared by transaction creation and pre-processing
pub(crate) fn check_amounts(
    amount_authorized: i64,
    amount_other: i64,
    transaction_type: TransactionType,
) -> Result<(), EntryPointError> {
    if amount_authorized < 0 {
        return Err(EntryPointError::InvalidArgument("amountAuthorized < 0".into()));
    }
    if amount_other < 0 {
        return Err(EntryPointError::InvalidArgument("amountOther < 0".into()));
    }
    if transaction_type != TransactionType::Cashback && amount_other > 0 {
        return Err(EntryPointError::InvalidArgument(format!(
            "amountOther > 0 when transaction is: {}",
            transaction_type
        )));
    }
    Ok(())
}

/// Wall-clock time at kernel activation, in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionTimestamp(DateTime<Utc>);

impl TransactionTimestamp {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Transaction date (tag 9A), YYMMDD as BCD
    pub fn date_bcd(&self) -> Vec<u8> {
        let d = self.0;
        let value = (d.year().rem_euclid(100) as u64) * 10_000 + d.month() as u64 * 100 + d.day() as u64;
        encode_bcd(value, 3).unwrap_or_default()
    }

    /// Transaction time (tag 9F21), HHMMSS as BCD
    pub fn time_bcd(&self) -> Vec<u8> {
        let t = self.0;
        let value = t.hour() as u64 * 10_000 + t.minute() as u64 * 100 + t.second() as u64;
        encode_bcd(value, 3).unwrap_or_default()
    }
}
