//! Customer wallet rules

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::money::Cents;
use crate::validation::ValidationError;

/// Why a wallet balance changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletEntryKind {
    TopUp,
    Refund,
    Purchase,
    Adjustment,
}

impl WalletEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopUp => "top_up",
            Self::Refund => "refund",
            Self::Purchase => "purchase",
            Self::Adjustment => "adjustment",
        }
    }
}

impl FromStr for WalletEntryKind {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top_up" => Ok(Self::TopUp),
            "refund" => Ok(Self::Refund),
            "purchase" => Ok(Self::Purchase),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(ValidationError::InvalidVariant {
                field: "wallet entry kind",
                value: other.to_owned(),
            }),
        }
    }
}

/// How much of `due` a wallet holding `balance` covers.
pub fn apply(balance: Cents, due: Cents) -> Cents {
    balance.max(Cents::ZERO).min(due.max(Cents::ZERO))
}

/// Validate a manual balance change and return the new balance.
///
/// Top-ups and refunds must be positive; purchases negative; adjustments
/// may go either way but never below zero.
pub fn check_entry(balance: Cents, kind: WalletEntryKind, delta: Cents) -> Result<Cents, ValidationError> {
    if delta.is_zero() {
        return Err(ValidationError::OutOfRange {
            field: "amount_cents",
            min: 1,
            max: i64::MAX,
        });
    }
    let sign_ok = match kind {
        WalletEntryKind::TopUp | WalletEntryKind::Refund => !delta.is_negative(),
        WalletEntryKind::Purchase => delta.is_negative(),
        WalletEntryKind::Adjustment => true,
    };
    if !sign_ok {
        return Err(ValidationError::InvalidFormat {
            field: "amount_cents",
            reason: "sign does not match entry kind",
        });
    }
    let next = balance + delta;
    if next.is_negative() {
        return Err(ValidationError::InvalidFormat {
            field: "amount_cents",
            reason: "wallet balance cannot go below zero",
        });
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_caps_both_ways() {
        assert_eq!(apply(Cents(500), Cents(1200)), Cents(500));
        assert_eq!(apply(Cents(5000), Cents(1200)), Cents(1200));
        assert_eq!(apply(Cents::ZERO, Cents(1200)), Cents::ZERO);
        assert_eq!(apply(Cents(500), Cents::ZERO), Cents::ZERO);
    }

    #[test]
    fn entries() {
        assert_eq!(check_entry(Cents(100), WalletEntryKind::TopUp, Cents(900)), Ok(Cents(1000)));
        assert!(check_entry(Cents(100), WalletEntryKind::TopUp, Cents(-50)).is_err());
        assert!(check_entry(Cents(100), WalletEntryKind::Purchase, Cents(50)).is_err());
        assert_eq!(check_entry(Cents(100), WalletEntryKind::Adjustment, Cents(-100)), Ok(Cents::ZERO));
        assert!(check_entry(Cents(100), WalletEntryKind::Adjustment, Cents(-101)).is_err());
        assert!(check_entry(Cents(100), WalletEntryKind::Adjustment, Cents::ZERO).is_err());
    }

    #[test]
    fn parse_kind() {
        assert_eq!("refund".parse::<WalletEntryKind>().unwrap(), WalletEntryKind::Refund);
        assert!("gift".parse::<WalletEntryKind>().is_err());
    }
}
