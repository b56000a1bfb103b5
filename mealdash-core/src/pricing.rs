//! Checkout arithmetic
//!
//! subtotal - coupon discount + delivery fees - wallet credit = total.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Cents;
use crate::validation::{in_range, ValidationError};
use crate::wallet;

/// Most units of one item a single line may carry
pub const MAX_LINE_QUANTITY: i64 = 50;

/// Pickup at the kitchen or delivery by driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fulfillment {
    Pickup,
    #[default]
    Delivery,
}

impl Fulfillment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Delivery => "delivery",
        }
    }
}

impl FromStr for Fulfillment {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pickup" => Ok(Self::Pickup),
            "delivery" => Ok(Self::Delivery),
            other => Err(ValidationError::InvalidVariant {
                field: "fulfillment",
                value: other.to_owned(),
            }),
        }
    }
}

/// One priced line of a cart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub menu_item_id: Uuid,
    pub unit_price: Cents,
    pub quantity: i32,
    pub delivery_date: NaiveDate,
}

impl LineItem {
    pub fn line_total(&self) -> Cents {
        self.unit_price * self.quantity as i64
    }
}

/// Fee rules in effect for a checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRules {
    /// Charged once per delivery date
    pub delivery_fee: Cents,
    /// Discounted subtotal at or above which delivery is free
    pub free_delivery_threshold: Option<Cents>,
}

/// Fully priced cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub subtotal: Cents,
    pub discount: Cents,
    pub delivery_fee: Cents,
    pub wallet_applied: Cents,
    pub total: Cents,
    /// Distinct delivery/pickup dates in the cart
    pub deliveries: u32,
}

/// Check every line and return the cart subtotal.
pub fn subtotal(lines: &[LineItem]) -> Result<Cents, ValidationError> {
    if lines.is_empty() {
        return Err(ValidationError::Empty { field: "items" });
    }
    for line in lines {
        in_range("quantity", line.quantity as i64, 1, MAX_LINE_QUANTITY)?;
        if line.unit_price.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "unit_price",
                min: 0,
                max: i64::MAX,
            });
        }
    }
    Ok(lines.iter().map(LineItem::line_total).sum())
}

/// Delivery dates in the cart, ascending
pub fn delivery_dates(lines: &[LineItem]) -> Vec<NaiveDate> {
    lines
        .iter()
        .map(|l| l.delivery_date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Price a cart.
///
/// `discount` comes from an already-validated coupon quote and is capped at
/// the subtotal again here. The wallet only covers what is left after the
/// discount and fees.
pub fn price(
    lines: &[LineItem],
    fulfillment: Fulfillment,
    rules: &PricingRules,
    discount: Cents,
    wallet_balance: Cents,
    use_wallet: bool,
) -> Result<PriceBreakdown, ValidationError> {
    let subtotal = subtotal(lines)?;
    let discount = discount.min(subtotal).max(Cents::ZERO);
    let deliveries = delivery_dates(lines).len() as u32;

    let after_discount = subtotal - discount;
    let free = matches!(rules.free_delivery_threshold, Some(t) if after_discount >= t);
    let delivery_fee = match fulfillment {
        Fulfillment::Delivery if !free => rules.delivery_fee * deliveries as i64,
        _ => Cents::ZERO,
    };

    let due = after_discount + delivery_fee;
    let wallet_applied = if use_wallet {
        wallet::apply(wallet_balance, due)
    } else {
        Cents::ZERO
    };

    Ok(PriceBreakdown {
        subtotal,
        discount,
        delivery_fee,
        wallet_applied,
        total: due - wallet_applied,
        deliveries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn line(price: i64, qty: i32, day: u32) -> LineItem {
        LineItem {
            menu_item_id: Uuid::nil(),
            unit_price: Cents(price),
            quantity: qty,
            delivery_date: date(day),
        }
    }

    fn rules() -> PricingRules {
        PricingRules {
            delivery_fee: Cents(499),
            free_delivery_threshold: Some(Cents::dollars(60)),
        }
    }

    #[test]
    fn delivery_fee_per_date() {
        let lines = [line(1200, 2, 9), line(1100, 1, 9), line(1200, 1, 11)];
        let p = price(&lines, Fulfillment::Delivery, &rules(), Cents::ZERO, Cents::ZERO, false).unwrap();
        assert_eq!(p.subtotal, Cents(4700));
        assert_eq!(p.deliveries, 2);
        assert_eq!(p.delivery_fee, Cents(998));
        assert_eq!(p.total, Cents(5698));
    }

    #[test]
    fn pickup_is_free() {
        let lines = [line(1200, 1, 9)];
        let p = price(&lines, Fulfillment::Pickup, &rules(), Cents::ZERO, Cents::ZERO, false).unwrap();
        assert_eq!(p.delivery_fee, Cents::ZERO);
        assert_eq!(p.total, Cents(1200));
    }

    #[test]
    fn free_delivery_threshold_uses_discounted_subtotal() {
        let lines = [line(1500, 4, 9)];
        let p = price(&lines, Fulfillment::Delivery, &rules(), Cents::ZERO, Cents::ZERO, false).unwrap();
        assert_eq!(p.delivery_fee, Cents::ZERO);

        let p = price(&lines, Fulfillment::Delivery, &rules(), Cents(100), Cents::ZERO, false).unwrap();
        assert_eq!(p.delivery_fee, Cents(499));
        assert_eq!(p.total, Cents(6000 - 100 + 499));
    }

    #[test]
    fn no_threshold_means_always_charged() {
        let r = PricingRules {
            delivery_fee: Cents(300),
            free_delivery_threshold: None,
        };
        let p = price(&[line(100_000, 1, 9)], Fulfillment::Delivery, &r, Cents::ZERO, Cents::ZERO, false).unwrap();
        assert_eq!(p.delivery_fee, Cents(300));
    }

    #[test]
    fn wallet_covers_remaining() {
        let lines = [line(1000, 1, 9)];
        let p = price(&lines, Fulfillment::Delivery, &rules(), Cents(200), Cents(5000), true).unwrap();
        assert_eq!(p.wallet_applied, Cents(1000 - 200 + 499));
        assert_eq!(p.total, Cents::ZERO);

        let p = price(&lines, Fulfillment::Pickup, &rules(), Cents::ZERO, Cents(300), true).unwrap();
        assert_eq!(p.wallet_applied, Cents(300));
        assert_eq!(p.total, Cents(700));

        let p = price(&lines, Fulfillment::Pickup, &rules(), Cents::ZERO, Cents(300), false).unwrap();
        assert_eq!(p.wallet_applied, Cents::ZERO);
    }

    #[test]
    fn discount_capped() {
        let p = price(&[line(500, 1, 9)], Fulfillment::Pickup, &rules(), Cents(900), Cents::ZERO, false).unwrap();
        assert_eq!(p.discount, Cents(500));
        assert_eq!(p.total, Cents::ZERO);
    }

    #[test]
    fn rejects_bad_carts() {
        assert!(matches!(subtotal(&[]), Err(ValidationError::Empty { .. })));
        assert!(matches!(
            subtotal(&[line(100, 0, 9)]),
            Err(ValidationError::OutOfRange { field: "quantity", .. })
        ));
        assert!(subtotal(&[line(100, 51, 9)]).is_err());
        assert!(subtotal(&[line(-1, 1, 9)]).is_err());
    }

    #[test]
    fn fulfillment_parse() {
        assert_eq!("pickup".parse::<Fulfillment>().unwrap(), Fulfillment::Pickup);
        assert!("drone".parse::<Fulfillment>().is_err());
    }
}
