//! Coupon validation
//!
//! A coupon is checked against the order being placed. Checks run in a fixed
//! order and the first failure is reported, so a customer sees "expired"
//! rather than "minimum not met" for a dead code.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Cents;
use crate::validation::{CouponCode, ValidationError};

/// How the discount value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// Whole percent of the subtotal (1..=100)
    Percent,
    /// Flat amount in cents
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::Fixed => "fixed",
        }
    }
}

impl FromStr for DiscountKind {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percent" => Ok(Self::Percent),
            "fixed" => Ok(Self::Fixed),
            other => Err(ValidationError::InvalidVariant {
                field: "discount_kind",
                value: other.to_owned(),
            }),
        }
    }
}

/// Which orders a coupon applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponScope {
    #[default]
    Any,
    OneTime,
    Subscription,
}

impl CouponScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::OneTime => "one_time",
            Self::Subscription => "subscription",
        }
    }

    pub fn allows(&self, kind: OrderKind) -> bool {
        match self {
            Self::Any => true,
            Self::OneTime => kind == OrderKind::OneTime,
            Self::Subscription => kind == OrderKind::Subscription,
        }
    }
}

impl FromStr for CouponScope {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Self::Any),
            "one_time" => Ok(Self::OneTime),
            "subscription" => Ok(Self::Subscription),
            other => Err(ValidationError::InvalidVariant {
                field: "scope",
                value: other.to_owned(),
            }),
        }
    }
}

/// One-time order vs. subscription delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    #[default]
    OneTime,
    Subscription,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneTime => f.write_str("one-time"),
            Self::Subscription => f.write_str("subscription"),
        }
    }
}

impl FromStr for OrderKind {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_time" => Ok(Self::OneTime),
            "subscription" => Ok(Self::Subscription),
            other => Err(ValidationError::InvalidVariant {
                field: "order kind",
                value: other.to_owned(),
            }),
        }
    }
}

/// A coupon as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: CouponCode,
    pub description: Option<String>,
    pub discount_kind: DiscountKind,
    /// Percent (1..=100) or cents, depending on `discount_kind`
    pub discount_value: i64,
    pub scope: CouponScope,
    pub min_subtotal: Option<Cents>,
    pub max_redemptions: Option<i32>,
    pub per_customer_limit: Option<i32>,
    pub redemptions: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// The order a coupon is being applied to
#[derive(Debug, Clone, Copy)]
pub struct CouponContext {
    pub now: DateTime<Utc>,
    pub subtotal: Cents,
    pub order_kind: OrderKind,
    /// Times this customer has already redeemed the coupon
    pub customer_redemptions: i64,
}

/// Accepted coupon with the discount it yields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponQuote {
    pub code: CouponCode,
    pub discount: Cents,
    pub subtotal_after: Cents,
}

/// Why a coupon was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("coupon is no longer active")]
    Inactive,

    #[error("coupon is not valid until {starts_at}")]
    NotStarted { starts_at: DateTime<Utc> },

    #[error("coupon has expired")]
    Expired,

    #[error("coupon has reached its usage limit")]
    UsageLimitReached,

    #[error("you have already used this coupon the maximum number of times")]
    CustomerLimitReached,

    #[error("coupon is not valid for {order_kind} orders")]
    NotApplicable { order_kind: OrderKind },

    #[error("order subtotal must be at least {minimum}")]
    MinimumNotMet { minimum: Cents },
}

impl CouponRejection {
    /// Stable machine-readable reason
    pub fn code(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::NotStarted { .. } => "not_started",
            Self::Expired => "expired",
            Self::UsageLimitReached => "usage_limit_reached",
            Self::CustomerLimitReached => "customer_limit_reached",
            Self::NotApplicable { .. } => "not_applicable",
            Self::MinimumNotMet { .. } => "minimum_not_met",
        }
    }
}

impl Coupon {
    /// Reject coupon definitions that could never be applied sensibly.
    pub fn check_definition(&self) -> Result<(), ValidationError> {
        match self.discount_kind {
            DiscountKind::Percent if !(1..=100).contains(&self.discount_value) => {
                return Err(ValidationError::OutOfRange {
                    field: "discount_value",
                    min: 1,
                    max: 100,
                });
            }
            DiscountKind::Fixed if self.discount_value <= 0 => {
                return Err(ValidationError::OutOfRange {
                    field: "discount_value",
                    min: 1,
                    max: i64::MAX,
                });
            }
            _ => {}
        }
        if matches!(self.max_redemptions, Some(n) if n < 1) {
            return Err(ValidationError::OutOfRange {
                field: "max_redemptions",
                min: 1,
                max: i32::MAX as i64,
            });
        }
        if matches!(self.per_customer_limit, Some(n) if n < 1) {
            return Err(ValidationError::OutOfRange {
                field: "per_customer_limit",
                min: 1,
                max: i32::MAX as i64,
            });
        }
        if matches!(self.min_subtotal, Some(m) if m.is_negative()) {
            return Err(ValidationError::OutOfRange {
                field: "min_subtotal_cents",
                min: 0,
                max: i64::MAX,
            });
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.expires_at) {
            if end <= start {
                return Err(ValidationError::InvalidFormat {
                    field: "expires_at",
                    reason: "must be after starts_at",
                });
            }
        }
        Ok(())
    }

    /// Discount this coupon gives on `subtotal`, capped at the subtotal.
    pub fn discount_for(&self, subtotal: Cents) -> Cents {
        let raw = match self.discount_kind {
            DiscountKind::Percent => subtotal.percent(self.discount_value),
            DiscountKind::Fixed => Cents(self.discount_value),
        };
        raw.min(subtotal).max(Cents::ZERO)
    }
}

/// Validate `coupon` for the order in `ctx`.
pub fn validate(coupon: &Coupon, ctx: &CouponContext) -> Result<CouponQuote, CouponRejection> {
    if !coupon.active {
        return Err(CouponRejection::Inactive);
    }
    if let Some(starts_at) = coupon.starts_at {
        if ctx.now < starts_at {
            return Err(CouponRejection::NotStarted { starts_at });
        }
    }
    if matches!(coupon.expires_at, Some(end) if ctx.now >= end) {
        return Err(CouponRejection::Expired);
    }
    if matches!(coupon.max_redemptions, Some(max) if coupon.redemptions >= max) {
        return Err(CouponRejection::UsageLimitReached);
    }
    if matches!(coupon.per_customer_limit, Some(limit) if ctx.customer_redemptions >= limit as i64) {
        return Err(CouponRejection::CustomerLimitReached);
    }
    if !coupon.scope.allows(ctx.order_kind) {
        return Err(CouponRejection::NotApplicable {
            order_kind: ctx.order_kind,
        });
    }
    if let Some(minimum) = coupon.min_subtotal {
        if ctx.subtotal < minimum {
            return Err(CouponRejection::MinimumNotMet { minimum });
        }
    }

    let discount = coupon.discount_for(ctx.subtotal);
    Ok(CouponQuote {
        code: coupon.code.clone(),
        discount,
        subtotal_after: ctx.subtotal - discount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn coupon() -> Coupon {
        Coupon {
            code: CouponCode::new("WELCOME10").unwrap(),
            description: None,
            discount_kind: DiscountKind::Percent,
            discount_value: 10,
            scope: CouponScope::Any,
            min_subtotal: None,
            max_redemptions: None,
            per_customer_limit: None,
            redemptions: 0,
            starts_at: None,
            expires_at: None,
            active: true,
        }
    }

    fn ctx(subtotal: i64) -> CouponContext {
        CouponContext {
            now: now(),
            subtotal: Cents(subtotal),
            order_kind: OrderKind::OneTime,
            customer_redemptions: 0,
        }
    }

    #[test]
    fn percent_discount() {
        let quote = validate(&coupon(), &ctx(4500)).unwrap();
        assert_eq!(quote.discount, Cents(450));
        assert_eq!(quote.subtotal_after, Cents(4050));
    }

    #[test]
    fn fixed_discount_capped_at_subtotal() {
        let mut c = coupon();
        c.discount_kind = DiscountKind::Fixed;
        c.discount_value = 2000;
        let quote = validate(&c, &ctx(1500)).unwrap();
        assert_eq!(quote.discount, Cents(1500));
        assert_eq!(quote.subtotal_after, Cents::ZERO);
    }

    #[test]
    fn inactive_rejected_first() {
        let mut c = coupon();
        c.active = false;
        c.expires_at = Some(now() - Duration::days(1));
        assert_eq!(validate(&c, &ctx(1000)), Err(CouponRejection::Inactive));
    }

    #[test]
    fn window() {
        let mut c = coupon();
        c.starts_at = Some(now() + Duration::hours(1));
        assert!(matches!(validate(&c, &ctx(1000)), Err(CouponRejection::NotStarted { .. })));

        let mut c = coupon();
        c.expires_at = Some(now());
        assert_eq!(validate(&c, &ctx(1000)), Err(CouponRejection::Expired));

        c.expires_at = Some(now() + Duration::seconds(1));
        assert!(validate(&c, &ctx(1000)).is_ok());
    }

    #[test]
    fn usage_limits() {
        let mut c = coupon();
        c.max_redemptions = Some(100);
        c.redemptions = 100;
        assert_eq!(validate(&c, &ctx(1000)), Err(CouponRejection::UsageLimitReached));

        let mut c = coupon();
        c.per_customer_limit = Some(1);
        let mut context = ctx(1000);
        context.customer_redemptions = 1;
        assert_eq!(validate(&c, &context), Err(CouponRejection::CustomerLimitReached));
    }

    #[test]
    fn scope_mismatch() {
        let mut c = coupon();
        c.scope = CouponScope::Subscription;
        let err = validate(&c, &ctx(1000)).unwrap_err();
        assert_eq!(err.to_string(), "coupon is not valid for one-time orders");
        assert_eq!(err.code(), "not_applicable");
    }

    #[test]
    fn minimum_subtotal() {
        let mut c = coupon();
        c.min_subtotal = Some(Cents::dollars(30));
        let err = validate(&c, &ctx(2999)).unwrap_err();
        assert_eq!(err.to_string(), "order subtotal must be at least $30.00");
        assert!(validate(&c, &ctx(3000)).is_ok());
    }

    #[test]
    fn definition_checks() {
        let mut c = coupon();
        c.discount_value = 0;
        assert!(c.check_definition().is_err());
        c.discount_value = 101;
        assert!(c.check_definition().is_err());
        c.discount_value = 100;
        assert!(c.check_definition().is_ok());

        let mut c = coupon();
        c.starts_at = Some(now());
        c.expires_at = Some(now());
        assert!(c.check_definition().is_err());

        let mut c = coupon();
        c.max_redemptions = Some(0);
        assert!(c.check_definition().is_err());
    }

    #[test]
    fn parses_enums() {
        assert_eq!("fixed".parse::<DiscountKind>().unwrap(), DiscountKind::Fixed);
        assert_eq!("one_time".parse::<CouponScope>().unwrap(), CouponScope::OneTime);
        assert!("weekly".parse::<OrderKind>().is_err());
    }

    proptest! {
        #[test]
        fn discount_never_exceeds_subtotal(
            subtotal in 0i64..1_000_000,
            percent in 1i64..=100,
            fixed in 1i64..1_000_000,
        ) {
            let mut c = coupon();
            c.discount_value = percent;
            let d = c.discount_for(Cents(subtotal));
            prop_assert!(d <= Cents(subtotal) && d >= Cents::ZERO);

            c.discount_kind = DiscountKind::Fixed;
            c.discount_value = fixed;
            let d = c.discount_for(Cents(subtotal));
            prop_assert!(d <= Cents(subtotal) && d >= Cents::ZERO);
        }
    }
}
