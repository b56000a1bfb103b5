//! mealdash-core: domain types and business rules
//!
//! Everything here is pure: no database, no HTTP. The server crate feeds
//! rows and request bodies in and persists whatever comes out.

pub mod config;
pub mod coupon;
pub mod error;
pub mod money;
pub mod pricing;
pub mod schedule;
pub mod servings;
pub mod status;
pub mod validation;
pub mod wallet;

pub use config::MealdashConfig;
pub use coupon::{Coupon, CouponContext, CouponQuote, CouponRejection, CouponScope, DiscountKind, OrderKind};
pub use error::{CoreError, Result};
pub use money::Cents;
pub use pricing::{Fulfillment, LineItem, PriceBreakdown, PricingRules};
pub use schedule::{DaySwitch, DeliveryDays, SwitchRejection};
pub use servings::{PrepLine, PrepRow, PrepSheet};
pub use status::{OrderStatus, ShipdayEvent, SubOrderStatus, SubscriptionStatus, Transition};
pub use validation::{CouponCode, Email, Slug, ValidationError};
pub use wallet::WalletEntryKind;
