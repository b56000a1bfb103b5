//! Repositories, one per aggregate
//!
//! Each exposes a `XRepo<'a>` over the pool for single-statement reads and
//! writes, plus free functions taking `&mut PgConnection` for the steps of a
//! multi-statement transaction.

pub mod coupons;
pub mod customers;
pub mod kitchen;
pub mod menu;
pub mod orders;
pub mod settings;
pub mod subscriptions;
pub mod wallet;
pub mod webhooks;

pub use coupons::CouponRepo;
pub use customers::{Customer, CustomerRepo, NewCustomer};
pub use kitchen::KitchenRepo;
pub use menu::{MealPlan, MenuItem, MenuItemPatch, MenuRepo, NewMealPlan, NewMenuItem};
pub use orders::{
    DeliveryStop, DispatchTarget, NewOrder, Order, OrderDetail, OrderFilter, OrderItem, OrderRepo, SubOrder,
};
pub use settings::{Setting, SettingsRepo};
pub use subscriptions::{NewSubscription, Subscription, SubscriptionRepo};
pub use wallet::{WalletEntry, WalletRepo, WalletSummary};
