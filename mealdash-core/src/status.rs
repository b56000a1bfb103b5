//! Order and sub-order status machine
//!
//! Sub-orders only move forward. Delivery webhooks arrive late, twice, or
//! out of order; anything that would move a sub-order backwards is ignored
//! instead of treated as an error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Lifecycle of a single delivery (or pickup)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubOrderStatus {
    Pending,
    Paid,
    Preparing,
    Dispatched,
    Assigned,
    PickedUp,
    OnTheWay,
    Delivered,
    Failed,
    Cancelled,
}

impl SubOrderStatus {
    pub const ALL: [SubOrderStatus; 10] = [
        Self::Pending,
        Self::Paid,
        Self::Preparing,
        Self::Dispatched,
        Self::Assigned,
        Self::PickedUp,
        Self::OnTheWay,
        Self::Delivered,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Preparing => "preparing",
            Self::Dispatched => "dispatched",
            Self::Assigned => "assigned",
            Self::PickedUp => "picked_up",
            Self::OnTheWay => "on_the_way",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Position along the happy path
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Paid => 1,
            Self::Preparing => 2,
            Self::Dispatched => 3,
            Self::Assigned => 4,
            Self::PickedUp => 5,
            Self::OnTheWay => 6,
            Self::Delivered | Self::Failed | Self::Cancelled => 7,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    /// The kitchen or a driver has it; customers can no longer change it.
    pub fn is_locked(&self) -> bool {
        self.rank() >= Self::Preparing.rank()
    }

    /// Unpaid sub-orders can only be paid or cancelled.
    pub fn can_transition(&self, to: SubOrderStatus) -> bool {
        if self.is_terminal() || *self == to {
            return false;
        }
        if *self == Self::Pending {
            return matches!(to, Self::Paid | Self::Cancelled);
        }
        match to {
            Self::Cancelled => matches!(self, Self::Pending | Self::Paid),
            Self::Failed => self.is_locked(),
            _ => to.rank() > self.rank(),
        }
    }
}

impl fmt::Display for SubOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubOrderStatus {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidVariant {
                field: "status",
                value: s.to_owned(),
            })
    }
}

/// Status of a whole order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    PaymentFailed,
    InProgress,
    Completed,
    Cancelled,
    NeedsAttention,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        Self::PendingPayment,
        Self::Paid,
        Self::PaymentFailed,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
        Self::NeedsAttention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::PaymentFailed => "payment_failed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NeedsAttention => "needs_attention",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidVariant {
                field: "status",
                value: s.to_owned(),
            })
    }
}

/// State of a meal-plan subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn can_transition(&self, to: SubscriptionStatus) -> bool {
        matches!(
            (self, to),
            (Self::Active, Self::Paused)
                | (Self::Paused, Self::Active)
                | (Self::Active | Self::Paused, Self::Cancelled)
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ValidationError::InvalidVariant {
                field: "subscription status",
                value: other.to_owned(),
            }),
        }
    }
}

/// Recompute a parent order's status from its sub-orders.
///
/// `None` means the sub-orders give no reason to change it.
pub fn rollup(subs: &[SubOrderStatus]) -> Option<OrderStatus> {
    if subs.is_empty() {
        return None;
    }
    let all = |f: fn(&SubOrderStatus) -> bool| subs.iter().all(f);
    let any = |f: fn(&SubOrderStatus) -> bool| subs.iter().any(f);

    if all(|s| *s == SubOrderStatus::Cancelled) {
        return Some(OrderStatus::Cancelled);
    }
    if all(|s| matches!(s, SubOrderStatus::Delivered | SubOrderStatus::Cancelled)) {
        return Some(OrderStatus::Completed);
    }
    if any(|s| *s == SubOrderStatus::Failed) && all(SubOrderStatus::is_terminal) {
        return Some(OrderStatus::NeedsAttention);
    }
    if any(|s| s.rank() > SubOrderStatus::Paid.rank() && *s != SubOrderStatus::Cancelled) {
        return Some(OrderStatus::InProgress);
    }
    None
}

/// Delivery event reported by Shipday
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipdayEvent {
    Assigned,
    Started,
    PickedUp,
    OnTheWay,
    Completed,
    Failed,
    Other(String),
}

impl ShipdayEvent {
    /// Parse a Shipday event name. Shipday spells one event `ORDER_PIKEDUP`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "ORDER_ASSIGNED" => Self::Assigned,
            "ORDER_ACCEPTED_AND_STARTED" => Self::Started,
            "ORDER_PIKEDUP" | "ORDER_PICKEDUP" | "ORDER_PICKED_UP" => Self::PickedUp,
            "ORDER_ONTHEWAY" | "ORDER_ON_THE_WAY" => Self::OnTheWay,
            "ORDER_COMPLETED" => Self::Completed,
            "ORDER_FAILED" | "ORDER_INCOMPLETE" => Self::Failed,
            _ => Self::Other(name.to_owned()),
        }
    }

    /// Sub-order status this event moves to
    pub fn target(&self) -> Option<SubOrderStatus> {
        match self {
            Self::Assigned | Self::Started => Some(SubOrderStatus::Assigned),
            Self::PickedUp => Some(SubOrderStatus::PickedUp),
            Self::OnTheWay => Some(SubOrderStatus::OnTheWay),
            Self::Completed => Some(SubOrderStatus::Delivered),
            Self::Failed => Some(SubOrderStatus::Failed),
            Self::Other(_) => None,
        }
    }
}

/// Outcome of applying an event to a sub-order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(SubOrderStatus),
    Ignored(String),
}

pub fn apply_event(current: SubOrderStatus, event: &ShipdayEvent) -> Transition {
    let Some(target) = event.target() else {
        return Transition::Ignored(format!("unhandled event {:?}", event));
    };
    if current == target {
        return Transition::Ignored(format!("already {}", current));
    }
    if current.is_terminal() {
        return Transition::Ignored(format!("sub-order is {}", current));
    }
    if !current.can_transition(target) {
        return Transition::Ignored(format!("stale event: {} -> {}", current, target));
    }
    Transition::Applied(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubOrderStatus::*;

    #[test]
    fn round_trips_names() {
        for s in SubOrderStatus::ALL {
            assert_eq!(s.as_str().parse::<SubOrderStatus>().unwrap(), s);
        }
        assert_eq!("needs_attention".parse::<OrderStatus>().unwrap(), OrderStatus::NeedsAttention);
        assert!("shipped".parse::<SubOrderStatus>().is_err());
    }

    #[test]
    fn forward_only() {
        assert!(Paid.can_transition(Preparing));
        assert!(Paid.can_transition(Delivered));
        assert!(!OnTheWay.can_transition(Assigned));
        assert!(!Delivered.can_transition(Failed));
        assert!(!Assigned.can_transition(Assigned));
    }

    #[test]
    fn unpaid_only_pays_or_cancels() {
        assert!(Pending.can_transition(Paid));
        assert!(Pending.can_transition(Cancelled));
        for to in [Preparing, Dispatched, Assigned, PickedUp, OnTheWay, Delivered, Failed] {
            assert!(!Pending.can_transition(to), "pending -> {}", to);
        }
    }

    #[test]
    fn cancel_and_fail_windows() {
        assert!(Pending.can_transition(Cancelled));
        assert!(Paid.can_transition(Cancelled));
        assert!(!Preparing.can_transition(Cancelled));
        assert!(!Paid.can_transition(Failed));
        assert!(OnTheWay.can_transition(Failed));
    }

    #[test]
    fn parses_shipday_events() {
        assert_eq!(ShipdayEvent::parse("ORDER_PIKEDUP"), ShipdayEvent::PickedUp);
        assert_eq!(ShipdayEvent::parse("order_completed"), ShipdayEvent::Completed);
        assert_eq!(ShipdayEvent::parse("ORDER_INCOMPLETE"), ShipdayEvent::Failed);
        assert_eq!(
            ShipdayEvent::parse("ORDER_POD_UPLOAD"),
            ShipdayEvent::Other("ORDER_POD_UPLOAD".into())
        );
    }

    #[test]
    fn applies_events() {
        assert_eq!(apply_event(Dispatched, &ShipdayEvent::Assigned), Transition::Applied(Assigned));
        assert_eq!(apply_event(Assigned, &ShipdayEvent::Completed), Transition::Applied(Delivered));
        assert!(matches!(apply_event(Delivered, &ShipdayEvent::OnTheWay), Transition::Ignored(_)));
        assert!(matches!(apply_event(Pending, &ShipdayEvent::Completed), Transition::Ignored(_)));
        assert!(matches!(apply_event(Pending, &ShipdayEvent::Assigned), Transition::Ignored(_)));
        assert!(matches!(apply_event(OnTheWay, &ShipdayEvent::Assigned), Transition::Ignored(_)));
        assert!(matches!(apply_event(OnTheWay, &ShipdayEvent::OnTheWay), Transition::Ignored(_)));
        assert!(matches!(
            apply_event(Assigned, &ShipdayEvent::Other("X".into())),
            Transition::Ignored(_)
        ));
    }

    #[test]
    fn subscription_transitions() {
        use SubscriptionStatus as S;
        assert!(S::Active.can_transition(S::Paused));
        assert!(S::Paused.can_transition(S::Active));
        assert!(S::Paused.can_transition(S::Cancelled));
        assert!(!S::Cancelled.can_transition(S::Active));
        assert!(!S::Active.can_transition(S::Active));
        assert_eq!("paused".parse::<S>().unwrap(), S::Paused);
    }

    #[test]
    fn rollup_rules() {
        assert_eq!(rollup(&[]), None);
        assert_eq!(rollup(&[Paid, Paid]), None);
        assert_eq!(rollup(&[Paid, Preparing]), Some(OrderStatus::InProgress));
        assert_eq!(rollup(&[Delivered, OnTheWay]), Some(OrderStatus::InProgress));
        assert_eq!(rollup(&[Delivered, Delivered]), Some(OrderStatus::Completed));
        assert_eq!(rollup(&[Delivered, Cancelled]), Some(OrderStatus::Completed));
        assert_eq!(rollup(&[Cancelled, Cancelled]), Some(OrderStatus::Cancelled));
        assert_eq!(rollup(&[Delivered, Failed]), Some(OrderStatus::NeedsAttention));
        assert_eq!(rollup(&[Failed, Assigned]), Some(OrderStatus::InProgress));
    }
}
