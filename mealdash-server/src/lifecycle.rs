//! Order state changes after checkout
//!
//! Payment outcomes, cancellation, and sub-order progress all end the same
//! way: sub-order rows change, then the parent order is recomputed from them.
//! Every function here runs inside the caller's transaction.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use mealdash_core::schedule::cutoff_for;
use mealdash_core::status::rollup;
use mealdash_core::{Cents, OrderStatus, SubOrderStatus, WalletEntryKind};
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::repos::{coupons, orders, wallet};
use crate::db::{DbError, Order, SubOrder};
use crate::http::ApiError;

/// What a payment webhook did to its order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Applied,
    /// Already in the target state
    Unchanged,
    /// Payment arrived for an order that was already closed
    NeedsAttention,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::NeedsAttention => "needs_attention",
        }
    }
}

/// Payment captured: order and its pending sub-orders become `paid`.
pub async fn mark_paid(conn: &mut PgConnection, order: &Order) -> Result<PaymentOutcome, DbError> {
    match order.status {
        OrderStatus::PendingPayment => {}
        OrderStatus::PaymentFailed | OrderStatus::Cancelled => {
            tracing::warn!(order_id = %order.id, status = %order.status, "payment succeeded for a closed order");
            orders::set_status(conn, order.id, OrderStatus::NeedsAttention).await?;
            return Ok(PaymentOutcome::NeedsAttention);
        }
        _ => return Ok(PaymentOutcome::Unchanged),
    }

    let pending: Vec<Uuid> = orders::sub_orders_for_update(conn, order.id)
        .await?
        .into_iter()
        .filter(|s| s.status == SubOrderStatus::Pending)
        .map(|s| s.id)
        .collect();
    orders::set_sub_statuses(conn, &pending, SubOrderStatus::Paid).await?;
    orders::set_status(conn, order.id, OrderStatus::Paid).await?;
    tracing::info!(order_id = %order.id, sub_orders = pending.len(), "order paid");
    Ok(PaymentOutcome::Applied)
}

/// Payment declined: the order closes and its wallet debit and coupon
/// redemption are given back.
pub async fn mark_payment_failed(
    conn: &mut PgConnection,
    order: &Order,
    reason: Option<&str>,
) -> Result<PaymentOutcome, DbError> {
    if order.status != OrderStatus::PendingPayment {
        return Ok(PaymentOutcome::Unchanged);
    }

    let subs: Vec<Uuid> = orders::sub_orders_for_update(conn, order.id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    orders::set_sub_statuses(conn, &subs, SubOrderStatus::Cancelled).await?;
    orders::set_status(conn, order.id, OrderStatus::PaymentFailed).await?;
    let refunded = release_holds(conn, order, Cents::ZERO, "payment failed").await?;
    tracing::info!(
        order_id = %order.id,
        reason = reason.unwrap_or("unknown"),
        wallet_refund = %refunded,
        "order payment failed"
    );
    Ok(PaymentOutcome::Applied)
}

/// Give back the coupon redemption and the wallet money held by `order`,
/// plus `extra` (card money refunded as store credit).
async fn release_holds(conn: &mut PgConnection, order: &Order, extra: Cents, note: &str) -> Result<Cents, DbError> {
    coupons::release(conn, order.id).await?;
    let refund = wallet::held_for_order(conn, order.id).await? + extra;
    if refund > Cents::ZERO {
        wallet::record(
            conn,
            order.customer_id,
            WalletEntryKind::Refund,
            refund,
            Some(order.id),
            Some(note),
        )
        .await?;
    }
    Ok(refund)
}

/// Result of a customer cancellation
#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub order_id: Uuid,
    pub status: OrderStatus,
    /// Credited to the customer's wallet
    pub refunded: Cents,
}

/// Cancel an order before the kitchen starts on it.
///
/// Every live delivery must still be `pending` or `paid` and before its
/// cutoff. Money already captured goes back as wallet credit.
pub async fn cancel_order(
    conn: &mut PgConnection,
    order: &Order,
    cutoff_hours: u32,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<Cancellation, ApiError> {
    let not_cancellable = |message: String| ApiError::Rejected {
        code: "not_cancellable",
        message,
    };
    if !matches!(order.status, OrderStatus::PendingPayment | OrderStatus::Paid) {
        return Err(not_cancellable(format!("order is {}", order.status)));
    }

    let subs = orders::sub_orders_for_update(conn, order.id).await?;
    for sub in subs.iter().filter(|s| s.status != SubOrderStatus::Cancelled) {
        if !sub.status.can_transition(SubOrderStatus::Cancelled) {
            return Err(not_cancellable(format!(
                "the delivery on {} is already {}",
                sub.delivery_date, sub.status
            )));
        }
        let cutoff = cutoff_for(sub.delivery_date, cutoff_hours, tz);
        if now >= cutoff {
            return Err(not_cancellable(format!(
                "changes to the delivery on {} closed at {}",
                sub.delivery_date, cutoff
            )));
        }
    }

    let ids: Vec<Uuid> = subs.iter().map(|s| s.id).collect();
    orders::set_sub_statuses(conn, &ids, SubOrderStatus::Cancelled).await?;
    orders::set_status(conn, order.id, OrderStatus::Cancelled).await?;

    let captured = if order.status == OrderStatus::Paid {
        order.total
    } else {
        Cents::ZERO
    };
    let refunded = release_holds(conn, order, captured, "order cancelled").await?;
    tracing::info!(order_id = %order.id, refunded = %refunded, "order cancelled");

    Ok(Cancellation {
        order_id: order.id,
        status: OrderStatus::Cancelled,
        refunded,
    })
}

/// Lock a sub-order and its parent order, parent first.
///
/// Every writer takes the order row before its sub-orders so concurrent
/// webhooks, cancellations and staff updates queue instead of deadlocking.
pub async fn lock_sub_order(conn: &mut PgConnection, sub_order_id: Uuid) -> Result<(Order, SubOrder), DbError> {
    let order_id = orders::order_id_of(conn, sub_order_id).await?;
    let order = orders::fetch_for_update(conn, order_id).await?;
    let sub = orders::sub_order_for_update(conn, sub_order_id).await?;
    Ok((order, sub))
}

/// Lock a subscription's live deliveries between `start` and `end`, parent
/// orders first.
///
/// Deliveries of orders still awaiting payment are included; a later payment
/// webhook waits on the order lock and then pays the rescheduled rows.
pub async fn lock_subscription_deliveries(
    conn: &mut PgConnection,
    subscription_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<SubOrder>, DbError> {
    let order_ids = orders::lock_subscription_orders(conn, subscription_id, start, end).await?;
    if order_ids.is_empty() {
        return Ok(Vec::new());
    }
    orders::deliveries_for_update(conn, &order_ids, start, end).await
}

/// Move a locked sub-order to `to` and recompute its parent order.
///
/// Returns the parent's status after the rollup.
pub async fn set_sub_order_status(
    conn: &mut PgConnection,
    order: &Order,
    sub_order_id: Uuid,
    to: SubOrderStatus,
) -> Result<OrderStatus, DbError> {
    orders::set_sub_status(conn, sub_order_id, to).await?;
    refresh_order(conn, order).await
}

/// Recompute a fulfilled order's status from its sub-orders.
pub async fn refresh_order(conn: &mut PgConnection, order: &Order) -> Result<OrderStatus, DbError> {
    // Payment states are owned by the payment webhook
    if matches!(
        order.status,
        OrderStatus::PendingPayment | OrderStatus::PaymentFailed | OrderStatus::Cancelled
    ) {
        return Ok(order.status);
    }
    let statuses: Vec<SubOrderStatus> = orders::sub_orders_for_update(conn, order.id)
        .await?
        .into_iter()
        .map(|s| s.status)
        .collect();
    match rollup(&statuses) {
        Some(next) if next != order.status => {
            orders::set_status(conn, order.id, next).await?;
            tracing::info!(order_id = %order.id, from = %order.status, to = %next, "order status rolled up");
            Ok(next)
        }
        _ => Ok(order.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::{CustomerRepo, NewCustomer};
    use chrono::{Duration, NaiveDate};
    use mealdash_core::{Email, Fulfillment, OrderKind, PriceBreakdown};

    async fn pool() -> sqlx::PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.unwrap();
        crate::db::migrations::run(&pool).await.unwrap();
        pool
    }

    async fn seed_order(conn: &mut PgConnection, customer_id: Uuid, date: NaiveDate) -> Order {
        let order = orders::insert_order(
            conn,
            &orders::NewOrder {
                customer_id,
                subscription_id: None,
                kind: OrderKind::OneTime,
                fulfillment: Fulfillment::Pickup,
                price: PriceBreakdown {
                    subtotal: Cents(2_000),
                    discount: Cents::ZERO,
                    delivery_fee: Cents::ZERO,
                    wallet_applied: Cents(500),
                    total: Cents(1_500),
                    deliveries: 1,
                },
                coupon_code: None,
            },
        )
        .await
        .unwrap();
        orders::insert_sub_order(conn, order.id, date, None).await.unwrap();
        order
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn payment_failure_refunds_wallet_hold() {
        let pool = pool().await;
        let customer = CustomerRepo::new(&pool)
            .upsert(&NewCustomer {
                email: Email::new(&format!("{}@example.com", Uuid::new_v4())).unwrap(),
                name: "Lifecycle".into(),
                phone: None,
                address: None,
            })
            .await
            .unwrap();

        let mut tx = pool.begin().await.unwrap();
        wallet::record(&mut tx, customer.id, WalletEntryKind::TopUp, Cents(500), None, None)
            .await
            .unwrap();
        let date = (Utc::now() + Duration::days(10)).date_naive();
        let order = seed_order(&mut tx, customer.id, date).await;
        wallet::record(&mut tx, customer.id, WalletEntryKind::Purchase, Cents(-500), Some(order.id), None)
            .await
            .unwrap();

        let outcome = mark_payment_failed(&mut tx, &order, Some("card declined")).await.unwrap();
        assert_eq!(outcome, PaymentOutcome::Applied);
        assert_eq!(wallet::held_for_order(&mut tx, order.id).await.unwrap(), Cents::ZERO);

        let again = orders::fetch(&mut tx, order.id).await.unwrap();
        assert_eq!(again.status, OrderStatus::PaymentFailed);
        assert_eq!(
            mark_payment_failed(&mut tx, &again, None).await.unwrap(),
            PaymentOutcome::Unchanged
        );
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn late_payment_on_cancelled_order_needs_attention() {
        let pool = pool().await;
        let customer = CustomerRepo::new(&pool)
            .upsert(&NewCustomer {
                email: Email::new(&format!("{}@example.com", Uuid::new_v4())).unwrap(),
                name: "Late".into(),
                phone: None,
                address: None,
            })
            .await
            .unwrap();

        let mut tx = pool.begin().await.unwrap();
        let date = (Utc::now() + Duration::days(10)).date_naive();
        let order = seed_order(&mut tx, customer.id, date).await;
        orders::set_status(&mut tx, order.id, OrderStatus::Cancelled).await.unwrap();
        let order = orders::fetch(&mut tx, order.id).await.unwrap();

        assert_eq!(mark_paid(&mut tx, &order).await.unwrap(), PaymentOutcome::NeedsAttention);
        tx.rollback().await.unwrap();
    }

    async fn customer(pool: &sqlx::PgPool, name: &str) -> crate::db::Customer {
        CustomerRepo::new(pool)
            .upsert(&NewCustomer {
                email: Email::new(&format!("{}@example.com", Uuid::new_v4())).unwrap(),
                name: name.into(),
                phone: None,
                address: Some("1 Main St".into()),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn cancel_refuses_after_cutoff() {
        let pool = pool().await;
        let customer = customer(&pool, "Late Cancel").await;
        let tz = chrono_tz::America::New_York;

        let mut tx = pool.begin().await.unwrap();
        let today = Utc::now().with_timezone(&tz).date_naive();
        let order = seed_order(&mut tx, customer.id, today + Duration::days(1)).await;

        let err = cancel_order(&mut tx, &order, 48, tz, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { code: "not_cancellable", .. }));
        let again = orders::fetch(&mut tx, order.id).await.unwrap();
        assert_eq!(again.status, OrderStatus::PendingPayment);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn cancel_paid_order_credits_wallet() {
        let pool = pool().await;
        let customer = customer(&pool, "Early Cancel").await;

        let mut tx = pool.begin().await.unwrap();
        let date = (Utc::now() + Duration::days(10)).date_naive();
        let order = seed_order(&mut tx, customer.id, date).await;
        assert_eq!(mark_paid(&mut tx, &order).await.unwrap(), PaymentOutcome::Applied);
        let order = orders::fetch(&mut tx, order.id).await.unwrap();

        let done = cancel_order(&mut tx, &order, 48, chrono_tz::UTC, Utc::now()).await.unwrap();
        assert_eq!(done.status, OrderStatus::Cancelled);
        assert_eq!(done.refunded, Cents(1_500));
        let subs = orders::sub_orders_for_update(&mut tx, order.id).await.unwrap();
        assert!(subs.iter().all(|s| s.status == SubOrderStatus::Cancelled));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn subscription_deliveries_lock_and_move() {
        use crate::db::repos::{MenuRepo, NewMealPlan, NewSubscription, SubscriptionRepo};
        use mealdash_core::Slug;

        let pool = pool().await;
        let customer = customer(&pool, "Switcher").await;
        let tag = Uuid::new_v4().simple().to_string();
        let plan = MenuRepo::new(&pool)
            .create_plan(&NewMealPlan {
                slug: Slug::new(&format!("plan-{}", &tag[..12])).unwrap(),
                name: "Two a day".into(),
                meals_per_delivery: 2,
                servings_per_meal: 1,
                price_per_meal: Cents(1_000),
            })
            .await
            .unwrap();
        let sub = SubscriptionRepo::new(&pool)
            .create(&NewSubscription {
                customer_id: customer.id,
                plan_id: plan.id,
                delivery_days: "mon,wed,fri".parse().unwrap(),
                fulfillment: Fulfillment::Delivery,
                address: None,
            })
            .await
            .unwrap();

        let mut tx = pool.begin().await.unwrap();
        let from = (Utc::now() + Duration::days(10)).date_naive();
        let order = orders::insert_order(
            &mut tx,
            &orders::NewOrder {
                customer_id: customer.id,
                subscription_id: Some(sub.id),
                kind: OrderKind::Subscription,
                fulfillment: Fulfillment::Delivery,
                price: PriceBreakdown {
                    subtotal: Cents(2_000),
                    discount: Cents::ZERO,
                    delivery_fee: Cents::ZERO,
                    wallet_applied: Cents::ZERO,
                    total: Cents(2_000),
                    deliveries: 1,
                },
                coupon_code: None,
            },
        )
        .await
        .unwrap();
        let seeded = orders::insert_sub_order(&mut tx, order.id, from, Some("1 Main St")).await.unwrap();

        let locked = lock_subscription_deliveries(&mut tx, sub.id, from - Duration::days(7), from + Duration::days(7))
            .await
            .unwrap();
        assert_eq!(locked.len(), 1);
        assert_eq!(locked[0].id, seeded.id);

        let to = from + Duration::days(2);
        orders::reschedule(&mut tx, seeded.id, to).await.unwrap();
        let moved = orders::sub_order_for_update(&mut tx, seeded.id).await.unwrap();
        assert_eq!(moved.delivery_date, to);

        let none = lock_subscription_deliveries(&mut tx, Uuid::new_v4(), from, to).await.unwrap();
        assert!(none.is_empty());
        tx.rollback().await.unwrap();
    }
}
