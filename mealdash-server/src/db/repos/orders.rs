//! Orders, sub-orders and their line items

use chrono::{DateTime, NaiveDate, Utc};
use mealdash_core::{Cents, CouponCode, Fulfillment, OrderKind, OrderStatus, PriceBreakdown, SubOrderStatus};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::db::error::parse_column;
use crate::db::DbError;
use crate::models::{Page, Paginated};

#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    subscription_id: Option<Uuid>,
    kind: String,
    fulfillment: String,
    status: String,
    subtotal_cents: i64,
    discount_cents: i64,
    delivery_fee_cents: i64,
    wallet_applied_cents: i64,
    total_cents: i64,
    coupon_code: Option<String>,
    payment_intent_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Checkout record; one per payment
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub kind: OrderKind,
    pub fulfillment: Fulfillment,
    pub status: OrderStatus,
    pub subtotal: Cents,
    pub discount: Cents,
    pub delivery_fee: Cents,
    pub wallet_applied: Cents,
    pub total: Cents,
    pub coupon_code: Option<String>,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            customer_id: r.customer_id,
            subscription_id: r.subscription_id,
            kind: parse_column("kind", &r.kind)?,
            fulfillment: parse_column("fulfillment", &r.fulfillment)?,
            status: parse_column("status", &r.status)?,
            subtotal: Cents(r.subtotal_cents),
            discount: Cents(r.discount_cents),
            delivery_fee: Cents(r.delivery_fee_cents),
            wallet_applied: Cents(r.wallet_applied_cents),
            total: Cents(r.total_cents),
            coupon_code: r.coupon_code,
            payment_intent_id: r.payment_intent_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, customer_id, subscription_id, kind, fulfillment, status, \
    subtotal_cents, discount_cents, delivery_fee_cents, wallet_applied_cents, total_cents, \
    coupon_code, payment_intent_id, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct SubOrderRow {
    id: Uuid,
    order_id: Uuid,
    delivery_date: NaiveDate,
    status: String,
    shipday_order_id: Option<i64>,
    address: Option<String>,
    updated_at: DateTime<Utc>,
}

/// The part of an order fulfilled on one date
#[derive(Debug, Clone, Serialize)]
pub struct SubOrder {
    pub id: Uuid,
    pub order_id: Uuid,
    pub delivery_date: NaiveDate,
    pub status: SubOrderStatus,
    pub shipday_order_id: Option<i64>,
    pub address: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubOrderRow> for SubOrder {
    type Error = DbError;
    fn try_from(r: SubOrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            order_id: r.order_id,
            delivery_date: r.delivery_date,
            status: parse_column("status", &r.status)?,
            shipday_order_id: r.shipday_order_id,
            address: r.address,
            updated_at: r.updated_at,
        })
    }
}

const SUB_ORDER_COLUMNS: &str = "id, order_id, delivery_date, status, shipday_order_id, address, updated_at";

/// Line item, joined with the dish name
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub sub_order_id: Uuid,
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub servings: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubOrderDetail {
    #[serde(flatten)]
    pub sub_order: SubOrder,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub sub_orders: Vec<SubOrderDetail>,
}

/// Values written when an order is placed
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub kind: OrderKind,
    pub fulfillment: Fulfillment,
    pub price: PriceBreakdown,
    pub coupon_code: Option<CouponCode>,
}

/// Admin listing filters
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub fulfillment: Option<Fulfillment>,
    /// Orders with a sub-order on this date
    pub date: Option<NaiveDate>,
}

/// One row of the delivery board for a date
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeliveryStop {
    pub sub_order_id: Uuid,
    pub order_id: Uuid,
    pub delivery_date: NaiveDate,
    pub status: String,
    pub shipday_order_id: Option<i64>,
    pub fulfillment: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub address: Option<String>,
    pub item_count: i64,
}

/// Everything needed to hand a sub-order to the courier
#[derive(Debug, Clone)]
pub struct DispatchTarget {
    pub sub_order: SubOrder,
    pub fulfillment: Fulfillment,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub address: Option<String>,
    pub items: Vec<OrderItem>,
}

impl DispatchTarget {
    pub fn subtotal(&self) -> Cents {
        self.items
            .iter()
            .map(|i| Cents(i.unit_price_cents) * i.quantity as i64)
            .sum()
    }
}

pub struct OrderRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Order, DbError> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Order with its sub-orders and items
    pub async fn detail(&self, id: Uuid) -> Result<OrderDetail, DbError> {
        let mut conn = self.pool.acquire().await?;
        let order = fetch(&mut conn, id).await?;

        let subs = sqlx::query_as::<_, SubOrderRow>(&format!(
            "SELECT {SUB_ORDER_COLUMNS} FROM sub_orders WHERE order_id = $1 ORDER BY delivery_date"
        ))
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT oi.id, oi.sub_order_id, oi.menu_item_id, m.name, oi.quantity,
                   oi.unit_price_cents, oi.servings
            FROM order_items oi
            JOIN sub_orders s ON s.id = oi.sub_order_id
            JOIN menu_items m ON m.id = oi.menu_item_id
            WHERE s.order_id = $1
            ORDER BY m.name
            "#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        let mut sub_orders = Vec::with_capacity(subs.len());
        for row in subs {
            let sub_order = SubOrder::try_from(row)?;
            let items = items.iter().filter(|i| i.sub_order_id == sub_order.id).cloned().collect();
            sub_orders.push(SubOrderDetail { sub_order, items });
        }
        Ok(OrderDetail { order, sub_orders })
    }

    pub async fn list_for_customer(&self, customer_id: Uuid, page: Page) -> Result<Paginated<Order>, DbError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}, COUNT(*) OVER() AS total
            FROM orders
            WHERE customer_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(customer_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;
        paginate(page, &rows)
    }

    pub async fn admin_list(&self, filter: &OrderFilter, page: Page) -> Result<Paginated<Order>, DbError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}, COUNT(*) OVER() AS total
            FROM orders o
            WHERE ($1::text IS NULL OR o.status = $1)
              AND ($2::text IS NULL OR o.fulfillment = $2)
              AND ($3::date IS NULL OR EXISTS (
                    SELECT 1 FROM sub_orders s WHERE s.order_id = o.id AND s.delivery_date = $3))
            ORDER BY o.created_at DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.fulfillment.map(|f| f.as_str()))
        .bind(filter.date)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;
        paginate(page, &rows)
    }

    /// A subscription's upcoming deliveries, for display.
    pub async fn subscription_schedule(
        &self,
        subscription_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SubOrder>, DbError> {
        let rows = sqlx::query_as::<_, SubOrderRow>(SUBSCRIPTION_DELIVERIES)
            .bind(subscription_id)
            .bind(start)
            .bind(end)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(SubOrder::try_from).collect()
    }

    /// Sub-orders due on `date` that have been paid for.
    pub async fn deliveries_for_date(&self, date: NaiveDate) -> Result<Vec<DeliveryStop>, DbError> {
        let stops = sqlx::query_as::<_, DeliveryStop>(
            r#"
            SELECT s.id AS sub_order_id, s.order_id, s.delivery_date, s.status, s.shipday_order_id,
                   o.fulfillment, c.name AS customer_name, c.email AS customer_email,
                   c.phone AS customer_phone, COALESCE(s.address, c.address) AS address,
                   COALESCE((SELECT SUM(quantity) FROM order_items WHERE sub_order_id = s.id), 0)::BIGINT
                       AS item_count
            FROM sub_orders s
            JOIN orders o ON o.id = s.order_id
            JOIN customers c ON c.id = o.customer_id
            WHERE s.delivery_date = $1 AND s.status NOT IN ('pending', 'cancelled')
            ORDER BY o.fulfillment, c.name
            "#,
        )
        .bind(date)
        .fetch_all(self.pool)
        .await?;
        Ok(stops)
    }

    pub async fn dispatch_target(&self, sub_order_id: Uuid) -> Result<DispatchTarget, DbError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            r#"
            SELECT s.id, s.order_id, s.delivery_date, s.status, s.shipday_order_id, s.address,
                   s.updated_at, o.fulfillment, c.name AS customer_name, c.email AS customer_email,
                   c.phone AS customer_phone, c.address AS customer_address
            FROM sub_orders s
            JOIN orders o ON o.id = s.order_id
            JOIN customers c ON c.id = o.customer_id
            WHERE s.id = $1
            "#,
        )
        .bind(sub_order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("sub-order", sub_order_id))?;

        let sub_order = SubOrder::try_from(SubOrderRow::from_row(&row)?)?;
        let fulfillment: String = row.try_get("fulfillment")?;
        let items = items_for_sub_order(&mut conn, sub_order_id).await?;
        let address: Option<String> = row.try_get("address")?;
        let customer_address: Option<String> = row.try_get("customer_address")?;

        Ok(DispatchTarget {
            sub_order,
            fulfillment: parse_column("fulfillment", &fulfillment)?,
            customer_name: row.try_get("customer_name")?,
            customer_email: row.try_get("customer_email")?,
            customer_phone: row.try_get("customer_phone")?,
            address: address.or(customer_address),
            items,
        })
    }
}

fn paginate(page: Page, rows: &[sqlx::postgres::PgRow]) -> Result<Paginated<Order>, DbError> {
    let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
    let items = rows
        .iter()
        .map(|r| OrderRow::from_row(r).map_err(DbError::from).and_then(Order::try_from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(page.wrap(items, total))
}

pub async fn fetch(conn: &mut PgConnection, id: Uuid) -> Result<Order, DbError> {
    sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("order", id))?
        .try_into()
}

pub async fn fetch_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Order, DbError> {
    sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("order", id))?
        .try_into()
}

pub async fn find_by_payment_intent(conn: &mut PgConnection, intent_id: &str) -> Result<Option<Order>, DbError> {
    sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_intent_id = $1 FOR UPDATE"
    ))
    .bind(intent_id)
    .fetch_optional(conn)
    .await?
    .map(Order::try_from)
    .transpose()
}

pub async fn insert_order(conn: &mut PgConnection, new: &NewOrder) -> Result<Order, DbError> {
    let p = &new.price;
    sqlx::query_as::<_, OrderRow>(&format!(
        r#"
        INSERT INTO orders
            (customer_id, subscription_id, kind, fulfillment, status, subtotal_cents, discount_cents,
             delivery_fee_cents, wallet_applied_cents, total_cents, coupon_code)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(new.customer_id)
    .bind(new.subscription_id)
    .bind(new.kind.as_str())
    .bind(new.fulfillment.as_str())
    .bind(OrderStatus::PendingPayment.as_str())
    .bind(p.subtotal.get())
    .bind(p.discount.get())
    .bind(p.delivery_fee.get())
    .bind(p.wallet_applied.get())
    .bind(p.total.get())
    .bind(new.coupon_code.as_ref().map(CouponCode::as_str))
    .fetch_one(conn)
    .await?
    .try_into()
}

pub async fn insert_sub_order(
    conn: &mut PgConnection,
    order_id: Uuid,
    date: NaiveDate,
    address: Option<&str>,
) -> Result<SubOrder, DbError> {
    sqlx::query_as::<_, SubOrderRow>(&format!(
        r#"
        INSERT INTO sub_orders (order_id, delivery_date, address)
        VALUES ($1, $2, $3)
        RETURNING {SUB_ORDER_COLUMNS}
        "#
    ))
    .bind(order_id)
    .bind(date)
    .bind(address)
    .fetch_one(conn)
    .await?
    .try_into()
}

pub async fn insert_item(
    conn: &mut PgConnection,
    sub_order_id: Uuid,
    menu_item_id: Uuid,
    quantity: i32,
    unit_price: Cents,
    servings: i32,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO order_items (sub_order_id, menu_item_id, quantity, unit_price_cents, servings)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(sub_order_id)
    .bind(menu_item_id)
    .bind(quantity)
    .bind(unit_price.get())
    .bind(servings)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_payment_intent(conn: &mut PgConnection, order_id: Uuid, intent_id: &str) -> Result<(), DbError> {
    sqlx::query("UPDATE orders SET payment_intent_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .bind(intent_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_status(conn: &mut PgConnection, order_id: Uuid, status: OrderStatus) -> Result<(), DbError> {
    sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .bind(status.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

/// Lock every sub-order of an order.
pub async fn sub_orders_for_update(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<SubOrder>, DbError> {
    let rows = sqlx::query_as::<_, SubOrderRow>(&format!(
        "SELECT {SUB_ORDER_COLUMNS} FROM sub_orders WHERE order_id = $1 ORDER BY delivery_date FOR UPDATE"
    ))
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(SubOrder::try_from).collect()
}

pub async fn sub_order_for_update(conn: &mut PgConnection, id: Uuid) -> Result<SubOrder, DbError> {
    sqlx::query_as::<_, SubOrderRow>(&format!(
        "SELECT {SUB_ORDER_COLUMNS} FROM sub_orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DbError::not_found("sub-order", id))?
    .try_into()
}

/// Parent order of a sub-order, without locking either row.
pub async fn order_id_of(conn: &mut PgConnection, sub_order_id: Uuid) -> Result<Uuid, DbError> {
    sqlx::query_scalar::<_, Uuid>("SELECT order_id FROM sub_orders WHERE id = $1")
        .bind(sub_order_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("sub-order", sub_order_id))
}

pub async fn sub_order_by_shipday_id(conn: &mut PgConnection, shipday_id: i64) -> Result<Option<SubOrder>, DbError> {
    sqlx::query_as::<_, SubOrderRow>(&format!(
        "SELECT {SUB_ORDER_COLUMNS} FROM sub_orders WHERE shipday_order_id = $1"
    ))
    .bind(shipday_id)
    .fetch_optional(conn)
    .await?
    .map(SubOrder::try_from)
    .transpose()
}

/// Set many sub-orders at once (payment outcome, cancellation).
pub async fn set_sub_statuses(conn: &mut PgConnection, ids: &[Uuid], status: SubOrderStatus) -> Result<(), DbError> {
    sqlx::query("UPDATE sub_orders SET status = $2, updated_at = NOW() WHERE id = ANY($1)")
        .bind(ids)
        .bind(status.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_sub_status(conn: &mut PgConnection, id: Uuid, status: SubOrderStatus) -> Result<(), DbError> {
    set_sub_statuses(conn, &[id], status).await
}

pub async fn set_shipday_id(conn: &mut PgConnection, sub_order_id: Uuid, shipday_id: i64) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE sub_orders SET shipday_order_id = $2, status = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(sub_order_id)
    .bind(shipday_id)
    .bind(SubOrderStatus::Dispatched.as_str())
    .execute(conn)
    .await
    .map_err(|e| DbError::on_unique(e, "shipday order already linked"))?;
    Ok(())
}

/// Move a sub-order to another date.
pub async fn reschedule(conn: &mut PgConnection, sub_order_id: Uuid, date: NaiveDate) -> Result<(), DbError> {
    sqlx::query("UPDATE sub_orders SET delivery_date = $2, updated_at = NOW() WHERE id = $1")
        .bind(sub_order_id)
        .bind(date)
        .execute(conn)
        .await
        .map_err(|e| DbError::on_unique(e, "order already has a delivery on that date"))?;
    Ok(())
}

const SUBSCRIPTION_DELIVERIES: &str = r#"
    SELECT s.id, s.order_id, s.delivery_date, s.status, s.shipday_order_id, s.address, s.updated_at
    FROM sub_orders s
    JOIN orders o ON o.id = s.order_id
    WHERE o.subscription_id = $1
      AND s.delivery_date BETWEEN $2 AND $3
      AND s.status NOT IN ('cancelled', 'failed')
      AND o.status NOT IN ('payment_failed', 'cancelled')
    ORDER BY s.delivery_date
"#;

/// Lock a subscription's live orders with a delivery between `start` and
/// `end`, in id order. Returns their ids.
pub async fn lock_subscription_orders(
    conn: &mut PgConnection,
    subscription_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Uuid>, DbError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT o.id
        FROM orders o
        WHERE o.subscription_id = $1
          AND o.status NOT IN ('payment_failed', 'cancelled')
          AND EXISTS (
              SELECT 1 FROM sub_orders s
              WHERE s.order_id = o.id AND s.delivery_date BETWEEN $2 AND $3
          )
        ORDER BY o.id
        FOR UPDATE
        "#,
    )
    .bind(subscription_id)
    .bind(start)
    .bind(end)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// Live deliveries of `order_ids` between `start` and `end` inclusive,
/// row-locked. The orders must already be locked by the caller.
pub async fn deliveries_for_update(
    conn: &mut PgConnection,
    order_ids: &[Uuid],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<SubOrder>, DbError> {
    let rows = sqlx::query_as::<_, SubOrderRow>(
        r#"
        SELECT id, order_id, delivery_date, status, shipday_order_id, address, updated_at
        FROM sub_orders
        WHERE order_id = ANY($1)
          AND delivery_date BETWEEN $2 AND $3
          AND status NOT IN ('cancelled', 'failed')
        ORDER BY delivery_date, id
        FOR UPDATE
        "#,
    )
    .bind(order_ids)
    .bind(start)
    .bind(end)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(SubOrder::try_from).collect()
}

pub async fn items_for_sub_order(conn: &mut PgConnection, sub_order_id: Uuid) -> Result<Vec<OrderItem>, DbError> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT oi.id, oi.sub_order_id, oi.menu_item_id, m.name, oi.quantity,
               oi.unit_price_cents, oi.servings
        FROM order_items oi
        JOIN menu_items m ON m.id = oi.menu_item_id
        WHERE oi.sub_order_id = $1
        ORDER BY m.name
        "#,
    )
    .bind(sub_order_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}
