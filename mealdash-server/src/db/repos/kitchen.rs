//! Kitchen prep queries

use chrono::NaiveDate;
use mealdash_core::servings::PrepRow;
use mealdash_core::Cents;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::DbError;

#[derive(Debug, FromRow)]
struct PrepItemRow {
    menu_item_id: Uuid,
    name: String,
    quantity: i32,
    servings: i32,
    unit_price_cents: i64,
    cost_per_serving_cents: i64,
    batch_yield: i32,
}

impl From<PrepItemRow> for PrepRow {
    fn from(r: PrepItemRow) -> Self {
        PrepRow {
            menu_item_id: r.menu_item_id,
            name: r.name,
            quantity: r.quantity,
            servings: r.servings,
            unit_price: Cents(r.unit_price_cents),
            cost_per_serving: Cents(r.cost_per_serving_cents),
            batch_yield: r.batch_yield,
        }
    }
}

pub struct KitchenRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> KitchenRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every item the kitchen has to cook for `date`.
    ///
    /// Unpaid and cancelled sub-orders are left out; failed deliveries were
    /// still cooked and stay in.
    pub async fn prep_rows(&self, date: NaiveDate) -> Result<Vec<PrepRow>, DbError> {
        let rows = sqlx::query_as::<_, PrepItemRow>(
            r#"
            SELECT oi.menu_item_id, m.name, oi.quantity, oi.servings, oi.unit_price_cents,
                   m.cost_per_serving_cents, m.batch_yield
            FROM order_items oi
            JOIN sub_orders s ON s.id = oi.sub_order_id
            JOIN menu_items m ON m.id = oi.menu_item_id
            WHERE s.delivery_date = $1
              AND s.status NOT IN ('pending', 'cancelled')
            "#,
        )
        .bind(date)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(PrepRow::from).collect())
    }
}
