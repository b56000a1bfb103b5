//! Coupon repository
//!
//! Redemption counting is a conditional UPDATE so the usage cap holds even
//! when two checkouts race for the last redemption.

use chrono::{DateTime, Utc};
use mealdash_core::{Cents, Coupon, CouponCode};
use sqlx::{FromRow, PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::db::error::parse_column;
use crate::db::DbError;
use crate::models::{Page, Paginated};

#[derive(Debug, Clone, FromRow)]
struct CouponRow {
    code: String,
    description: Option<String>,
    discount_kind: String,
    discount_value: i64,
    scope: String,
    min_subtotal_cents: Option<i64>,
    max_redemptions: Option<i32>,
    per_customer_limit: Option<i32>,
    redemptions: i32,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    active: bool,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = DbError;
    fn try_from(r: CouponRow) -> Result<Self, Self::Error> {
        Ok(Coupon {
            code: CouponCode::new(&r.code).map_err(|_| DbError::Corrupt {
                column: "code",
                value: r.code.clone(),
            })?,
            description: r.description,
            discount_kind: parse_column("discount_kind", &r.discount_kind)?,
            discount_value: r.discount_value,
            scope: parse_column("scope", &r.scope)?,
            min_subtotal: r.min_subtotal_cents.map(Cents),
            max_redemptions: r.max_redemptions,
            per_customer_limit: r.per_customer_limit,
            redemptions: r.redemptions,
            starts_at: r.starts_at,
            expires_at: r.expires_at,
            active: r.active,
        })
    }
}

const COUPON_COLUMNS: &str = "code, description, discount_kind, discount_value, scope, \
    min_subtotal_cents, max_redemptions, per_customer_limit, redemptions, starts_at, expires_at, active";

pub struct CouponRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, code: &CouponCode) -> Result<Coupon, DbError> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, code).await
    }

    /// Newest first; `active_only` hides deactivated codes.
    pub async fn list(&self, page: Page, active_only: bool) -> Result<Paginated<Coupon>, DbError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COUPON_COLUMNS}, COUNT(*) OVER() AS total
            FROM coupons
            WHERE NOT $1 OR active
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(active_only)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(|r| CouponRow::from_row(r).map_err(DbError::from).and_then(Coupon::try_from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(page.wrap(items, total))
    }

    pub async fn create(&self, coupon: &Coupon) -> Result<Coupon, DbError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            r#"
            INSERT INTO coupons
                (code, description, discount_kind, discount_value, scope, min_subtotal_cents,
                 max_redemptions, per_customer_limit, starts_at, expires_at, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {COUPON_COLUMNS}
            "#
        ))
        .bind(coupon.code.as_str())
        .bind(&coupon.description)
        .bind(coupon.discount_kind.as_str())
        .bind(coupon.discount_value)
        .bind(coupon.scope.as_str())
        .bind(coupon.min_subtotal.map(Cents::get))
        .bind(coupon.max_redemptions)
        .bind(coupon.per_customer_limit)
        .bind(coupon.starts_at)
        .bind(coupon.expires_at)
        .bind(coupon.active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::on_unique(e, "coupon code already exists"))?;
        row.try_into()
    }

    /// Overwrite the editable fields. Redemption count is left alone.
    pub async fn save(&self, coupon: &Coupon) -> Result<Coupon, DbError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            r#"
            UPDATE coupons SET
                description = $2,
                discount_kind = $3,
                discount_value = $4,
                scope = $5,
                min_subtotal_cents = $6,
                max_redemptions = $7,
                per_customer_limit = $8,
                starts_at = $9,
                expires_at = $10,
                active = $11
            WHERE code = $1
            RETURNING {COUPON_COLUMNS}
            "#
        ))
        .bind(coupon.code.as_str())
        .bind(&coupon.description)
        .bind(coupon.discount_kind.as_str())
        .bind(coupon.discount_value)
        .bind(coupon.scope.as_str())
        .bind(coupon.min_subtotal.map(Cents::get))
        .bind(coupon.max_redemptions)
        .bind(coupon.per_customer_limit)
        .bind(coupon.starts_at)
        .bind(coupon.expires_at)
        .bind(coupon.active)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("coupon", &coupon.code))?;
        row.try_into()
    }

    pub async fn deactivate(&self, code: &CouponCode) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE coupons SET active = FALSE WHERE code = $1")
            .bind(code.as_str())
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("coupon", code));
        }
        Ok(())
    }

    pub async fn customer_redemptions(&self, code: &CouponCode, customer_id: Uuid) -> Result<i64, DbError> {
        let mut conn = self.pool.acquire().await?;
        count_customer_redemptions(&mut conn, code, customer_id).await
    }
}

pub async fn fetch(conn: &mut PgConnection, code: &CouponCode) -> Result<Coupon, DbError> {
    sqlx::query_as::<_, CouponRow>(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"))
        .bind(code.as_str())
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("coupon", code))?
        .try_into()
}

pub async fn count_customer_redemptions(
    conn: &mut PgConnection,
    code: &CouponCode,
    customer_id: Uuid,
) -> Result<i64, DbError> {
    let (n,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_code = $1 AND customer_id = $2",
    )
    .bind(code.as_str())
    .bind(customer_id)
    .fetch_one(conn)
    .await?;
    Ok(n)
}

/// Take one redemption for `order_id`.
///
/// Fails with `Conflict` when the cap was reached since validation.
pub async fn redeem(
    conn: &mut PgConnection,
    code: &CouponCode,
    customer_id: Uuid,
    order_id: Uuid,
    discount: Cents,
) -> Result<(), DbError> {
    let updated = sqlx::query(
        r#"
        UPDATE coupons SET redemptions = redemptions + 1
        WHERE code = $1 AND active
          AND (max_redemptions IS NULL OR redemptions < max_redemptions)
        "#,
    )
    .bind(code.as_str())
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(DbError::Conflict(format!("coupon {} is no longer available", code)));
    }

    sqlx::query(
        r#"
        INSERT INTO coupon_redemptions (coupon_code, customer_id, order_id, discount_cents)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(code.as_str())
    .bind(customer_id)
    .bind(order_id)
    .bind(discount.get())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Give back the redemption held by `order_id`, if any.
pub async fn release(conn: &mut PgConnection, order_id: Uuid) -> Result<bool, DbError> {
    let released = sqlx::query(
        r#"
        WITH r AS (
            DELETE FROM coupon_redemptions WHERE order_id = $1 RETURNING coupon_code
        )
        UPDATE coupons SET redemptions = GREATEST(redemptions - 1, 0)
        WHERE code IN (SELECT coupon_code FROM r)
        "#,
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(released.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn redeem_respects_cap() {
        // Two redemptions against max_redemptions = 1: second must conflict.
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.unwrap();
        crate::db::migrations::run(&pool).await.unwrap();

        let code = CouponCode::new(&format!("CAP{}", &Uuid::new_v4().simple().to_string()[..8])).unwrap();
        let coupon = Coupon {
            code: code.clone(),
            description: None,
            discount_kind: mealdash_core::DiscountKind::Fixed,
            discount_value: 500,
            scope: mealdash_core::CouponScope::Any,
            min_subtotal: None,
            max_redemptions: Some(1),
            per_customer_limit: None,
            redemptions: 0,
            starts_at: None,
            expires_at: None,
            active: true,
        };
        CouponRepo::new(&pool).create(&coupon).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        sqlx::query("UPDATE coupons SET redemptions = 1 WHERE code = $1")
            .bind(code.as_str())
            .execute(&mut *tx)
            .await
            .unwrap();
        let err = redeem(&mut tx, &code, Uuid::new_v4(), Uuid::new_v4(), Cents(500))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        tx.rollback().await.unwrap();
    }
}
