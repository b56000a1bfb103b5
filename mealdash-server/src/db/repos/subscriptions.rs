//! Subscription repository

use chrono::{DateTime, Utc};
use mealdash_core::schedule::DeliveryDays;
use mealdash_core::{Fulfillment, SubscriptionStatus};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::db::error::parse_column;
use crate::db::DbError;

#[derive(Debug, Clone, FromRow)]
struct SubscriptionRow {
    id: Uuid,
    customer_id: Uuid,
    plan_id: Uuid,
    delivery_days: i16,
    fulfillment: String,
    address: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub plan_id: Uuid,
    pub delivery_days: DeliveryDays,
    pub fulfillment: Fulfillment,
    pub address: Option<String>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DbError;
    fn try_from(r: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            customer_id: r.customer_id,
            plan_id: r.plan_id,
            delivery_days: DeliveryDays::from_bits(r.delivery_days),
            fulfillment: parse_column("fulfillment", &r.fulfillment)?,
            address: r.address,
            status: parse_column("status", &r.status)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub customer_id: Uuid,
    pub plan_id: Uuid,
    pub delivery_days: DeliveryDays,
    pub fulfillment: Fulfillment,
    pub address: Option<String>,
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, customer_id, plan_id, delivery_days, fulfillment, address, status, created_at, updated_at";

pub struct SubscriptionRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> SubscriptionRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewSubscription) -> Result<Subscription, DbError> {
        sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            INSERT INTO subscriptions (customer_id, plan_id, delivery_days, fulfillment, address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(new.customer_id)
        .bind(new.plan_id)
        .bind(new.delivery_days.bits())
        .bind(new.fulfillment.as_str())
        .bind(&new.address)
        .fetch_one(self.pool)
        .await?
        .try_into()
    }

    pub async fn get(&self, id: Uuid) -> Result<Subscription, DbError> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Move to `to` if the status machine allows it.
    pub async fn set_status(&self, id: Uuid, to: SubscriptionStatus) -> Result<Subscription, DbError> {
        let mut tx = self.pool.begin().await?;
        let current = fetch_for_update(&mut tx, id).await?;
        if !current.status.can_transition(to) {
            return Err(DbError::Rejected(format!(
                "subscription is {} and cannot become {}",
                current.status, to
            )));
        }
        let updated: Subscription = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(to.as_str())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;
        tx.commit().await?;
        Ok(updated)
    }
}

pub async fn fetch(conn: &mut PgConnection, id: Uuid) -> Result<Subscription, DbError> {
    sqlx::query_as::<_, SubscriptionRow>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DbError::not_found("subscription", id))?
    .try_into()
}

pub async fn fetch_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Subscription, DbError> {
    sqlx::query_as::<_, SubscriptionRow>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DbError::not_found("subscription", id))?
    .try_into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_converts_bitmask_and_status() {
        let row = SubscriptionRow {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            delivery_days: 0b00101,
            fulfillment: "pickup".into(),
            address: None,
            status: "paused".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let sub = Subscription::try_from(row).unwrap();
        assert_eq!(sub.delivery_days.to_string(), "mon,wed");
        assert_eq!(sub.status, SubscriptionStatus::Paused);
        assert_eq!(sub.fulfillment, Fulfillment::Pickup);
    }
}
