//! Customer repository

use chrono::{DateTime, Utc};
use mealdash_core::{Cents, Email};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::db::DbError;

/// Customer record
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Customer {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub wallet_balance_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn wallet_balance(&self) -> Cents {
        Cents(self.wallet_balance_cents)
    }
}

/// Fields for registering a customer
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

pub struct CustomerRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> CustomerRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Register a customer, or refresh the profile of an existing email.
    ///
    /// Idempotent on email; the wallet balance is never touched.
    pub async fn upsert(&self, new: &NewCustomer) -> Result<Customer, DbError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (email, name, phone, address)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE SET
                name = EXCLUDED.name,
                phone = COALESCE(EXCLUDED.phone, customers.phone),
                address = COALESCE(EXCLUDED.address, customers.address)
            RETURNING id, email, name, phone, address, wallet_balance_cents, created_at
            "#,
        )
        .bind(new.email.as_str())
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.address)
        .fetch_one(self.pool)
        .await?;
        Ok(customer)
    }

    pub async fn get(&self, id: Uuid) -> Result<Customer, DbError> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }
}

/// Fetch a customer inside an open transaction.
pub async fn fetch(conn: &mut PgConnection, id: Uuid) -> Result<Customer, DbError> {
    sqlx::query_as::<_, Customer>(
        r#"
        SELECT id, email, name, phone, address, wallet_balance_cents, created_at
        FROM customers WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DbError::not_found("customer", id))
}

/// Fetch and row-lock a customer (wallet changes).
pub async fn fetch_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Customer, DbError> {
    sqlx::query_as::<_, Customer>(
        r#"
        SELECT id, email, name, phone, address, wallet_balance_cents, created_at
        FROM customers WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DbError::not_found("customer", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn upsert_is_idempotent_on_email() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.unwrap();
        crate::db::migrations::run(&pool).await.unwrap();

        let email = format!("{}@example.com", Uuid::new_v4());
        let new = NewCustomer {
            email: Email::new(&email).unwrap(),
            name: "Pat".into(),
            phone: None,
            address: Some("1 Main St".into()),
        };
        let repo = CustomerRepo::new(&pool);
        let a = repo.upsert(&new).await.unwrap();
        let b = repo
            .upsert(&NewCustomer {
                address: None,
                ..new.clone()
            })
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.address.as_deref(), Some("1 Main St"));
        assert_eq!(b.wallet_balance(), Cents::ZERO);
    }
}
