//! Wallet ledger
//!
//! `customers.wallet_balance_cents` is the running balance; `wallet_entries`
//! is the append-only history. Both change in the same statement pair.

use chrono::{DateTime, Utc};
use mealdash_core::wallet::check_entry;
use mealdash_core::{Cents, WalletEntryKind};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::db::error::parse_column;
use crate::db::repos::customers;
use crate::db::DbError;

#[derive(Debug, Clone, FromRow)]
struct WalletEntryRow {
    id: Uuid,
    customer_id: Uuid,
    amount_cents: i64,
    kind: String,
    order_id: Option<Uuid>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

/// One balance change
#[derive(Debug, Clone, Serialize)]
pub struct WalletEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount: Cents,
    pub kind: WalletEntryKind,
    pub order_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<WalletEntryRow> for WalletEntry {
    type Error = DbError;
    fn try_from(r: WalletEntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            customer_id: r.customer_id,
            amount: Cents(r.amount_cents),
            kind: parse_column("kind", &r.kind)?,
            order_id: r.order_id,
            note: r.note,
            created_at: r.created_at,
        })
    }
}

/// Balance plus recent history
#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub customer_id: Uuid,
    pub balance: Cents,
    pub entries: Vec<WalletEntry>,
}

pub struct WalletRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> WalletRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn summary(&self, customer_id: Uuid, limit: i64) -> Result<WalletSummary, DbError> {
        let customer = self.customer(customer_id).await?;
        let rows = sqlx::query_as::<_, WalletEntryRow>(
            r#"
            SELECT id, customer_id, amount_cents, kind, order_id, note, created_at
            FROM wallet_entries
            WHERE customer_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(customer_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(WalletSummary {
            customer_id,
            balance: customer.wallet_balance(),
            entries: rows.into_iter().map(WalletEntry::try_from).collect::<Result<_, _>>()?,
        })
    }

    /// Manual change by staff. Locks the customer row, checks the rules,
    /// then writes the entry.
    pub async fn adjust(
        &self,
        customer_id: Uuid,
        kind: WalletEntryKind,
        amount: Cents,
        note: Option<&str>,
    ) -> Result<WalletEntry, DbError> {
        let mut tx = self.pool.begin().await?;
        let customer = customers::fetch_for_update(&mut tx, customer_id).await?;
        check_entry(customer.wallet_balance(), kind, amount)?;
        let entry = record(&mut tx, customer_id, kind, amount, None, note).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn customer(&self, id: Uuid) -> Result<customers::Customer, DbError> {
        let mut conn = self.pool.acquire().await?;
        customers::fetch(&mut conn, id).await
    }
}

/// Move the balance by `amount` and append the matching entry.
///
/// The balance update is conditional; a change that would take it below zero
/// is refused with `Conflict` and nothing is written.
pub async fn record(
    conn: &mut PgConnection,
    customer_id: Uuid,
    kind: WalletEntryKind,
    amount: Cents,
    order_id: Option<Uuid>,
    note: Option<&str>,
) -> Result<WalletEntry, DbError> {
    let updated = sqlx::query(
        r#"
        UPDATE customers SET wallet_balance_cents = wallet_balance_cents + $2
        WHERE id = $1 AND wallet_balance_cents + $2 >= 0
        "#,
    )
    .bind(customer_id)
    .bind(amount.get())
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(DbError::Conflict("insufficient wallet balance".into()));
    }

    let row = sqlx::query_as::<_, WalletEntryRow>(
        r#"
        INSERT INTO wallet_entries (customer_id, amount_cents, kind, order_id, note)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, customer_id, amount_cents, kind, order_id, note, created_at
        "#,
    )
    .bind(customer_id)
    .bind(amount.get())
    .bind(kind.as_str())
    .bind(order_id)
    .bind(note)
    .fetch_one(&mut *conn)
    .await?;
    row.try_into()
}

/// Wallet money spent on `order_id` that has not been given back yet.
pub async fn held_for_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Cents, DbError> {
    let (held,): (Option<i64>,) = sqlx::query_as(
        "SELECT -SUM(amount_cents)::BIGINT FROM wallet_entries WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(Cents(held.unwrap_or(0).max(0)))
}
