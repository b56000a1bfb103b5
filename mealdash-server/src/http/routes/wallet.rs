//! Wallet balance (storefront) and manual adjustments (admin)

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use mealdash_core::{Cents, WalletEntryKind};
use serde::Deserialize;

use crate::db::repos::{WalletEntry, WalletRepo, WalletSummary};
use crate::http::error::ApiError;
use crate::http::extractors::{ValidJson, ValidUuid};
use crate::state::AppState;

const DEFAULT_HISTORY: i64 = 20;
const MAX_HISTORY: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /customers/{id}/wallet
async fn wallet_summary(
    State(state): State<Arc<AppState>>,
    ValidUuid(customer_id): ValidUuid,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<WalletSummary>, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
    Ok(Json(WalletRepo::new(&state.pool).summary(customer_id, limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// Signed: credits positive, debits negative
    pub amount_cents: i64,
    pub kind: WalletEntryKind,
    pub note: Option<String>,
}

/// POST /admin/customers/{id}/wallet
async fn adjust_wallet(
    State(state): State<Arc<AppState>>,
    ValidUuid(customer_id): ValidUuid,
    ValidJson(req): ValidJson<AdjustRequest>,
) -> Result<(StatusCode, Json<WalletEntry>), ApiError> {
    let entry = WalletRepo::new(&state.pool)
        .adjust(customer_id, req.kind, Cents(req.amount_cents), req.note.as_deref())
        .await?;
    tracing::info!(
        customer_id = %customer_id,
        kind = req.kind.as_str(),
        amount = %entry.amount,
        "wallet adjusted by staff"
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/customers/{id}/wallet", get(wallet_summary))
}

/// Mounted under `/admin`
pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new().route("/customers/{id}/wallet", post(adjust_wallet))
}

#[cfg(test)]
mod tests {
    use crate::http::build_router;
    use crate::http::routes::testing::{lazy_state, post};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn adjustment_needs_admin_token() {
        let app = build_router(lazy_state());
        let uri = "/admin/customers/00000000-0000-0000-0000-000000000000/wallet";
        let body = r#"{"amount_cents":500,"kind":"top_up"}"#;
        let res = app
            .oneshot(post(uri, Some("storefront-secret"), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let app = build_router(lazy_state());
        let uri = "/admin/customers/00000000-0000-0000-0000-000000000000/wallet";
        let body = r#"{"amount_cents":500,"kind":"gift"}"#;
        let res = app.oneshot(post(uri, Some("admin-secret"), body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
