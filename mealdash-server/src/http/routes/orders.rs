//! Customer order history and cancellation

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repos::{orders, Order, OrderDetail, OrderRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{ValidJson, ValidUuid};
use crate::lifecycle::{self, Cancellation};
use crate::models::{PageParams, Paginated};
use crate::state::AppState;

/// GET /orders/{id}
async fn get_order(State(state): State<Arc<AppState>>, ValidUuid(id): ValidUuid) -> Result<Json<OrderDetail>, ApiError> {
    Ok(Json(OrderRepo::new(&state.pool).detail(id).await?))
}

/// GET /customers/{id}/orders
async fn customer_orders(
    State(state): State<Arc<AppState>>,
    ValidUuid(customer_id): ValidUuid,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<Order>>, ApiError> {
    let page = OrderRepo::new(&state.pool)
        .list_for_customer(customer_id, params.into())
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    /// Must own the order
    pub customer_id: Uuid,
}

/// POST /orders/{id}/cancel
async fn cancel_order(
    State(state): State<Arc<AppState>>,
    ValidUuid(id): ValidUuid,
    ValidJson(req): ValidJson<CancelRequest>,
) -> Result<Json<Cancellation>, ApiError> {
    let business = state.business().await?;
    let tz = business.tz()?;

    let mut tx = state.pool.begin().await?;
    let order = orders::fetch_for_update(&mut tx, id).await?;
    if order.customer_id != req.customer_id {
        return Err(ApiError::Forbidden {
            reason: "order belongs to another customer".into(),
        });
    }
    let cancellation = lifecycle::cancel_order(&mut tx, &order, business.order_cutoff_hours, tz, Utc::now()).await?;
    tx.commit().await?;
    Ok(Json(cancellation))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/customers/{id}/orders", get(customer_orders))
}

#[cfg(test)]
mod tests {
    use crate::http::build_router;
    use crate::http::routes::testing::{get, lazy_state};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn non_uuid_id_is_400() {
        let app = build_router(lazy_state());
        let res = app
            .oneshot(get("/orders/not-a-uuid", Some("storefront-secret")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
