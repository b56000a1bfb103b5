//! Checkout endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;

use crate::checkout::{self, CheckoutRequest, PlacedOrder, Quote};
use crate::http::error::ApiError;
use crate::http::extractors::ValidJson;
use crate::state::AppState;

/// POST /checkout/quote - price the cart without writing anything
async fn quote(State(state): State<Arc<AppState>>, ValidJson(req): ValidJson<CheckoutRequest>) -> Result<Json<Quote>, ApiError> {
    let business = state.business().await?;
    let mut conn = state.pool.acquire().await?;
    let quote = checkout::quote(&mut conn, &business, &req, Utc::now()).await?;
    Ok(Json(quote))
}

/// POST /checkout - place the order and start payment
async fn place(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let placed = checkout::place(&state, &req).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkout/quote", post(quote))
        .route("/checkout", post(place))
}
