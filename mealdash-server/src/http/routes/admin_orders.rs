//! Back-office order board, delivery list, dispatch and manual status
//!
//! Mounted under `/admin`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use mealdash_core::{Fulfillment, OrderStatus, SubOrderStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::local_today;
use crate::db::repos::{orders, DeliveryStop, DispatchTarget, Order, OrderFilter, OrderRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{ValidJson, ValidUuid};
use crate::integrations::shipday::{ShipdayItem, ShipdayOrder};
use crate::lifecycle;
use crate::models::{Page, Paginated};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub fulfillment: Option<Fulfillment>,
    pub date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /admin/orders
async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(q): Query<OrderListQuery>,
) -> Result<Json<Paginated<Order>>, ApiError> {
    let filter = OrderFilter {
        status: q.status,
        fulfillment: q.fulfillment,
        date: q.date,
    };
    let page = Page::new(q.page.unwrap_or(1), q.per_page.unwrap_or(25));
    Ok(Json(OrderRepo::new(&state.pool).admin_list(&filter, page).await?))
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

/// GET /admin/deliveries?date= (default: today in the business timezone)
async fn deliveries(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DateQuery>,
) -> Result<Json<Vec<DeliveryStop>>, ApiError> {
    let date = match q.date {
        Some(d) => d,
        None => local_today(state.business().await?.tz()?),
    };
    Ok(Json(OrderRepo::new(&state.pool).deliveries_for_date(date).await?))
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub sub_order_id: Uuid,
    pub shipday_order_id: i64,
    pub status: SubOrderStatus,
    pub order_status: OrderStatus,
}

fn shipday_order(target: &DispatchTarget, address: &str, restaurant: (&str, &str, &str)) -> ShipdayOrder {
    let (restaurant_name, restaurant_address, restaurant_phone) = restaurant;
    ShipdayOrder {
        order_number: target.sub_order.id.to_string(),
        customer_name: target.customer_name.clone(),
        customer_address: address.to_owned(),
        customer_email: target.customer_email.clone(),
        customer_phone_number: target.customer_phone.clone().unwrap_or_default(),
        restaurant_name: restaurant_name.to_owned(),
        restaurant_address: restaurant_address.to_owned(),
        restaurant_phone_number: restaurant_phone.to_owned(),
        expected_delivery_date: target.sub_order.delivery_date.format("%Y-%m-%d").to_string(),
        order_item: target
            .items
            .iter()
            .map(|i| ShipdayItem {
                name: i.name.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price_cents as f64 / 100.0,
            })
            .collect(),
        total_order_cost: target.subtotal().get() as f64 / 100.0,
    }
}

/// A delivery can go to the courier once it is paid and not yet handed over.
/// Returns the drop-off address.
fn dispatchable(target: &DispatchTarget) -> Result<&str, ApiError> {
    if target.fulfillment != Fulfillment::Delivery {
        return Err(ApiError::Rejected {
            code: "not_a_delivery",
            message: "pickup orders are not dispatched".into(),
        });
    }
    if target.sub_order.shipday_order_id.is_some() {
        return Err(ApiError::Conflict("sub-order already dispatched".into()));
    }
    if !target.sub_order.status.can_transition(SubOrderStatus::Dispatched) {
        return Err(ApiError::Rejected {
            code: "invalid_transition",
            message: format!("sub-order is {}", target.sub_order.status),
        });
    }
    target.address.as_deref().ok_or_else(|| ApiError::Rejected {
        code: "missing_address",
        message: "no delivery address on file".into(),
    })
}

/// POST /admin/sub-orders/{id}/dispatch
///
/// Creates the courier order first, then records its id. If the record step
/// loses a race the courier order is logged for manual cleanup.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    ValidUuid(id): ValidUuid,
) -> Result<Json<DispatchResponse>, ApiError> {
    let target = OrderRepo::new(&state.pool).dispatch_target(id).await?;
    let address = dispatchable(&target)?;

    let business = state.business().await?;
    let order = shipday_order(
        &target,
        address,
        (&business.name, &business.pickup_address, &business.phone),
    );
    let shipday_id = state.dispatch.create_order(&order).await?;

    let mut tx = state.pool.begin().await?;
    let (parent, sub) = lifecycle::lock_sub_order(&mut tx, id).await?;
    if sub.shipday_order_id.is_some() || !sub.status.can_transition(SubOrderStatus::Dispatched) {
        tracing::error!(sub_order_id = %id, shipday_id, "sub-order changed during dispatch; courier order is orphaned");
        return Err(ApiError::Conflict("sub-order changed during dispatch".into()));
    }
    orders::set_shipday_id(&mut tx, id, shipday_id).await?;
    let order_status = lifecycle::refresh_order(&mut tx, &parent).await?;
    tx.commit().await?;

    tracing::info!(sub_order_id = %id, shipday_id, "sub-order dispatched");
    Ok(Json(DispatchResponse {
        sub_order_id: id,
        shipday_order_id: shipday_id,
        status: SubOrderStatus::Dispatched,
        order_status,
    }))
}

/// Staff move sub-orders forward; payment is only recorded by the payment webhook.
fn check_staff_transition(from: SubOrderStatus, to: SubOrderStatus) -> Result<(), ApiError> {
    if to == SubOrderStatus::Paid {
        return Err(ApiError::Rejected {
            code: "invalid_transition",
            message: "payment is recorded by the payment provider".into(),
        });
    }
    if !from.can_transition(to) {
        return Err(ApiError::Rejected {
            code: "invalid_transition",
            message: format!("sub-order cannot move from {} to {}", from, to),
        });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: SubOrderStatus,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub sub_order_id: Uuid,
    pub status: SubOrderStatus,
    pub order_status: OrderStatus,
}

/// POST /admin/sub-orders/{id}/status
///
/// Forward-only, same rules as courier webhooks. Cancelling here does not
/// refund; staff credit the wallet separately.
async fn set_status(
    State(state): State<Arc<AppState>>,
    ValidUuid(id): ValidUuid,
    ValidJson(req): ValidJson<StatusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut tx = state.pool.begin().await?;
    let (order, sub) = lifecycle::lock_sub_order(&mut tx, id).await?;
    check_staff_transition(sub.status, req.status)?;
    let order_status = lifecycle::set_sub_order_status(&mut tx, &order, id, req.status).await?;
    tx.commit().await?;

    tracing::info!(sub_order_id = %id, from = %sub.status, to = %req.status, "sub-order status set by staff");
    Ok(Json(StatusResponse {
        sub_order_id: id,
        status: req.status,
        order_status,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/deliveries", get(deliveries))
        .route("/sub-orders/{id}/dispatch", post(dispatch))
        .route("/sub-orders/{id}/status", post(set_status))
}
