//! Inbound webhooks from Stripe and Shipday
//!
//! Both endpoints authenticate the sender themselves instead of using the
//! storefront or admin token. Events we cannot match to a row are
//! acknowledged with 200 so the provider stops retrying.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use mealdash_core::status::apply_event;
use mealdash_core::{ShipdayEvent, Transition};
use serde::Serialize;
use uuid::Uuid;

use crate::checkout::send_confirmation;
use crate::db::repos::{customers, orders, webhooks};
use crate::db::DbError;
use crate::http::error::ApiError;
use crate::http::extractors::tokens_match;
use crate::integrations::shipday::ShipdayWebhook;
use crate::integrations::stripe::{verify_signature, StripeEvent};
use crate::lifecycle::{self, PaymentOutcome};
use crate::state::AppState;

const STRIPE_SIGNATURE: &str = "stripe-signature";
const SHIPDAY_TOKEN: &str = "token";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl WebhookAck {
    fn new(status: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: status.into(),
            detail: None,
        })
    }

    fn ignored(detail: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "ignored".into(),
            detail: Some(detail.into()),
        })
    }
}

/// POST /webhooks/stripe
async fn stripe(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookAck>, ApiError> {
    let Some(secret) = state.config.stripe.webhook_secret.as_deref() else {
        tracing::warn!("stripe webhook received but no webhook secret is configured");
        return Err(ApiError::Unauthorized);
    };
    let signature = headers
        .get(STRIPE_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    verify_signature(
        signature,
        &body,
        secret,
        state.config.stripe.signature_tolerance_secs,
        Utc::now().timestamp(),
    )?;
    let event = StripeEvent::parse(&body)?;

    let mut tx = state.pool.begin().await?;
    if !webhooks::record_event(&mut tx, "stripe", &event.id).await? {
        tracing::debug!(event_id = %event.id, "duplicate stripe event");
        return Ok(WebhookAck::new("duplicate"));
    }

    let intent_id = &event.data.object.id;
    let succeeded = match event.kind.as_str() {
        "payment_intent.succeeded" => true,
        "payment_intent.payment_failed" => false,
        other => {
            tx.commit().await?;
            return Ok(WebhookAck::ignored(format!("event type {}", other)));
        }
    };

    let Some(order) = orders::find_by_payment_intent(&mut tx, intent_id).await? else {
        tracing::warn!(event_id = %event.id, intent = %intent_id, "payment intent matches no order");
        tx.commit().await?;
        return Ok(WebhookAck::ignored("unknown payment intent"));
    };

    let outcome = if succeeded {
        lifecycle::mark_paid(&mut tx, &order).await?
    } else {
        let reason = event
            .data
            .object
            .last_payment_error
            .as_ref()
            .and_then(|e| e.message.as_deref());
        lifecycle::mark_payment_failed(&mut tx, &order, reason).await?
    };
    let customer = customers::fetch(&mut tx, order.customer_id).await?;
    tx.commit().await?;

    tracing::info!(event_id = %event.id, order_id = %order.id, kind = %event.kind, outcome = outcome.as_str(), "stripe event applied");
    if succeeded && outcome == PaymentOutcome::Applied {
        let business = state.business().await?;
        send_confirmation(&state, &business.name, &customer.email, order.id).await;
    }
    Ok(WebhookAck::new(outcome.as_str()))
}

/// Find the sub-order a Shipday event is about: by courier id first, then by
/// the order number we sent, which is the sub-order id.
async fn resolve_sub_order(state: &AppState, hook: &ShipdayWebhook) -> Result<Option<Uuid>, ApiError> {
    let mut conn = state.pool.acquire().await?;
    if let Some(shipday_id) = hook.order.id {
        if let Some(sub) = orders::sub_order_by_shipday_id(&mut conn, shipday_id).await? {
            return Ok(Some(sub.id));
        }
    }
    Ok(hook
        .order
        .order_number
        .as_deref()
        .and_then(|n| Uuid::parse_str(n.trim()).ok()))
}

/// POST /webhooks/shipday
async fn shipday(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookAck>, ApiError> {
    let expected = state
        .config
        .shipday
        .webhook_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;
    let given = headers
        .get(SHIPDAY_TOKEN)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if !tokens_match(given, expected) {
        return Err(ApiError::Unauthorized);
    }

    let hook = ShipdayWebhook::parse(&body)?;
    let event = ShipdayEvent::parse(&hook.event);

    let Some(sub_order_id) = resolve_sub_order(&state, &hook).await? else {
        tracing::warn!(event = %hook.event, shipday_id = ?hook.order.id, "shipday event for unknown order");
        return Ok(WebhookAck::ignored("unknown order"));
    };

    let mut tx = state.pool.begin().await?;
    let (order, sub) = match lifecycle::lock_sub_order(&mut tx, sub_order_id).await {
        Ok(found) => found,
        Err(DbError::NotFound { .. }) => {
            tracing::warn!(event = %hook.event, %sub_order_id, "shipday event for unknown sub-order");
            return Ok(WebhookAck::ignored("unknown order"));
        }
        Err(e) => return Err(e.into()),
    };

    match apply_event(sub.status, &event) {
        Transition::Applied(to) => {
            let order_status = lifecycle::set_sub_order_status(&mut tx, &order, sub.id, to).await?;
            tx.commit().await?;
            tracing::info!(sub_order_id = %sub.id, from = %sub.status, %to, %order_status, "delivery status updated");
            Ok(WebhookAck::new(to.as_str()))
        }
        Transition::Ignored(reason) => {
            tracing::debug!(sub_order_id = %sub.id, event = %hook.event, %reason, "shipday event ignored");
            Ok(WebhookAck::ignored(reason))
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhooks/stripe", post(stripe))
        .route("/webhooks/shipday", post(shipday))
}

#[cfg(test)]
mod tests {
    use crate::http::build_router;
    use crate::http::routes::testing::lazy_state;
    use crate::integrations::stripe::sign;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn hook(uri: &str, header: (&str, &str), body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(header.0, header.1)
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn stripe_rejects_bad_signature() {
        let app = build_router(lazy_state());
        let body = r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let header = sign(body.as_bytes(), "whsec_wrong", chrono::Utc::now().timestamp());
        let res = app
            .oneshot(hook("/webhooks/stripe", ("stripe-signature", &header), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stripe_requires_signature_header() {
        let app = build_router(lazy_state());
        let res = app
            .oneshot(hook("/webhooks/stripe", ("x-other", "1"), "{}"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stripe_signed_garbage_is_400() {
        let app = build_router(lazy_state());
        let body = "not json";
        let header = sign(body.as_bytes(), "whsec_test", chrono::Utc::now().timestamp());
        let res = app
            .oneshot(hook("/webhooks/stripe", ("stripe-signature", &header), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn shipday_rejects_wrong_token() {
        let app = build_router(lazy_state());
        let body = r#"{"event":"ORDER_COMPLETED","order":{"id":42}}"#;
        let res = app
            .oneshot(hook("/webhooks/shipday", ("token", "nope"), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn shipday_malformed_body_is_400() {
        let app = build_router(lazy_state());
        let res = app
            .oneshot(hook("/webhooks/shipday", ("token", "ship-token"), r#"{"event":1}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
