//! Storefront coupon check

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use mealdash_core::coupon::{self, CouponContext, CouponQuote};
use mealdash_core::{Cents, CouponCode, OrderKind};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repos::CouponRepo;
use crate::http::error::ApiError;
use crate::http::extractors::ValidJson;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub customer_id: Uuid,
    pub subtotal_cents: i64,
    #[serde(default)]
    pub order_kind: OrderKind,
}

/// POST /coupons/validate
///
/// Answers with the discount the coupon would give; nothing is reserved.
/// Checkout repeats the check and takes the redemption atomically.
async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<ValidateCouponRequest>,
) -> Result<Json<CouponQuote>, ApiError> {
    let code = CouponCode::new(&req.code)?;
    let repo = CouponRepo::new(&state.pool);
    let found = repo.get(&code).await?;
    let used = repo.customer_redemptions(&code, req.customer_id).await?;

    let ctx = CouponContext {
        now: Utc::now(),
        subtotal: Cents(req.subtotal_cents.max(0)),
        order_kind: req.order_kind,
        customer_redemptions: used,
    };
    let quote = coupon::validate(&found, &ctx)?;
    tracing::debug!(code = %code, discount = %quote.discount, "coupon validated");
    Ok(Json(quote))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/coupons/validate", post(validate_coupon))
}

#[cfg(test)]
mod tests {
    use crate::http::build_router;
    use crate::http::routes::testing::{lazy_state, post};
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn malformed_code_fails_validation() {
        let app = build_router(lazy_state());
        let body = r#"{"code":"!","customer_id":"00000000-0000-0000-0000-000000000000","subtotal_cents":1000}"#;
        let res = app
            .oneshot(post("/coupons/validate", Some("storefront-secret"), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "validation_error");
    }
}
