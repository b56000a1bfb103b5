//! Coupon management. Mounted under `/admin`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use mealdash_core::{Cents, Coupon, CouponCode, CouponScope, DiscountKind};
use serde::Deserialize;

use crate::db::repos::CouponRepo;
use crate::http::error::ApiError;
use crate::http::extractors::{ValidCouponCode, ValidJson};
use crate::models::{Page, Paginated};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CouponListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(default)]
    pub active_only: bool,
}

/// GET /admin/coupons
async fn list_coupons(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CouponListQuery>,
) -> Result<Json<Paginated<Coupon>>, ApiError> {
    let page = Page::new(q.page.unwrap_or(1), q.per_page.unwrap_or(25));
    Ok(Json(CouponRepo::new(&state.pool).list(page, q.active_only).await?))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub description: Option<String>,
    pub discount_kind: DiscountKind,
    /// Percent (1-100) or cents, depending on `discount_kind`
    pub discount_value: i64,
    #[serde(default)]
    pub scope: CouponScope,
    pub min_subtotal_cents: Option<i64>,
    pub max_redemptions: Option<i32>,
    pub per_customer_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl CreateCouponRequest {
    fn into_coupon(self) -> Result<Coupon, ApiError> {
        let coupon = Coupon {
            code: CouponCode::new(&self.code)?,
            description: self.description,
            discount_kind: self.discount_kind,
            discount_value: self.discount_value,
            scope: self.scope,
            min_subtotal: self.min_subtotal_cents.map(Cents),
            max_redemptions: self.max_redemptions,
            per_customer_limit: self.per_customer_limit,
            redemptions: 0,
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            active: self.active,
        };
        coupon.check_definition()?;
        Ok(coupon)
    }
}

/// POST /admin/coupons
async fn create_coupon(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    let coupon = CouponRepo::new(&state.pool).create(&req.into_coupon()?).await?;
    tracing::info!(code = %coupon.code, "coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// GET /admin/coupons/{code}
async fn get_coupon(
    State(state): State<Arc<AppState>>,
    ValidCouponCode(code): ValidCouponCode,
) -> Result<Json<Coupon>, ApiError> {
    Ok(Json(CouponRepo::new(&state.pool).get(&code).await?))
}

/// Fields to change; absent fields keep their value. Nullable limits use
/// `Some(None)` to clear.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCouponRequest {
    pub description: Option<String>,
    pub discount_kind: Option<DiscountKind>,
    pub discount_value: Option<i64>,
    pub scope: Option<CouponScope>,
    #[serde(default, with = "nullable")]
    pub min_subtotal_cents: Option<Option<i64>>,
    #[serde(default, with = "nullable")]
    pub max_redemptions: Option<Option<i32>>,
    #[serde(default, with = "nullable")]
    pub per_customer_limit: Option<Option<i32>>,
    #[serde(default, with = "nullable")]
    pub starts_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "nullable")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub active: Option<bool>,
}

/// Distinguish a missing field from an explicit `null`.
mod nullable {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(d: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(d).map(Some)
    }
}

impl UpdateCouponRequest {
    fn apply(self, coupon: &mut Coupon) {
        if let Some(v) = self.description {
            coupon.description = Some(v);
        }
        if let Some(v) = self.discount_kind {
            coupon.discount_kind = v;
        }
        if let Some(v) = self.discount_value {
            coupon.discount_value = v;
        }
        if let Some(v) = self.scope {
            coupon.scope = v;
        }
        if let Some(v) = self.min_subtotal_cents {
            coupon.min_subtotal = v.map(Cents);
        }
        if let Some(v) = self.max_redemptions {
            coupon.max_redemptions = v;
        }
        if let Some(v) = self.per_customer_limit {
            coupon.per_customer_limit = v;
        }
        if let Some(v) = self.starts_at {
            coupon.starts_at = v;
        }
        if let Some(v) = self.expires_at {
            coupon.expires_at = v;
        }
        if let Some(v) = self.active {
            coupon.active = v;
        }
    }
}

/// PATCH /admin/coupons/{code}
async fn update_coupon(
    State(state): State<Arc<AppState>>,
    ValidCouponCode(code): ValidCouponCode,
    ValidJson(req): ValidJson<UpdateCouponRequest>,
) -> Result<Json<Coupon>, ApiError> {
    let repo = CouponRepo::new(&state.pool);
    let mut coupon = repo.get(&code).await?;
    req.apply(&mut coupon);
    coupon.check_definition()?;
    let saved = repo.save(&coupon).await?;
    tracing::info!(code = %saved.code, active = saved.active, "coupon updated");
    Ok(Json(saved))
}

/// DELETE /admin/coupons/{code} - deactivates; redemption history stays
async fn delete_coupon(
    State(state): State<Arc<AppState>>,
    ValidCouponCode(code): ValidCouponCode,
) -> Result<StatusCode, ApiError> {
    CouponRepo::new(&state.pool).deactivate(&code).await?;
    tracing::info!(code = %code, "coupon deactivated");
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route(
            "/coupons/{code}",
            get(get_coupon).patch(update_coupon).delete(delete_coupon),
        )
}
