//! Meal-plan subscriptions: sign-up, status, and day switching

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use mealdash_core::schedule::{plan_switch, DaySwitch, DeliveryDays, ScheduledDelivery, SwitchPolicy};
use mealdash_core::{Fulfillment, SubscriptionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::local_today;
use crate::db::repos::{
    customers, menu, orders, subscriptions, MealPlan, NewSubscription, OrderRepo, SubOrder, Subscription,
    SubscriptionRepo,
};
use crate::http::error::ApiError;
use crate::http::extractors::{ValidJson, ValidUuid};
use crate::integrations::email;
use crate::lifecycle;
use crate::state::AppState;

/// How far ahead `GET /subscriptions/{id}` looks
const SCHEDULE_WEEKS: u32 = 4;

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_id: Uuid,
    pub plan_id: Uuid,
    /// e.g. "mon,thu"
    pub delivery_days: DeliveryDays,
    #[serde(default)]
    pub fulfillment: Fulfillment,
    pub address: Option<String>,
}

/// POST /subscriptions
async fn create_subscription(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    let business = state.business().await?;
    if req.delivery_days.is_empty() {
        return Err(mealdash_core::ValidationError::Empty { field: "delivery_days" }.into());
    }
    if !req.delivery_days.is_subset_of(business.delivery_days) {
        return Err(ApiError::Rejected {
            code: "day_not_offered",
            message: format!("deliveries are only offered on {}", business.delivery_days),
        });
    }

    let mut conn = state.pool.acquire().await?;
    let customer = customers::fetch(&mut conn, req.customer_id).await?;
    let plan = menu::fetch_plan(&mut conn, req.plan_id).await?;
    if !plan.active {
        return Err(ApiError::Rejected {
            code: "plan_unavailable",
            message: format!("the {} plan is no longer offered", plan.name),
        });
    }
    let address = req
        .address
        .filter(|a| !a.trim().is_empty())
        .or(customer.address);
    if req.fulfillment == Fulfillment::Delivery && address.is_none() {
        return Err(mealdash_core::ValidationError::Empty { field: "address" }.into());
    }
    drop(conn);

    let sub = SubscriptionRepo::new(&state.pool)
        .create(&NewSubscription {
            customer_id: customer.id,
            plan_id: plan.id,
            delivery_days: req.delivery_days,
            fulfillment: req.fulfillment,
            address,
        })
        .await?;
    tracing::info!(subscription_id = %sub.id, plan = %plan.slug, days = %sub.delivery_days, "subscription created");
    Ok((StatusCode::CREATED, Json(sub)))
}

#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub plan: MealPlan,
    /// Dates this subscription delivers on over the next weeks
    pub upcoming_dates: Vec<NaiveDate>,
    /// Deliveries already ordered in that window
    pub scheduled: Vec<SubOrder>,
}

/// GET /subscriptions/{id}
async fn get_subscription(
    State(state): State<Arc<AppState>>,
    ValidUuid(id): ValidUuid,
) -> Result<Json<SubscriptionView>, ApiError> {
    let business = state.business().await?;
    let today = local_today(business.tz()?);
    let end = today + Duration::weeks(SCHEDULE_WEEKS as i64);

    let subscription = SubscriptionRepo::new(&state.pool).get(id).await?;
    let plan = {
        let mut conn = state.pool.acquire().await?;
        menu::fetch_plan(&mut conn, subscription.plan_id).await?
    };
    let scheduled = OrderRepo::new(&state.pool)
        .subscription_schedule(id, today, end)
        .await?;
    let upcoming_dates = match subscription.status {
        SubscriptionStatus::Active => subscription.delivery_days.upcoming(today, SCHEDULE_WEEKS),
        _ => Vec::new(),
    };

    Ok(Json(SubscriptionView {
        subscription,
        plan,
        upcoming_dates,
        scheduled,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SwitchDayRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// POST /subscriptions/{id}/switch-day
async fn switch_day(
    State(state): State<Arc<AppState>>,
    ValidUuid(id): ValidUuid,
    ValidJson(req): ValidJson<SwitchDayRequest>,
) -> Result<Json<DaySwitch>, ApiError> {
    let business = state.business().await?;
    let policy = SwitchPolicy {
        allowed_days: business.delivery_days,
        cutoff_hours: business.order_cutoff_hours,
        tz: business.tz()?,
    };

    let mut tx = state.pool.begin().await?;
    let sub = subscriptions::fetch_for_update(&mut tx, id).await?;
    if sub.status != SubscriptionStatus::Active {
        return Err(ApiError::Rejected {
            code: "subscription_inactive",
            message: format!("subscription is {}", sub.status),
        });
    }

    // Both dates must share an ISO week, so a week either side covers it
    let window_start = req.from.min(req.to) - Duration::days(7);
    let window_end = req.from.max(req.to) + Duration::days(7);
    let deliveries = lifecycle::lock_subscription_deliveries(&mut tx, id, window_start, window_end).await?;
    let scheduled: Vec<ScheduledDelivery> = deliveries
        .iter()
        .map(|d| ScheduledDelivery {
            date: d.delivery_date,
            locked: d.status.is_locked(),
        })
        .collect();

    let switch = plan_switch(req.from, req.to, &scheduled, &policy, Utc::now())?;
    for delivery in deliveries.iter().filter(|d| d.delivery_date == switch.from) {
        orders::reschedule(&mut tx, delivery.id, switch.to).await?;
    }
    let customer = customers::fetch(&mut tx, sub.customer_id).await?;
    tx.commit().await?;

    tracing::info!(subscription_id = %id, from = %switch.from, to = %switch.to, "delivery day switched");
    let message = email::day_switched(&business.name, &customer.email, &switch);
    if let Err(e) = state.mailer.send(&message).await {
        tracing::warn!(subscription_id = %id, error = %e, "day switch email failed");
    }
    Ok(Json(switch))
}

/// POST /subscriptions/{id}/{pause|resume|cancel}
async fn change_status(
    State(state): State<Arc<AppState>>,
    Path((id, action)): Path<(Uuid, String)>,
) -> Result<Json<Subscription>, ApiError> {
    let to = match action.as_str() {
        "pause" => SubscriptionStatus::Paused,
        "resume" => SubscriptionStatus::Active,
        "cancel" => SubscriptionStatus::Cancelled,
        other => {
            return Err(ApiError::NotFound {
                resource: "subscription action",
                id: other.to_owned(),
            })
        }
    };
    let sub = SubscriptionRepo::new(&state.pool).set_status(id, to).await?;
    tracing::info!(subscription_id = %id, status = %sub.status, "subscription status changed");
    Ok(Json(sub))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/subscriptions", post(create_subscription))
        .route("/subscriptions/{id}", get(get_subscription))
        .route("/subscriptions/{id}/switch-day", post(switch_day))
        .route("/subscriptions/{id}/{action}", post(change_status))
}

#[cfg(test)]
mod tests {
    use crate::http::build_router;
    use crate::http::routes::testing::{lazy_state, post};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn bad_day_list_is_rejected() {
        let app = build_router(lazy_state());
        let body = r#"{
            "customer_id": "00000000-0000-0000-0000-000000000000",
            "plan_id": "00000000-0000-0000-0000-000000000000",
            "delivery_days": "mon,funday"
        }"#;
        let res = app
            .oneshot(post("/subscriptions", Some("storefront-secret"), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "bad_request");
        assert!(json["message"].as_str().unwrap().contains("funday"));
    }

    #[tokio::test]
    async fn malformed_body_is_json_400() {
        let app = build_router(lazy_state());
        let res = app
            .oneshot(post("/subscriptions", Some("storefront-secret"), "{not json"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "bad_request");
    }
}
