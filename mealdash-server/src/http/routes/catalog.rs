//! Menu and meal-plan browsing

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::db::repos::{MealPlan, MenuItem, MenuRepo};
use crate::http::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MenuQuery {
    /// Only dishes offered on this date's weekday
    pub date: Option<NaiveDate>,
}

/// GET /menu?date=YYYY-MM-DD
async fn menu(State(state): State<Arc<AppState>>, Query(q): Query<MenuQuery>) -> Result<Json<Vec<MenuItem>>, ApiError> {
    let items = MenuRepo::new(&state.pool)
        .list_active(q.date.map(|d| d.weekday()))
        .await?;
    Ok(Json(items))
}

/// GET /plans
async fn plans(State(state): State<Arc<AppState>>) -> Result<Json<Vec<MealPlan>>, ApiError> {
    Ok(Json(MenuRepo::new(&state.pool).list_plans().await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/menu", get(menu)).route("/plans", get(plans))
}

#[cfg(test)]
mod tests {
    use crate::http::build_router;
    use crate::http::routes::testing::{get, lazy_state};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn malformed_date_is_400() {
        let app = build_router(lazy_state());
        let res = app
            .oneshot(get("/menu?date=next-tuesday", Some("storefront-secret")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
