//! Runtime business settings. Mounted under `/admin`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::db::repos::{Setting, SettingsRepo};
use crate::http::error::ApiError;
use crate::http::extractors::ValidJson;
use crate::state::AppState;

/// GET /admin/settings - effective value of every known key
async fn list_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<&'static str, serde_json::Value>>, ApiError> {
    let snapshot = SettingsRepo::new(&state.pool)
        .snapshot(&state.config.business)
        .await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct PutSettingRequest {
    pub value: serde_json::Value,
}

/// PUT /admin/settings/{key}
async fn put_setting(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    ValidJson(req): ValidJson<PutSettingRequest>,
) -> Result<Json<Setting>, ApiError> {
    let setting = SettingsRepo::new(&state.pool)
        .put(&state.config.business, &key, req.value)
        .await?;
    Ok(Json(setting))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/settings", get(list_settings))
        .route("/settings/{key}", put(put_setting))
}

#[cfg(test)]
mod tests {
    use crate::http::build_router;
    use crate::http::routes::testing::{lazy_state, post};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn unknown_key_is_refused_before_touching_the_database() {
        let app = build_router(lazy_state());
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/admin/settings/tax_rate")
            .header(header::AUTHORIZATION, "Bearer admin-secret")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"value":8}"#))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn settings_are_not_postable() {
        let app = build_router(lazy_state());
        let res = app
            .oneshot(post("/admin/settings/order_cutoff_hours", Some("admin-secret"), r#"{"value":24}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
