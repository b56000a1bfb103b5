//! Kitchen prep sheet. Mounted under `/admin`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use mealdash_core::servings::{prep_sheet, PrepSheet};

use super::admin_orders::DateQuery;
use super::local_today;
use crate::db::repos::KitchenRepo;
use crate::http::error::ApiError;
use crate::state::AppState;

/// GET /admin/kitchen/prep?date=
async fn prep(State(state): State<Arc<AppState>>, Query(q): Query<DateQuery>) -> Result<Json<PrepSheet>, ApiError> {
    let date = match q.date {
        Some(d) => d,
        None => local_today(state.business().await?.tz()?),
    };
    let rows = KitchenRepo::new(&state.pool).prep_rows(date).await?;
    let sheet = prep_sheet(date, &rows);
    tracing::debug!(%date, lines = sheet.lines.len(), servings = sheet.total_servings, "prep sheet built");
    Ok(Json(sheet))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/kitchen/prep", get(prep))
}
