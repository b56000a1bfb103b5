//! Menu and plan maintenance. Mounted under `/admin`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use mealdash_core::schedule::DeliveryDays;
use mealdash_core::validation::{bounded, in_range};
use mealdash_core::{Cents, Slug};
use serde::Deserialize;

use crate::db::repos::{MealPlan, MenuItem, MenuItemPatch, MenuRepo, NewMealPlan, NewMenuItem};
use crate::http::error::ApiError;
use crate::http::extractors::{ValidJson, ValidUuid};
use crate::state::AppState;

const MAX_NAME: usize = 120;
const MAX_DESCRIPTION: usize = 2_000;
const MAX_PRICE_CENTS: i64 = 100_000;

fn price(field: &'static str, cents: i64) -> Result<Cents, ApiError> {
    Ok(Cents(in_range(field, cents, 0, MAX_PRICE_CENTS)?))
}

fn count(field: &'static str, n: i32) -> Result<i32, ApiError> {
    Ok(in_range(field, n as i64, 1, 1_000)? as i32)
}

fn description(text: Option<String>) -> Result<Option<String>, ApiError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(Some(bounded("description", &t, MAX_DESCRIPTION)?)),
        _ => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMenuItemRequest {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub cost_per_serving_cents: i64,
    pub servings_per_unit: Option<i32>,
    pub batch_yield: Option<i32>,
    /// Defaults to every day
    pub available_days: Option<DeliveryDays>,
}

impl CreateMenuItemRequest {
    fn validate(self) -> Result<NewMenuItem, ApiError> {
        Ok(NewMenuItem {
            slug: Slug::new(&self.slug)?,
            name: bounded("name", &self.name, MAX_NAME)?,
            description: description(self.description)?,
            price: price("price_cents", self.price_cents)?,
            cost_per_serving: price("cost_per_serving_cents", self.cost_per_serving_cents)?,
            servings_per_unit: count("servings_per_unit", self.servings_per_unit.unwrap_or(1))?,
            batch_yield: count("batch_yield", self.batch_yield.unwrap_or(1))?,
            available_days: self.available_days.unwrap_or(DeliveryDays::ALL),
        })
    }
}

/// POST /admin/menu
async fn create_item(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateMenuItemRequest>,
) -> Result<(StatusCode, Json<MenuItem>), ApiError> {
    let item = MenuRepo::new(&state.pool).create(&req.validate()?).await?;
    tracing::info!(item_id = %item.id, slug = %item.slug, "menu item created");
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMenuItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub cost_per_serving_cents: Option<i64>,
    pub servings_per_unit: Option<i32>,
    pub batch_yield: Option<i32>,
    pub available_days: Option<DeliveryDays>,
    pub active: Option<bool>,
}

impl UpdateMenuItemRequest {
    fn validate(self) -> Result<MenuItemPatch, ApiError> {
        Ok(MenuItemPatch {
            name: self.name.map(|n| bounded("name", &n, MAX_NAME)).transpose()?,
            description: self.description.map(|d| bounded("description", &d, MAX_DESCRIPTION)).transpose()?,
            price: self.price_cents.map(|c| price("price_cents", c)).transpose()?,
            cost_per_serving: self
                .cost_per_serving_cents
                .map(|c| price("cost_per_serving_cents", c))
                .transpose()?,
            servings_per_unit: self.servings_per_unit.map(|n| count("servings_per_unit", n)).transpose()?,
            batch_yield: self.batch_yield.map(|n| count("batch_yield", n)).transpose()?,
            available_days: self.available_days,
            active: self.active,
        })
    }
}

/// PATCH /admin/menu/{id}
async fn update_item(
    State(state): State<Arc<AppState>>,
    ValidUuid(id): ValidUuid,
    ValidJson(req): ValidJson<UpdateMenuItemRequest>,
) -> Result<Json<MenuItem>, ApiError> {
    let item = MenuRepo::new(&state.pool).update(id, &req.validate()?).await?;
    tracing::info!(item_id = %id, active = item.active, "menu item updated");
    Ok(Json(item))
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub slug: String,
    pub name: String,
    pub meals_per_delivery: i32,
    pub servings_per_meal: i32,
    pub price_per_meal_cents: i64,
}

/// POST /admin/plans
async fn create_plan(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreatePlanRequest>,
) -> Result<(StatusCode, Json<MealPlan>), ApiError> {
    let new = NewMealPlan {
        slug: Slug::new(&req.slug)?,
        name: bounded("name", &req.name, MAX_NAME)?,
        meals_per_delivery: count("meals_per_delivery", req.meals_per_delivery)?,
        servings_per_meal: count("servings_per_meal", req.servings_per_meal)?,
        price_per_meal: price("price_per_meal_cents", req.price_per_meal_cents)?,
    };
    let plan = MenuRepo::new(&state.pool).create_plan(&new).await?;
    tracing::info!(plan_id = %plan.id, slug = %plan.slug, "meal plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/menu", post(create_item))
        .route("/menu/{id}", patch(update_item))
        .route("/plans", post(create_plan))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_defaults() {
        let req: CreateMenuItemRequest = serde_json::from_str(
            r#"{"slug":"green-curry","name":"  Green Curry ","price_cents":1299}"#,
        )
        .unwrap();
        let item = req.validate().unwrap();
        assert_eq!(item.name, "Green Curry");
        assert_eq!(item.servings_per_unit, 1);
        assert_eq!(item.available_days, DeliveryDays::ALL);
        assert_eq!(item.cost_per_serving, Cents(0));
    }

    #[test]
    fn rejects_negative_price_and_zero_yield() {
        let req: CreateMenuItemRequest =
            serde_json::from_str(r#"{"slug":"soup","name":"Soup","price_cents":-5}"#).unwrap();
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));

        let patch = UpdateMenuItemRequest {
            batch_yield: Some(0),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let patch = UpdateMenuItemRequest::default().validate().unwrap();
        assert!(patch.name.is_none() && patch.price.is_none() && patch.active.is_none());
    }
}
