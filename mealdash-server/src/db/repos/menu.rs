//! Menu items and meal plans

use chrono::{DateTime, Utc, Weekday};
use mealdash_core::schedule::DeliveryDays;
use mealdash_core::{Cents, Slug};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::db::DbError;

#[derive(Debug, Clone, FromRow)]
struct MenuItemRow {
    id: Uuid,
    slug: String,
    name: String,
    description: Option<String>,
    price_cents: i64,
    cost_per_serving_cents: i64,
    servings_per_unit: i32,
    batch_yield: i32,
    available_days: i16,
    active: bool,
    created_at: DateTime<Utc>,
}

/// Dish on the menu
#[derive(Debug, Clone, Serialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Cents,
    pub cost_per_serving: Cents,
    pub servings_per_unit: i32,
    pub batch_yield: i32,
    pub available_days: DeliveryDays,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<MenuItemRow> for MenuItem {
    fn from(r: MenuItemRow) -> Self {
        Self {
            id: r.id,
            slug: r.slug,
            name: r.name,
            description: r.description,
            price: Cents(r.price_cents),
            cost_per_serving: Cents(r.cost_per_serving_cents),
            servings_per_unit: r.servings_per_unit,
            batch_yield: r.batch_yield,
            available_days: DeliveryDays::from_bits(r.available_days),
            active: r.active,
            created_at: r.created_at,
        }
    }
}

/// Fields for a new menu item
#[derive(Debug, Clone)]
pub struct NewMenuItem {
    pub slug: Slug,
    pub name: String,
    pub description: Option<String>,
    pub price: Cents,
    pub cost_per_serving: Cents,
    pub servings_per_unit: i32,
    pub batch_yield: i32,
    pub available_days: DeliveryDays,
}

/// Partial update; `None` leaves a column unchanged
#[derive(Debug, Clone, Default)]
pub struct MenuItemPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Cents>,
    pub cost_per_serving: Option<Cents>,
    pub servings_per_unit: Option<i32>,
    pub batch_yield: Option<i32>,
    pub available_days: Option<DeliveryDays>,
    pub active: Option<bool>,
}

const MENU_COLUMNS: &str = "id, slug, name, description, price_cents, cost_per_serving_cents, \
    servings_per_unit, batch_yield, available_days, active, created_at";

/// Meal plan a subscription is built on
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MealPlan {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub meals_per_delivery: i32,
    pub servings_per_meal: i32,
    pub price_per_meal_cents: i64,
    pub active: bool,
}

impl MealPlan {
    pub fn price_per_meal(&self) -> Cents {
        Cents(self.price_per_meal_cents)
    }
}

/// Fields for a new plan
#[derive(Debug, Clone)]
pub struct NewMealPlan {
    pub slug: Slug,
    pub name: String,
    pub meals_per_delivery: i32,
    pub servings_per_meal: i32,
    pub price_per_meal: Cents,
}

pub struct MenuRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> MenuRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active items, optionally only those offered on `day`.
    pub async fn list_active(&self, day: Option<Weekday>) -> Result<Vec<MenuItem>, DbError> {
        let mask: Option<i16> = day.map(|d| DeliveryDays::from_weekdays(&[d]).bits());
        let rows = sqlx::query_as::<_, MenuItemRow>(&format!(
            r#"
            SELECT {MENU_COLUMNS}
            FROM menu_items
            WHERE active AND ($1::smallint IS NULL OR available_days & $1 <> 0)
            ORDER BY name
            "#
        ))
        .bind(mask)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(MenuItem::from).collect())
    }

    pub async fn create(&self, new: &NewMenuItem) -> Result<MenuItem, DbError> {
        let row = sqlx::query_as::<_, MenuItemRow>(&format!(
            r#"
            INSERT INTO menu_items
                (slug, name, description, price_cents, cost_per_serving_cents,
                 servings_per_unit, batch_yield, available_days)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {MENU_COLUMNS}
            "#
        ))
        .bind(new.slug.as_str())
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price.get())
        .bind(new.cost_per_serving.get())
        .bind(new.servings_per_unit)
        .bind(new.batch_yield)
        .bind(new.available_days.bits())
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::on_unique(e, "menu item slug already exists"))?;
        Ok(row.into())
    }

    pub async fn update(&self, id: Uuid, patch: &MenuItemPatch) -> Result<MenuItem, DbError> {
        let row = sqlx::query_as::<_, MenuItemRow>(&format!(
            r#"
            UPDATE menu_items SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                cost_per_serving_cents = COALESCE($5, cost_per_serving_cents),
                servings_per_unit = COALESCE($6, servings_per_unit),
                batch_yield = COALESCE($7, batch_yield),
                available_days = COALESCE($8, available_days),
                active = COALESCE($9, active)
            WHERE id = $1
            RETURNING {MENU_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(patch.price.map(Cents::get))
        .bind(patch.cost_per_serving.map(Cents::get))
        .bind(patch.servings_per_unit)
        .bind(patch.batch_yield)
        .bind(patch.available_days.map(|d| d.bits()))
        .bind(patch.active)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("menu item", id))?;
        Ok(row.into())
    }

    pub async fn list_plans(&self) -> Result<Vec<MealPlan>, DbError> {
        let plans = sqlx::query_as::<_, MealPlan>(
            r#"
            SELECT id, slug, name, meals_per_delivery, servings_per_meal, price_per_meal_cents, active
            FROM meal_plans
            WHERE active
            ORDER BY price_per_meal_cents
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(plans)
    }

    pub async fn create_plan(&self, new: &NewMealPlan) -> Result<MealPlan, DbError> {
        sqlx::query_as::<_, MealPlan>(
            r#"
            INSERT INTO meal_plans (slug, name, meals_per_delivery, servings_per_meal, price_per_meal_cents)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, slug, name, meals_per_delivery, servings_per_meal, price_per_meal_cents, active
            "#,
        )
        .bind(new.slug.as_str())
        .bind(&new.name)
        .bind(new.meals_per_delivery)
        .bind(new.servings_per_meal)
        .bind(new.price_per_meal.get())
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::on_unique(e, "meal plan slug already exists"))
    }
}

/// Load the given items (any order, missing ids simply absent).
pub async fn fetch_items(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<MenuItem>, DbError> {
    let rows = sqlx::query_as::<_, MenuItemRow>(&format!(
        "SELECT {MENU_COLUMNS} FROM menu_items WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(MenuItem::from).collect())
}

pub async fn fetch_plan(conn: &mut PgConnection, id: Uuid) -> Result<MealPlan, DbError> {
    sqlx::query_as::<_, MealPlan>(
        r#"
        SELECT id, slug, name, meals_per_delivery, servings_per_meal, price_per_meal_cents, active
        FROM meal_plans WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DbError::not_found("meal plan", id))
}
