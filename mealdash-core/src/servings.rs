//! Serving and cost calculation for kitchen prep

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::money::Cents;

/// Servings the kitchen cooks for one order line.
///
/// Subscription plans can scale every meal (e.g. a family plan at 4
/// servings per meal); one-time orders pass `None`. Saturates at `i32::MAX`.
pub fn servings_for(quantity: i32, servings_per_unit: i32, plan_servings_per_meal: Option<i32>) -> i32 {
    quantity
        .max(0)
        .saturating_mul(servings_per_unit.max(1))
        .saturating_mul(plan_servings_per_meal.unwrap_or(1).max(1))
}

/// Batches needed to cover `servings` when one batch yields `batch_yield`.
pub fn batches(servings: i32, batch_yield: i32) -> i32 {
    if servings <= 0 {
        return 0;
    }
    let y = batch_yield.max(1);
    (servings + y - 1) / y
}

/// One order item as read for a prep date
#[derive(Debug, Clone)]
pub struct PrepRow {
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub servings: i32,
    pub unit_price: Cents,
    pub cost_per_serving: Cents,
    pub batch_yield: i32,
}

/// Aggregated kitchen line for one menu item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrepLine {
    pub menu_item_id: Uuid,
    pub name: String,
    pub units: i32,
    pub servings: i32,
    pub batches: i32,
    pub ingredient_cost: Cents,
    pub revenue: Cents,
    pub margin: Cents,
}

impl PrepLine {
    /// Margin as a percentage of revenue; `None` when nothing was sold.
    pub fn margin_percent(&self) -> Option<f64> {
        if self.revenue.is_zero() {
            return None;
        }
        Some(self.margin.get() as f64 * 100.0 / self.revenue.get() as f64)
    }
}

/// Kitchen prep sheet for a single date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrepSheet {
    pub date: NaiveDate,
    pub lines: Vec<PrepLine>,
    pub total_servings: i32,
    pub total_cost: Cents,
    pub total_revenue: Cents,
    pub total_margin: Cents,
}

/// Aggregate order items into a prep sheet, one line per menu item, sorted
/// by item name.
pub fn prep_sheet(date: NaiveDate, rows: &[PrepRow]) -> PrepSheet {
    let mut by_item: BTreeMap<Uuid, PrepLine> = BTreeMap::new();
    let mut yields: BTreeMap<Uuid, i32> = BTreeMap::new();

    for row in rows {
        let line = by_item.entry(row.menu_item_id).or_insert_with(|| PrepLine {
            menu_item_id: row.menu_item_id,
            name: row.name.clone(),
            units: 0,
            servings: 0,
            batches: 0,
            ingredient_cost: Cents::ZERO,
            revenue: Cents::ZERO,
            margin: Cents::ZERO,
        });
        line.units += row.quantity;
        line.servings += row.servings;
        line.ingredient_cost += row.cost_per_serving * row.servings as i64;
        line.revenue += row.unit_price * row.quantity as i64;
        yields.insert(row.menu_item_id, row.batch_yield);
    }

    let mut lines: Vec<PrepLine> = by_item
        .into_values()
        .map(|mut line| {
            let y = yields.get(&line.menu_item_id).copied().unwrap_or(1);
            line.batches = batches(line.servings, y);
            line.margin = line.revenue - line.ingredient_cost;
            line
        })
        .collect();
    lines.sort_by(|a, b| a.name.cmp(&b.name));

    PrepSheet {
        date,
        total_servings: lines.iter().map(|l| l.servings).sum(),
        total_cost: lines.iter().map(|l| l.ingredient_cost).sum(),
        total_revenue: lines.iter().map(|l| l.revenue).sum(),
        total_margin: lines.iter().map(|l| l.margin).sum(),
        lines,
    }
}
