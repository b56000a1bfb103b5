//! Print the kitchen prep sheet for a date.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use mealdash_core::servings::{prep_sheet, PrepSheet};
use mealdash_core::MealdashConfig;
use mealdash_server::db::KitchenRepo;

#[derive(Parser, Debug)]
pub struct PrepArgs {
    /// Delivery date (YYYY-MM-DD); defaults to today in the business timezone
    #[arg(long, short = 'd')]
    pub date: Option<NaiveDate>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run_prep(args: PrepArgs, config: &MealdashConfig) -> Result<()> {
    let date = match args.date {
        Some(d) => d,
        None => {
            let tz = config.business.tz().context("Invalid business timezone")?;
            Utc::now().with_timezone(&tz).date_naive()
        }
    };

    let pool = super::connect(config).await?;
    let rows = KitchenRepo::new(&pool)
        .prep_rows(date)
        .await
        .with_context(|| format!("Failed to load order items for {}", date))?;
    let sheet = prep_sheet(date, &rows);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sheet)?);
    } else {
        print!("{}", render(&sheet));
    }
    Ok(())
}

fn render(sheet: &PrepSheet) -> String {
    let mut out = format!("Prep sheet for {}\n\n", sheet.date.format("%A %Y-%m-%d"));
    if sheet.lines.is_empty() {
        out.push_str("Nothing to cook.\n");
        return out;
    }

    out.push_str(&format!(
        "{:<32} {:>6} {:>9} {:>8} {:>11} {:>11} {:>7}\n",
        "item", "units", "servings", "batches", "cost", "revenue", "margin"
    ));
    for line in &sheet.lines {
        let margin = line
            .margin_percent()
            .map(|p| format!("{:.0}%", p))
            .unwrap_or_else(|| "-".into());
        out.push_str(&format!(
            "{:<32} {:>6} {:>9} {:>8} {:>11} {:>11} {:>7}\n",
            truncate(&line.name, 32),
            line.units,
            line.servings,
            line.batches,
            line.ingredient_cost.to_string(),
            line.revenue.to_string(),
            margin
        ));
    }
    out.push_str(&format!(
        "\n{} servings, cost {}, revenue {}, margin {}\n",
        sheet.total_servings, sheet.total_cost, sheet.total_revenue, sheet.total_margin
    ));
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let cut: String = s.chars().take(max - 1).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealdash_core::servings::PrepRow;
    use mealdash_core::Cents;
    use uuid::Uuid;

    #[test]
    fn renders_lines_and_totals() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let rows = vec![PrepRow {
            menu_item_id: Uuid::nil(),
            name: "Chili".into(),
            quantity: 3,
            servings: 6,
            unit_price: Cents(1_200),
            cost_per_serving: Cents(150),
            batch_yield: 4,
        }];
        let text = render(&prep_sheet(date, &rows));
        assert!(text.contains("Monday 2026-03-09"));
        assert!(text.contains("Chili"));
        assert!(text.contains("$36.00"));
        assert!(text.contains("6 servings"));
    }

    #[test]
    fn empty_day() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert!(render(&prep_sheet(date, &[])).contains("Nothing to cook"));
    }

    #[test]
    fn truncates_long_names() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
