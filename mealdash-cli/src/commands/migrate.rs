//! Apply the schema to the configured database.

use anyhow::{Context, Result};
use mealdash_core::MealdashConfig;
use mealdash_server::db::migrations;

pub async fn run_migrate(config: &MealdashConfig) -> Result<()> {
    let pool = super::connect(config).await?;
    migrations::run(&pool).await.context("Migrations failed")?;
    pool.close().await;
    println!("Schema is up to date");
    Ok(())
}
