//! Command implementations for the mealdash CLI

pub mod migrate;
pub mod prep;
pub mod serve;

pub use migrate::run_migrate;
pub use prep::run_prep;
pub use serve::run_serve;

use anyhow::{Context, Result};
use mealdash_core::MealdashConfig;
use mealdash_server::db::create_pool_with_options;
use sqlx::PgPool;

/// Connect using `database.url`, with a hint when it is missing.
pub(crate) async fn connect(config: &MealdashConfig) -> Result<PgPool> {
    let url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL not set. Set via --database-url, DATABASE_URL env, .env, or [database] url")?;
    create_pool_with_options(url, config.database.max_connections)
        .await
        .context("Failed to create database pool")
}
