//! Database layer - connection pool, migrations, repositories
//!
//! - One pool, shared via `AppState`
//! - List queries JOIN instead of looping (no N+1)
//! - Multi-step writes take a `&mut PgConnection` so handlers can run them
//!   inside one transaction

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repos;

pub use error::DbError;
pub use pool::{create_pool, create_pool_with_options};
pub use repos::*;
