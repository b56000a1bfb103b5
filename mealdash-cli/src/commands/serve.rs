//! Run the mealdash HTTP API.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use mealdash_core::MealdashConfig;
use mealdash_server::db::migrations;
use mealdash_server::{run_server, AppState};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides [server] bind)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Skip applying migrations on start
    #[arg(long)]
    pub no_migrate: bool,
}

impl ServeArgs {
    fn apply(&self, config: &mut MealdashConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if self.cors_permissive {
            config.server.cors_permissive = true;
        }
        if let Some(url) = self.database_url.as_ref().filter(|u| !u.is_empty()) {
            config.database.url = Some(url.clone());
        }
    }
}

/// Validate config, connect, migrate, then serve until shutdown.
pub async fn run_serve(args: ServeArgs, mut config: MealdashConfig) -> Result<()> {
    args.apply(&mut config);
    config
        .validate()
        .context("Config is incomplete; run `mealdash config validate` for details")?;

    let pool = super::connect(&config).await?;
    if args.no_migrate {
        tracing::info!("skipping migrations");
    } else {
        migrations::run(&pool).await.context("Migrations failed")?;
    }

    tracing::info!(bind = %config.server.bind, "starting mealdash server");
    run_server(AppState::new(pool, config))
        .await
        .context("Server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let args = ServeArgs {
            bind: Some("0.0.0.0:8080".parse().unwrap()),
            cors_permissive: false,
            database_url: Some("postgres://db/mealdash".into()),
            no_migrate: false,
        };
        let mut config = MealdashConfig::default();
        config.database.url = Some("postgres://file/mealdash".into());
        args.apply(&mut config);

        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.database.url.as_deref(), Some("postgres://db/mealdash"));
        assert!(!config.server.cors_permissive);
    }
}
