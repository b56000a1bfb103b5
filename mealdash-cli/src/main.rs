//! mealdash CLI - runs and operates the mealdash food-delivery backend
//!
//! - `serve`: HTTP API (storefront, admin, webhooks)
//! - `migrate`: apply the database schema
//! - `config`: create, show and validate the config file
//! - `prep`: print a kitchen prep sheet

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "mealdash",
    author,
    version,
    about = "Backend for a meal-prep delivery business",
    long_about = "Run the mealdash API server and its operational tasks. Config is read from \
                  ~/.mealdash/config.toml (or $MEALDASH_CONFIG); secrets come from the \
                  environment or a .env file."
)]
struct Cli {
    /// Debug logging (unless RUST_LOG is set)
    #[arg(long, global = true)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long = "log-json", global = true)]
    log_json: bool,

    /// Config file path
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Apply database migrations
    Migrate,
    /// Manage mealdash configuration (init, show, validate, path)
    Config(config::ConfigArgs),
    /// Print the kitchen prep sheet for a delivery date
    Prep(commands::prep::PrepArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        json: cli.log_json,
    })
    .ok();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => commands::run_serve(args, config::load(config_path)?).await?,
        Commands::Migrate => commands::run_migrate(&config::load(config_path)?).await?,
        Commands::Config(args) => config::run_config(args, config_path)?,
        Commands::Prep(args) => commands::run_prep(args, &config::load(config_path)?).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["mealdash", "prep", "--date", "2026-03-09", "--debug", "--log-json"]);
        assert!(cli.debug && cli.log_json);
        assert!(matches!(cli.command, Commands::Prep(ref a) if a.date.is_some()));
    }
}
