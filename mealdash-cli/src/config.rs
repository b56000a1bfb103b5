use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use mealdash_core::MealdashConfig;

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a config file with default values
    Init(InitArgs),
    /// Print the effective config with secrets masked
    Show(ShowArgs),
    /// Check that everything `serve` needs is present
    Validate,
    /// Show config file path
    Path,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Force overwrite existing config
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Print JSON instead of TOML
    #[arg(long)]
    pub json: bool,
}

/// Config file in use: `--config`, then `$MEALDASH_CONFIG`, then the default.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(MealdashConfig::config_path)
}

/// Load the file (defaults if missing) and overlay the environment.
pub fn load(explicit: Option<&Path>) -> Result<MealdashConfig> {
    let path = resolve_path(explicit);
    let mut config =
        MealdashConfig::load_from(&path).with_context(|| format!("Failed to load config from {:?}", path))?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

pub fn run_config(args: ConfigArgs, explicit: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Init(args) => run_init(args, explicit),
        ConfigCommands::Show(args) => run_show(args, explicit),
        ConfigCommands::Validate => run_validate(explicit),
        ConfigCommands::Path => {
            println!("{}", resolve_path(explicit).display());
            Ok(())
        }
    }
}

fn run_init(args: InitArgs, explicit: Option<&Path>) -> Result<()> {
    let config_path = resolve_path(explicit);

    if config_path.exists() && !args.force {
        return Err(anyhow!(
            "Config already exists at {:?}\n\nUse --force to overwrite",
            config_path
        ));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = MealdashConfig::default()
        .to_toml()
        .context("Failed to render default config")?;
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

    println!("Created config at: {:?}", config_path);
    println!("\nSecrets are read from the environment (or a .env file):");
    println!("  DATABASE_URL, STRIPE_SECRET_KEY, STRIPE_WEBHOOK_SECRET,");
    println!("  SHIPDAY_API_KEY, SHIPDAY_WEBHOOK_TOKEN, EMAIL_API_KEY,");
    println!("  MEALDASH_ADMIN_TOKEN, MEALDASH_STOREFRONT_TOKEN");
    println!("\nThen run: mealdash config validate");
    Ok(())
}

fn run_show(args: ShowArgs, explicit: Option<&Path>) -> Result<()> {
    let config = load(explicit)?.redacted();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

fn run_validate(explicit: Option<&Path>) -> Result<()> {
    let config = load(explicit)?;
    config.validate().context("Config is not ready to serve")?;
    println!("Config OK ({})", resolve_path(explicit).display());
    Ok(())
}
