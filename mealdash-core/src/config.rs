//! Configuration file and environment overrides
//!
//! Loaded from `~/.mealdash/config.toml` (or `$MEALDASH_CONFIG`). A missing
//! file yields defaults; secrets normally come from the environment.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::money::Cents;
use crate::pricing::PricingRules;
use crate::schedule::DeliveryDays;
use crate::validation::{in_range, ValidationError};

const REDACTED: &str = "********";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MealdashConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub stripe: StripeSection,
    pub shipday: ShipdaySection,
    pub email: EmailSection,
    pub business: BusinessSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: SocketAddr,
    /// Allowed browser origins for the storefront and admin UIs
    pub cors_origins: Vec<String>,
    pub cors_permissive: bool,
    pub admin_token: Option<String>,
    pub storefront_token: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3030)),
            cors_origins: vec!["http://localhost:3000".to_string()],
            cors_permissive: false,
            admin_token: None,
            storefront_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeSection {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub api_base: String,
    pub currency: String,
    /// Max age of a signed webhook before it is refused
    pub signature_tolerance_secs: i64,
}

impl Default for StripeSection {
    fn default() -> Self {
        Self {
            secret_key: None,
            webhook_secret: None,
            api_base: "https://api.stripe.com".to_string(),
            currency: "usd".to_string(),
            signature_tolerance_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipdaySection {
    pub api_key: Option<String>,
    /// Value Shipday sends in the `token` header of webhooks
    pub webhook_token: Option<String>,
    pub api_base: String,
}

impl Default for ShipdaySection {
    fn default() -> Self {
        Self {
            api_key: None,
            webhook_token: None,
            api_base: "https://api.shipday.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSection {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub from: String,
    pub api_base: String,
}

impl Default for EmailSection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            from: "orders@mealdash.local".to_string(),
            api_base: "https://api.postmarkapp.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessSection {
    pub name: String,
    pub phone: String,
    /// IANA timezone name, e.g. "America/New_York"
    pub timezone: String,
    pub delivery_fee_cents: i64,
    pub free_delivery_threshold_cents: Option<i64>,
    pub order_cutoff_hours: u32,
    pub delivery_days: DeliveryDays,
    pub pickup_address: String,
}

impl Default for BusinessSection {
    fn default() -> Self {
        Self {
            name: "Mealdash Kitchen".to_string(),
            phone: String::new(),
            timezone: "America/New_York".to_string(),
            delivery_fee_cents: 499,
            free_delivery_threshold_cents: Some(6000),
            order_cutoff_hours: 48,
            delivery_days: "mon,wed,fri".parse().unwrap_or_default(),
            pickup_address: String::new(),
        }
    }
}

impl BusinessSection {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| CoreError::config(format!("unknown timezone '{}'", self.timezone)))
    }

    pub fn pricing_rules(&self) -> PricingRules {
        PricingRules {
            delivery_fee: Cents(self.delivery_fee_cents),
            free_delivery_threshold: self.free_delivery_threshold_cents.map(Cents),
        }
    }

    /// Overlay one admin-editable runtime setting.
    pub fn apply_setting(&mut self, key: &str, value: &serde_json::Value) -> std::result::Result<(), ValidationError> {
        let non_negative = |field: &'static str| {
            value
                .as_i64()
                .filter(|v| *v >= 0)
                .ok_or(ValidationError::OutOfRange {
                    field,
                    min: 0,
                    max: i64::MAX,
                })
        };
        match key {
            "delivery_fee_cents" => {
                self.delivery_fee_cents = non_negative("delivery_fee_cents")?;
            }
            "free_delivery_threshold_cents" => {
                self.free_delivery_threshold_cents = if value.is_null() {
                    None
                } else {
                    Some(non_negative("free_delivery_threshold_cents")?)
                };
            }
            "order_cutoff_hours" => {
                let hours = value
                    .as_i64()
                    .ok_or(ValidationError::InvalidFormat {
                        field: "order_cutoff_hours",
                        reason: "must be an integer",
                    })?;
                self.order_cutoff_hours = in_range("order_cutoff_hours", hours, 0, MAX_CUTOFF_HOURS)? as u32;
            }
            "delivery_days" => {
                let s = value.as_str().ok_or(ValidationError::InvalidFormat {
                    field: "delivery_days",
                    reason: "must be a string like \"mon,wed,fri\"",
                })?;
                self.delivery_days = s.parse()?;
            }
            other => {
                return Err(ValidationError::InvalidVariant {
                    field: "setting",
                    value: other.to_owned(),
                })
            }
        }
        Ok(())
    }
}

/// Runtime settings admins may change without a restart
pub const SETTING_KEYS: [&str; 4] = [
    "delivery_fee_cents",
    "free_delivery_threshold_cents",
    "order_cutoff_hours",
    "delivery_days",
];

const MAX_CUTOFF_HOURS: i64 = 24 * 7;

impl MealdashConfig {
    /// Load from the default path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a specific file; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| CoreError::ConfigParse {
            path: path.to_owned(),
            source,
        })
    }

    /// Config file path: `$MEALDASH_CONFIG` or `~/.mealdash/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(p) = std::env::var("MEALDASH_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mealdash/config.toml")
    }

    /// Overlay secrets and the database URL from the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(v) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(v);
            }
        };
        set(&mut self.database.url, "DATABASE_URL");
        set(&mut self.stripe.secret_key, "STRIPE_SECRET_KEY");
        set(&mut self.stripe.webhook_secret, "STRIPE_WEBHOOK_SECRET");
        set(&mut self.shipday.api_key, "SHIPDAY_API_KEY");
        set(&mut self.shipday.webhook_token, "SHIPDAY_WEBHOOK_TOKEN");
        set(&mut self.email.api_key, "EMAIL_API_KEY");
        set(&mut self.server.admin_token, "MEALDASH_ADMIN_TOKEN");
        set(&mut self.server.storefront_token, "MEALDASH_STOREFRONT_TOKEN");
    }

    /// Check everything the server needs before it starts.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        let required = [
            (&self.database.url, "database.url (DATABASE_URL)"),
            (&self.server.admin_token, "server.admin_token (MEALDASH_ADMIN_TOKEN)"),
            (&self.server.storefront_token, "server.storefront_token (MEALDASH_STOREFRONT_TOKEN)"),
            (&self.stripe.secret_key, "stripe.secret_key (STRIPE_SECRET_KEY)"),
            (&self.stripe.webhook_secret, "stripe.webhook_secret (STRIPE_WEBHOOK_SECRET)"),
            (&self.shipday.api_key, "shipday.api_key (SHIPDAY_API_KEY)"),
            (&self.shipday.webhook_token, "shipday.webhook_token (SHIPDAY_WEBHOOK_TOKEN)"),
        ];
        for (value, name) in required {
            if value.as_deref().map_or(true, str::is_empty) {
                missing.push(name);
            }
        }
        if self.email.enabled && self.email.api_key.is_none() {
            missing.push("email.api_key (EMAIL_API_KEY)");
        }
        if !missing.is_empty() {
            return Err(CoreError::config(format!("missing {}", missing.join(", "))));
        }

        if self.server.admin_token == self.server.storefront_token {
            return Err(CoreError::config("admin and storefront tokens must differ"));
        }
        self.business.tz()?;
        if self.business.delivery_days.is_empty() {
            return Err(CoreError::config("business.delivery_days cannot be empty"));
        }
        if self.business.delivery_fee_cents < 0 {
            return Err(CoreError::config("business.delivery_fee_cents cannot be negative"));
        }
        Ok(())
    }

    /// Copy with every secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_string());
        let mut c = self.clone();
        c.database.url = mask(&self.database.url);
        c.server.admin_token = mask(&self.server.admin_token);
        c.server.storefront_token = mask(&self.server.storefront_token);
        c.stripe.secret_key = mask(&self.stripe.secret_key);
        c.stripe.webhook_secret = mask(&self.stripe.webhook_secret);
        c.shipday.api_key = mask(&self.shipday.api_key);
        c.shipday.webhook_token = mask(&self.shipday.webhook_token);
        c.email.api_key = mask(&self.email.api_key);
        c
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::config(e.to_string()))
    }
}
