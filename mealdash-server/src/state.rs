//! Application state shared across handlers

use std::sync::Arc;

use mealdash_core::config::BusinessSection;
use mealdash_core::MealdashConfig;
use sqlx::PgPool;

use crate::db::{DbError, SettingsRepo};
use crate::integrations::{email, DeliveryDispatch, Mailer, PaymentGateway, ShipdayClient, StripeClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<MealdashConfig>,
    pub payments: Arc<dyn PaymentGateway>,
    pub dispatch: Arc<dyn DeliveryDispatch>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// State with the real provider clients built from `config`.
    pub fn new(pool: PgPool, config: MealdashConfig) -> Self {
        let payments = Arc::new(StripeClient::new(&config.stripe));
        let dispatch = Arc::new(ShipdayClient::new(&config.shipday));
        let mailer: Arc<dyn Mailer> = Arc::from(email::from_config(&config.email));
        Self {
            pool,
            config: Arc::new(config),
            payments,
            dispatch,
            mailer,
        }
    }

    /// Business rules in force right now: the config file's `[business]`
    /// section with admin settings applied on top.
    pub async fn business(&self) -> Result<BusinessSection, DbError> {
        SettingsRepo::new(&self.pool).effective(&self.config.business).await
    }
}
