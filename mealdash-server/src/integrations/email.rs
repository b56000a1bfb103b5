//! Transactional email (Postmark-compatible HTTP API)

use async_trait::async_trait;
use mealdash_core::config::EmailSection;
use mealdash_core::schedule::DaySwitch;
use mealdash_core::{Cents, Fulfillment};
use reqwest::Client;
use serde::Serialize;

use super::{ensure_success, IntegrationError};
use crate::db::repos::OrderDetail;

const SERVICE: &str = "email";

/// Plain-text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), IntegrationError>;
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text_body: &'a str,
}

pub struct EmailClient {
    client: Client,
    api_key: String,
    from: String,
    api_base: String,
}

impl EmailClient {
    pub fn new(config: &EmailSection, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            from: config.from.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Mailer for EmailClient {
    async fn send(&self, message: &EmailMessage) -> Result<(), IntegrationError> {
        let body = PostmarkEmail {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text_body: &message.text_body,
        };
        let response = self
            .client
            .post(format!("{}/email", self.api_base))
            .header("X-Postmark-Server-Token", &self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(IntegrationError::http(SERVICE))?;
        ensure_success(SERVICE, response).await?;
        tracing::debug!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

/// Used when `[email] enabled = false`: logs and drops.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), IntegrationError> {
        tracing::debug!(to = %message.to, subject = %message.subject, "email disabled, not sending");
        Ok(())
    }
}

/// Pick the mailer for a config.
pub fn from_config(config: &EmailSection) -> Box<dyn Mailer> {
    match (&config.api_key, config.enabled) {
        (Some(key), true) => Box::new(EmailClient::new(config, key.clone())),
        _ => Box::new(DisabledMailer),
    }
}

pub fn order_confirmation(business_name: &str, to: &str, detail: &OrderDetail) -> EmailMessage {
    let order = &detail.order;
    let short_id = &order.id.simple().to_string()[..8];
    let mut body = format!("Thanks for your order!\n\nOrder {}\n", short_id);

    for sub in &detail.sub_orders {
        let verb = match order.fulfillment {
            Fulfillment::Pickup => "Pickup",
            Fulfillment::Delivery => "Delivery",
        };
        body.push_str(&format!("\n{} on {}\n", verb, sub.sub_order.delivery_date.format("%A, %B %-d")));
        for item in &sub.items {
            body.push_str(&format!(
                "  {} x {}  {}\n",
                item.quantity,
                item.name,
                Cents(item.unit_price_cents) * item.quantity as i64
            ));
        }
    }

    body.push_str(&format!("\nSubtotal: {}\n", order.subtotal));
    if !order.discount.is_zero() {
        body.push_str(&format!("Discount: -{}\n", order.discount));
    }
    if !order.delivery_fee.is_zero() {
        body.push_str(&format!("Delivery: {}\n", order.delivery_fee));
    }
    if !order.wallet_applied.is_zero() {
        body.push_str(&format!("Wallet credit: -{}\n", order.wallet_applied));
    }
    body.push_str(&format!("Total charged: {}\n\n{}\n", order.total, business_name));

    EmailMessage {
        to: to.to_owned(),
        subject: format!("{}: order {} confirmed", business_name, short_id),
        text_body: body,
    }
}

pub fn day_switched(business_name: &str, to: &str, switch: &DaySwitch) -> EmailMessage {
    EmailMessage {
        to: to.to_owned(),
        subject: format!("{}: delivery moved to {}", business_name, switch.to.format("%A")),
        text_body: format!(
            "Your delivery scheduled for {} will now arrive on {}.\n\n{}\n",
            switch.from.format("%A, %B %-d"),
            switch.to.format("%A, %B %-d"),
            business_name
        ),
    }
}
