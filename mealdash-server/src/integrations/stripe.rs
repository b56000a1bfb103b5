//! Stripe payment intents and webhook verification
//!
//! Only the two calls checkout needs: create a payment intent, and check the
//! `Stripe-Signature` header on incoming events.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use mealdash_core::config::StripeSection;
use mealdash_core::Cents;
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use super::{ensure_success, IntegrationError};

const SERVICE: &str = "stripe";

type HmacSha256 = Hmac<Sha256>;

/// What checkout asks Stripe to charge
#[derive(Debug, Clone)]
pub struct PaymentIntentRequest {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub customer_email: String,
    pub amount: Cents,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

/// Payment provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(&self, req: &PaymentIntentRequest) -> Result<PaymentIntent, IntegrationError>;
}

/// Stripe REST client
pub struct StripeClient {
    client: Client,
    secret_key: Option<String>,
    api_base: String,
    currency: String,
}

impl StripeClient {
    pub fn new(config: &StripeSection) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            currency: config.currency.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_payment_intent(&self, req: &PaymentIntentRequest) -> Result<PaymentIntent, IntegrationError> {
        let key = self
            .secret_key
            .as_deref()
            .ok_or(IntegrationError::NotConfigured { service: SERVICE })?;

        let order_id = req.order_id.to_string();
        let customer_id = req.customer_id.to_string();
        let amount = req.amount.get().to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", self.currency.as_str()),
            ("receipt_email", req.customer_email.as_str()),
            ("metadata[order_id]", order_id.as_str()),
            ("metadata[customer_id]", customer_id.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(key)
            // One intent per order even if checkout is retried
            .header("Idempotency-Key", format!("order-{}", req.order_id))
            .form(&form)
            .send()
            .await
            .map_err(IntegrationError::http(SERVICE))?;

        let intent: PaymentIntent = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(IntegrationError::http(SERVICE))?;
        tracing::info!(order_id = %req.order_id, intent = %intent.id, amount = %req.amount, "payment intent created");
        Ok(intent)
    }
}

/// Incoming webhook event, trimmed to what we read
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: EventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    pub id: String,
    #[serde(default)]
    pub last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentError {
    pub message: Option<String>,
}

impl StripeEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, IntegrationError> {
        serde_json::from_slice(payload).map_err(|source| IntegrationError::Payload {
            service: SERVICE,
            source,
        })
    }
}

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`).
///
/// The signed message is `"{t}.{payload}"`. Any `v1` entry may match; the
/// timestamp must be within `tolerance_secs` of `now`.
pub fn verify_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), IntegrationError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => candidates.push(v),
            _ => {}
        }
    }

    let t = timestamp.ok_or(IntegrationError::Signature("missing timestamp"))?;
    let ts: i64 = t.parse().map_err(|_| IntegrationError::Signature("bad timestamp"))?;
    if candidates.is_empty() {
        return Err(IntegrationError::Signature("no v1 signature"));
    }
    if now.abs_diff(ts) > tolerance_secs.max(0) as u64 {
        return Err(IntegrationError::Signature("timestamp outside tolerance"));
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| IntegrationError::Signature("bad secret"))?;
    mac.update(t.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = candidates.iter().any(|c| {
        hex::decode(c)
            .map(|sig| mac.clone().verify_slice(&sig).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(IntegrationError::Signature("signature mismatch"))
    }
}

/// Build a header the way Stripe does. Test helper.
#[cfg(test)]
pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
