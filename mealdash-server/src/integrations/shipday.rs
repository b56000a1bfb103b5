//! Shipday delivery dispatch

use async_trait::async_trait;
use mealdash_core::config::ShipdaySection;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ensure_success, IntegrationError};

const SERVICE: &str = "shipday";

/// Order as Shipday's `POST /orders` expects it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipdayOrder {
    /// Our sub-order id; echoed back in webhooks
    pub order_number: String,
    pub customer_name: String,
    pub customer_address: String,
    pub customer_email: String,
    pub customer_phone_number: String,
    pub restaurant_name: String,
    pub restaurant_address: String,
    pub restaurant_phone_number: String,
    /// YYYY-MM-DD
    pub expected_delivery_date: String,
    pub order_item: Vec<ShipdayItem>,
    pub total_order_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipdayItem {
    pub name: String,
    pub quantity: i32,
    pub unit_price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResponse {
    #[serde(default)]
    success: bool,
    order_id: Option<i64>,
    #[serde(default)]
    response: Option<String>,
}

/// Courier dispatch provider
#[async_trait]
pub trait DeliveryDispatch: Send + Sync {
    /// Hand an order to the courier service, returning its order id.
    async fn create_order(&self, order: &ShipdayOrder) -> Result<i64, IntegrationError>;
}

pub struct ShipdayClient {
    client: Client,
    api_key: Option<String>,
    api_base: String,
}

impl ShipdayClient {
    pub fn new(config: &ShipdaySection) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DeliveryDispatch for ShipdayClient {
    async fn create_order(&self, order: &ShipdayOrder) -> Result<i64, IntegrationError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(IntegrationError::NotConfigured { service: SERVICE })?;

        let response = self
            .client
            .post(format!("{}/orders", self.api_base))
            .header("Authorization", format!("Basic {}", key))
            .json(order)
            .send()
            .await
            .map_err(IntegrationError::http(SERVICE))?;

        let body: CreateOrderResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(IntegrationError::http(SERVICE))?;

        match body.order_id {
            Some(id) if body.success => {
                tracing::info!(order_number = %order.order_number, shipday_id = id, "shipday order created");
                Ok(id)
            }
            _ => Err(IntegrationError::Upstream {
                service: SERVICE,
                status: 200,
                body: body.response.unwrap_or_else(|| "order was not created".into()),
            }),
        }
    }
}

/// Status webhook body
#[derive(Debug, Clone, Deserialize)]
pub struct ShipdayWebhook {
    pub event: String,
    pub order: WebhookOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookOrder {
    pub id: Option<i64>,
    #[serde(rename = "orderNumber", alias = "order_number")]
    pub order_number: Option<String>,
}

impl ShipdayWebhook {
    pub fn parse(payload: &[u8]) -> Result<Self, IntegrationError> {
        serde_json::from_slice(payload).map_err(|source| IntegrationError::Payload {
            service: SERVICE,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn order() -> ShipdayOrder {
        ShipdayOrder {
            order_number: "7f1c".into(),
            customer_name: "Pat".into(),
            customer_address: "1 Main St".into(),
            customer_email: "pat@example.com".into(),
            customer_phone_number: "555-0100".into(),
            restaurant_name: "Mealdash Kitchen".into(),
            restaurant_address: "9 Commissary Rd".into(),
            restaurant_phone_number: String::new(),
            expected_delivery_date: "2026-03-09".into(),
            order_item: vec![ShipdayItem {
                name: "Chili".into(),
                quantity: 2,
                unit_price: 12.5,
            }],
            total_order_cost: 25.0,
        }
    }

    fn client(base: &str) -> ShipdayClient {
        ShipdayClient::new(&ShipdaySection {
            api_key: Some("ship-key".into()),
            api_base: base.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(order()).unwrap();
        assert_eq!(v["orderNumber"], "7f1c");
        assert_eq!(v["orderItem"][0]["unitPrice"], 12.5);
        assert_eq!(v["expectedDeliveryDate"], "2026-03-09");
    }

    #[tokio::test]
    async fn creates_order() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/orders")
                .header("authorization", "Basic ship-key")
                .json_body_partial(r#"{"orderNumber": "7f1c"}"#);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"success": true, "response": "Order inserted", "orderId": 991}));
        });

        let id = client(&server.base_url()).create_order(&order()).await.unwrap();
        mock.assert();
        assert_eq!(id, 991);
    }

    #[tokio::test]
    async fn unsuccessful_body_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/orders");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"success": false, "response": "Invalid address"}));
        });

        let err = client(&server.base_url()).create_order(&order()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid address"));
    }

    #[test]
    fn parses_webhook_with_either_spelling() {
        let a = ShipdayWebhook::parse(br#"{"event":"ORDER_PIKEDUP","order":{"id":5,"orderNumber":"abc"}}"#).unwrap();
        assert_eq!(a.order.id, Some(5));
        assert_eq!(a.order.order_number.as_deref(), Some("abc"));

        let b = ShipdayWebhook::parse(br#"{"event":"ORDER_COMPLETED","order":{"order_number":"def"}}"#).unwrap();
        assert_eq!(b.order.id, None);
        assert_eq!(b.order.order_number.as_deref(), Some("def"));
    }
}
