//! Outbound clients for third-party services
//!
//! Each client sits behind a trait so handlers can run against fakes in
//! tests. Error bodies from providers are truncated before they reach logs.

pub mod email;
pub mod shipday;
pub mod stripe;

pub use email::{DisabledMailer, EmailClient, EmailMessage, Mailer};
pub use shipday::{DeliveryDispatch, ShipdayClient, ShipdayOrder};
pub use stripe::{PaymentGateway, PaymentIntent, PaymentIntentRequest, StripeClient};

const MAX_ERROR_BODY: usize = 500;

/// Integration error type
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },

    #[error("webhook signature rejected: {0}")]
    Signature(&'static str),

    #[error("malformed {service} payload: {source}")]
    Payload {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl IntegrationError {
    pub(crate) fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Http { service, source }
    }
}

/// Cut a provider error body down to something safe to log.
pub(crate) fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_owned();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Turn a non-2xx response into `Upstream`.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, IntegrationError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(IntegrationError::Upstream {
        service,
        status,
        body: truncate(&body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_bodies() {
        let body = "x".repeat(800);
        let t = truncate(&body);
        assert_eq!(t.len(), MAX_ERROR_BODY + 3);
        assert!(t.ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(400);
        let t = truncate(&body);
        assert!(t.ends_with("..."));
        assert!(t.len() <= MAX_ERROR_BODY + 3);
    }
}
