//! Customer registration
//!
//! The storefront owns sign-in; it registers customers here by email and
//! uses the returned id for every other call.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use mealdash_core::validation::{self, Email, ValidationError};
use serde::Deserialize;

use crate::db::repos::{Customer, CustomerRepo, NewCustomer};
use crate::http::error::ApiError;
use crate::http::extractors::{ValidJson, ValidUuid};
use crate::state::AppState;

const MAX_NAME_LEN: usize = 200;
const MAX_ADDRESS_LEN: usize = 500;

#[derive(Debug, Deserialize)]
pub struct UpsertCustomerRequest {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl UpsertCustomerRequest {
    fn validate(self) -> Result<NewCustomer, ValidationError> {
        let name = validation::bounded("name", &self.name, MAX_NAME_LEN)?;
        let address = match self.address {
            Some(a) if !a.trim().is_empty() => Some(validation::bounded("address", &a, MAX_ADDRESS_LEN)?),
            _ => None,
        };
        Ok(NewCustomer {
            email: Email::new(&self.email)?,
            name,
            phone: self.phone.map(|p| p.trim().to_owned()).filter(|p| !p.is_empty()),
            address,
        })
    }
}

/// POST /customers - register or refresh by email
async fn upsert_customer(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<UpsertCustomerRequest>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let new = req.validate()?;
    let customer = CustomerRepo::new(&state.pool).upsert(&new).await?;
    Ok((StatusCode::OK, Json(customer)))
}

/// GET /customers/{id}
async fn get_customer(State(state): State<Arc<AppState>>, ValidUuid(id): ValidUuid) -> Result<Json<Customer>, ApiError> {
    Ok(Json(CustomerRepo::new(&state.pool).get(id).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/customers", post(upsert_customer))
        .route("/customers/{id}", get(get_customer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(email: &str, name: &str) -> UpsertCustomerRequest {
        UpsertCustomerRequest {
            email: email.into(),
            name: name.into(),
            phone: Some("  ".into()),
            address: Some("".into()),
        }
    }

    #[test]
    fn normalizes_profile() {
        let new = req(" Pat@Example.com ", " Pat ").validate().unwrap();
        assert_eq!(new.email.as_str(), "pat@example.com");
        assert_eq!(new.name, "Pat");
        assert_eq!(new.phone, None);
        assert_eq!(new.address, None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(req("not-an-email", "Pat").validate().is_err());
        assert!(req("pat@example.com", "   ").validate().is_err());
    }
}
