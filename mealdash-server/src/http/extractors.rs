//! Custom Axum extractors

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use mealdash_core::{CouponCode, ValidationError};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::ApiError;
use crate::state::AppState;

/// Compare secrets without leaking the mismatch position through timing.
pub(crate) fn tokens_match(given: &str, expected: &str) -> bool {
    let a = Sha256::digest(given.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn check_bearer(parts: &Parts, expected: Option<&str>) -> Result<(), ApiError> {
    match (bearer(parts), expected) {
        (Some(given), Some(expected)) if !expected.is_empty() && tokens_match(given, expected) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Caller presented the admin token
pub struct AdminAuth;

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        check_bearer(parts, state.config.server.admin_token.as_deref())?;
        Ok(Self)
    }
}

/// Caller presented the storefront token
pub struct StorefrontAuth;

impl FromRequestParts<Arc<AppState>> for StorefrontAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        check_bearer(parts, state.config.server.storefront_token.as_deref())?;
        Ok(Self)
    }
}

/// Extract and validate a UUID from path
pub struct ValidUuid(pub Uuid);

impl<S> FromRequestParts<S> for ValidUuid
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "id" }))?;

        let uuid = Uuid::parse_str(&id).map_err(|_| {
            ApiError::Validation(ValidationError::InvalidFormat {
                field: "id",
                reason: "invalid UUID format",
            })
        })?;

        Ok(Self(uuid))
    }
}

/// Extract and normalize a coupon code from path
pub struct ValidCouponCode(pub CouponCode);

impl<S> FromRequestParts<S> for ValidCouponCode
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(code): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "code" }))?;
        Ok(Self(CouponCode::new(&code)?))
    }
}

/// JSON body whose parse errors come back as a 400 `ApiError`
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3cres"));
        assert!(!tokens_match("", "s3cret"));
    }

    #[test]
    fn bearer_parsing() {
        let (mut parts, _) = axum::http::Request::builder()
            .header("authorization", "Bearer abc ")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer(&parts), Some("abc"));
        assert!(check_bearer(&parts, Some("abc")).is_ok());
        assert!(check_bearer(&parts, Some("xyz")).is_err());
        assert!(check_bearer(&parts, None).is_err());

        parts.headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer(&parts), None);
    }
}
