//! HTTP Middleware
//!
//! API key authentication middleware and the AuthExtractor handlers use to
//! pull the authenticated context out of request extensions.
//!
//! The external release gateway is NOT behind this middleware: its bearer
//! secret is the whole credential, carried in the path, and validated by
//! digest lookup in the token service.

use crate::auth::{AuthConfig, AuthContext};
use crate::error::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authenticate a request against the configured key table and attach the
/// resolved AuthContext. Rejects before any handler runs.
pub async fn auth_middleware(
    State(config): State<Arc<AuthConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing X-API-Key header"))?;

    let principal = config
        .authenticate(presented)
        .ok_or_else(|| ApiError::unauthorized("invalid API key"))?;

    request.extensions_mut().insert(AuthContext {
        principal: principal.to_string(),
    });

    Ok(next.run(request).await)
}

/// Extractor for the AuthContext placed by `auth_middleware`.
///
/// A handler reaching this without the middleware in front of it is a
/// wiring bug, reported as 401 rather than a panic.
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| ApiError::unauthorized("request is not authenticated"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_header_name_is_lowercase() {
        // HeaderName lookups are case-insensitive but the constant must be
        // a valid lowercase header name.
        assert_eq!(API_KEY_HEADER, API_KEY_HEADER.to_lowercase());
    }

    #[tokio::test]
    async fn test_extractor_rejects_without_context() {
        let request = axum::http::Request::builder()
            .uri("/api/v1/lots")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let result = AuthExtractor::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_extractor_reads_context() {
        let request = axum::http::Request::builder()
            .uri("/api/v1/lots")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        parts.extensions.insert(AuthContext {
            principal: "site-engineer".to_string(),
        });
        let AuthExtractor(auth) = AuthExtractor::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(auth.principal, "site-engineer");
    }
}
