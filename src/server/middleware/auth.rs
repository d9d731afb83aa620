//! Bearer-token extraction (spec §6 "Authentication").
//!
//! `litellm-rs`'s own `server::middleware::auth` wraps every route in an
//! Actix `Transform` that consults `AuthSystem`; this gateway's key
//! resolution instead lives in `Pipeline::resolve_key` (database-backed,
//! cached per key), so the HTTP layer only needs to pull the raw bearer
//! token off the request and hand it down — there is no separate
//! authentication decision to make at the middleware layer.

use crate::utils::error::GatewayError;
use actix_web::HttpRequest;

/// Extract the `Authorization: Bearer <token>` header's token.
pub fn bearer_token(req: &HttpRequest) -> Result<String, GatewayError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::Authentication("missing Authorization header".into()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| GatewayError::Authentication("Authorization header must be a Bearer token".into()))
}

/// Admin endpoints (spec §6) compare the bearer token against `ADMIN_API_KEY`
/// directly; there is no per-admin-key catalog.
pub fn require_admin(req: &HttpRequest, admin_key: Option<&str>) -> Result<(), GatewayError> {
    let token = bearer_token(req)?;
    match admin_key {
        Some(expected) if token == expected => Ok(()),
        _ => Err(GatewayError::Authentication("invalid admin credentials".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn extracts_bearer_token() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer sk-test-123"))
            .to_http_request();
        assert_eq!(bearer_token(&req).unwrap(), "sk-test-123");
    }

    #[test]
    fn rejects_missing_header() {
        let req = TestRequest::default().to_http_request();
        assert!(bearer_token(&req).is_err());
    }

    #[test]
    fn rejects_non_bearer_scheme() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert!(bearer_token(&req).is_err());
    }

    #[test]
    fn admin_check_matches_configured_key() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer admin-secret"))
            .to_http_request();
        assert!(require_admin(&req, Some("admin-secret")).is_ok());
        assert!(require_admin(&req, Some("other")).is_err());
        assert!(require_admin(&req, None).is_err());
    }
}
