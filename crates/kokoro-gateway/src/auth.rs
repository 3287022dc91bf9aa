//! Bearer checks and the authenticated caller.
//!
//! The user-facing API sits behind an auth proxy that has already resolved
//! the user; it forwards the gateway token plus `x-user-id` (and optionally
//! `x-user-email`, the default delivery address).

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use kokoro_core::types::UserId;

use crate::app::AppState;
use crate::error::ApiError;

/// Accepts `Authorization: Bearer <expected>`. No configured secret rejects
/// every request.
pub fn check_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return Err(ApiError::unauthorized("no credential configured"));
    };
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    if token == expected {
        Ok(())
    } else {
        Err(ApiError::unauthorized("bearer token mismatch"))
    }
}

/// The authenticated owner of the request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: UserId,
    pub email: Option<String>,
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        check_bearer(&parts.headers, state.config.gateway.auth.token.as_deref())?;
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        let user_id = header("x-user-id").ok_or_else(|| ApiError::unauthorized("missing x-user-id"))?;
        Ok(Caller {
            user_id: user_id.into(),
            email: header("x-user-email"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("authorization", HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn bearer_must_match() {
        assert!(check_bearer(&headers("Bearer s3cret"), Some("s3cret")).is_ok());
        assert!(check_bearer(&headers("Bearer nope"), Some("s3cret")).is_err());
        assert!(check_bearer(&headers("s3cret"), Some("s3cret")).is_err());
        assert!(check_bearer(&HeaderMap::new(), Some("s3cret")).is_err());
    }

    #[test]
    fn unset_secret_denies() {
        assert!(check_bearer(&headers("Bearer anything"), None).is_err());
        assert!(check_bearer(&headers("Bearer "), Some("")).is_err());
    }
}
