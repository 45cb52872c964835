//! Request guards: ordered predicate checks over request headers.
//!
//! Identity arrives in headers set by the edge proxy (`x-user-id`,
//! `x-user-email`, `x-admin`). Each guard fails closed with its own
//! error kind: a missing identity is 401, a missing admin flag is 403.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

/// Who is making the request, as asserted by the edge.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: UserId,
    pub email: String,
    pub admin: bool,
}

impl RequestContext {
    /// Authentication guard: builds a context from the identity headers,
    /// rejecting requests with a missing or malformed identity.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing x-user-id header".to_string()))?;
        let user_id: UserId = user_id
            .parse()
            .map_err(|_| ApiError::Unauthorized("Invalid x-user-id header".to_string()))?;

        let email = headers
            .get("x-user-email")
            .and_then(|v| v.to_str().ok())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing x-user-email header".to_string()))?
            .to_string();

        let admin = headers
            .get("x-admin")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Ok(Self {
            user_id,
            email,
            admin,
        })
    }

    /// Authorization guard: runs after authentication and rejects
    /// non-admin callers.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin access required".to_string()))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(user_id: Option<&str>, email: Option<&str>, admin: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(v) = user_id {
            map.insert("x-user-id", HeaderValue::from_str(v).unwrap());
        }
        if let Some(v) = email {
            map.insert("x-user-email", HeaderValue::from_str(v).unwrap());
        }
        if let Some(v) = admin {
            map.insert("x-admin", HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn full_identity_is_accepted() {
        let user_id = UserId::new();
        let ctx = RequestContext::from_headers(&headers(
            Some(&user_id.to_string()),
            Some("buyer@example.com"),
            None,
        ))
        .unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.email, "buyer@example.com");
        assert!(!ctx.admin);
        assert!(ctx.require_admin().is_err());
    }

    #[test]
    fn missing_identity_is_unauthorized() {
        let result = RequestContext::from_headers(&headers(None, Some("a@b.c"), None));
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));

        let result = RequestContext::from_headers(&headers(
            Some(&UserId::new().to_string()),
            None,
            None,
        ));
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn malformed_user_id_is_unauthorized() {
        let result =
            RequestContext::from_headers(&headers(Some("not-a-uuid"), Some("a@b.c"), None));
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn admin_flag_gates_admin_guard() {
        let ctx = RequestContext::from_headers(&headers(
            Some(&UserId::new().to_string()),
            Some("ops@example.com"),
            Some("true"),
        ))
        .unwrap();
        assert!(ctx.require_admin().is_ok());
    }
}
