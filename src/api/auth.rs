use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    Json,
};

use crate::api::handlers::{api_error, AppState, ErrorResponse};
use crate::error::InventoryError;
use crate::model::UserContext;
use crate::store::Store;

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the acting user from the bearer token.
///
/// Requests without a token are rejected with 401 unless anonymous access is
/// enabled, in which case they act as the development admin user. An unknown
/// or expired token is always rejected.
#[async_trait]
impl<S: Store> FromRequestParts<AppState<S>> for UserContext {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(&parts.headers) {
            Some(token) => state
                .auth
                .resolve(token)
                .ok_or_else(|| api_error(InventoryError::Unauthorized)),
            None if state.config.auth.allow_anonymous => Ok(UserContext::default_user()),
            None => Err(api_error(InventoryError::Unauthorized)),
        }
    }
}

/// Acting user that must hold the admin role; visitors get 403
pub struct AdminUser(pub UserContext);

#[async_trait]
impl<S: Store> FromRequestParts<AppState<S>> for AdminUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let user = UserContext::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            log::warn!("User {} attempted {} {}", user.user_name, parts.method, parts.uri.path());
            return Err(api_error(InventoryError::Forbidden(
                "this action requires the admin role".to_string(),
            )));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
