use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use problem_hub_core::{context::RequestContext, HubError};

use super::{ApiError, AppState};

/// Caller identity available to handlers.
#[derive(Clone, Debug)]
pub struct AuthContext(pub RequestContext);

/// Resolve the caller from the `Authorization: Bearer <jwt>` header.
///
/// The identity and admin flag come from the token issued at login; there is
/// no header-only fallback.
pub fn extract_auth_context(headers: &HeaderMap, state: &AppState) -> Result<AuthContext, HubError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(HubError::Unauthorized)?;
    let claims = state.tokens.verify(token)?;
    Ok(AuthContext(claims.context()))
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(extract_auth_context(&parts.headers, state)?)
    }
}
