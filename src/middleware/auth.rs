use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::models::auth::{Identity, TrustLevel};
use crate::models::user::DashboardUser;
use crate::services::auth::TokenKind;
use crate::services::users::UserService;
use crate::AppState;

fn unauthorized() -> ApiError {
    ApiError::Unauthorized("Invalid or expired token".into())
}

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".into()))
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        match state.tokens.classify(token).ok_or_else(unauthorized)? {
            TokenKind::Synthesized(identity) => Ok(Identity::Synthesized(identity)),
            TokenKind::Dashboard { email } => {
                // The account may have been deleted since the token was issued.
                let user = UserService::find_by_email(&state.db, &email)
                    .await?
                    .ok_or_else(unauthorized)?;
                Ok(Identity::Persisted(user))
            }
        }
    }
}

/// A signed-in dashboard account. Rejects frontend and website callers.
#[derive(Debug, Clone)]
pub struct DashboardAccount(pub DashboardUser);

impl FromRequestParts<AppState> for DashboardAccount {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Identity::from_request_parts(parts, state).await? {
            Identity::Persisted(user) => Ok(DashboardAccount(user)),
            Identity::Synthesized(s) => {
                debug_assert_ne!(s.trust, TrustLevel::Dashboard);
                Err(ApiError::Forbidden("Dashboard account required".into()))
            }
        }
    }
}
