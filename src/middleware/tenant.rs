use axum::{extract::FromRequestParts, http::request::Parts};

use crate::db::tenant::session::TenantSession;
use crate::error::ApiError;
use crate::models::auth::{Identity, TrustLevel};
use crate::AppState;

/// The caller plus a session scoped to the caller's tenant namespace.
///
/// Handlers should finish with [`TenantContext::finish`] once their queries
/// are done. Finishing never changes the response; a context dropped on an
/// error path is cleaned up by the pool's release hook.
pub struct TenantContext {
    pub identity: Identity,
    pub session: TenantSession,
}

impl TenantContext {
    pub fn tenant(&self) -> &str {
        self.session.tenant().as_str()
    }

    /// Public callers (website, frontend) only see published rows.
    pub fn is_public(&self) -> bool {
        self.identity.trust_level() != TrustLevel::Dashboard
    }

    pub async fn finish(self) {
        self.session.close().await;
    }
}

impl FromRequestParts<AppState> for TenantContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        let session = state.tenancy.sessions.open(identity.tenant_id()).await?;
        Ok(Self { identity, session })
    }
}
