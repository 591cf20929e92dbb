use axum::{extract::State, Form, Json};

use crate::error::{ApiError, ApiResult};
use crate::models::auth::{Identity, IdentityView, SignInForm, TokenResponse};
use crate::services::auth::verify_password;
use crate::services::metrics;
use crate::services::users::UserService;
use crate::AppState;

/// POST /api/auth/sign-in (form: email, password)
pub async fn sign_in(
    State(state): State<AppState>,
    Form(form): Form<SignInForm>,
) -> ApiResult<Json<TokenResponse>> {
    let user = UserService::find_by_email(&state.db, &form.email)
        .await?
        .ok_or_else(|| ApiError::not_found("Email not registered"))?;
    let tenant = user.client.clone().unwrap_or_default();

    if !verify_password(&form.password, &user.password) {
        metrics::record_login(&tenant, "bad_password");
        return Err(ApiError::Unauthorized("Incorrect password".into()));
    }

    let (access_token, expires_at) = state.tokens.issue_access_token(&user)?;
    UserService::record_session(&state.db, user.id, &access_token, expires_at).await?;
    metrics::record_login(&tenant, "success");
    tracing::info!(user_id = user.id, tenant = %tenant, "Dashboard sign-in");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

/// GET /api/auth/me
pub async fn me(identity: Identity) -> Json<IdentityView> {
    Json(identity.view())
}
