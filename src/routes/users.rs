use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::db::tenant::TenantId;
use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::DashboardAccount;
use crate::models::user::{CreateUserRequest, DashboardUser, UpdateUserRequest, UserCreated, UserUpdated};
use crate::services::users::{normalize_client, UserService};
use crate::AppState;

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    _caller: DashboardAccount,
) -> ApiResult<Json<Vec<DashboardUser>>> {
    let users = UserService::list(&state.db).await?;
    if users.is_empty() {
        return Err(ApiError::not_found("No users found"));
    }
    Ok(Json(users))
}

/// POST /api/users: creates the account and provisions its tenant first.
pub async fn create_user(
    State(state): State<AppState>,
    DashboardAccount(caller): DashboardAccount,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserCreated>)> {
    let client = normalize_client(&body.client);
    TenantId::parse(&client)?;

    if UserService::find_by_email(&state.db, &body.email).await?.is_some() {
        return Err(ApiError::bad_request("Email already registered"));
    }

    // A provisioning failure does not block the account: the reconciler will
    // pick the tenant up again on the next startup.
    let tenant_warning = match state.tenancy.provisioner.provision(&client).await {
        Ok(report) if report.is_complete() => None,
        Ok(report) => Some(format!(
            "Tenant '{client}' provisioned with {} table and {} seed error(s)",
            report.table_errors.len(),
            report.seed_errors.len()
        )),
        Err(e) => {
            tracing::warn!(tenant = %client, "Tenant provisioning failed: {e}");
            Some(format!("Tenant '{client}' could not be provisioned: {e}"))
        }
    };

    let user = UserService::create(&state.db, &body.email, &body.password, &body.full_name, &client).await?;
    tracing::info!(created_by = caller.id, user_id = user.id, tenant = %client, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(UserCreated {
            message: "User created",
            email: user.email,
            full_name: user.full_name,
            client,
            tenant_warning,
        }),
    ))
}

/// PATCH /api/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    _caller: DashboardAccount,
    Path(id): Path<i32>,
    Json(body): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserUpdated>> {
    if let Some(email) = body.email.as_deref().filter(|e| !e.is_empty()) {
        if let Some(existing) = UserService::find_by_email(&state.db, email).await? {
            if existing.id != id {
                return Err(ApiError::bad_request("Email already in use"));
            }
        }
    }

    let user = UserService::update(&state.db, id, &body)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserUpdated {
        message: "User updated",
        email: user.email,
        full_name: user.full_name,
    }))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    _caller: DashboardAccount,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    if !UserService::delete(&state.db, id).await? {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
