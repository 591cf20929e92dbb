use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Duration;
use serde::Serialize;
use serde_json::{json, Value};

use crate::db::tenant::{ProvisionReport, TenantId};
use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::DashboardAccount;
use crate::AppState;

const WEBSITE_TOKEN_DAYS: i64 = 30;

#[derive(Debug, Serialize)]
pub struct TenantStatus {
    pub tenant: String,
    pub exists: bool,
    pub missing_tables: Vec<String>,
    pub tables: Vec<String>,
}

/// GET /api/admin/tenants/{client}: compare a tenant with the template.
pub async fn tenant_status(
    State(state): State<AppState>,
    _caller: DashboardAccount,
    Path(client): Path<String>,
) -> ApiResult<Json<TenantStatus>> {
    let tenant = TenantId::parse(&client)?;
    let registry = &state.tenancy.registry;

    let exists = registry.schema_exists(&tenant).await?;
    let tables = if exists {
        registry.list_tenant_tables(&tenant).await?
    } else {
        Vec::new()
    };
    let missing_tables = registry
        .list_template_tables()
        .await?
        .into_iter()
        .filter(|t| !tables.contains(t))
        .collect();

    Ok(Json(TenantStatus {
        tenant: tenant.to_string(),
        exists,
        missing_tables,
        tables,
    }))
}

/// POST /api/admin/tenants/{client}/reconcile
pub async fn reconcile_tenant(
    State(state): State<AppState>,
    DashboardAccount(caller): DashboardAccount,
    Path(client): Path<String>,
) -> ApiResult<Json<ProvisionReport>> {
    tracing::info!(requested_by = caller.id, tenant = %client, "Manual tenant reconcile");
    let report = state.tenancy.reconciler.reconcile(&client).await?;
    Ok(Json(report))
}

/// POST /api/admin/tenants/{client}/website-token: mint an expiring token
/// for the tenant's public website.
pub async fn issue_website_token(
    State(state): State<AppState>,
    _caller: DashboardAccount,
    Path(client): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = TenantId::parse(&client)?;
    if !state.tenancy.registry.schema_exists(&tenant).await? {
        return Err(ApiError::not_found(format!("Tenant '{tenant}' does not exist")));
    }
    let token = state
        .tokens
        .issue_website_token(tenant.as_str(), Duration::days(WEBSITE_TOKEN_DAYS))?;
    Ok(Json(json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in_days": WEBSITE_TOKEN_DAYS,
    })))
}
