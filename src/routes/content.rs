//! Generic CRUD handlers shared by every site entity. Each handler runs on a
//! session scoped to the caller's tenant.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::tenant::TenantContext;
use crate::models::content::{ContentForm, FieldValue, SiteEntity};
use crate::services::content::ContentService;
use crate::services::metrics;
use crate::services::storage::FileStore;
use crate::AppState;

/// Best-effort removal of a stored file; failures are only logged.
async fn discard(files: &dyn FileStore, tenant: &str, file_name: &str) {
    if let Err(e) = files.delete(tenant, file_name).await {
        tracing::warn!(tenant, file = file_name, "Could not delete stored file: {e}");
    }
}

/// A file saved for this request: the column it fills and its stored name.
type Stored = Vec<(&'static str, String)>;

async fn discard_all(files: &dyn FileStore, tenant: &str, stored: &Stored) {
    for (_, name) in stored {
        discard(files, tenant, name).await;
    }
}

/// Save every upload the entity has a slot for and add the stored names to
/// `fields`. On failure nothing saved by this call is left behind.
async fn store_uploads<E: SiteEntity>(
    state: &AppState,
    tenant: &str,
    form: &mut ContentForm,
    fields: &mut Vec<(&'static str, FieldValue)>,
    creating: bool,
) -> ApiResult<Stored> {
    if creating {
        if let Some(missing) = E::FILES.iter().find(|slot| slot.required && !form.has_file(slot.field)) {
            return Err(ApiError::bad_request(format!("Field '{}' is required", missing.field)));
        }
    }
    let mut stored = Stored::new();
    for slot in E::FILES {
        let Some(upload) = form.take_file(slot.field) else {
            continue;
        };
        match state.files.save(tenant, upload).await {
            Ok(name) => {
                metrics::record_upload(tenant);
                fields.push((slot.column, FieldValue::Text(name.clone())));
                stored.push((slot.column, name));
            }
            Err(e) => {
                discard_all(state.files.as_ref(), tenant, &stored).await;
                return Err(e.into());
            }
        }
    }
    Ok(stored)
}

pub async fn list<E: SiteEntity>(mut ctx: TenantContext) -> ApiResult<Json<Vec<E>>> {
    let public = ctx.is_public();
    let rows = ContentService::list::<E>(&mut ctx.session, public).await;
    ctx.finish().await;
    Ok(Json(rows?))
}

pub async fn get<E: SiteEntity>(mut ctx: TenantContext, Path(id): Path<i32>) -> ApiResult<Json<E>> {
    let public = ctx.is_public();
    let row = ContentService::get::<E>(&mut ctx.session, id, public).await;
    ctx.finish().await;
    row?.map(Json)
        .ok_or_else(|| ApiError::not_found(format!("{} not found", E::LABEL)))
}

pub async fn create<E: SiteEntity>(
    State(state): State<AppState>,
    mut ctx: TenantContext,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<E>)> {
    let mut form = ContentForm::from_multipart(multipart).await?;
    let mut fields = E::create_fields(&form)?;
    let tenant = ctx.tenant().to_string();
    let stored = store_uploads::<E>(&state, &tenant, &mut form, &mut fields, true).await?;

    let result = ContentService::insert::<E>(&mut ctx.session, &fields).await;
    ctx.finish().await;
    match result {
        Ok(row) => {
            tracing::info!(tenant = %tenant, table = E::TABLE, "Content created");
            Ok((StatusCode::CREATED, Json(row)))
        }
        Err(e) => {
            discard_all(state.files.as_ref(), &tenant, &stored).await;
            Err(e.into())
        }
    }
}

pub async fn update<E: SiteEntity>(
    State(state): State<AppState>,
    mut ctx: TenantContext,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> ApiResult<Json<E>> {
    let mut form = ContentForm::from_multipart(multipart).await?;
    let mut fields = E::update_fields(&form)?;
    let tenant = ctx.tenant().to_string();

    let existing = match ContentService::get::<E>(&mut ctx.session, id, false).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            ctx.finish().await;
            return Err(ApiError::not_found(format!("{} not found", E::LABEL)));
        }
        Err(e) => {
            ctx.finish().await;
            return Err(e.into());
        }
    };
    let stored = store_uploads::<E>(&state, &tenant, &mut form, &mut fields, false).await?;

    let result = ContentService::update::<E>(&mut ctx.session, id, &fields).await;
    ctx.finish().await;
    match result {
        Ok(Some(row)) => {
            for (column, _) in &stored {
                if let Some(old) = existing.stored_file(column) {
                    discard(state.files.as_ref(), &tenant, old).await;
                }
            }
            Ok(Json(row))
        }
        other => {
            discard_all(state.files.as_ref(), &tenant, &stored).await;
            match other {
                Ok(_) => Err(ApiError::not_found(format!("{} not found", E::LABEL))),
                Err(e) => Err(e.into()),
            }
        }
    }
}

pub async fn remove<E: SiteEntity>(
    State(state): State<AppState>,
    mut ctx: TenantContext,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    let tenant = ctx.tenant().to_string();
    let deleted = ContentService::delete::<E>(&mut ctx.session, id).await;
    ctx.finish().await;
    let row = deleted?.ok_or_else(|| ApiError::not_found(format!("{} not found", E::LABEL)))?;
    for name in row.stored_files() {
        discard(state.files.as_ref(), &tenant, &name).await;
    }
    tracing::info!(tenant = %tenant, table = E::TABLE, id, "Content deleted");
    Ok(StatusCode::NO_CONTENT)
}
