use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use crate::error::ApiResult;
use crate::models::auth::Identity;
use crate::AppState;

/// GET /api/images/{filename}: serve an upload from the caller's tenant.
pub async fn serve_image(
    State(state): State<AppState>,
    identity: Identity,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let file = state.files.open(identity.tenant_id(), &filename).await?;
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        file.bytes,
    ))
}
