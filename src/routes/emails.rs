use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::models::auth::Identity;
use crate::services::email::ContactMessage;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub client_email: String,
    pub subject: String,
    pub message: String,
}

/// POST /api/emails: forward a site's contact form to the owner.
pub async fn send_contact_email(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<ContactRequest>,
) -> ApiResult<Json<Value>> {
    let email = state
        .email
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Email is not configured".into()))?;

    if body.client_email.trim().is_empty() || body.message.trim().is_empty() {
        return Err(ApiError::bad_request("client_email and message are required"));
    }

    email
        .send_contact_message(&ContactMessage {
            tenant: identity.tenant_id(),
            client_email: body.client_email.trim(),
            subject: &body.subject,
            message: &body.message,
        })
        .await
        .map_err(|e| {
            tracing::error!(tenant = identity.tenant_id(), "Contact email failed: {e:#}");
            ApiError::Unavailable("Could not send the message".into())
        })?;

    Ok(Json(json!({ "message": "Email sent" })))
}
