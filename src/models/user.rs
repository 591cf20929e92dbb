use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the cross-tenant `user2` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DashboardUser {
    pub id: i32,
    #[serde(skip_serializing)]
    pub password: String,
    pub full_name: String,
    pub email: String,
    pub client: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub client: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserCreated {
    pub message: &'static str,
    pub email: String,
    pub full_name: String,
    pub client: String,
    /// Set when the user was created but its tenant schema is incomplete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserUpdated {
    pub message: &'static str,
    pub email: String,
    pub full_name: String,
}
