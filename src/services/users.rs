use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::db::Database;
use crate::models::user::{DashboardUser, UpdateUserRequest};
use crate::services::auth::hash_password;
use crate::with_pool;

const USER_COLS: &str = "id, password, full_name, email, client";

/// Dashboard accounts in the cross-tenant `user2` table.
pub struct UserService;

impl UserService {
    pub async fn list(db: &Database) -> anyhow::Result<Vec<DashboardUser>> {
        let sql = format!("SELECT {USER_COLS} FROM {} ORDER BY id", db.template_table("user2"));
        let users = with_pool!(db, |pool| {
            sqlx::query_as::<_, DashboardUser>(&sql).fetch_all(pool).await
        })?;
        Ok(users)
    }

    pub async fn find_by_email(db: &Database, email: &str) -> anyhow::Result<Option<DashboardUser>> {
        let sql = format!(
            "SELECT {USER_COLS} FROM {} WHERE email = $1",
            db.template_table("user2")
        );
        let user = with_pool!(db, |pool| {
            sqlx::query_as::<_, DashboardUser>(&sql)
                .bind(email)
                .fetch_optional(pool)
                .await
        })?;
        Ok(user)
    }

    pub async fn find_by_id(db: &Database, id: i32) -> anyhow::Result<Option<DashboardUser>> {
        let sql = format!("SELECT {USER_COLS} FROM {} WHERE id = $1", db.template_table("user2"));
        let user = with_pool!(db, |pool| {
            sqlx::query_as::<_, DashboardUser>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
        })?;
        Ok(user)
    }

    pub async fn create(
        db: &Database,
        email: &str,
        password: &str,
        full_name: &str,
        client: &str,
    ) -> anyhow::Result<DashboardUser> {
        let hash = hash_password(password)?;
        let sql = format!(
            "INSERT INTO {} (email, password, full_name, client) VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLS}",
            db.template_table("user2")
        );
        let user = with_pool!(db, |pool| {
            sqlx::query_as::<_, DashboardUser>(&sql)
                .bind(email)
                .bind(&hash)
                .bind(full_name)
                .bind(client)
                .fetch_one(pool)
                .await
        })?;
        tracing::info!(user_id = user.id, client, "Dashboard user created");
        Ok(user)
    }

    /// Apply the non-empty fields of `req`. Returns None when the user is gone.
    pub async fn update(
        db: &Database,
        id: i32,
        req: &UpdateUserRequest,
    ) -> anyhow::Result<Option<DashboardUser>> {
        let Some(mut user) = Self::find_by_id(db, id).await? else {
            return Ok(None);
        };
        if let Some(email) = req.email.as_deref().filter(|s| !s.is_empty()) {
            user.email = email.to_string();
        }
        if let Some(full_name) = req.full_name.as_deref().filter(|s| !s.is_empty()) {
            user.full_name = full_name.to_string();
        }
        if let Some(password) = req.password.as_deref().filter(|s| !s.is_empty()) {
            user.password = hash_password(password)?;
        }

        let sql = format!(
            "UPDATE {} SET email = $1, full_name = $2, password = $3 WHERE id = $4",
            db.template_table("user2")
        );
        with_pool!(db, |pool| {
            sqlx::query(&sql)
                .bind(&user.email)
                .bind(&user.full_name)
                .bind(&user.password)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })?;
        Ok(Some(user))
    }

    /// Returns false when no row matched.
    pub async fn delete(db: &Database, id: i32) -> anyhow::Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", db.template_table("user2"));
        let result = with_pool!(db, |pool| {
            sqlx::query(&sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })?;
        Ok(result > 0)
    }

    /// Two sign-ins within the same second yield the same token; the second
    /// insert is a no-op.
    pub async fn record_session(
        db: &Database,
        user_id: i32,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO {} (user_id, token, expires_at) VALUES ($1, $2, $3)
             ON CONFLICT (token) DO NOTHING",
            db.template_table("active_sessions")
        );
        let expires_at = expires_at.naive_utc();
        with_pool!(db, |pool| {
            sqlx::query(&sql)
                .bind(user_id)
                .bind(token)
                .bind(expires_at)
                .execute(pool)
                .await
                .map(|_| ())
        })?;
        Ok(())
    }

    /// Create the bootstrap admin when missing, or give an existing admin
    /// its client back. Returns the admin's tenant key.
    pub async fn ensure_admin(db: &Database, config: &Config) -> anyhow::Result<String> {
        match Self::find_by_email(db, &config.admin_email).await? {
            None => {
                Self::create(
                    db,
                    &config.admin_email,
                    &config.admin_password,
                    "Super Admin",
                    &config.admin_client,
                )
                .await?;
                tracing::info!(email = %config.admin_email, "Bootstrap admin created");
            }
            Some(admin) if admin.client.as_deref().unwrap_or("").is_empty() => {
                let sql = format!("UPDATE {} SET client = $1 WHERE id = $2", db.template_table("user2"));
                with_pool!(db, |pool| {
                    sqlx::query(&sql)
                        .bind(&config.admin_client)
                        .bind(admin.id)
                        .execute(pool)
                        .await
                        .map(|_| ())
                })?;
                tracing::info!(email = %config.admin_email, "Bootstrap admin client repaired");
            }
            Some(_) => tracing::debug!("Bootstrap admin present"),
        }
        Ok(config.admin_client.clone())
    }
}

/// Tenant keys are stored trimmed and lowercased.
pub fn normalize_client(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_keys_are_normalized() {
        assert_eq!(normalize_client("  AcMe_1 "), "acme_1");
    }
}
