use async_trait::async_trait;
use sqlx::{PgPool, SqlitePool};

use super::registry::schema_exists_on;
use super::{TenantError, TenantId};
use crate::db::{Conn, DbConn};

/// One pooled connection pointed at a tenant's namespace for the length of a
/// request.
#[derive(Debug)]
pub struct TenantSession {
    tenant: TenantId,
    conn: DbConn,
}

impl TenantSession {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn conn(&mut self) -> Conn<'_> {
        self.conn.conn()
    }

    /// Restore the default search path and hand the connection back. Sessions
    /// dropped without this are reset by the pool's release hook instead.
    pub async fn release(mut self) -> Result<(), sqlx::Error> {
        if let DbConn::Postgres(conn) = &mut self.conn {
            sqlx::query("RESET search_path").execute(&mut **conn).await?;
        }
        Ok(())
    }

    /// [`release`](Self::release) for request handlers: a failed reset is
    /// logged and the connection still goes back to the pool, whose release
    /// hook resets it or closes it.
    pub async fn close(self) {
        let tenant = self.tenant.clone();
        if let Err(e) = self.release().await {
            tracing::warn!(tenant = %tenant, "Could not reset tenant session: {e}");
        }
    }
}

#[async_trait]
pub trait TenantSessionFactory: Send + Sync {
    async fn open(&self, tenant: &str) -> Result<TenantSession, TenantError>;
}

pub struct PgSessionFactory {
    pool: PgPool,
}

impl PgSessionFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantSessionFactory for PgSessionFactory {
    async fn open(&self, raw: &str) -> Result<TenantSession, TenantError> {
        let tenant = TenantId::parse(raw)?;
        let mut conn = self.pool.acquire().await?;

        // Never fall back to the template: a missing schema would otherwise
        // resolve every unqualified table to `public`.
        if !schema_exists_on(&mut conn, tenant.as_str()).await? {
            return Err(TenantError::NotFound(tenant.to_string()));
        }
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&format!("SET search_path TO {}, public", tenant.quoted())))
            .await?;

        Ok(TenantSession {
            tenant,
            conn: DbConn::Postgres(conn),
        })
    }
}

pub struct EmbeddedSessionFactory {
    pool: SqlitePool,
}

impl EmbeddedSessionFactory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantSessionFactory for EmbeddedSessionFactory {
    async fn open(&self, raw: &str) -> Result<TenantSession, TenantError> {
        let tenant = TenantId::parse(raw)?;
        let conn = self.pool.acquire().await?;
        Ok(TenantSession {
            tenant,
            conn: DbConn::Sqlite(conn),
        })
    }
}
