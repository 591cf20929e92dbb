use async_trait::async_trait;
use sqlx::{FromRow, PgConnection, PgPool};

use super::{TenantError, TenantId, EXCLUDED_TABLES, TEMPLATE_SCHEMA};

/// Read-only catalog queries over tenant namespaces.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn schema_exists(&self, tenant: &TenantId) -> Result<bool, TenantError>;
    /// Base tables of the template namespace that tenants are cloned from.
    async fn list_template_tables(&self) -> Result<Vec<String>, TenantError>;
    async fn list_tenant_tables(&self, tenant: &TenantId) -> Result<Vec<String>, TenantError>;
}

pub struct PgSchemaRegistry {
    pool: PgPool,
}

impl PgSchemaRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchemaRegistry for PgSchemaRegistry {
    async fn schema_exists(&self, tenant: &TenantId) -> Result<bool, TenantError> {
        let mut conn = self.pool.acquire().await?;
        Ok(schema_exists_on(&mut conn, tenant.as_str()).await?)
    }

    async fn list_template_tables(&self) -> Result<Vec<String>, TenantError> {
        let mut conn = self.pool.acquire().await?;
        Ok(template_tables_on(&mut conn).await?)
    }

    async fn list_tenant_tables(&self, tenant: &TenantId) -> Result<Vec<String>, TenantError> {
        let mut conn = self.pool.acquire().await?;
        Ok(base_tables_on(&mut conn, tenant.as_str()).await?)
    }
}

/// SQLite has one implicit namespace: it always exists and there is never
/// anything to diff.
pub struct EmbeddedSchemaRegistry;

#[async_trait]
impl SchemaRegistry for EmbeddedSchemaRegistry {
    async fn schema_exists(&self, _tenant: &TenantId) -> Result<bool, TenantError> {
        Ok(true)
    }

    async fn list_template_tables(&self) -> Result<Vec<String>, TenantError> {
        Ok(Vec::new())
    }

    async fn list_tenant_tables(&self, _tenant: &TenantId) -> Result<Vec<String>, TenantError> {
        Ok(Vec::new())
    }
}

// Connection-level helpers, shared with the provisioner so catalog reads see
// the provisioning transaction's own DDL.

pub(crate) async fn schema_exists_on(
    conn: &mut PgConnection,
    schema: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)")
        .bind(schema)
        .fetch_one(conn)
        .await
}

pub(crate) async fn base_tables_on(
    conn: &mut PgConnection,
    schema: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT tablename::TEXT FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
    )
    .bind(schema)
    .fetch_all(conn)
    .await
}

pub(crate) async fn table_exists_on(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_tables WHERE schemaname = $1 AND tablename = $2)",
    )
    .bind(schema)
    .bind(table)
    .fetch_one(conn)
    .await
}

pub(crate) async fn template_tables_on(conn: &mut PgConnection) -> Result<Vec<String>, sqlx::Error> {
    let mut tables = base_tables_on(conn, TEMPLATE_SCHEMA).await?;
    tables.retain(|t| !EXCLUDED_TABLES.contains(&t.as_str()));
    Ok(tables)
}

/// Columns of `schema.table` in ordinal order.
pub(crate) async fn columns_on(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT column_name::TEXT FROM information_schema.columns
         WHERE table_schema = $1 AND table_name = $2
         ORDER BY ordinal_position",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(conn)
    .await
}

/// Columns of `schema.table` whose default draws from a sequence.
pub(crate) async fn sequence_columns_on(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT column_name::TEXT FROM information_schema.columns
         WHERE table_schema = $1 AND table_name = $2
           AND column_default LIKE 'nextval(%'
         ORDER BY ordinal_position",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(conn)
    .await
}

/// A foreign key as read from `pg_constraint`, with column lists in key order.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_schema: String,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}

pub(crate) async fn foreign_keys_on(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKey>, sqlx::Error> {
    sqlx::query_as(
        "SELECT c.conname::TEXT AS name,
                ARRAY(SELECT a.attname::TEXT
                      FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
                      JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum
                      ORDER BY k.ord) AS columns,
                rn.nspname::TEXT AS ref_schema,
                rt.relname::TEXT AS ref_table,
                ARRAY(SELECT a.attname::TEXT
                      FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord)
                      JOIN pg_attribute a ON a.attrelid = c.confrelid AND a.attnum = k.attnum
                      ORDER BY k.ord) AS ref_columns,
                c.confupdtype::TEXT AS on_update,
                c.confdeltype::TEXT AS on_delete
         FROM pg_constraint c
         JOIN pg_class t ON t.oid = c.conrelid
         JOIN pg_namespace n ON n.oid = t.relnamespace
         JOIN pg_class rt ON rt.oid = c.confrelid
         JOIN pg_namespace rn ON rn.oid = rt.relnamespace
         WHERE c.contype = 'f' AND n.nspname = $1 AND t.relname = $2
         ORDER BY c.conname",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(conn)
    .await
}

pub(crate) async fn constraint_exists_on(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
    constraint: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (
             SELECT 1 FROM pg_constraint c
             JOIN pg_class t ON t.oid = c.conrelid
             JOIN pg_namespace n ON n.oid = t.relnamespace
             WHERE n.nspname = $1 AND t.relname = $2 AND c.conname = $3
         )",
    )
    .bind(schema)
    .bind(table)
    .bind(constraint)
    .fetch_one(conn)
    .await
}
