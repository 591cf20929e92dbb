pub mod schema;
pub mod tenant;

use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgConnection, PgPool, Postgres, Sqlite, SqliteConnection, SqlitePool};

use self::tenant::{quote_ident, TEMPLATE_SCHEMA};

/// Runs one sqlx expression against whichever backend `$target` (a [`Conn`])
/// points at. `$conn` is bound to `&mut PgConnection` or `&mut SqliteConnection`.
#[macro_export]
macro_rules! with_conn {
    ($target:expr, |$conn:ident| $body:expr) => {
        match $target {
            $crate::db::Conn::Postgres($conn) => $body,
            $crate::db::Conn::Sqlite($conn) => $body,
        }
    };
}

/// Same as [`with_conn!`] but over a [`Database`] pool; `$pool` is `&PgPool`
/// or `&SqlitePool`.
#[macro_export]
macro_rules! with_pool {
    ($db:expr, |$pool:ident| $body:expr) => {
        match $db {
            $crate::db::Database::Postgres($pool) => $body,
            $crate::db::Database::Sqlite($pool) => $body,
        }
    };
}

/// Backend chosen once at startup from the database URL.
#[derive(Debug, Clone)]
pub enum Database {
    /// Relational backend: one schema per tenant plus the `public` template.
    Postgres(PgPool),
    /// Embedded single-file backend: one implicit namespace.
    Sqlite(SqlitePool),
}

/// Borrowed connection of either backend.
pub enum Conn<'a> {
    Postgres(&'a mut PgConnection),
    Sqlite(&'a mut SqliteConnection),
}

impl Conn<'_> {
    pub fn reborrow(&mut self) -> Conn<'_> {
        match self {
            Conn::Postgres(c) => Conn::Postgres(&mut **c),
            Conn::Sqlite(c) => Conn::Sqlite(&mut **c),
        }
    }

    /// Fully qualified name of a table in the template namespace.
    pub fn template_table(&self, table: &str) -> String {
        match self {
            Conn::Postgres(_) => format!("{}.{}", quote_ident(TEMPLATE_SCHEMA), quote_ident(table)),
            Conn::Sqlite(_) => quote_ident(table),
        }
    }
}

/// Owned pooled connection of either backend.
#[derive(Debug)]
pub enum DbConn {
    Postgres(PoolConnection<Postgres>),
    Sqlite(PoolConnection<Sqlite>),
}

impl DbConn {
    pub fn conn(&mut self) -> Conn<'_> {
        match self {
            DbConn::Postgres(c) => Conn::Postgres(&mut **c),
            DbConn::Sqlite(c) => Conn::Sqlite(&mut **c),
        }
    }
}

impl Database {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        if database_url.starts_with("sqlite:") {
            let opts = SqliteConnectOptions::from_str(database_url)?
                .create_if_missing(true)
                .foreign_keys(true)
                .busy_timeout(Duration::from_secs(5));
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(opts)
                .await?;
            return Ok(Database::Sqlite(pool));
        }

        let pool = PgPoolOptions::new()
            .max_connections(20)
            // A tenant session that was dropped on an error path still holds its
            // search_path; reset it before the connection is handed out again.
            .after_release(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("RESET search_path").execute(&mut *conn).await?;
                    Ok(true)
                })
            })
            .connect(database_url)
            .await?;
        Ok(Database::Postgres(pool))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Database::Postgres(_) => "postgres",
            Database::Sqlite(_) => "sqlite",
        }
    }

    pub async fn acquire(&self) -> Result<DbConn, sqlx::Error> {
        Ok(match self {
            Database::Postgres(pool) => DbConn::Postgres(pool.acquire().await?),
            Database::Sqlite(pool) => DbConn::Sqlite(pool.acquire().await?),
        })
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        with_pool!(self, |pool| sqlx::query("SELECT 1").execute(pool).await.map(|_| ()))?;
        Ok(())
    }

    /// Fully qualified name of a cross-tenant table (identity, sessions).
    pub fn template_table(&self, table: &str) -> String {
        match self {
            Database::Postgres(_) => {
                format!("{}.{}", quote_ident(TEMPLATE_SCHEMA), quote_ident(table))
            }
            Database::Sqlite(_) => quote_ident(table),
        }
    }
}
