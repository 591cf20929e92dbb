//! Tenant schema provisioning.
//!
//! Every tenant owns a PostgreSQL schema named after its `client` key. The
//! `public` schema is the template: its tables (minus the cross-tenant ones in
//! [`EXCLUDED_TABLES`]) and its starter rows are cloned into each tenant. On the
//! SQLite backend there is a single namespace and provisioning is a no-op.

pub mod embedded;
pub mod provision;
pub mod registry;
pub mod seed;
pub mod session;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::Database;
use embedded::EmbeddedTenants;
use provision::{PgTenantProvisioner, TenantProvisioner, TenantReconciler};
use registry::{EmbeddedSchemaRegistry, PgSchemaRegistry, SchemaRegistry};
use seed::TemplateSeeder;
use session::{EmbeddedSessionFactory, PgSessionFactory, TenantSessionFactory};

pub const TEMPLATE_SCHEMA: &str = "public";

/// Template tables that hold cross-tenant state and are never cloned.
pub const EXCLUDED_TABLES: &[&str] = &["user2", "active_sessions", "google_calendar_tokens"];

const MAX_TENANT_LEN: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("invalid tenant identifier {0:?}: expected 1-50 characters from [A-Za-z0-9_]")]
    InvalidName(String),
    #[error("tenant schema '{0}' does not exist")]
    NotFound(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// A validated tenant key. Construction is the only place the naming rule is
/// checked, so every identifier that reaches SQL text went through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> Result<Self, TenantError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_TENANT_LEN
            && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(TenantError::InvalidName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The schema name as a quoted SQL identifier.
    pub fn quoted(&self) -> String {
        quote_ident(&self.0)
    }

    /// `"tenant"."table"`
    pub fn qualify(&self, table: &str) -> String {
        format!("{}.{}", self.quoted(), quote_ident(table))
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// One table, constraint or seed unit that failed and was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct UnitError {
    pub unit: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SeededTable {
    pub table: String,
    pub rows: u64,
}

/// What a provision or reconcile pass did for one tenant.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub tenant: String,
    pub schema_created: bool,
    pub tables_created: Vec<String>,
    /// Foreign keys recreated in the tenant, as `table.constraint`.
    pub constraints_added: Vec<String>,
    pub table_errors: Vec<UnitError>,
    pub rows_seeded: Vec<SeededTable>,
    pub seed_errors: Vec<UnitError>,
}

impl ProvisionReport {
    pub fn new(tenant: &TenantId) -> Self {
        Self {
            tenant: tenant.to_string(),
            schema_created: false,
            tables_created: Vec::new(),
            constraints_added: Vec::new(),
            table_errors: Vec::new(),
            rows_seeded: Vec::new(),
            seed_errors: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.table_errors.is_empty() && self.seed_errors.is_empty()
    }

    pub fn rows_copied(&self) -> u64 {
        self.rows_seeded.iter().map(|s| s.rows).sum()
    }
}

/// Result of reconciling one tenant inside a batch.
#[derive(Debug)]
pub struct TenantOutcome {
    pub tenant: String,
    pub result: Result<ProvisionReport, TenantError>,
}

/// The tenancy components for the configured backend, built once at startup.
#[derive(Clone)]
pub struct Tenancy {
    pub registry: Arc<dyn SchemaRegistry>,
    pub seeder: TemplateSeeder,
    pub provisioner: Arc<dyn TenantProvisioner>,
    pub reconciler: Arc<dyn TenantReconciler>,
    pub sessions: Arc<dyn TenantSessionFactory>,
}

impl Tenancy {
    pub fn for_database(db: &Database) -> Self {
        let seeder = TemplateSeeder::new(db.clone());
        match db {
            Database::Postgres(pool) => {
                let engine = Arc::new(PgTenantProvisioner::new(pool.clone()));
                Self {
                    registry: Arc::new(PgSchemaRegistry::new(pool.clone())),
                    seeder,
                    provisioner: engine.clone(),
                    reconciler: engine,
                    sessions: Arc::new(PgSessionFactory::new(pool.clone())),
                }
            }
            Database::Sqlite(pool) => {
                let engine = Arc::new(EmbeddedTenants);
                Self {
                    registry: Arc::new(EmbeddedSchemaRegistry),
                    seeder,
                    provisioner: engine.clone(),
                    reconciler: engine,
                    sessions: Arc::new(EmbeddedSessionFactory::new(pool.clone())),
                }
            }
        }
    }
}
