use std::collections::HashSet;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Connection, PgConnection, PgPool};

use super::registry::{
    columns_on, constraint_exists_on, foreign_keys_on, schema_exists_on, sequence_columns_on,
    table_exists_on, template_tables_on, ForeignKey,
};
use super::seed::{seed_template_entity, SeedEntity};
use super::{
    quote_ident, quote_literal, ProvisionReport, SeededTable, TenantError, TenantId,
    TenantOutcome, UnitError, EXCLUDED_TABLES, TEMPLATE_SCHEMA,
};
use crate::db::Conn;
use crate::services::metrics;

/// Postgres caps identifiers at 63 bytes.
const MAX_IDENT_LEN: usize = 63;

#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    /// Create the tenant's namespace from the template. An existing namespace
    /// is reconciled instead.
    async fn provision(&self, tenant: &str) -> Result<ProvisionReport, TenantError>;
}

#[async_trait]
pub trait TenantReconciler: Send + Sync {
    /// Bring an existing tenant back in line with the template. A missing
    /// namespace is provisioned instead.
    async fn reconcile(&self, tenant: &str) -> Result<ProvisionReport, TenantError>;

    /// Reconcile every tenant referenced by a dashboard user. Each tenant is
    /// independent: a failure is recorded in its outcome and the batch goes on.
    async fn reconcile_all(&self) -> Result<Vec<TenantOutcome>, TenantError>;
}

pub struct PgTenantProvisioner {
    pool: PgPool,
}

impl PgTenantProvisioner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Provision and reconcile share one path: under a per-tenant advisory
    /// lock, create the schema when missing, fill in absent tables, relink
    /// foreign keys, then copy starter rows into empty tables. Each table,
    /// constraint and seed unit runs in its own savepoint.
    async fn run(&self, raw: &str) -> Result<ProvisionReport, TenantError> {
        let tenant = TenantId::parse(raw)?;
        let mut report = ProvisionReport::new(&tenant);

        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("tenant:{tenant}"))
            .execute(&mut *tx)
            .await?;

        if schema_exists_on(&mut tx, tenant.as_str()).await? {
            reconcile_existing(&mut tx, &tenant, &mut report).await?;
        } else {
            create_new(&mut tx, &tenant, &mut report).await?;
        }
        tx.commit().await?;

        metrics::record_provision(&report);
        if report.is_complete() {
            tracing::info!(
                tenant = %tenant,
                created = report.schema_created,
                tables = report.tables_created.len(),
                rows = report.rows_copied(),
                "Tenant schema in sync"
            );
        } else {
            tracing::warn!(
                tenant = %tenant,
                table_errors = report.table_errors.len(),
                seed_errors = report.seed_errors.len(),
                "Tenant schema provisioned with errors"
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl TenantProvisioner for PgTenantProvisioner {
    async fn provision(&self, tenant: &str) -> Result<ProvisionReport, TenantError> {
        self.run(tenant).await.inspect_err(|_| metrics::record_provision_failure())
    }
}

#[async_trait]
impl TenantReconciler for PgTenantProvisioner {
    async fn reconcile(&self, tenant: &str) -> Result<ProvisionReport, TenantError> {
        self.run(tenant).await.inspect_err(|_| metrics::record_provision_failure())
    }

    async fn reconcile_all(&self) -> Result<Vec<TenantOutcome>, TenantError> {
        let clients: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT client FROM public.user2
             WHERE client IS NOT NULL AND client <> ''
             ORDER BY client",
        )
        .fetch_all(&self.pool)
        .await?;

        tracing::info!(tenants = clients.len(), "Reconciling tenant schemas");
        let mut outcomes = Vec::with_capacity(clients.len());
        for client in clients {
            let result = self.reconcile(&client).await;
            if let Err(e) = &result {
                tracing::error!(tenant = %client, "Tenant reconciliation failed: {e}");
            }
            outcomes.push(TenantOutcome { tenant: client, result });
        }
        Ok(outcomes)
    }
}

async fn create_new(
    conn: &mut PgConnection,
    tenant: &TenantId,
    report: &mut ProvisionReport,
) -> Result<(), TenantError> {
    sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&format!("CREATE SCHEMA IF NOT EXISTS {}", tenant.quoted())))
        .await?;
    report.schema_created = true;
    tracing::info!(tenant = %tenant, "Created tenant schema");

    let tables = template_tables_on(conn).await?;
    if tables.is_empty() {
        tracing::warn!(tenant = %tenant, "Template schema has no tables; tenant left empty");
        return Ok(());
    }
    for table in &tables {
        copy_table(conn, tenant, table, report).await;
    }
    link_foreign_keys(conn, tenant, &tables, report).await?;
    copy_seed_data(conn, tenant, report).await;
    Ok(())
}

async fn reconcile_existing(
    conn: &mut PgConnection,
    tenant: &TenantId,
    report: &mut ProvisionReport,
) -> Result<(), TenantError> {
    let template = template_tables_on(conn).await?;
    let present: HashSet<String> = super::registry::base_tables_on(conn, tenant.as_str())
        .await?
        .into_iter()
        .collect();

    let missing: Vec<&String> = template.iter().filter(|t| !present.contains(*t)).collect();
    if !missing.is_empty() {
        tracing::info!(tenant = %tenant, missing = ?missing, "Restoring missing tenant tables");
    }
    for table in missing {
        copy_table(conn, tenant, table, report).await;
    }
    link_foreign_keys(conn, tenant, &template, report).await?;
    copy_seed_data(conn, tenant, report).await;
    Ok(())
}

async fn copy_table(
    conn: &mut PgConnection,
    tenant: &TenantId,
    table: &str,
    report: &mut ProvisionReport,
) {
    match copy_table_structure(conn, tenant, table).await {
        Ok(()) => report.tables_created.push(table.to_string()),
        Err(e) => {
            tracing::warn!(tenant = %tenant, table, "Could not copy table: {e}");
            report.table_errors.push(UnitError {
                unit: table.to_string(),
                error: e.to_string(),
            });
        }
    }
}

/// Clone one template table into the tenant and give every sequence-backed
/// column its own tenant-scoped sequence. Savepoint-scoped.
async fn copy_table_structure(
    conn: &mut PgConnection,
    tenant: &TenantId,
    table: &str,
) -> Result<(), sqlx::Error> {
    let mut sp = conn.begin().await?;
    let source = format!("{}.{}", quote_ident(TEMPLATE_SCHEMA), quote_ident(table));
    let target = tenant.qualify(table);

    sqlx::Executor::execute(&mut *sp, sqlx::raw_sql(&format!(
        "CREATE TABLE IF NOT EXISTS {target} (LIKE {source} INCLUDING ALL)"
    )))
    .await?;

    // LIKE copies `nextval('public.<seq>')` defaults verbatim; without this the
    // tenant would draw ids from the template's sequence.
    for column in sequence_columns_on(&mut sp, TEMPLATE_SCHEMA, table).await? {
        let sequence = tenant.qualify(&sequence_name(table, &column));
        let column = quote_ident(&column);
        sqlx::Executor::execute(&mut *sp, sqlx::raw_sql(&format!(
            "CREATE SEQUENCE IF NOT EXISTS {sequence} OWNED BY {target}.{column}"
        )))
        .await?;
        sqlx::Executor::execute(&mut *sp, sqlx::raw_sql(&format!(
            "ALTER TABLE {target} ALTER COLUMN {column} SET DEFAULT nextval({}::regclass)",
            quote_literal(&sequence)
        )))
        .await?;
    }

    sp.commit().await
}

/// `LIKE .. INCLUDING ALL` leaves foreign keys behind. Recreate each template
/// constraint the tenant lacks, pointing at the tenant's own copy of the
/// referenced table. Tables that failed to copy are already reported and
/// skipped here.
async fn link_foreign_keys(
    conn: &mut PgConnection,
    tenant: &TenantId,
    tables: &[String],
    report: &mut ProvisionReport,
) -> Result<(), TenantError> {
    for table in tables {
        if !table_exists_on(conn, tenant.as_str(), table).await? {
            continue;
        }
        for fk in foreign_keys_on(conn, TEMPLATE_SCHEMA, table).await? {
            if constraint_exists_on(conn, tenant.as_str(), table, &fk.name).await? {
                continue;
            }
            let unit = format!("{table}.{}", fk.name);
            match add_foreign_key(conn, tenant, table, &fk).await {
                Ok(()) => {
                    tracing::debug!(tenant = %tenant, constraint = %unit, "Linked foreign key");
                    report.constraints_added.push(unit);
                }
                Err(e) => {
                    tracing::warn!(tenant = %tenant, constraint = %unit, "Could not link foreign key: {e}");
                    report.table_errors.push(UnitError {
                        unit,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

async fn add_foreign_key(
    conn: &mut PgConnection,
    tenant: &TenantId,
    table: &str,
    fk: &ForeignKey,
) -> Result<(), sqlx::Error> {
    let referenced = if fk.ref_schema == TEMPLATE_SCHEMA
        && !EXCLUDED_TABLES.contains(&fk.ref_table.as_str())
    {
        tenant.qualify(&fk.ref_table)
    } else {
        format!("{}.{}", quote_ident(&fk.ref_schema), quote_ident(&fk.ref_table))
    };
    let list = |columns: &[String]| {
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut sp = conn.begin().await?;
    sqlx::Executor::execute(&mut *sp, sqlx::raw_sql(&format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {referenced} ({}) ON UPDATE {} ON DELETE {}",
        tenant.qualify(table),
        quote_ident(&fk.name),
        list(&fk.columns),
        list(&fk.ref_columns),
        referential_action(&fk.on_update),
        referential_action(&fk.on_delete),
    )))
    .await?;
    sp.commit().await
}

/// Decode `pg_constraint.confupdtype` / `confdeltype`.
fn referential_action(code: &str) -> &'static str {
    match code {
        "r" => "RESTRICT",
        "c" => "CASCADE",
        "n" => "SET NULL",
        "d" => "SET DEFAULT",
        _ => "NO ACTION",
    }
}

async fn copy_seed_data(conn: &mut PgConnection, tenant: &TenantId, report: &mut ProvisionReport) {
    for entity in SeedEntity::ALL {
        match copy_seed_entity(conn, tenant, entity).await {
            Ok(rows) => report.rows_seeded.push(SeededTable {
                table: entity.table().to_string(),
                rows,
            }),
            Err(e) => {
                tracing::warn!(tenant = %tenant, table = entity.table(), "Seed copy failed: {e}");
                report.seed_errors.push(UnitError {
                    unit: entity.table().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Copy the template's starter rows into an empty tenant table, then move the
/// tenant's sequences past the copied ids. Tables with content are left alone.
async fn copy_seed_entity(
    conn: &mut PgConnection,
    tenant: &TenantId,
    entity: SeedEntity,
) -> Result<u64, sqlx::Error> {
    let table = entity.table();
    let mut sp = conn.begin().await?;

    seed_template_entity(Conn::Postgres(&mut sp), entity).await?;
    if !table_exists_on(&mut sp, tenant.as_str(), table).await? {
        copy_table_structure(&mut sp, tenant, table).await?;
    }

    let target = tenant.qualify(table);
    let existing: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {target}"))
        .fetch_one(&mut *sp)
        .await?;
    if existing > 0 {
        sp.commit().await?;
        return Ok(0);
    }

    let source = format!("{}.{}", quote_ident(TEMPLATE_SCHEMA), quote_ident(table));
    let columns = columns_on(&mut sp, TEMPLATE_SCHEMA, table)
        .await?
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let copied = sqlx::query(&format!(
        "INSERT INTO {target} ({columns}) SELECT {columns} FROM {source} ORDER BY 1"
    ))
    .execute(&mut *sp)
    .await?
    .rows_affected();

    for column in sequence_columns_on(&mut sp, tenant.as_str(), table).await? {
        sqlx::query(&format!(
            "SELECT setval(pg_get_serial_sequence($1, $2), COALESCE(MAX({}), 0) + 1, false) FROM {target}",
            quote_ident(&column)
        ))
        .bind(target.as_str())
        .bind(column.as_str())
        .execute(&mut *sp)
        .await?;
    }

    sp.commit().await?;
    Ok(copied)
}

/// `<table>_<column>_seq`. Names over the identifier limit are cut on a char
/// boundary and suffixed with a digest of the full name, so two long names
/// sharing a prefix still get distinct sequences.
fn sequence_name(table: &str, column: &str) -> String {
    let mut name = format!("{table}_{column}_seq");
    if name.len() <= MAX_IDENT_LEN {
        return name;
    }
    let digest = Sha256::digest(name.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    let mut cut = MAX_IDENT_LEN - suffix.len() - 1;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    name.truncate(cut);
    name.push('_');
    name.push_str(&suffix);
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_names_follow_serial_convention() {
        assert_eq!(sequence_name("header", "id"), "header_id_seq");
    }

    #[test]
    fn sequence_names_fit_identifier_limit() {
        let table = "t".repeat(70);
        let name = sequence_name(&table, "id");
        assert_eq!(name.len(), MAX_IDENT_LEN);
        assert_eq!(name, sequence_name(&table, "id"));

        let wide = "\u{e9}".repeat(40);
        let name = sequence_name(&wide, "id");
        assert!(name.len() <= MAX_IDENT_LEN);
        assert!(name.is_char_boundary(name.len()));
    }

    #[test]
    fn truncated_sequence_names_stay_distinct() {
        let prefix = "registro_de_publicaciones_".repeat(3);
        let a = sequence_name(&format!("{prefix}anuales"), "id");
        let b = sequence_name(&format!("{prefix}mensuales"), "id");
        assert!(a.len() <= MAX_IDENT_LEN && b.len() <= MAX_IDENT_LEN);
        assert_ne!(a, b);
        assert_eq!(a[..50], b[..50]);

        let c = sequence_name(&prefix, "id_largo_de_la_columna");
        let d = sequence_name(&prefix, "id_largo_de_la_columnb");
        assert_ne!(c, d);
    }

    #[test]
    fn referential_actions_decode_catalog_codes() {
        assert_eq!(referential_action("a"), "NO ACTION");
        assert_eq!(referential_action("c"), "CASCADE");
        assert_eq!(referential_action("n"), "SET NULL");
    }
}
