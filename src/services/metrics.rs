use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec};
use tracing::{info, warn};

use crate::db::tenant::{quote_ident, ProvisionReport, TenantId};
use crate::db::Database;

lazy_static! {
    // ── Event counters ──────────────────────────────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by tenant and status",
        &["tenant", "status"]
    ).unwrap();

    pub static ref UPLOADS_COUNTER: CounterVec = register_counter_vec!(
        "api_uploads_total",
        "Files stored by tenant",
        &["tenant"]
    ).unwrap();

    pub static ref PROVISION_COUNTER: CounterVec = register_counter_vec!(
        "tenant_provision_total",
        "Provision/reconcile passes by outcome (complete, partial, failed)",
        &["outcome"]
    ).unwrap();

    pub static ref PROVISION_UNIT_ERRORS: CounterVec = register_counter_vec!(
        "tenant_provision_unit_errors_total",
        "Tables or seed units skipped during provisioning",
        &["kind"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref TENANTS_GAUGE: Gauge = register_gauge!(
        "site_tenants_total",
        "Distinct tenants referenced by dashboard users"
    ).unwrap();

    pub static ref CONTENT_GAUGE: GaugeVec = register_gauge_vec!(
        "site_content_rows_total",
        "Content rows per tenant and table",
        &["tenant", "table"]
    ).unwrap();
}

const COUNTED_TABLES: &[&str] = &[
    "company",
    "carrousel",
    "news",
    "reviews",
    "product",
    "manager",
    "publication",
];

pub fn record_provision(report: &ProvisionReport) {
    let outcome = if report.is_complete() { "complete" } else { "partial" };
    PROVISION_COUNTER.with_label_values(&[outcome]).inc();
    PROVISION_UNIT_ERRORS
        .with_label_values(&["table"])
        .inc_by(report.table_errors.len() as f64);
    PROVISION_UNIT_ERRORS
        .with_label_values(&["seed"])
        .inc_by(report.seed_errors.len() as f64);
}

pub fn record_provision_failure() {
    PROVISION_COUNTER.with_label_values(&["failed"]).inc();
}

pub fn record_login(tenant: &str, status: &str) {
    LOGINS_COUNTER.with_label_values(&[tenant, status]).inc();
}

pub fn record_upload(tenant: &str) {
    UPLOADS_COUNTER.with_label_values(&[tenant]).inc();
}

/// Spawn the background gauge collector (refreshes every 5 minutes).
pub fn start(db: Database) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = collect(&db).await {
                warn!("Metrics: collection failed: {}", e);
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
        }
    });
}

async fn collect(db: &Database) -> anyhow::Result<()> {
    let users = db.template_table("user2");
    let tenants: Vec<String> = crate::with_pool!(db, |pool| {
        sqlx::query_scalar(&format!(
            "SELECT DISTINCT client FROM {users} WHERE client IS NOT NULL AND client <> ''"
        ))
        .fetch_all(pool)
        .await
    })?;
    TENANTS_GAUGE.set(tenants.len() as f64);

    // Only the relational backend keeps per-tenant tables worth counting.
    let Database::Postgres(pool) = db else {
        return Ok(());
    };
    for client in &tenants {
        let Ok(tenant) = TenantId::parse(client) else {
            continue;
        };
        for table in COUNTED_TABLES {
            let rows: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM {}.{}",
                tenant.quoted(),
                quote_ident(table)
            ))
            .fetch_one(pool)
            .await
            .unwrap_or(0);
            CONTENT_GAUGE
                .with_label_values(&[client.as_str(), table])
                .set(rows as f64);
        }
    }

    info!("Metrics: collected for {} tenant(s)", tenants.len());
    Ok(())
}
