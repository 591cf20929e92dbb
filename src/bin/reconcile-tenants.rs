/// Bring tenant schemas back in line with the template.
/// Safe to run repeatedly, e.g. after adding a table to the template.
///
/// Usage: reconcile-tenants [--tenant CLIENT] [--seed-only]
///   --tenant CLIENT : Reconcile only this tenant (all if not specified)
///   --seed-only     : Only make sure the template holds its starter rows

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use sitecms_api::db::tenant::{ProvisionReport, Tenancy, TenantOutcome};
use sitecms_api::db::{self, Database};

#[derive(Parser)]
#[command(name = "reconcile-tenants", about = "Reconcile tenant schemas with the template")]
struct Args {
    /// Tenant client key to reconcile (optional, all if not specified)
    #[arg(long)]
    tenant: Option<String>,

    /// Only seed the template namespace
    #[arg(long)]
    seed_only: bool,
}

fn log_report(report: &ProvisionReport) {
    tracing::info!(
        tenant = %report.tenant,
        schema_created = report.schema_created,
        tables_created = report.tables_created.len(),
        constraints_added = report.constraints_added.len(),
        rows_copied = report.rows_copied(),
        "Tenant reconciled"
    );
    for e in report.table_errors.iter().chain(&report.seed_errors) {
        tracing::error!(tenant = %report.tenant, unit = %e.unit, "{}", e.error);
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let db = Database::connect(&database_url).await?;
    db::schema::bootstrap(&db).await?;
    let tenancy = Tenancy::for_database(&db);

    let seeded = tenancy.seeder.ensure_seed_data().await?;
    for table in &seeded.seeded {
        tracing::info!("Seeded {} row(s) into template table {}", table.rows, table.table);
    }
    let mut ok = seeded.errors.is_empty();
    for e in &seeded.errors {
        tracing::error!(unit = %e.unit, "Template seeding failed: {}", e.error);
    }
    if args.seed_only {
        return Ok(ok);
    }

    let outcomes = match args.tenant {
        Some(tenant) => vec![TenantOutcome {
            result: tenancy.reconciler.reconcile(&tenant).await,
            tenant,
        }],
        None => tenancy.reconciler.reconcile_all().await?,
    };

    tracing::info!("Reconciled {} tenant(s)", outcomes.len());
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => {
                log_report(report);
                ok &= report.is_complete();
            }
            Err(e) => {
                tracing::error!(tenant = %outcome.tenant, "Reconcile failed: {e}");
                ok = false;
            }
        }
    }
    Ok(ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    match run(Args::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("reconcile-tenants failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
