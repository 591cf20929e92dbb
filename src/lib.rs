// Library exports for the server, the operator CLI and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use tracing::{info, warn};

use config::Config;
use db::tenant::Tenancy;
use db::Database;
use services::auth::TokenService;
use services::email::EmailService;
use services::storage::{FileStore, LocalFileStore};
use services::users::UserService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub tenancy: Tenancy,
    pub tokens: Arc<TokenService>,
    pub files: Arc<dyn FileStore>,
    pub email: Option<Arc<EmailService>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let email = EmailService::new(&config).map(Arc::new);
        if email.is_some() {
            info!("SMTP email service configured");
        } else {
            info!("SMTP not configured, contact emails disabled");
        }

        Self {
            tenancy: Tenancy::for_database(&db),
            tokens: Arc::new(TokenService::new(&config)),
            files: Arc::new(LocalFileStore::new(
                &config.uploads_dir,
                config.max_image_dimension,
            )),
            email,
            config: Arc::new(config),
            db,
        }
    }
}

/// Startup sequence: template tables, starter rows, the bootstrap admin and
/// its tenant, then a reconcile pass over every known tenant.
pub async fn bootstrap(state: &AppState) -> anyhow::Result<()> {
    db::schema::bootstrap(&state.db).await?;

    let seeded = state.tenancy.seeder.ensure_seed_data().await?;
    for unit in &seeded.errors {
        warn!(unit = %unit.unit, "Template seeding failed: {}", unit.error);
    }

    let admin_client = UserService::ensure_admin(&state.db, &state.config).await?;
    match state.tenancy.provisioner.provision(&admin_client).await {
        Ok(report) if !report.is_complete() => {
            warn!(tenant = %admin_client, "Admin tenant provisioned with errors")
        }
        Ok(_) => {}
        Err(e) => warn!(tenant = %admin_client, "Admin tenant provisioning failed: {e}"),
    }

    let outcomes = state.tenancy.reconciler.reconcile_all().await?;
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        tenants = outcomes.len(),
        failed, "Startup tenant reconciliation finished"
    );
    Ok(())
}
