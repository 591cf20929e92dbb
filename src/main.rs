use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sitecms_api::config::Config;
use sitecms_api::db::Database;
use sitecms_api::services::metrics;
use sitecms_api::{bootstrap, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::connect(&config.database_url).await?;
    info!(backend = db.backend_name(), "Database connected");

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(db.clone(), config);
    bootstrap(&state).await?;
    info!("Template and tenants ready");

    metrics::start(db);

    let app = routes::router(state);

    info!("sitecms API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
