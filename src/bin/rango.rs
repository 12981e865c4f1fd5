use anyhow::Context;
use rango::config::get_configuration;
use rango::db;
use rango::server::app::run_server;
use rango::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = get_configuration().context("Failed to read configuration")?;
    let pool = db::establish_connection(&settings.database.path)
        .await
        .with_context(|| format!("Cannot open database {}", settings.database.path))?;

    tracing::info!("Running db migrations...");
    db::run_migrations(&pool).await?;

    let removed = db::queries::sessions::delete_expired_sessions(&pool, chrono::Utc::now()).await?;
    if removed > 0 {
        tracing::info!(removed, "Removed expired sessions");
    }

    run_server(pool, settings).await
}
