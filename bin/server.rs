// Vehicle Access Register - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use vehicle_access::api::{router, AppState};
use vehicle_access::logging::{init_logging, LogTarget};
use vehicle_access::{open_database, table_counts, AppConfig, SiteClock};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let _log_guard = init_logging(&config.logging, LogTarget::Stderr)?;

    let clock = SiteClock::from_offset(config.site.utc_offset.as_deref())?;

    // Open database connection
    let conn = open_database(&config.database.path)?;
    let (vehicles, entries) = table_counts(&conn)?;
    tracing::info!(
        path = ?config.database.path,
        vehicles,
        entries,
        "Database ready"
    );

    let session_idle = Duration::from_secs(config.server.session_idle_minutes.saturating_mul(60));
    let state = AppState::new(conn, Arc::new(clock), config.reporting.top_vehicles).with_session_idle(session_idle);
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("🚀 {} access server listening on http://{}", config.site.name, addr);
    tracing::info!("   GET  /api/health");
    tracing::info!("   GET  /api/vehicles/lookup/:plate");
    tracing::info!("   POST /api/sessions");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
