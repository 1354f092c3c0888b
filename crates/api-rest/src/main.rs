//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own, without the background job scheduler.
//!
//! ## Intended use
//! Useful for development and debugging when you only want the REST server (with OpenAPI/Swagger
//! UI). The workspace's main `hms-run` binary runs the REST server and the jobs together.

use api_rest::{build_router, AppState};
use hms_core::{CoreConfig, Database, EnvValues};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the HMS REST API server
///
/// # Environment Variables
/// - `HMS_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `HMS_DATABASE_PATH`: SQLite database file (default: "hms.sqlite3")
/// - `HMS_CACHE_TTL_SECS`, `HMS_RESERVATION_MINUTES`, `HMS_DEFAULT_BRANCH`
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the database cannot be opened and migrated,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("hms_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(CoreConfig::from_env_values(EnvValues::from_process_env())?);
    let db = Database::open(cfg.database_path())?;

    let addr = cfg.rest_addr().to_string();
    tracing::info!("-- Starting HMS REST API on {}", addr);

    let app = build_router(AppState::new(db, cfg));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
