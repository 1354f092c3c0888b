use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, build_router};
use hms_core::db::now;
use hms_core::jobs::{Job, default_jobs, run_all};
use hms_core::{CoreConfig, Database, EnvValues};

/// Main entry point for the HMS application
///
/// Runs the REST server and the background job scheduler concurrently. The
/// scheduler wakes every `HMS_JOB_INTERVAL_SECS` and runs every job once on a
/// blocking thread (scheduled reports, stock reservation expiry, invoice backfill).
///
/// # Environment Variables
/// - `HMS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `HMS_DATABASE_PATH`: SQLite database file (default: "hms.sqlite3")
/// - `HMS_JOB_INTERVAL_SECS`: scheduler period (default: 60)
/// - `HMS_CACHE_TTL_SECS`, `HMS_RESERVATION_MINUTES`, `HMS_DEFAULT_BRANCH`
///
/// # Returns
/// * `Ok(())` - If the server shuts down cleanly
/// * `Err(anyhow::Error)` - If startup fails or the server errors
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hms_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("hms_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(CoreConfig::from_env_values(EnvValues::from_process_env())?);
    let db = Database::open(cfg.database_path())?;

    let rest_addr = cfg.rest_addr().to_string();
    tracing::info!("++ Starting HMS REST on {}", rest_addr);
    tracing::info!(
        "++ Starting job scheduler every {}s",
        cfg.job_interval().as_secs()
    );

    let jobs: Arc<Vec<Box<dyn Job>>> = Arc::new(default_jobs(&db, &cfg));
    let rest_app = build_router(AppState::new(db, cfg.clone()));

    let rest_server = async move {
        let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
        axum::serve(listener, rest_app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok::<_, anyhow::Error>(())
    };

    let scheduler = run_scheduler(jobs, cfg.job_interval());

    let (rest_result, ()) = tokio::join!(rest_server, async {
        tokio::select! {
            _ = scheduler => {}
            _ = shutdown_signal() => tracing::info!("-- Stopping job scheduler"),
        }
    });
    rest_result?;

    Ok(())
}

async fn run_scheduler(jobs: Arc<Vec<Box<dyn Job>>>, period: std::time::Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let jobs = jobs.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || run_all(&jobs, now())).await {
            tracing::error!("job runner panicked: {e}");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
