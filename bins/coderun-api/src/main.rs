mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use coderun_common::Config;
use coderun_engine::Executor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub executor: Arc<Executor>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // LOG_FORMAT=json for structured output in production
    if std::env::var("LOG_FORMAT").map_or(false, |f| f == "json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("coderun API booting...");

    metrics::init_metrics().context("failed to register metrics")?;
    info!("Metrics registry initialized");

    let config = Config::from_env();
    info!(
        scratch_root = %config.scratch_root.display(),
        dockerfiles_dir = %config.dockerfiles_dir.display(),
        run_timeout_ms = config.run_timeout_ms,
        memory_limit_mb = config.memory_limit_mb,
        "Execution config loaded"
    );

    let executor = Executor::with_docker(config).context("failed to connect to Docker")?;
    info!("Connected to Docker");

    let state = Arc::new(AppState {
        executor: Arc::new(executor),
    });

    let app = routes::app(state);

    // Start server
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept executions");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
