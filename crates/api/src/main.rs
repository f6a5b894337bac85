use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wfm_api::config::ServerConfig;
use wfm_api::router::build_app_router;
use wfm_api::state::AppState;
use wfm_comfyui::config::LauncherConfig;
use wfm_comfyui::launcher::ProcessLauncher;
use wfm_comfyui::manager::RunManager;

/// Database used when `DATABASE_URL` is unset.
const DEFAULT_DATABASE_URL: &str = "sqlite://./workflow.db";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wfm_api=debug,wfm_comfyui=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let launcher_config = LauncherConfig::from_env();
    tracing::info!(
        python = %launcher_config.python,
        public_host = %launcher_config.public_host,
        ports = ?launcher_config.port_range,
        run_root = %launcher_config.run_root.display(),
        "Loaded launcher configuration",
    );

    // --- Database ---
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into());

    let pool = if database_url == "sqlite::memory:" {
        wfm_db::create_memory_pool().await
    } else {
        wfm_db::create_pool(&database_url).await
    }
    .expect("Failed to open database");
    tracing::info!(%database_url, "Database connection pool created");

    wfm_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    wfm_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Run manager ---
    std::fs::create_dir_all(&launcher_config.run_root).expect("Failed to create RUN_ROOT");

    let launcher = Arc::new(ProcessLauncher::new(
        launcher_config.python.clone(),
        launcher_config.bind_host.clone(),
        launcher_config.startup_timeout,
    ));
    let run_manager = RunManager::start(pool.clone(), launcher, &launcher_config).await;
    tracing::info!("Run manager started");

    // --- Router ---
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        run_manager: Arc::clone(&run_manager),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid HOST:PORT combination");

    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped, tearing down live runs");

    if tokio::time::timeout(shutdown_timeout, run_manager.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Run teardown did not finish before the shutdown timeout",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly under a process supervisor.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
