use std::sync::Arc;

use catalog::config::{Cli, Config, default_config_dir, default_config_path};
use catalog::db::Database;
use catalog::handler::AppState;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    // Determine config path and data directory
    // If --config is provided, use its parent directory for data (database, etc.)
    // Otherwise use ~/.catalog/ for both
    let (config_path, data_dir) = match &args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    let (cfg, notes) = Config::from_cli(&args, &config_path).unwrap_or_else(|e| {
        eprintln!("failed to load config file {:?}: {}", config_path, e);
        std::process::exit(1);
    });

    let default_level = if cfg.app.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().json().with_env_filter(filter).init();
    tracing::info!("catalog.svc starting");
    if notes.used_defaults {
        tracing::info!(path = ?config_path, "no config file found, using defaults");
    }
    for var_name in &notes.missing_env_vars {
        tracing::warn!("environment variable '{}' not found", var_name);
    }

    // Ensure data directory exists
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(error = %e, path = ?data_dir, "failed to create data directory");
        std::process::exit(1);
    }

    let db_path = cfg.app.db_path(&data_dir);
    let db = Arc::new(Database::open(&db_path).await.unwrap_or_else(|e| {
        tracing::error!(error = %catalog::unpack_error(&e), path = ?db_path, "failed to setup database");
        std::process::exit(1);
    }));
    tracing::info!(path = ?db_path, "database ready");

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();

    let app = catalog::app(AppState { db });

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("ctrl+c signal received, preparing to shutdown");
        shutdown_token.cancel();
    });

    tracing::info!(debug = cfg.app.debug, "catalog.svc running on {}", &address);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(cancellation_token.cancelled_owned())
        .await;

    if let Err(err) = result {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }

    tracing::info!("catalog.svc going off, graceful shutdown complete");
}
