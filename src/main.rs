use std::sync::Arc;

use anyhow::Context;

mod app;
mod config;
mod db;
mod error;
mod health;
mod state;
mod users;

use crate::config::AppConfig;
use crate::db::RecordStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "userstore=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env().context("load configuration")?);

    let store = Arc::new(
        RecordStore::connect(&config.database_url, config.pool.clone())
            .await
            .context("connect to database")?,
    );

    let monitor = health::spawn(store.clone(), config.health_check_interval);
    let stop = monitor.cancellation_token();

    let state = AppState::init(store, config.clone());
    let users = state.users.clone();
    let app = app::build_app(state);

    let served = app::serve(app, &config.host, config.port, async move {
        shutdown_signal().await;
        stop.cancel();
    })
    .await;

    monitor.shutdown().await;
    users.close().await;
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
