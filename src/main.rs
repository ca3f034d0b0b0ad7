//! Pong Match Server - authoritative dedicated server for a single match
//!
//! This is the main entry point for the match process. It:
//! - accepts the two player WebSocket connections
//! - runs the match coordinator until the result is reported
//! - exits once the match is released (or with an error on a platform failure)

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pong_match_server::app::AppState;
use pong_match_server::config::Config;
use pong_match_server::game::{MatchCoordinator, MatchOutcome};
use pong_match_server::http::build_router;
use pong_match_server::platform::{HttpReporter, JwtAuth, LogReporter, PlatformReporter};
use pong_match_server::util::time::init_server_time;
use pong_match_server::ws::ConnectionHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Pong Match Server");
    info!(match_id = %config.match_id, "Server address: {}", config.server_addr);

    let reporter: Arc<dyn PlatformReporter> = match &config.platform_url {
        Some(url) => {
            info!(platform_url = %url, "Reporting to platform agent");
            Arc::new(HttpReporter::new(
                url,
                &config.match_id,
                config.platform_api_key.clone(),
            ))
        }
        None => {
            warn!("PLATFORM_URL not set, platform reports are only logged");
            Arc::new(LogReporter)
        }
    };

    let hub = Arc::new(ConnectionHub::new());
    let coordinator = MatchCoordinator::new(
        config.match_config.clone(),
        hub.clone(),
        Arc::new(JwtAuth::new(config.auth_jwt_secret.clone())),
        reporter,
    );

    let (match_tx, match_rx) = mpsc::unbounded_channel();
    let state = AppState::new(config.clone(), hub, match_tx, coordinator.subscribe_phase());

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    // The process lives exactly as long as its match
    let outcome = tokio::select! {
        outcome = coordinator.run(match_rx) => outcome,
        _ = shutdown_signal() => {
            info!("Shutting down before the match finished");
            server.abort();
            return Ok(());
        }
    };
    server.abort();

    match outcome {
        MatchOutcome::Completed(result) => {
            info!(
                winner_id = %result.winner_connection_id,
                winner_uid = %result.winner_user_id,
                "Match complete, exiting"
            );
            Ok(())
        }
        MatchOutcome::Abandoned => {
            warn!("Match abandoned, exiting");
            Ok(())
        }
        MatchOutcome::Aborted(failure) => {
            error!(error = %failure, "Platform report failed, terminating");
            Err(failure.into())
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
