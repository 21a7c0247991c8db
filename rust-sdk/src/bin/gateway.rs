//! Kiket Gateway - webhook authentication server.
//!
//! Routes:
//! - `GET /health`
//! - `POST /webhooks`: authenticate and acknowledge a Kiket delivery
//! - `POST /audit/verify`: check an audit inclusion proof locally
//!
//! Authentication failures answer 401; a missing secret answers 500.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kiket::web::{audit_verify, health, webhook, AppState};
use kiket::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::from_env();
    let state = AppState::new(&config);

    // Deliveries are refused until KIKET_WEBHOOK_SECRET is set; keep serving
    // so /health and /audit/verify stay reachable.
    if state.authenticator.is_configured() {
        info!(
            max_age_seconds = config.signature_max_age,
            "webhook_authentication_enabled"
        );
    } else {
        error!("kiket_webhook_secret_unset");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind gateway to {addr}"))?;

    info!(address = %addr, "kiket_gateway_listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")?;

    info!("kiket_gateway_stopped");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks", post(webhook))
        .route("/audit/verify", post(audit_verify))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves on SIGINT or SIGTERM. In-flight deliveries finish first.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "sigint_listener_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_listener_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal = signal, "kiket_gateway_draining");
}
