//! Mobius Registration Service
//!
//! Keeps one calling line registered with Mobius and exposes its state on
//! an HTTP endpoint.
//!
//! # Servers
//!
//! - HTTP server for health endpoints and `/metrics` (default: 0.0.0.0:8090)
//!
//! # Startup Flow
//!
//! 1. Initialize tracing from `RUST_LOG` / `MOBIUS_LOG_JSON`
//! 2. Load configuration from environment
//! 3. Initialize Prometheus metrics recorder
//! 4. Start health HTTP server (liveness, readiness, metrics)
//! 5. Build the Mobius client around the user token
//! 6. Create the registration engine and trigger registration
//! 7. Wait for shutdown signal, then delete the device on the server

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use common::config::ObservabilityConfig;
use common::token::token_channel;
use mobius_registration::call_manager::NoCalls;
use mobius_registration::client::HttpMobiusClient;
use mobius_registration::config::Config;
use mobius_registration::events::LineEvent;
use mobius_registration::observability::{
    health_router, init_metrics_recorder, HealthState, PrometheusMetricSink,
};
use mobius_registration::Registration;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing comes up before config so config errors are logged
    let observability = ObservabilityConfig::from_vars(&std::env::vars().collect::<HashMap<_, _>>());
    init_tracing(&observability);

    info!("Starting Mobius registration service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        user_id = %config.user_id,
        service = %config.service_data.indicator,
        primary = ?config.servers.primary(),
        backup = ?config.servers.backup(),
        health_bind_address = %config.health_bind_address,
        http_timeout_seconds = config.http_timeout_seconds,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());
    let shutdown_token = CancellationToken::new();

    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = health_router(Arc::clone(&health_state)).merge(metrics_router);

    // Bind before spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // The publisher stays alive for the life of the service; a token refresh
    // hook would publish through it.
    let (_token_publisher, token_rx) = token_channel(config.user_token.clone());
    let client = HttpMobiusClient::new(
        token_rx,
        config.client_device_uri.clone(),
        config.http_timeout(),
    )
    .map_err(|e| {
        error!(error = %e, "Failed to build Mobius client");
        e
    })?;

    let (registration, events) = Registration::new(
        config.registration_settings(),
        Arc::new(client),
        Arc::new(NoCalls),
        Arc::new(PrometheusMetricSink),
    );

    let event_task_token = shutdown_token.child_token();
    let event_health = Arc::clone(&health_state);
    let event_task = tokio::spawn(async move {
        run_event_task(events, event_health, event_task_token).await;
    });

    registration.trigger_registration().await;

    info!("Mobius registration service running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.set_not_ready();

    registration.shutdown().await;
    // Line is torn down; probes see the process as going away
    health_state.set_not_live();
    shutdown_token.cancel();

    if let Err(e) = event_task.await {
        warn!(error = %e, "Event task ended abnormally");
    }

    info!("Mobius registration service shutdown complete");
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&observability.log_filter)
        .unwrap_or_else(|_| common::config::DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(filter);
    if observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Log line events and drive readiness from them until cancelled.
async fn run_event_task(
    mut events: mpsc::UnboundedReceiver<LineEvent>,
    health_state: Arc<HealthState>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Event task: Shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    info!("Event task: Registration dropped");
                    break;
                };
                match &event {
                    LineEvent::Error(line_error) => warn!(
                        event = event.name(),
                        error_type = %line_error.error_type,
                        message = %line_error.message,
                        "Line event"
                    ),
                    _ => info!(event = event.name(), "Line event"),
                }
                health_state.observe(&event);
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without them the service
/// cannot shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
