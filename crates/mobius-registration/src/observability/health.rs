//! Health endpoints for the registration service.
//!
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (is the line registered?)
//!
//! The `/metrics` endpoint is merged in by the binary from the Prometheus
//! exporter handle.
//!
//! Readiness follows the line event stream: it flips on at `REGISTERED` and
//! off at `UNREGISTERED` or `ERROR`.

use crate::events::LineEvent;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness and readiness flags.
#[derive(Debug)]
pub struct HealthState {
    /// True until the binary has torn the line down during shutdown.
    live: AtomicBool,
    /// True while the line is registered with a Mobius server.
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Mark the process as shutting down. Liveness never comes back.
    pub fn set_not_live(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Update readiness from a line event.
    pub fn observe(&self, event: &LineEvent) {
        match event {
            LineEvent::Registered(_) => self.set_ready(),
            LineEvent::Unregistered | LineEvent::Error(_) => self.set_not_ready(),
            LineEvent::Connecting | LineEvent::Reconnecting | LineEvent::Reconnected => {}
        }
    }
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
