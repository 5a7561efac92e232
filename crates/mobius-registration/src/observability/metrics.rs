//! Metrics for the Mobius registration engine.
//!
//! All metrics follow Prometheus naming conventions:
//! - `mobius_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded by the enums below:
//! - `event`: 2 values (registration, registration_error)
//! - `action`: 2 values (register, keepalive_failure)
//! - `type`: 1 value (behavioral)
//! - `error_type`: 8 values (`ErrorType` plus none)
//! - `server_set`: 2 values (primary, backup)
//! - `outcome`: bounded by `FailbackOutcome`
//! - `status`: 3 values (idle, inactive, active)

use crate::errors::LineError;
use common::types::RegistrationStatus;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Metric event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    Registration,
    RegistrationError,
}

impl MetricEvent {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricEvent::Registration => "registration",
            MetricEvent::RegistrationError => "registration_error",
        }
    }
}

/// Registration action a metric refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationAction {
    Register,
    KeepaliveFailure,
}

impl RegistrationAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationAction::Register => "register",
            RegistrationAction::KeepaliveFailure => "keepalive_failure",
        }
    }
}

/// Metric classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Behavioral,
}

impl MetricType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Behavioral => "behavioral",
        }
    }
}

/// Outcome of one failback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailbackOutcome {
    /// Bound to a primary server.
    Succeeded,
    /// Calls were active; rescheduled without contacting Mobius.
    Deferred,
    /// Primary throttled the attempt.
    RateLimited,
    /// Primary unreachable; previous binding restored or restarted.
    Failed,
}

impl FailbackOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FailbackOutcome::Succeeded => "succeeded",
            FailbackOutcome::Deferred => "deferred",
            FailbackOutcome::RateLimited => "rate_limited",
            FailbackOutcome::Failed => "failed",
        }
    }
}

/// Sink for registration metrics, passed explicitly into the engine.
///
/// Submissions are fire-and-forget; implementations must not block.
pub trait MetricSink: Send + Sync {
    fn submit_registration_metric(
        &self,
        event: MetricEvent,
        action: RegistrationAction,
        metric_type: MetricType,
        error: Option<&LineError>,
    );
}

/// Sink that records through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetricSink;

impl MetricSink for PrometheusMetricSink {
    fn submit_registration_metric(
        &self,
        event: MetricEvent,
        action: RegistrationAction,
        metric_type: MetricType,
        error: Option<&LineError>,
    ) {
        let error_type = error.map_or("none", |e| e.error_type.as_str());
        counter!(
            "mobius_registration_events_total",
            "event" => event.as_str(),
            "action" => action.as_str(),
            "type" => metric_type.as_str(),
            "error_type" => error_type
        )
        .increment(1);
    }
}

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// # Errors
///
/// Returns error if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Record a missed keepalive.
///
/// Metric: `mobius_keepalive_failures_total`
/// Labels: `final` (true, false)
pub fn record_keepalive_failure(is_final: bool) {
    counter!(
        "mobius_keepalive_failures_total",
        "final" => if is_final { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a scheduled failover retry.
///
/// Metric: `mobius_failover_attempts_total`
/// Labels: `server_set` (primary, backup)
pub fn record_failover_attempt(server_set: &'static str) {
    counter!("mobius_failover_attempts_total", "server_set" => server_set).increment(1);
}

/// Record a failback attempt.
///
/// Metric: `mobius_failback_attempts_total`
/// Labels: `outcome`
pub fn record_failback_attempt(outcome: FailbackOutcome) {
    counter!("mobius_failback_attempts_total", "outcome" => outcome.as_str()).increment(1);
}

/// Publish the current registration status.
///
/// Metric: `mobius_registration_status`
/// Labels: `status`; the current status reads 1, the others 0.
pub fn set_registration_status(status: RegistrationStatus) {
    for candidate in [
        RegistrationStatus::Idle,
        RegistrationStatus::Inactive,
        RegistrationStatus::Active,
    ] {
        let value = if candidate == status { 1.0 } else { 0.0 };
        gauge!("mobius_registration_status", "status" => candidate.as_str()).set(value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::ErrorType;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // These run against the global no-op recorder unless one is installed;
    // they only prove the calls do not panic.

    #[test]
    fn test_record_functions_do_not_panic() {
        record_keepalive_failure(false);
        record_keepalive_failure(true);
        record_failover_attempt("primary");
        record_failover_attempt("backup");
        for outcome in [
            FailbackOutcome::Succeeded,
            FailbackOutcome::Deferred,
            FailbackOutcome::RateLimited,
            FailbackOutcome::Failed,
        ] {
            record_failback_attempt(outcome);
        }
        set_registration_status(RegistrationStatus::Active);
    }

    #[test]
    fn test_prometheus_sink_records_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        let error = LineError::new(ErrorType::TokenError, "expired", Some(401));
        metrics::with_local_recorder(&recorder, || {
            let sink = PrometheusMetricSink;
            sink.submit_registration_metric(
                MetricEvent::Registration,
                RegistrationAction::Register,
                MetricType::Behavioral,
                None,
            );
            sink.submit_registration_metric(
                MetricEvent::RegistrationError,
                RegistrationAction::Register,
                MetricType::Behavioral,
                Some(&error),
            );
        });

        let metrics = snapshotter.snapshot().into_vec();
        let mut seen_error_types: Vec<String> = metrics
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == "mobius_registration_events_total")
            .map(|(key, _, _, value)| {
                assert_eq!(value, &DebugValue::Counter(1));
                key.key()
                    .labels()
                    .find(|l| l.key() == "error_type")
                    .map(|l| l.value().to_string())
                    .unwrap()
            })
            .collect();
        seen_error_types.sort();

        assert_eq!(seen_error_types, vec!["none", "token_error"]);
    }
}
