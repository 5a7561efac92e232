//! Observability for the registration service.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `mobius_registration_events_total` | Counter | `event`, `action`, `type`, `error_type` | Registration and keepalive outcomes |
//! | `mobius_keepalive_failures_total` | Counter | `final` | Missed keepalives |
//! | `mobius_failover_attempts_total` | Counter | `server_set` | Scheduled failover retries |
//! | `mobius_failback_attempts_total` | Counter | `outcome` | Failback timer firings |
//! | `mobius_registration_status` | Gauge | `status` | Current registration status |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::{
    init_metrics_recorder, FailbackOutcome, MetricEvent, MetricSink, MetricType,
    PrometheusMetricSink, RegistrationAction,
};
