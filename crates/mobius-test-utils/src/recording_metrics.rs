//! Metric sink that records submissions.

use mobius_registration::errors::{ErrorType, LineError};
use mobius_registration::observability::{MetricEvent, MetricSink, MetricType, RegistrationAction};
use std::sync::Mutex;

/// One `submit_registration_metric` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedMetric {
    pub event: MetricEvent,
    pub action: RegistrationAction,
    pub metric_type: MetricType,
    pub error_type: Option<ErrorType>,
}

#[derive(Debug, Default)]
pub struct RecordingMetricSink {
    metrics: Mutex<Vec<RecordedMetric>>,
}

impl RecordingMetricSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn metrics(&self) -> Vec<RecordedMetric> {
        self.metrics.lock().unwrap().clone()
    }

    /// Number of submissions with this event and action.
    #[must_use]
    pub fn count(&self, event: MetricEvent, action: RegistrationAction) -> usize {
        self.metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.event == event && m.action == action)
            .count()
    }
}

impl MetricSink for RecordingMetricSink {
    fn submit_registration_metric(
        &self,
        event: MetricEvent,
        action: RegistrationAction,
        metric_type: MetricType,
        error: Option<&LineError>,
    ) {
        self.metrics.lock().unwrap().push(RecordedMetric {
            event,
            action,
            metric_type,
            error_type: error.map(|e| e.error_type),
        });
    }
}
