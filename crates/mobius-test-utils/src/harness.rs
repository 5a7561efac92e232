//! A registration wired to mock collaborators.

use crate::mock_calls::MockCallManager;
use crate::mock_mobius::MockMobiusClient;
use crate::recording_metrics::RecordingMetricSink;
use mobius_registration::config::RegistrationSettings;
use mobius_registration::events::LineEvent;
use mobius_registration::Registration;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One line under test.
///
/// The mocks are shared with the engine, so scripting `client` or
/// `calls` after construction affects the next request.
pub struct TestLine {
    pub registration: Registration,
    pub client: Arc<MockMobiusClient>,
    pub calls: Arc<MockCallManager>,
    pub metrics: Arc<RecordingMetricSink>,
    pub events: mpsc::UnboundedReceiver<LineEvent>,
}

impl TestLine {
    #[must_use]
    pub fn new(settings: RegistrationSettings) -> Self {
        let client = Arc::new(MockMobiusClient::new());
        let calls = Arc::new(MockCallManager::new());
        let metrics = Arc::new(RecordingMetricSink::new());

        let (registration, events) = Registration::new(
            settings,
            Arc::clone(&client) as _,
            Arc::clone(&calls) as _,
            Arc::clone(&metrics) as _,
        );

        Self {
            registration,
            client,
            calls,
            metrics,
            events,
        }
    }

    /// Events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<LineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Names of events emitted since the last drain.
    pub fn drain_event_names(&mut self) -> Vec<&'static str> {
        self.drain_events().iter().map(LineEvent::name).collect()
    }
}

/// Let spawned timer tasks run up to `duration` of paused tokio time.
pub async fn run_for(duration: std::time::Duration) {
    tokio::time::sleep(duration).await;
}
