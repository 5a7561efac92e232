//! Keepalive scheduler.
//!
//! While ACTIVE, POST `{activeMobiusUrl}/status` every keepalive interval.
//! Consecutive failures are counted against a retry budget (5 for calling,
//! 4 for contact center); exhausting it, or a final error, drops the binding
//! and hands over to reconnect.

use super::{Caller, Inner, RegistrationState, TimerTask};
use crate::classify::classify;
use crate::events::LineEvent;
use crate::observability::metrics::{
    record_keepalive_failure, MetricEvent, MetricType, RegistrationAction,
};
use common::types::RegistrationStatus;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

impl Inner {
    /// Start (or restart) the keepalive loop. Any previous loop is cancelled.
    pub(super) fn start_keepalive(self: &Arc<Self>, state: &mut RegistrationState, interval_secs: u64) {
        state.keepalive_timer = None;
        state.keepalive_retry_count = 0;
        state.keepalive_timer =
            Some(self.spawn_repeating(Duration::from_secs(interval_secs), TimerTask::Keepalive));
        debug!(
            target: "mobius.registration.keepalive",
            interval_secs,
            "Keepalive started"
        );
    }

    pub(super) async fn keepalive_tick(self: &Arc<Self>, state: &mut RegistrationState) {
        let budget = self
            .settings
            .timers
            .keepalive_retry_budget(&self.settings.service_data);

        if !state.is_active() || state.keepalive_retry_count >= budget {
            return;
        }
        let Some(url) = state.active_mobius_url.clone() else {
            return;
        };

        let err = match self.client.post_keepalive(&url).await {
            Ok(()) => {
                info!(target: "mobius.registration.keepalive", url = %url, "Sent keepalive");
                if state.keepalive_retry_count > 0 {
                    self.events.emit(LineEvent::Reconnected);
                }
                state.keepalive_retry_count = 0;
                return;
            }
            Err(err) => err,
        };

        state.keepalive_retry_count += 1;
        warn!(
            target: "mobius.registration.keepalive",
            missed = state.keepalive_retry_count,
            status = ?err.status(),
            "Keepalive missed"
        );

        let classified = classify(&err);
        if classified.is_final() {
            self.events.emit(LineEvent::Error(classified.error.clone()));
        }
        self.metrics.submit_registration_metric(
            MetricEvent::Registration,
            RegistrationAction::KeepaliveFailure,
            MetricType::Behavioral,
            Some(&classified.error),
        );
        record_keepalive_failure(classified.is_final());

        if classified.abort_registration || state.keepalive_retry_count >= budget {
            self.set_status(state, RegistrationStatus::Inactive);
            state.keepalive_timer = None;
            state.failback_timer = None;
            self.events.emit(LineEvent::Unregistered);

            if !classified.abort_registration {
                self.reconnect_on_failure(state, Caller::Keepalive).await;
            }
        } else {
            self.events.emit(LineEvent::Reconnecting);
        }
    }
}
