//! Failover timer: retry primary servers with backoff until the service's
//! threshold, then try backup servers once more before giving up.

use super::{Caller, Inner, RegistrationState, TimerTask};
use crate::errors::LineError;
use crate::events::LineEvent;
use crate::observability::metrics::record_failover_attempt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

impl Inner {
    /// Schedule the next primary retry, or move on to backup servers.
    ///
    /// `elapsed_secs` is the time spent retrying primary so far. The interval
    /// is shortened so the last primary retry lands on the threshold; once
    /// that leaves no more than the backoff base, primary is given up.
    pub(super) async fn start_failover_timer(
        self: &Arc<Self>,
        state: &mut RegistrationState,
        attempt: u32,
        elapsed_secs: u64,
    ) {
        let timers = &self.settings.timers;
        let threshold = timers.failover_threshold_seconds(&self.settings.service_data);
        let base = timers.backoff.base_seconds;

        let mut interval = timers.backoff.interval_secs(attempt, &mut state.rng);
        if elapsed_secs.saturating_add(interval) > threshold {
            interval = threshold.saturating_sub(elapsed_secs);
        }

        if interval > base {
            let task = TimerTask::FailoverRetry {
                attempt,
                elapsed_secs,
                scheduled_at: Instant::now(),
            };
            state.failover_timer = Some(self.spawn_once(Duration::from_secs(interval), task));
            record_failover_attempt("primary");
            info!(
                target: "mobius.registration.failover",
                interval_secs = interval,
                attempt,
                "Scheduled retry with primary"
            );
            return;
        }

        let backup = self.settings.servers.backup();
        if backup.is_empty() {
            self.emit_final_failure();
            return;
        }

        info!(target: "mobius.registration.failover", "Failing over to backup servers");
        record_failover_attempt("backup");
        let outcome = self
            .attempt_registration_with_servers(state, Caller::FailoverTimer, backup)
            .await;

        if !outcome.abort() && !state.is_active() {
            let interval = timers.backoff.interval_secs(1, &mut state.rng);
            state.failover_timer = Some(
                self.spawn_once(Duration::from_secs(interval), TimerTask::BackupRetry),
            );
            info!(
                target: "mobius.registration.failover",
                interval_secs = interval,
                "Scheduled retry with backup servers"
            );
        }
    }

    /// Failover timer fired: retry primary, reschedule if still unbound.
    pub(super) async fn run_failover_retry(
        self: &Arc<Self>,
        state: &mut RegistrationState,
        attempt: u32,
        elapsed_secs: u64,
        scheduled_at: Instant,
    ) {
        let outcome = self
            .attempt_registration_with_servers(
                state,
                Caller::FailoverTimer,
                self.settings.servers.primary(),
            )
            .await;

        if !outcome.abort() && !state.is_active() {
            let elapsed = elapsed_secs.saturating_add(scheduled_at.elapsed().as_secs());
            self.start_failover_timer(state, attempt.saturating_add(1), elapsed)
                .await;
        }
    }

    /// Last backup attempt fired: give up if it fails too.
    pub(super) async fn run_backup_retry(self: &Arc<Self>, state: &mut RegistrationState) {
        let outcome = self
            .attempt_registration_with_servers(
                state,
                Caller::FailoverTimer,
                self.settings.servers.backup(),
            )
            .await;

        if !outcome.abort() && !state.is_active() {
            self.emit_final_failure();
        }
    }

    /// Primary and backup are exhausted; nothing retries after this.
    fn emit_final_failure(&self) {
        warn!(
            target: "mobius.registration.failover",
            "All Mobius servers exhausted, giving up registration"
        );
        self.events.emit(LineEvent::Error(LineError::final_failure()));
    }
}
