//! Failback (rehoming) scheduler.
//!
//! While bound to a server outside the primary list, a one-shot timer fires
//! after a random `[rehomingIntervalMin, rehomingIntervalMax]` minutes and
//! tries to move the registration back to primary. Active calls defer the
//! attempt to the next cycle. A 429 from primary gets its own short retry
//! loop, capped, that restores the backup binding while it waits.

use super::{AttemptOutcome, Caller, Inner, RegistrationState, TimerTask};
use crate::models::DeviceInfo;
use crate::observability::metrics::{record_failback_attempt, FailbackOutcome};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SECONDS_PER_MINUTE: u64 = 60;

impl Inner {
    fn is_failback_required(&self, state: &RegistrationState) -> bool {
        state.is_active()
            && state
                .active_mobius_url
                .as_deref()
                .is_some_and(|url| !self.settings.servers.is_primary(url))
    }

    /// Arm the failback timer if bound to a non-primary server, clear it
    /// otherwise. An already armed timer is left alone.
    pub(super) fn initiate_failback(self: &Arc<Self>, state: &mut RegistrationState) {
        if !self.is_failback_required(state) {
            state.failback_429_retry_attempts = 0;
            state.failback_timer = None;
            return;
        }

        if state.failback_timer.is_none() {
            state.failback_429_retry_attempts = 0;
            let minutes = failback_interval_minutes(state);
            let delay = Duration::from_secs(minutes.saturating_mul(SECONDS_PER_MINUTE));
            self.start_failback_timer(state, delay);
        }
    }

    fn start_failback_timer(self: &Arc<Self>, state: &mut RegistrationState, delay: Duration) {
        state.failback_timer = Some(self.spawn_once(delay, TimerTask::Failback));
        info!(
            target: "mobius.registration.failback",
            interval_secs = delay.as_secs(),
            "Failback scheduled"
        );
    }

    /// Take rehoming bounds from a registration response, only when bound to
    /// a primary server. Missing values fall back to the defaults.
    pub(super) fn set_interval_values(&self, state: &mut RegistrationState, device_info: &DeviceInfo) {
        let Some(url) = state.active_mobius_url.as_deref() else {
            return;
        };
        if !self.settings.servers.is_primary(url) {
            return;
        }

        let timers = &self.settings.timers;
        state.rehoming_interval_min = device_info
            .rehoming_interval_min
            .filter(|m| *m > 0)
            .unwrap_or(timers.default_rehoming_interval_min_minutes);
        state.rehoming_interval_max = device_info
            .rehoming_interval_max
            .filter(|m| *m > 0)
            .unwrap_or(timers.default_rehoming_interval_max_minutes);
    }

    /// Failback timer fired.
    pub(super) async fn execute_failback(self: &Arc<Self>, state: &mut RegistrationState) {
        if !self.is_failback_required(state) {
            debug!(target: "mobius.registration.failback", "Failback no longer required");
            return;
        }

        let active_calls = self.call_manager.active_call_count();
        if active_calls > 0 {
            info!(
                target: "mobius.registration.failback",
                active_calls,
                "Active calls present, deferring failback to next cycle"
            );
            record_failback_attempt(FailbackOutcome::Deferred);
            state.failback_timer = None;
            self.initiate_failback(state);
            return;
        }

        info!(target: "mobius.registration.failback", "Attempting failback to primary");
        self.deregister(state).await;

        let outcome = self
            .attempt_registration_with_servers(state, Caller::Failback, self.settings.servers.primary())
            .await;

        match outcome {
            AttemptOutcome::Registered | AttemptOutcome::AlreadyRegistered => {
                record_failback_attempt(FailbackOutcome::Succeeded);
            }
            AttemptOutcome::RateLimited => {
                record_failback_attempt(FailbackOutcome::RateLimited);
                self.schedule_failback_429_retry(state).await;
            }
            AttemptOutcome::Abort => {
                record_failback_attempt(FailbackOutcome::Failed);
            }
            AttemptOutcome::Exhausted => {
                record_failback_attempt(FailbackOutcome::Failed);
                self.recover_after_failed_failback(state).await;
            }
        }
    }

    /// Primary rejected the failback: go back to the previous server, or
    /// start over if that is gone too.
    async fn recover_after_failed_failback(self: &Arc<Self>, state: &mut RegistrationState) {
        let outcome = self
            .restore_previous_registration(state, Caller::Failback)
            .await;

        if outcome.abort() {
            state.failback_timer = None;
            return;
        }

        if state.is_active() {
            state.failback_timer = None;
            self.initiate_failback(state);
        } else {
            self.restart_registration(state, Caller::Failback).await;
        }
    }

    /// Primary answered 429: retry failback sooner than the rehoming
    /// interval, keeping the previous binding while waiting.
    async fn schedule_failback_429_retry(self: &Arc<Self>, state: &mut RegistrationState) {
        let max_retries = self.settings.timers.failback_429_max_retries;
        if state.failback_429_retry_attempts >= max_retries {
            info!(
                target: "mobius.registration.failback",
                attempts = state.failback_429_retry_attempts,
                "429 retry limit reached, restoring previous registration"
            );
            self.recover_after_failed_failback(state).await;
            return;
        }

        state.failback_timer = None;
        state.failback_429_retry_attempts += 1;
        info!(
            target: "mobius.registration.failback",
            attempts = state.failback_429_retry_attempts,
            "Received 429 while rehoming"
        );

        let interval = self
            .settings
            .timers
            .backoff
            .interval(state.failback_429_retry_attempts, &mut state.rng);
        self.start_failback_timer(state, interval);

        let outcome = self
            .restore_previous_registration(state, Caller::Failback429Retry)
            .await;
        if !outcome.abort() && !state.is_active() {
            self.restart_registration(state, Caller::Failback429Retry)
                .await;
        }
    }
}

/// Uniform draw in `[min, max]` minutes.
fn failback_interval_minutes(state: &mut RegistrationState) -> u64 {
    let (low, high) = if state.rehoming_interval_min <= state.rehoming_interval_max {
        (state.rehoming_interval_min, state.rehoming_interval_max)
    } else {
        (state.rehoming_interval_max, state.rehoming_interval_min)
    };
    state.rng.gen_range(low..=high)
}
