//! Registration state machine for one line.
//!
//! # State
//!
//! All mutable state lives in [`RegistrationState`] behind one
//! `tokio::sync::Mutex`. Every entry point (public operations and timer
//! firings) takes that lock for its whole duration, including the Mobius
//! round trips it makes, so two timers firing together run one after the
//! other and the second sees what the first left behind.
//!
//! # Timers
//!
//! | Timer     | Kind      | Armed by                              |
//! |-----------|-----------|---------------------------------------|
//! | failover  | one-shot  | primary exhausted without abort       |
//! | keepalive | repeating | every successful registration         |
//! | failback  | one-shot  | registration to a non-primary server  |
//!
//! Timer tasks hold only a `Weak` reference to the engine; dropping the
//! [`Registration`] drops the state and with it every timer handle.
//!
//! # Flow
//!
//! ```text
//! trigger_registration ─► primary[0..n] ─► ACTIVE ─► keepalive (+ failback if not primary)
//!                               │
//!                               └─► failover timer ─► primary retries ─► backup once ─► ERROR
//! ```

mod failback;
mod failover;
mod keepalive;

use crate::call_manager::CallManager;
use crate::classify::{classify, ErrorCategory};
use crate::client::MobiusClient;
use crate::config::RegistrationSettings;
use crate::errors::{LineError, MobiusError};
use crate::events::{EventSink, LineEvent};
use crate::models::{base_url_of_device, device_url, DeviceInfo, RegistrationRequest};
use crate::observability::metrics::{
    set_registration_status, MetricEvent, MetricSink, MetricType, RegistrationAction,
};
use crate::timer::{self, TimerHandle};
use common::types::RegistrationStatus;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Entry point that started a registration attempt. Logged as `caller`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    TriggerRegistration,
    FailoverTimer,
    Failback,
    Failback429Retry,
    Keepalive,
    ConnectionRestoration,
    CallsCleared,
    /// The line owner asked for a reconnect directly.
    External,
}

impl Caller {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Caller::TriggerRegistration => "trigger_registration",
            Caller::FailoverTimer => "failover_timer",
            Caller::Failback => "failback",
            Caller::Failback429Retry => "failback_429_retry",
            Caller::Keepalive => "keepalive",
            Caller::ConnectionRestoration => "connection_restoration",
            Caller::CallsCleared => "calls_cleared",
            Caller::External => "external",
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a registration, for observability and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationSnapshot {
    pub status: RegistrationStatus,
    pub active_mobius_url: Option<String>,
    pub device_info: Option<DeviceInfo>,
    pub keepalive_running: bool,
    pub failback_scheduled: bool,
    pub failover_scheduled: bool,
    /// Failback bounds in minutes.
    pub rehoming_interval_min: u64,
    pub rehoming_interval_max: u64,
    pub failback_429_retry_attempts: u32,
    pub keepalive_retry_count: u32,
    pub reconnect_pending: bool,
}

/// How a pass over a server list ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptOutcome {
    /// Already ACTIVE when the pass started; nothing was sent.
    AlreadyRegistered,
    Registered,
    /// Every server failed with a non-final error.
    Exhausted,
    /// A final error was reported; no retry may be scheduled.
    Abort,
    /// Primary throttled a failback attempt; the dedicated 429 path takes over.
    RateLimited,
}

impl AttemptOutcome {
    /// Whether the caller must not fall back to its generic retry.
    pub(crate) fn abort(self) -> bool {
        matches!(self, AttemptOutcome::Abort | AttemptOutcome::RateLimited)
    }
}

/// Mutable state of one registration.
pub(crate) struct RegistrationState {
    status: RegistrationStatus,
    active_mobius_url: Option<String>,
    device_info: Option<DeviceInfo>,
    keepalive_timer: Option<TimerHandle>,
    failback_timer: Option<TimerHandle>,
    failover_timer: Option<TimerHandle>,
    rehoming_interval_min: u64,
    rehoming_interval_max: u64,
    failback_429_retry_attempts: u32,
    keepalive_retry_count: u32,
    reconnect_pending: bool,
    rng: StdRng,
}

impl RegistrationState {
    fn is_active(&self) -> bool {
        self.status == RegistrationStatus::Active
    }
}

/// Work a timer performs when it fires.
#[derive(Debug, Clone, Copy)]
enum TimerTask {
    FailoverRetry {
        attempt: u32,
        elapsed_secs: u64,
        scheduled_at: Instant,
    },
    BackupRetry,
    Failback,
    Keepalive,
}

struct Inner {
    settings: RegistrationSettings,
    client: Arc<dyn MobiusClient>,
    call_manager: Arc<dyn CallManager>,
    metrics: Arc<dyn MetricSink>,
    events: EventSink,
    state: Mutex<RegistrationState>,
}

/// Device registration for one line.
///
/// Created at line setup and dropped at teardown. Dropping it stops all
/// timers; call [`shutdown`](Self::shutdown) first to also delete the device
/// on the server.
pub struct Registration {
    inner: Arc<Inner>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("user_id", &self.inner.settings.user_id)
            .field("service", &self.inner.settings.service_data.indicator)
            .finish_non_exhaustive()
    }
}

impl Registration {
    /// Create a registration and the receiver for its line events.
    #[must_use]
    pub fn new(
        settings: RegistrationSettings,
        client: Arc<dyn MobiusClient>,
        call_manager: Arc<dyn CallManager>,
        metrics: Arc<dyn MetricSink>,
    ) -> (Self, mpsc::UnboundedReceiver<LineEvent>) {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let state = RegistrationState {
            status: RegistrationStatus::Idle,
            active_mobius_url: None,
            device_info: None,
            keepalive_timer: None,
            failback_timer: None,
            failover_timer: None,
            rehoming_interval_min: settings.timers.default_rehoming_interval_min_minutes,
            rehoming_interval_max: settings.timers.default_rehoming_interval_max_minutes,
            failback_429_retry_attempts: 0,
            keepalive_retry_count: 0,
            reconnect_pending: false,
            rng,
        };

        let (events, receiver) = EventSink::channel();
        let inner = Arc::new(Inner {
            settings,
            client,
            call_manager,
            metrics,
            events,
            state: Mutex::new(state),
        });

        (Self { inner }, receiver)
    }

    /// Register with the first reachable primary server.
    ///
    /// No-op when there are no primary servers. If every primary fails
    /// without a final error, the failover timer takes over.
    #[instrument(skip_all)]
    pub async fn trigger_registration(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;

        let primary = inner.settings.servers.primary();
        if primary.is_empty() {
            warn!(target: "mobius.registration", "No primary Mobius servers, registration not attempted");
            return;
        }

        let outcome = inner
            .attempt_registration_with_servers(&mut state, Caller::TriggerRegistration, primary)
            .await;

        if !outcome.abort() && !state.is_active() {
            inner.start_failover_timer(&mut state, 1, 0).await;
        }
    }

    /// Delete the device on the bound server and stop keepalives.
    ///
    /// A failed DELETE is logged, never returned.
    #[instrument(skip_all)]
    pub async fn deregister(&self) {
        let mut state = self.inner.state.lock().await;
        self.inner.deregister(&mut state).await;
    }

    /// Re-register after losing the binding, or defer while calls are active.
    #[instrument(skip_all, fields(caller = %caller))]
    pub async fn reconnect_on_failure(&self, caller: Caller) {
        let mut state = self.inner.state.lock().await;
        self.inner.reconnect_on_failure(&mut state, caller).await;
    }

    /// React to the transport coming back after an outage.
    ///
    /// With `retry` set, drops the current binding and restores it (or
    /// restarts registration) exactly as a reconnect does. Always returns
    /// `false`, so repeated signals are no-ops for the caller.
    #[instrument(skip_all, fields(retry = retry))]
    pub async fn handle_connection_restoration(&self, retry: bool) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;

        if !retry {
            return false;
        }

        info!(
            target: "mobius.registration",
            "Connection is up again, re-registering with Mobius if needed"
        );
        state.keepalive_timer = None;
        if state.is_active() {
            inner.deregister(&mut state).await;
        }

        // Without a previous binding the initial registration is still in
        // progress and the failover timer owns the retries.
        if state.active_mobius_url.is_some() {
            let outcome = inner
                .restore_previous_registration(&mut state, Caller::ConnectionRestoration)
                .await;
            if !outcome.abort() && !state.is_active() {
                inner
                    .restart_registration(&mut state, Caller::ConnectionRestoration)
                    .await;
            }
        }

        false
    }

    /// Call manager notification that the last call ended.
    ///
    /// Runs a deferred reconnect, if one is pending.
    #[instrument(skip_all)]
    pub async fn handle_calls_cleared(&self) {
        let mut state = self.inner.state.lock().await;
        if state.reconnect_pending {
            self.inner
                .reconnect_on_failure(&mut state, Caller::CallsCleared)
                .await;
        }
    }

    /// Stop every timer and delete the device on the server.
    #[instrument(skip_all)]
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        state.failover_timer = None;
        state.failback_timer = None;
        self.inner.deregister(&mut state).await;
        info!(target: "mobius.registration", "Registration shut down");
    }

    pub async fn status(&self) -> RegistrationStatus {
        self.inner.state.lock().await.status
    }

    pub async fn active_mobius_url(&self) -> Option<String> {
        self.inner.state.lock().await.active_mobius_url.clone()
    }

    pub async fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.state.lock().await.device_info.clone()
    }

    pub async fn is_reconnect_pending(&self) -> bool {
        self.inner.state.lock().await.reconnect_pending
    }

    /// Current state, taken under the registration lock.
    pub async fn snapshot(&self) -> RegistrationSnapshot {
        let state = self.inner.state.lock().await;
        RegistrationSnapshot {
            status: state.status,
            active_mobius_url: state.active_mobius_url.clone(),
            device_info: state.device_info.clone(),
            keepalive_running: state.keepalive_timer.is_some(),
            failback_scheduled: state.failback_timer.is_some(),
            failover_scheduled: state.failover_timer.is_some(),
            rehoming_interval_min: state.rehoming_interval_min,
            rehoming_interval_max: state.rehoming_interval_max,
            failback_429_retry_attempts: state.failback_429_retry_attempts,
            keepalive_retry_count: state.keepalive_retry_count,
            reconnect_pending: state.reconnect_pending,
        }
    }
}

impl Inner {
    fn set_status(&self, state: &mut RegistrationState, status: RegistrationStatus) {
        if state.status != status {
            debug!(
                target: "mobius.registration",
                from = state.status.as_str(),
                to = status.as_str(),
                "Registration status changed"
            );
        }
        state.status = status;
        set_registration_status(status);
    }

    fn registration_request(&self) -> RegistrationRequest {
        RegistrationRequest {
            user_id: self.settings.user_id.clone(),
            client_device_uri: self.settings.client_device_uri.clone(),
            service_data: self.settings.service_data.clone(),
        }
    }

    /// Try `servers` in order until one accepts the registration.
    async fn attempt_registration_with_servers(
        self: &Arc<Self>,
        state: &mut RegistrationState,
        caller: Caller,
        servers: &[String],
    ) -> AttemptOutcome {
        if state.is_active() {
            debug!(
                target: "mobius.registration",
                caller = %caller,
                url = ?state.active_mobius_url,
                "Device already registered"
            );
            return AttemptOutcome::AlreadyRegistered;
        }

        let request = self.registration_request();

        for url in servers {
            self.set_status(state, RegistrationStatus::Inactive);
            self.events.emit(LineEvent::Connecting);
            info!(target: "mobius.registration", caller = %caller, url = %url, "Contacting Mobius");

            let err = match self.client.post_registration(url, &request).await {
                Ok(device_info) => {
                    self.on_registered(state, url, device_info);
                    return AttemptOutcome::Registered;
                }
                Err(err) => err,
            };

            let classified = classify(&err);
            match classified.category {
                ErrorCategory::Final => {
                    self.set_status(state, RegistrationStatus::Inactive);
                    self.events.emit(LineEvent::Error(classified.error.clone()));
                    self.submit_error_metric(&classified.error);
                    warn!(
                        target: "mobius.registration",
                        caller = %caller,
                        url = %url,
                        "Registration rejected with a final error"
                    );
                    return AttemptOutcome::Abort;
                }
                ErrorCategory::CapacityLimited => {
                    if self.reclaim_existing_device(state, caller, url, &err).await {
                        info!(
                            target: "mobius.registration",
                            caller = %caller,
                            url = ?state.active_mobius_url,
                            "Device is already restored"
                        );
                        return AttemptOutcome::Registered;
                    }
                }
                ErrorCategory::RateLimited if caller == Caller::Failback => {
                    self.events.emit(LineEvent::Unregistered);
                    self.submit_error_metric(&classified.error);
                    return AttemptOutcome::RateLimited;
                }
                ErrorCategory::RateLimited | ErrorCategory::Transient => {
                    self.events.emit(LineEvent::Unregistered);
                    self.submit_error_metric(&classified.error);
                }
            }
        }

        AttemptOutcome::Exhausted
    }

    fn submit_error_metric(&self, error: &LineError) {
        self.metrics.submit_registration_metric(
            MetricEvent::RegistrationError,
            RegistrationAction::Register,
            MetricType::Behavioral,
            Some(error),
        );
    }

    /// Bind to `url` with `device_info` and start the schedulers.
    fn on_registered(
        self: &Arc<Self>,
        state: &mut RegistrationState,
        url: &str,
        device_info: DeviceInfo,
    ) {
        state.device_info = Some(device_info.clone());
        self.set_status(state, RegistrationStatus::Active);
        state.active_mobius_url = Some(url.to_string());
        state.failover_timer = None;
        self.call_manager.update_active_mobius(url);
        info!(target: "mobius.registration", url = %url, "Registered with Mobius");
        self.events
            .emit(LineEvent::Registered(Box::new(device_info.clone())));

        self.set_interval_values(state, &device_info);
        self.metrics.submit_registration_metric(
            MetricEvent::Registration,
            RegistrationAction::Register,
            MetricType::Behavioral,
            None,
        );

        let keepalive_secs = device_info
            .keepalive_interval
            .filter(|secs| *secs > 0)
            .unwrap_or(self.settings.timers.default_keepalive_interval_seconds);

        self.start_keepalive(state, keepalive_secs);
        self.initiate_failback(state);
    }

    /// Recover a device slot held by a stale registration.
    ///
    /// Deletes the stale device and adopts its record as the current
    /// binding. Returns `false` when the error body lists no device.
    async fn reclaim_existing_device(
        self: &Arc<Self>,
        state: &mut RegistrationState,
        caller: Caller,
        candidate_url: &str,
        err: &MobiusError,
    ) -> bool {
        let body = err.body().cloned().unwrap_or_default();
        let Some(device) = body.devices.into_iter().next() else {
            warn!(
                target: "mobius.registration",
                caller = %caller,
                "Device limit exceeded but no existing device was returned"
            );
            self.events.emit(LineEvent::Unregistered);
            return false;
        };

        info!(
            target: "mobius.registration",
            caller = %caller,
            device_id = %device.device_id,
            "Registration restoration in progress"
        );

        let client_device_uri = device
            .client_device_uri
            .clone()
            .unwrap_or_else(|| self.settings.client_device_uri.clone());
        self.delete_registration(state, &device.uri, &client_device_uri)
            .await;

        let derived = base_url_of_device(&device);
        let url = self
            .settings
            .servers
            .find(&derived)
            .unwrap_or(candidate_url)
            .to_string();

        let timers = &self.settings.timers;
        let device_info = DeviceInfo {
            user_id: body.user_id,
            device: Some(device),
            keepalive_interval: Some(timers.default_keepalive_interval_seconds),
            call_keepalive_interval: None,
            rehoming_interval_min: Some(timers.default_rehoming_interval_min_minutes),
            rehoming_interval_max: Some(timers.default_rehoming_interval_max_minutes),
        };

        self.on_registered(state, &url, device_info);
        true
    }

    /// DELETE a device record. Failures are logged only.
    ///
    /// Always leaves the line INACTIVE and emits UNREGISTERED.
    async fn delete_registration(
        &self,
        state: &mut RegistrationState,
        device_uri: &str,
        client_device_uri: &str,
    ) {
        if let Err(e) = self
            .client
            .delete_device(device_uri, client_device_uri)
            .await
        {
            warn!(target: "mobius.registration", error = %e, "Delete failed with Mobius");
        }

        self.set_status(state, RegistrationStatus::Inactive);
        self.events.emit(LineEvent::Unregistered);
    }

    async fn deregister(&self, state: &mut RegistrationState) {
        let target = state.active_mobius_url.as_deref().and_then(|url| {
            state.device_info.as_ref()?.device.as_ref().map(|device| {
                let client_device_uri = device
                    .client_device_uri
                    .clone()
                    .unwrap_or_else(|| self.settings.client_device_uri.clone());
                (device_url(url, &device.device_id), client_device_uri)
            })
        });

        match target {
            Some((device_uri, client_device_uri)) => {
                self.delete_registration(state, &device_uri, &client_device_uri)
                    .await;
            }
            None => debug!(target: "mobius.registration", "No device to delete"),
        }

        state.keepalive_timer = None;
        self.set_status(state, RegistrationStatus::Inactive);
    }

    async fn reconnect_on_failure(self: &Arc<Self>, state: &mut RegistrationState, caller: Caller) {
        state.reconnect_pending = false;
        if state.is_active() {
            return;
        }

        let active_calls = self.call_manager.active_call_count();
        if active_calls > 0 {
            state.reconnect_pending = true;
            info!(
                target: "mobius.registration",
                caller = %caller,
                active_calls,
                "Active call(s) present, deferred reconnect till call cleanup"
            );
            return;
        }

        let outcome = self.restore_previous_registration(state, caller).await;
        if !outcome.abort() && !state.is_active() {
            self.restart_registration(state, caller).await;
        }
    }

    /// Retry only the server the line was last bound to.
    ///
    /// Without a previous binding this is a logged no-op and the caller
    /// moves on to a full restart.
    async fn restore_previous_registration(
        self: &Arc<Self>,
        state: &mut RegistrationState,
        caller: Caller,
    ) -> AttemptOutcome {
        let Some(url) = state.active_mobius_url.clone() else {
            warn!(
                target: "mobius.registration",
                caller = %caller,
                "No previous Mobius binding to restore"
            );
            return AttemptOutcome::Exhausted;
        };

        self.attempt_registration_with_servers(state, caller, std::slice::from_ref(&url))
            .await
    }

    /// Full primary → backup cycle from scratch.
    async fn restart_registration(self: &Arc<Self>, state: &mut RegistrationState, caller: Caller) {
        state.failback_timer = None;
        state.failback_429_retry_attempts = 0;

        let outcome = self
            .attempt_registration_with_servers(state, caller, self.settings.servers.primary())
            .await;

        if !outcome.abort() && !state.is_active() {
            self.start_failover_timer(state, 1, 0).await;
        }
    }

    fn spawn_once(self: &Arc<Self>, delay: Duration, task: TimerTask) -> TimerHandle {
        let weak = Arc::downgrade(self);
        timer::schedule_once(delay, move |token| async move {
            run_timer_task(&weak, task, token).await;
        })
    }

    fn spawn_repeating(self: &Arc<Self>, period: Duration, task: TimerTask) -> TimerHandle {
        let weak = Arc::downgrade(self);
        timer::schedule_repeating(period, move |token| {
            let weak = weak.clone();
            async move {
                run_timer_task(&weak, task, token).await;
            }
        })
    }
}

/// Body of every timer firing: take the lock, confirm the timer is still
/// current, then dispatch.
async fn run_timer_task(weak: &Weak<Inner>, task: TimerTask, token: CancellationToken) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut state = inner.state.lock().await;

    // Cancelled while waiting for the lock
    if token.is_cancelled() {
        debug!(target: "mobius.registration", task = ?task, "Timer cancelled before it ran");
        return;
    }

    match task {
        TimerTask::FailoverRetry {
            attempt,
            elapsed_secs,
            scheduled_at,
        } => {
            state.failover_timer = None;
            inner
                .run_failover_retry(&mut state, attempt, elapsed_secs, scheduled_at)
                .await;
        }
        TimerTask::BackupRetry => {
            state.failover_timer = None;
            inner.run_backup_retry(&mut state).await;
        }
        TimerTask::Failback => {
            state.failback_timer = None;
            inner.execute_failback(&mut state).await;
        }
        TimerTask::Keepalive => inner.keepalive_tick(&mut state).await,
    }
}
