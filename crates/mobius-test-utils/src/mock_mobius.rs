//! Scripted Mobius client.
//!
//! Responses are scripted per operation and per URL. Each script has an
//! optional queue of one-shot responses, consumed first, and an optional
//! fallback returned once the queue is empty. Unscripted registrations fail
//! with a transport error; unscripted keepalives and deletes succeed.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = MockMobiusClient::new();
//! client.register_err(PRIMARY_1, MobiusError::http(503));
//! client.register_ok(BACKUP_1, device_info(BACKUP_1, "dev-1"));
//! client.queue_keepalive(BACKUP_1, Err(MobiusError::http(503)));
//! ```

use async_trait::async_trait;
use mobius_registration::client::MobiusClient;
use mobius_registration::errors::MobiusError;
use mobius_registration::models::{DeviceInfo, RegistrationRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

/// Mobius operation recorded by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MobiusOp {
    Register,
    Keepalive,
    Delete,
}

/// One request received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub op: MobiusOp,
    /// Server URL for register and keepalive, device URI for delete.
    pub url: String,
    /// Time on the tokio clock when the request arrived.
    pub at: Instant,
    /// Body of a registration request.
    pub registration: Option<RegistrationRequest>,
    /// `cisco-device-url` of a delete request.
    pub client_device_uri: Option<String>,
}

struct Script<T> {
    queued: VecDeque<Result<T, MobiusError>>,
    fallback: Option<Result<T, MobiusError>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queued: VecDeque::new(),
            fallback: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<Result<T, MobiusError>> {
        self.queued.pop_front().or_else(|| self.fallback.clone())
    }
}

#[derive(Default)]
struct MockState {
    register: HashMap<String, Script<DeviceInfo>>,
    keepalive: HashMap<String, Script<()>>,
    delete: HashMap<String, Script<()>>,
    requests: Vec<RecordedRequest>,
}

/// Mobius client with scripted responses.
#[derive(Default)]
pub struct MockMobiusClient {
    state: Mutex<MockState>,
}

impl std::fmt::Debug for MockMobiusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockMobiusClient").finish_non_exhaustive()
    }
}

impl MockMobiusClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every registration at `url` succeeds with `info` (after queued responses).
    pub fn register_ok(&self, url: &str, info: DeviceInfo) {
        self.with_state(|s| s.register.entry(url.to_string()).or_default().fallback = Some(Ok(info)));
    }

    /// Every registration at `url` fails with `err` (after queued responses).
    pub fn register_err(&self, url: &str, err: MobiusError) {
        self.with_state(|s| s.register.entry(url.to_string()).or_default().fallback = Some(Err(err)));
    }

    /// Answer the next registration at `url` with `result`.
    pub fn queue_register(&self, url: &str, result: Result<DeviceInfo, MobiusError>) {
        self.with_state(|s| {
            s.register
                .entry(url.to_string())
                .or_default()
                .queued
                .push_back(result);
        });
    }

    /// Every keepalive to `url` succeeds (after queued responses).
    pub fn keepalive_ok(&self, url: &str) {
        self.with_state(|s| s.keepalive.entry(url.to_string()).or_default().fallback = Some(Ok(())));
    }

    /// Every keepalive to `url` fails with `err` (after queued responses).
    pub fn keepalive_err(&self, url: &str, err: MobiusError) {
        self.with_state(|s| s.keepalive.entry(url.to_string()).or_default().fallback = Some(Err(err)));
    }

    /// Answer the next keepalive to `url` with `result`.
    pub fn queue_keepalive(&self, url: &str, result: Result<(), MobiusError>) {
        self.with_state(|s| {
            s.keepalive
                .entry(url.to_string())
                .or_default()
                .queued
                .push_back(result);
        });
    }

    /// Every delete of `device_uri` fails with `err`.
    pub fn delete_err(&self, device_uri: &str, err: MobiusError) {
        self.with_state(|s| s.delete.entry(device_uri.to_string()).or_default().fallback = Some(Err(err)));
    }

    /// All requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.with_state(|s| s.requests.clone())
    }

    /// Requests of one operation, in order.
    #[must_use]
    pub fn requests_for(&self, op: MobiusOp) -> Vec<RecordedRequest> {
        self.with_state(|s| s.requests.iter().filter(|r| r.op == op).cloned().collect())
    }

    /// URLs of requests of one operation, in order.
    #[must_use]
    pub fn urls_for(&self, op: MobiusOp) -> Vec<String> {
        self.requests_for(op).into_iter().map(|r| r.url).collect()
    }

    /// Number of `op` requests sent to `url`.
    #[must_use]
    pub fn count(&self, op: MobiusOp, url: &str) -> usize {
        self.with_state(|s| {
            s.requests
                .iter()
                .filter(|r| r.op == op && r.url == url)
                .count()
        })
    }

    /// Number of `op` requests sent anywhere.
    #[must_use]
    pub fn count_op(&self, op: MobiusOp) -> usize {
        self.with_state(|s| s.requests.iter().filter(|r| r.op == op).count())
    }

    /// Forget recorded requests; scripts are kept.
    pub fn clear_requests(&self) {
        self.with_state(|s| s.requests.clear());
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    fn record(&self, request: RecordedRequest) {
        self.with_state(|s| s.requests.push(request));
    }
}

#[async_trait]
impl MobiusClient for MockMobiusClient {
    async fn post_registration(
        &self,
        url: &str,
        request: &RegistrationRequest,
    ) -> Result<DeviceInfo, MobiusError> {
        self.record(RecordedRequest {
            op: MobiusOp::Register,
            url: url.to_string(),
            at: Instant::now(),
            registration: Some(request.clone()),
            client_device_uri: Some(request.client_device_uri.clone()),
        });

        self.with_state(|s| s.register.get_mut(url).and_then(Script::next))
            .unwrap_or_else(|| {
                Err(MobiusError::Transport(format!(
                    "no scripted registration response for {url}"
                )))
            })
    }

    async fn post_keepalive(&self, url: &str) -> Result<(), MobiusError> {
        self.record(RecordedRequest {
            op: MobiusOp::Keepalive,
            url: url.to_string(),
            at: Instant::now(),
            registration: None,
            client_device_uri: None,
        });

        self.with_state(|s| s.keepalive.get_mut(url).and_then(Script::next))
            .unwrap_or(Ok(()))
    }

    async fn delete_device(
        &self,
        device_uri: &str,
        client_device_uri: &str,
    ) -> Result<(), MobiusError> {
        self.record(RecordedRequest {
            op: MobiusOp::Delete,
            url: device_uri.to_string(),
            at: Instant::now(),
            registration: None,
            client_device_uri: Some(client_device_uri.to_string()),
        });

        self.with_state(|s| s.delete.get_mut(device_uri).and_then(Script::next))
            .unwrap_or(Ok(()))
    }
}
