//! Mobius Registration Engine
//!
//! Keeps a calling line's device registered with one of a ranked set of
//! regional Mobius servers:
//!
//! - Ordered primary → backup failover with bounded, jittered backoff
//! - Keepalive heartbeats against the bound server, with a retry budget
//! - Scheduled failback (rehoming) to a primary server, deferred while calls are active
//! - Recovery of a device slot occupied by a stale registration
//!
//! # Architecture
//!
//! ```text
//! Registration (one per line)
//! ├── RegistrationState behind a single tokio Mutex
//! ├── failover timer   (retry primary, then backup once)
//! ├── keepalive timer  (POST {url}/status every keepaliveInterval)
//! └── failback timer   (random [min, max] minutes while bound to backup)
//! ```
//!
//! Every timer firing takes the same lock, so a keepalive failure and a
//! failback attempt landing together run one after the other.
//!
//! # Modules
//!
//! - [`registration`] - The registration state machine
//! - [`backoff`] - Retry interval calculation
//! - [`classify`] - Mobius failure classification
//! - [`client`] - Mobius HTTP client and its trait seam
//! - [`config`] - Service configuration from environment
//! - [`events`] - Line events surfaced to consumers
//! - [`errors`] - Error types

pub mod backoff;
pub mod call_manager;
pub mod classify;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod observability;
pub mod registration;
pub mod servers;
pub(crate) mod timer;

pub use registration::{Caller, Registration, RegistrationSnapshot};
