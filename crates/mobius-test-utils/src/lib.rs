//! # Mobius Test Utilities
//!
//! Shared test utilities for the Mobius registration engine.
//!
//! This crate provides mock collaborators and fixtures for driving a
//! [`Registration`](mobius_registration::Registration) without a network:
//!
//! - `mock_mobius` - Scripted Mobius client that records every request
//! - `mock_calls` - Call manager with a settable active call count
//! - `recording_metrics` - Metric sink that keeps submissions for assertions
//! - `fixtures` - Server URLs, device records, settings and error responses
//! - `harness` - `TestLine`, a registration wired to all of the above
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mobius_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let mut line = TestLine::new(calling_settings(&[PRIMARY_1], &[BACKUP_1]));
//!     line.client.register_ok(PRIMARY_1, device_info(PRIMARY_1, "dev-1"));
//!
//!     line.registration.trigger_registration().await;
//!
//!     assert_eq!(line.drain_event_names(), vec!["connecting", "registered"]);
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod mock_calls;
pub mod mock_mobius;
pub mod recording_metrics;

// Re-export commonly used items
pub use fixtures::*;
pub use harness::*;
pub use mock_calls::*;
pub use mock_mobius::*;
pub use recording_metrics::*;
