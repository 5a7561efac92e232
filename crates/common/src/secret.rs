//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for the user's bearer token. Any
//! struct that derives `Debug` and holds a `SecretString` prints
//! `[REDACTED]` for it, so the token never reaches a log line through
//! `{:?}` or a tracing field.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct DeleteRequest {
//!     device_uri: String,
//!     user_token: SecretString,
//! }
//!
//! let req = DeleteRequest {
//!     device_uri: "https://mobius.example.com/api/v1/calling/web/devices/d1".to_string(),
//!     user_token: SecretString::from("eyJhbGciOi"),
//! };
//!
//! assert!(!format!("{req:?}").contains("eyJhbGciOi"));
//!
//! // Reading the value is always explicit
//! let header = format!("Bearer {}", req.user_token.expose_secret());
//! # assert!(header.starts_with("Bearer "));
//! ```

pub use secrecy::{ExposeSecret, SecretString};
