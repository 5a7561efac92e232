//! Common utilities and types shared across the Mobius registration crates.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for access to the current user token
pub mod token;
