//! Common configuration types for the Mobius registration crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "mobius_registration=debug,common=info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. `mobius_registration=debug`)
    pub log_filter: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Read `RUST_LOG` and `MOBIUS_LOG_JSON` from a variable map.
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let log_filter = vars
            .get("RUST_LOG")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let json_logs = vars
            .get("MOBIUS_LOG_JSON")
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        Self {
            log_filter,
            json_logs,
        }
    }
}
