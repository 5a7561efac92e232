//! Mobius registration configuration.
//!
//! Service configuration is loaded from environment variables; the
//! user token is redacted in Debug output. Engine timing lives in
//! [`RegistrationTimers`], which is only overridden programmatically.

use crate::backoff::BackoffPolicy;
use crate::servers::MobiusServers;
use common::config::ObservabilityConfig;
use common::secret::SecretString;
use common::types::{ServiceData, ServiceIndicator};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8090";

/// Default HTTP request timeout for Mobius calls, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Seconds of primary retries before a calling line tries backup servers.
pub const DEFAULT_FAILOVER_THRESHOLD_SECONDS: u64 = 114;

/// Seconds of primary retries before a contact center line tries backup servers.
pub const DEFAULT_CC_FAILOVER_THRESHOLD_SECONDS: u64 = 36;

/// Keepalive period used when the server does not send one.
pub const DEFAULT_KEEPALIVE_INTERVAL_SECONDS: u64 = 30;

/// Lower failback bound in minutes until a primary server sends its own.
pub const DEFAULT_REHOMING_INTERVAL_MIN_MINUTES: u64 = 60;

/// Upper failback bound in minutes until a primary server sends its own.
pub const DEFAULT_REHOMING_INTERVAL_MAX_MINUTES: u64 = 120;

/// Failback attempts rejected with 429 that are retried early.
pub const DEFAULT_FAILBACK_429_MAX_RETRIES: u32 = 5;

/// Missed keepalives tolerated on a calling line.
pub const DEFAULT_KEEPALIVE_RETRY_BUDGET: u32 = 5;

/// Missed keepalives tolerated on a contact center line.
pub const DEFAULT_CC_KEEPALIVE_RETRY_BUDGET: u32 = 4;

/// Timing knobs of the registration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationTimers {
    pub backoff: BackoffPolicy,
    pub failover_threshold_seconds: u64,
    pub cc_failover_threshold_seconds: u64,
    pub default_keepalive_interval_seconds: u64,
    pub default_rehoming_interval_min_minutes: u64,
    pub default_rehoming_interval_max_minutes: u64,
    pub failback_429_max_retries: u32,
    pub keepalive_retry_budget: u32,
    pub cc_keepalive_retry_budget: u32,
}

impl Default for RegistrationTimers {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            failover_threshold_seconds: DEFAULT_FAILOVER_THRESHOLD_SECONDS,
            cc_failover_threshold_seconds: DEFAULT_CC_FAILOVER_THRESHOLD_SECONDS,
            default_keepalive_interval_seconds: DEFAULT_KEEPALIVE_INTERVAL_SECONDS,
            default_rehoming_interval_min_minutes: DEFAULT_REHOMING_INTERVAL_MIN_MINUTES,
            default_rehoming_interval_max_minutes: DEFAULT_REHOMING_INTERVAL_MAX_MINUTES,
            failback_429_max_retries: DEFAULT_FAILBACK_429_MAX_RETRIES,
            keepalive_retry_budget: DEFAULT_KEEPALIVE_RETRY_BUDGET,
            cc_keepalive_retry_budget: DEFAULT_CC_KEEPALIVE_RETRY_BUDGET,
        }
    }
}

impl RegistrationTimers {
    /// How long primary servers are retried before moving to backup.
    #[must_use]
    pub fn failover_threshold_seconds(&self, service: &ServiceData) -> u64 {
        if service.is_contact_center() {
            self.cc_failover_threshold_seconds
        } else {
            self.failover_threshold_seconds
        }
    }

    /// How many consecutive keepalive failures end a registration.
    #[must_use]
    pub fn keepalive_retry_budget(&self, service: &ServiceData) -> u32 {
        if service.is_contact_center() {
            self.cc_keepalive_retry_budget
        } else {
            self.keepalive_retry_budget
        }
    }
}

/// Everything one line's registration engine needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    pub servers: MobiusServers,
    pub service_data: ServiceData,
    pub user_id: String,
    pub client_device_uri: String,
    pub timers: RegistrationTimers,
    /// Seed for backoff jitter and failback draws; `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl RegistrationSettings {
    /// Settings with default timers and an entropy-seeded RNG.
    #[must_use]
    pub fn new(
        servers: MobiusServers,
        service_data: ServiceData,
        user_id: impl Into<String>,
        client_device_uri: impl Into<String>,
    ) -> Self {
        Self {
            servers,
            service_data,
            user_id: user_id.into(),
            client_device_uri: client_device_uri.into(),
            timers: RegistrationTimers::default(),
            rng_seed: None,
        }
    }
}

/// Service configuration.
#[derive(Clone)]
pub struct Config {
    pub servers: MobiusServers,

    pub user_id: String,

    /// Device URI the client was provisioned with; sent as `cisco-device-url`.
    pub client_device_uri: String,

    /// Bearer token for Mobius.
    /// Protected by `SecretString` to prevent accidental logging.
    pub user_token: SecretString,

    pub service_data: ServiceData,

    /// Request timeout for Mobius calls (default: 10).
    pub http_timeout_seconds: u64,

    /// Health endpoint bind address (default: "0.0.0.0:8090").
    pub health_bind_address: String,

    pub failback_429_max_retries: u32,

    pub rng_seed: Option<u64>,

    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("servers", &self.servers)
            .field("user_id", &self.user_id)
            .field("client_device_uri", &self.client_device_uri)
            .field("user_token", &"[REDACTED]")
            .field("service_data", &self.service_data)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .field("health_bind_address", &self.health_bind_address)
            .field("failback_429_max_retries", &self.failback_429_max_retries)
            .field("rng_seed", &self.rng_seed)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let primary = split_uris(required(vars, "MOBIUS_PRIMARY_URIS")?);
        if primary.is_empty() {
            return Err(ConfigError::InvalidValue(
                "MOBIUS_PRIMARY_URIS must list at least one server".to_string(),
            ));
        }
        let backup = vars
            .get("MOBIUS_BACKUP_URIS")
            .map(String::as_str)
            .map(split_uris)
            .unwrap_or_default();

        let user_id = required(vars, "MOBIUS_USER_ID")?.to_string();
        let client_device_uri = required(vars, "MOBIUS_CLIENT_DEVICE_URI")?.to_string();
        let user_token = SecretString::from(required(vars, "MOBIUS_USER_TOKEN")?.to_string());

        let indicator = match vars.get("MOBIUS_SERVICE_INDICATOR") {
            Some(raw) => raw
                .parse::<ServiceIndicator>()
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?,
            None => ServiceIndicator::Calling,
        };
        let service_data = ServiceData {
            indicator,
            domain: vars
                .get("MOBIUS_SERVICE_DOMAIN")
                .cloned()
                .unwrap_or_default(),
        };

        let http_timeout_seconds =
            parse_or(vars, "MOBIUS_HTTP_TIMEOUT_SECONDS", DEFAULT_HTTP_TIMEOUT_SECONDS)?;
        if http_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "MOBIUS_HTTP_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }

        let health_bind_address = vars
            .get("MOBIUS_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let failback_429_max_retries = parse_or(
            vars,
            "MOBIUS_FAILBACK_429_MAX_RETRIES",
            DEFAULT_FAILBACK_429_MAX_RETRIES,
        )?;

        let rng_seed = vars
            .get("MOBIUS_RNG_SEED")
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|e| {
                    ConfigError::InvalidValue(format!("MOBIUS_RNG_SEED: {e}"))
                })
            })
            .transpose()?;

        Ok(Config {
            servers: MobiusServers::new(primary, backup),
            user_id,
            client_device_uri,
            user_token,
            service_data,
            http_timeout_seconds,
            health_bind_address,
            failback_429_max_retries,
            rng_seed,
            observability: ObservabilityConfig::from_vars(vars),
        })
    }

    /// HTTP request timeout for Mobius calls.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Engine settings for the configured line.
    #[must_use]
    pub fn registration_settings(&self) -> RegistrationSettings {
        RegistrationSettings {
            servers: self.servers.clone(),
            service_data: self.service_data.clone(),
            user_id: self.user_id.clone(),
            client_device_uri: self.client_device_uri.clone(),
            timers: RegistrationTimers {
                failback_429_max_retries: self.failback_429_max_retries,
                ..RegistrationTimers::default()
            },
            rng_seed: self.rng_seed,
        }
    }
}

fn required<'a>(vars: &'a HashMap<String, String>, name: &str) -> Result<&'a str, ConfigError> {
    vars.get(name)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_or<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("{name}: {e}"))),
        None => Ok(default),
    }
}

fn split_uris(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
