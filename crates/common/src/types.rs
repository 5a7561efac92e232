//! Common data types for the Mobius registration crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which product a registration is made for.
///
/// `ContactCenter` selects the alternate timing profile (shorter keepalive
/// retry budget, different failover threshold).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceIndicator {
    /// Regular calling.
    #[serde(rename = "calling")]
    Calling,
    /// Contact center agent line.
    #[serde(rename = "contactcenter")]
    ContactCenter,
}

impl ServiceIndicator {
    /// Wire value of the indicator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceIndicator::Calling => "calling",
            ServiceIndicator::ContactCenter => "contactcenter",
        }
    }
}

impl fmt::Display for ServiceIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown service indicator.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown service indicator: {0}")]
pub struct UnknownServiceIndicator(pub String);

impl FromStr for ServiceIndicator {
    type Err = UnknownServiceIndicator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "calling" => Ok(ServiceIndicator::Calling),
            "contactcenter" | "contact_center" => Ok(ServiceIndicator::ContactCenter),
            other => Err(UnknownServiceIndicator(other.to_string())),
        }
    }
}

/// Service data sent with every registration request.
///
/// Immutable for the life of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceData {
    /// Product the line is registered for.
    pub indicator: ServiceIndicator,
    /// Service domain (empty for regular calling).
    pub domain: String,
}

impl ServiceData {
    /// Service data for a regular calling line.
    #[must_use]
    pub fn calling() -> Self {
        Self {
            indicator: ServiceIndicator::Calling,
            domain: String::new(),
        }
    }

    /// Service data for a contact center line.
    #[must_use]
    pub fn contact_center(domain: impl Into<String>) -> Self {
        Self {
            indicator: ServiceIndicator::ContactCenter,
            domain: domain.into(),
        }
    }

    /// Whether the contact center timing profile applies.
    #[must_use]
    pub fn is_contact_center(&self) -> bool {
        self.indicator == ServiceIndicator::ContactCenter
    }
}

/// Registration status of a line.
///
/// `Idle` is only ever the initial value; afterwards the status alternates
/// between `Active` and `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Nothing attempted yet.
    #[default]
    Idle,
    /// Not registered with any server.
    Inactive,
    /// Registered with exactly one server.
    Active,
}

impl RegistrationStatus {
    /// Status as a lowercase label (used in logs and metric labels).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Idle => "idle",
            RegistrationStatus::Inactive => "inactive",
            RegistrationStatus::Active => "active",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_service_indicator_parse() {
        assert_eq!(
            "calling".parse::<ServiceIndicator>().unwrap(),
            ServiceIndicator::Calling
        );
        assert_eq!(
            "ContactCenter".parse::<ServiceIndicator>().unwrap(),
            ServiceIndicator::ContactCenter
        );
        assert_eq!(
            "contact_center".parse::<ServiceIndicator>().unwrap(),
            ServiceIndicator::ContactCenter
        );
        assert!("guest".parse::<ServiceIndicator>().is_err());
    }

    #[test]
    fn test_service_data_serializes_wire_format() {
        let json = serde_json::to_value(ServiceData::contact_center("cc.example.com")).unwrap();
        assert_eq!(json["indicator"], "contactcenter");
        assert_eq!(json["domain"], "cc.example.com");

        let json = serde_json::to_value(ServiceData::calling()).unwrap();
        assert_eq!(json["indicator"], "calling");
        assert_eq!(json["domain"], "");
    }

    #[test]
    fn test_registration_status_default_is_idle() {
        assert_eq!(RegistrationStatus::default(), RegistrationStatus::Idle);
        assert_eq!(RegistrationStatus::Active.to_string(), "active");
    }
}
