//! Pre-configured test data for registration tests.
//!
//! Server URLs look like real regional Mobius endpoints so URL handling
//! (trailing slashes, `devices/{id}` suffixes) is exercised as in production.

use common::types::ServiceData;
use mobius_registration::config::RegistrationSettings;
use mobius_registration::errors::MobiusError;
use mobius_registration::models::{device_url, Device, DeviceInfo, ErrorBody};
use mobius_registration::servers::MobiusServers;
use uuid::Uuid;

/// First primary server.
pub const PRIMARY_1: &str = "https://mobius-us-east-1.example.com/api/v1/calling/web/";
/// Second primary server.
pub const PRIMARY_2: &str = "https://mobius-us-east-2.example.com/api/v1/calling/web/";
/// First backup server.
pub const BACKUP_1: &str = "https://mobius-eu-central-1.example.com/api/v1/calling/web/";
/// Second backup server.
pub const BACKUP_2: &str = "https://mobius-eu-west-1.example.com/api/v1/calling/web/";

pub const TEST_USER_ID: &str = "8a67806f-fc4d-446b-a131-31e71ea5b0e9";
pub const TEST_CLIENT_DEVICE_URI: &str =
    "https://wdm-a.example.com/wdm/api/v1/devices/0b7c0e5a-3a0b-4bd9-9d0b-6c4b8a9b2d11";

/// Seed used by every settings fixture, so backoff draws are reproducible.
pub const TEST_RNG_SEED: u64 = 7;

/// Settings for a calling line.
#[must_use]
pub fn calling_settings(primary: &[&str], backup: &[&str]) -> RegistrationSettings {
    settings(primary, backup, ServiceData::calling())
}

/// Settings for a contact center line.
#[must_use]
pub fn contact_center_settings(primary: &[&str], backup: &[&str]) -> RegistrationSettings {
    settings(primary, backup, ServiceData::contact_center("rtw.example.com"))
}

fn settings(primary: &[&str], backup: &[&str], service_data: ServiceData) -> RegistrationSettings {
    let mut settings = RegistrationSettings::new(
        MobiusServers::new(primary.iter().copied(), backup.iter().copied()),
        service_data,
        TEST_USER_ID,
        TEST_CLIENT_DEVICE_URI,
    );
    settings.rng_seed = Some(TEST_RNG_SEED);
    settings
}

/// Device record living on `base_url`.
#[must_use]
pub fn device(base_url: &str, device_id: &str) -> Device {
    Device {
        device_id: device_id.to_string(),
        uri: device_url(base_url, device_id),
        status: Some("CREATED".to_string()),
        last_seen: None,
        addresses: vec![format!("sip:{TEST_USER_ID}@example.com")],
        client_device_uri: Some(TEST_CLIENT_DEVICE_URI.to_string()),
    }
}

/// Successful registration response from `base_url`.
///
/// Keepalive interval 30 seconds, no rehoming bounds.
#[must_use]
pub fn device_info(base_url: &str, device_id: &str) -> DeviceInfo {
    DeviceInfo {
        user_id: Some(TEST_USER_ID.to_string()),
        device: Some(device(base_url, device_id)),
        keepalive_interval: Some(30),
        call_keepalive_interval: Some(60),
        rehoming_interval_min: None,
        rehoming_interval_max: None,
    }
}

/// Registration response with a random device id.
#[must_use]
pub fn random_device_info(base_url: &str) -> DeviceInfo {
    device_info(base_url, &Uuid::new_v4().to_string())
}

/// 403 with error code 101 listing `devices` as the occupants.
#[must_use]
pub fn device_limit_exceeded(devices: Vec<Device>) -> MobiusError {
    MobiusError::Http {
        status: 403,
        body: Some(ErrorBody {
            error_code: Some(101),
            user_id: Some(TEST_USER_ID.to_string()),
            devices,
        }),
    }
}

/// 403 carrying `error_code` and no devices.
#[must_use]
pub fn forbidden(error_code: u32) -> MobiusError {
    MobiusError::Http {
        status: 403,
        body: Some(ErrorBody {
            error_code: Some(error_code),
            ..ErrorBody::default()
        }),
    }
}
