//! Mobius wire types.
//!
//! Field names follow the Mobius JSON (camelCase). Unknown fields are ignored
//! so newer servers do not break older clients.

use common::types::ServiceData;
use serde::{Deserialize, Serialize};

/// Path segment under which Mobius exposes device records.
pub const DEVICES_RESOURCE: &str = "devices";

/// Server-side device record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    /// Absolute URI of this device record (`{mobius}/devices/{deviceId}`).
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_device_uri: Option<String>,
}

/// Registration record returned by `POST {url}/device`.
///
/// Superseded, never merged, by the next successful registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    /// Keepalive period in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_keepalive_interval: Option<u64>,
    /// Lower failback bound in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rehoming_interval_min: Option<u64>,
    /// Upper failback bound in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rehoming_interval_max: Option<u64>,
}

/// Body sent with a registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub user_id: String,
    pub client_device_uri: String,
    pub service_data: ServiceData,
}

/// Error body Mobius attaches to some 4xx responses.
///
/// A 403 with `errorCode` 101 lists the devices already occupying the
/// user's slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<Device>,
}

/// Join a Mobius base URL and a path without doubling or dropping slashes.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// URI of a device record under a Mobius base URL.
#[must_use]
pub fn device_url(base: &str, device_id: &str) -> String {
    join_url(base, &format!("{DEVICES_RESOURCE}/{device_id}"))
}

/// Mobius base URL a device record lives under.
///
/// Strips the `/devices/{deviceId}` suffix; a URI without that suffix is
/// returned unchanged.
#[must_use]
pub fn base_url_of_device(device: &Device) -> String {
    let suffix = format!("{DEVICES_RESOURCE}/{}", device.device_id);
    match device.uri.strip_suffix(&suffix) {
        Some(base) => base.to_string(),
        None => device.uri.clone(),
    }
}
