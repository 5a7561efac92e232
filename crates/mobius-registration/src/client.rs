//! Mobius HTTP client.
//!
//! The engine talks to Mobius only through [`MobiusClient`], so tests swap in
//! a scripted mock. [`HttpMobiusClient`] is the production implementation on
//! `reqwest`.
//!
//! # Requests
//!
//! | Operation    | Request                  |
//! |--------------|--------------------------|
//! | register     | `POST {url}/device`      |
//! | keepalive    | `POST {url}/status`      |
//! | delete       | `DELETE {deviceUri}`     |
//!
//! Every request carries the bearer token, the client device URI and a fresh
//! tracking id. Tokens are read from the [`TokenReceiver`] per request, so a
//! refreshed token is picked up without rebuilding the client.

use crate::errors::MobiusError;
use crate::models::{join_url, DeviceInfo, ErrorBody, RegistrationRequest};
use async_trait::async_trait;
use common::secret::ExposeSecret;
use common::token::TokenReceiver;
use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Header carrying the client device URI.
pub const CISCO_DEVICE_URL: &str = "cisco-device-url";
/// User agent header name Mobius expects.
pub const SPARK_USER_AGENT: &str = "spark-user-agent";
/// User agent value for calling clients.
pub const CALLING_USER_AGENT: &str = "webex-calling/beta";
/// Tracking id header name.
pub const TRACKING_ID: &str = "trackingid";
/// Tracking id prefix; a v4 UUID follows.
pub const TRACKING_ID_PREFIX: &str = "webex-web-client";

/// Connect timeout for Mobius requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Calls the engine makes against Mobius.
#[async_trait]
pub trait MobiusClient: Send + Sync {
    /// Register the device with the server at `url`.
    async fn post_registration(
        &self,
        url: &str,
        request: &RegistrationRequest,
    ) -> Result<DeviceInfo, MobiusError>;

    /// Send a keepalive to the server at `url`.
    async fn post_keepalive(&self, url: &str) -> Result<(), MobiusError>;

    /// Delete the device record at `device_uri`.
    async fn delete_device(
        &self,
        device_uri: &str,
        client_device_uri: &str,
    ) -> Result<(), MobiusError>;
}

/// `reqwest` based Mobius client.
#[derive(Clone)]
pub struct HttpMobiusClient {
    http: reqwest::Client,
    token: TokenReceiver,
    client_device_uri: String,
}

impl std::fmt::Debug for HttpMobiusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMobiusClient")
            .field("token", &"[REDACTED]")
            .field("client_device_uri", &self.client_device_uri)
            .finish_non_exhaustive()
    }
}

impl HttpMobiusClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns `MobiusError::Transport` if the underlying HTTP client cannot
    /// be built.
    pub fn new(
        token: TokenReceiver,
        client_device_uri: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MobiusError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| MobiusError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            token,
            client_device_uri: client_device_uri.into(),
        })
    }

    fn request(&self, method: Method, url: &str, client_device_uri: &str) -> RequestBuilder {
        let tracking_id = format!("{TRACKING_ID_PREFIX}_{}", uuid::Uuid::new_v4());
        self.http
            .request(method, url)
            .bearer_auth(self.token.token().expose_secret())
            .header(CISCO_DEVICE_URL, client_device_uri)
            .header(SPARK_USER_AGENT, CALLING_USER_AGENT)
            .header(TRACKING_ID, tracking_id)
    }

    async fn send(&self, builder: RequestBuilder, url: &str) -> Result<Response, MobiusError> {
        let response = builder.send().await.map_err(|e| {
            debug!(target: "mobius.client", error = %e, url = %url, "HTTP request failed");
            MobiusError::Transport(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_else(|e| {
            trace!(target: "mobius.client", error = %e, "Failed to read error response body");
            String::new()
        });
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<ErrorBody>(&text).ok()
        };

        warn!(
            target: "mobius.client",
            status = %status,
            url = %url,
            error_code = ?body.as_ref().and_then(|b| b.error_code),
            "Mobius rejected request"
        );
        trace!(target: "mobius.client", body = %text, "Mobius error response body");

        Err(MobiusError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl MobiusClient for HttpMobiusClient {
    #[instrument(skip_all)]
    async fn post_registration(
        &self,
        url: &str,
        request: &RegistrationRequest,
    ) -> Result<DeviceInfo, MobiusError> {
        let endpoint = join_url(url, "device");
        debug!(target: "mobius.client", url = %endpoint, "Posting registration");

        let builder = self
            .request(Method::POST, &endpoint, &request.client_device_uri)
            .json(request);
        let response = self.send(builder, &endpoint).await?;

        response.json::<DeviceInfo>().await.map_err(|e| {
            warn!(target: "mobius.client", error = %e, "Failed to parse registration response");
            MobiusError::InvalidResponse(e.to_string())
        })
    }

    #[instrument(skip_all)]
    async fn post_keepalive(&self, url: &str) -> Result<(), MobiusError> {
        let endpoint = join_url(url, "status");
        let builder = self.request(Method::POST, &endpoint, &self.client_device_uri);
        let response = self.send(builder, &endpoint).await?;

        trace!(target: "mobius.client", status = %response.status(), "Keepalive acknowledged");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn delete_device(
        &self,
        device_uri: &str,
        client_device_uri: &str,
    ) -> Result<(), MobiusError> {
        let device_header = if client_device_uri.is_empty() {
            self.client_device_uri.as_str()
        } else {
            client_device_uri
        };

        let builder = self.request(Method::DELETE, device_uri, device_header);
        let response = self.send(builder, device_uri).await?;

        // Body is informational only
        match response.text().await {
            Ok(body) => trace!(target: "mobius.client", body = %body, "Device deleted"),
            Err(e) => trace!(target: "mobius.client", error = %e, "Device deleted, body unreadable"),
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let client = HttpMobiusClient::new(
            TokenReceiver::fixed("very-secret"),
            "https://wdm/devices/a1",
            Duration::from_secs(1),
        )
        .unwrap();

        let debug = format!("{client:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("very-secret"));
    }
}
