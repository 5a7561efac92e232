//! `HttpMobiusClient` against a mock Mobius server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use common::secret::SecretString;
use common::token::{token_channel, TokenReceiver};
use common::types::ServiceData;
use mobius_registration::classify::{classify, ErrorCategory};
use mobius_registration::client::{HttpMobiusClient, MobiusClient};
use mobius_registration::errors::MobiusError;
use mobius_registration::models::RegistrationRequest;
use wiremock::matchers::{body_partial_json, header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_DEVICE_URI: &str = "https://wdm.example.com/wdm/api/v1/devices/client-1";
const TRACKING_ID_PATTERN: &str = "^webex-web-client_[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$";

fn base_url(server: &MockServer) -> String {
    format!("{}/api/v1/calling/web/", server.uri())
}

fn client(token: TokenReceiver) -> HttpMobiusClient {
    HttpMobiusClient::new(token, CLIENT_DEVICE_URI, Duration::from_secs(5)).unwrap()
}

fn request() -> RegistrationRequest {
    RegistrationRequest {
        user_id: "user-1".to_string(),
        client_device_uri: CLIENT_DEVICE_URI.to_string(),
        service_data: ServiceData::calling(),
    }
}

#[tokio::test]
async fn test_post_registration_sends_headers_and_body() {
    let server = MockServer::start().await;
    let device_uri = format!("{}devices/dev-1", base_url(&server));

    Mock::given(method("POST"))
        .and(path("/api/v1/calling/web/device"))
        .and(header("authorization", "Bearer user-token"))
        .and(header("cisco-device-url", CLIENT_DEVICE_URI))
        .and(header("spark-user-agent", "webex-calling/beta"))
        .and(header_regex("trackingid", TRACKING_ID_PATTERN))
        .and(body_partial_json(serde_json::json!({
            "userId": "user-1",
            "clientDeviceUri": CLIENT_DEVICE_URI,
            "serviceData": { "indicator": "calling", "domain": "" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "userId": "user-1",
            "device": {
                "deviceId": "dev-1",
                "uri": device_uri,
                "status": "CREATED"
            },
            "keepaliveInterval": 30,
            "callKeepaliveInterval": 60,
            "rehomingIntervalMin": 60,
            "rehomingIntervalMax": 120
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = client(TokenReceiver::fixed("user-token"))
        .post_registration(&base_url(&server), &request())
        .await
        .unwrap();

    let device = info.device.unwrap();
    assert_eq!(device.device_id, "dev-1");
    assert_eq!(device.uri, device_uri);
    assert_eq!(info.keepalive_interval, Some(30));
    assert_eq!(info.rehoming_interval_max, Some(120));
}

#[tokio::test]
async fn test_keepalive_posts_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/calling/web/status"))
        .and(header("cisco-device-url", CLIENT_DEVICE_URI))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(TokenReceiver::fixed("user-token"))
        .post_keepalive(&base_url(&server))
        .await;

    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_delete_device_uses_record_uri() {
    let server = MockServer::start().await;
    let other_device = "https://wdm.example.com/wdm/api/v1/devices/other";

    Mock::given(method("DELETE"))
        .and(path("/api/v1/calling/web/devices/stale-1"))
        .and(header("cisco-device-url", other_device))
        .respond_with(ResponseTemplate::new(200).set_body_string("deleted"))
        .expect(1)
        .mount(&server)
        .await;

    let device_uri = format!("{}devices/stale-1", base_url(&server));
    let result = client(TokenReceiver::fixed("user-token"))
        .delete_device(&device_uri, other_device)
        .await;

    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_device_limit_body_is_parsed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/calling/web/device"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "errorCode": 101,
            "userId": "user-1",
            "devices": [{
                "deviceId": "stale-1",
                "uri": "https://mobius.example.com/api/v1/calling/web/devices/stale-1",
                "status": "CREATED",
                "lastSeen": "2024-05-01T10:00:00Z",
                "clientDeviceUri": CLIENT_DEVICE_URI
            }]
        })))
        .mount(&server)
        .await;

    let err = client(TokenReceiver::fixed("user-token"))
        .post_registration(&base_url(&server), &request())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(403));
    let body = err.body().unwrap();
    assert_eq!(body.error_code, Some(101));
    assert_eq!(body.devices.len(), 1);
    assert_eq!(body.devices.first().unwrap().device_id, "stale-1");
    assert_eq!(classify(&err).category, ErrorCategory::CapacityLimited);
}

#[tokio::test]
async fn test_unparseable_error_body_is_dropped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/calling/web/status"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>busy</html>"))
        .mount(&server)
        .await;

    let err = client(TokenReceiver::fixed("user-token"))
        .post_keepalive(&base_url(&server))
        .await
        .unwrap_err();

    assert_eq!(err, MobiusError::http(503));
}

#[tokio::test]
async fn test_invalid_success_body_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/calling/web/device"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(TokenReceiver::fixed("user-token"))
        .post_registration(&base_url(&server), &request())
        .await
        .unwrap_err();

    assert!(matches!(err, MobiusError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let err = client(TokenReceiver::fixed("user-token"))
        .post_keepalive("http://127.0.0.1:1/api/v1/calling/web/")
        .await
        .unwrap_err();

    assert!(matches!(err, MobiusError::Transport(_)));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_refreshed_token_used_on_next_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/calling/web/status"))
        .and(header("authorization", "Bearer refreshed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/calling/web/status"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (publisher, receiver) = token_channel(SecretString::from("expired"));
    let client = client(receiver);

    assert_eq!(
        client.post_keepalive(&base_url(&server)).await,
        Err(MobiusError::http(401))
    );

    publisher.publish(SecretString::from("refreshed"));
    assert_eq!(client.post_keepalive(&base_url(&server)).await, Ok(()));
}
