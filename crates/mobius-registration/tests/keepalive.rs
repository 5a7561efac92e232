//! Keepalive scheduler behavior.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]

use std::time::Duration;

use common::types::RegistrationStatus;
use mobius_registration::config::RegistrationSettings;
use mobius_registration::errors::{ErrorType, MobiusError};
use mobius_registration::events::LineEvent;
use mobius_registration::observability::{MetricEvent, RegistrationAction};
use mobius_test_utils::*;

async fn registered_line(settings: RegistrationSettings) -> TestLine {
    let mut line = TestLine::new(settings);
    line.client
        .register_ok(PRIMARY_1, device_info(PRIMARY_1, "dev-1"));
    line.registration.trigger_registration().await;
    assert_eq!(line.drain_event_names(), vec!["connecting", "registered"]);
    line
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_sent_every_interval_to_active_server() {
    let line = registered_line(calling_settings(&[PRIMARY_1], &[])).await;

    run_for(Duration::from_secs(95)).await;

    assert_eq!(line.client.count(MobiusOp::Keepalive, PRIMARY_1), 3);
    assert_eq!(line.client.count_op(MobiusOp::Keepalive), 3);
}

#[tokio::test(start_paused = true)]
async fn test_missing_keepalive_interval_uses_default() {
    let mut settings = calling_settings(&[PRIMARY_1], &[]);
    settings.timers.default_keepalive_interval_seconds = 45;
    let mut line = TestLine::new(settings);
    let mut info = device_info(PRIMARY_1, "dev-1");
    info.keepalive_interval = None;
    line.client.register_ok(PRIMARY_1, info);
    line.registration.trigger_registration().await;

    run_for(Duration::from_secs(44)).await;
    assert_eq!(line.client.count_op(MobiusOp::Keepalive), 0);

    run_for(Duration::from_secs(2)).await;
    assert_eq!(line.client.count_op(MobiusOp::Keepalive), 1);
}

#[tokio::test(start_paused = true)]
async fn test_huge_keepalive_interval_keeps_line_registered() {
    let mut line = TestLine::new(calling_settings(&[PRIMARY_1], &[]));
    let mut info = device_info(PRIMARY_1, "dev-1");
    info.keepalive_interval = Some(u64::MAX);
    line.client.register_ok(PRIMARY_1, info);
    line.registration.trigger_registration().await;

    run_for(Duration::from_secs(3600)).await;

    assert_eq!(line.client.count_op(MobiusOp::Keepalive), 0);
    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Active);
    assert!(snapshot.keepalive_running);

    // The engine still answers and tears down normally
    line.registration.deregister().await;
    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Inactive);
    assert!(!snapshot.keepalive_running);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_recovers_within_budget() {
    let mut line = registered_line(calling_settings(&[PRIMARY_1], &[])).await;
    line.client
        .queue_keepalive(PRIMARY_1, Err(MobiusError::http(503)));
    line.client
        .queue_keepalive(PRIMARY_1, Err(MobiusError::http(503)));

    run_for(Duration::from_secs(91)).await;

    assert_eq!(
        line.drain_event_names(),
        vec!["reconnecting", "reconnecting", "reconnected"]
    );
    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Active);
    assert_eq!(snapshot.keepalive_retry_count, 0);
    assert_eq!(line.client.count_op(MobiusOp::Register), 1);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_budget_exhausted_reconnects() {
    let mut line = registered_line(calling_settings(&[PRIMARY_1], &[BACKUP_1])).await;
    line.client.keepalive_err(PRIMARY_1, MobiusError::http(503));

    run_for(Duration::from_secs(151)).await;

    assert_eq!(
        line.drain_event_names(),
        vec![
            "reconnecting",
            "reconnecting",
            "reconnecting",
            "reconnecting",
            "unregistered",
            "connecting",
            "registered"
        ]
    );

    // Restored on the server it was bound to
    assert_eq!(
        line.client.urls_for(MobiusOp::Register),
        vec![PRIMARY_1, PRIMARY_1]
    );
    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Active);
    assert_eq!(snapshot.keepalive_retry_count, 0);
    assert!(snapshot.keepalive_running);
    assert_eq!(
        line.metrics
            .count(MetricEvent::Registration, RegistrationAction::KeepaliveFailure),
        5
    );
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_budget_exhausted_on_backup_stops_failback() {
    let mut line = TestLine::new(calling_settings(&[PRIMARY_1], &[BACKUP_1]));
    line.client.register_err(PRIMARY_1, MobiusError::http(503));
    line.client
        .register_ok(BACKUP_1, device_info(BACKUP_1, "dev-backup"));
    line.client.keepalive_err(BACKUP_1, MobiusError::http(503));
    // Calls hold the reconnect back so the post-budget state stays visible
    line.calls.set_active_calls(1);

    line.registration.trigger_registration().await;
    run_for(Duration::from_secs(115)).await;

    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Active);
    assert_eq!(snapshot.active_mobius_url.as_deref(), Some(BACKUP_1));
    assert!(snapshot.failback_scheduled);

    run_for(Duration::from_secs(151)).await;

    let names = line.drain_event_names();
    assert_eq!(
        &names[names.len() - 6..],
        &[
            "registered",
            "reconnecting",
            "reconnecting",
            "reconnecting",
            "reconnecting",
            "unregistered"
        ]
    );
    assert_eq!(line.client.count(MobiusOp::Keepalive, BACKUP_1), 5);
    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Inactive);
    assert!(!snapshot.keepalive_running);
    assert!(!snapshot.failback_scheduled);
    assert!(snapshot.reconnect_pending);

    // Reconnect restores the backup binding and re-arms failback
    line.calls.set_active_calls(0);
    line.client.keepalive_ok(BACKUP_1);
    line.registration.handle_calls_cleared().await;

    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Active);
    assert_eq!(snapshot.active_mobius_url.as_deref(), Some(BACKUP_1));
    assert!(snapshot.keepalive_running);
    assert!(snapshot.failback_scheduled);
}

#[tokio::test(start_paused = true)]
async fn test_contact_center_budget_is_four() {
    let mut line = registered_line(contact_center_settings(&[PRIMARY_1], &[])).await;
    line.client.keepalive_err(PRIMARY_1, MobiusError::http(503));

    run_for(Duration::from_secs(121)).await;

    assert_eq!(
        line.drain_event_names(),
        vec![
            "reconnecting",
            "reconnecting",
            "reconnecting",
            "unregistered",
            "connecting",
            "registered"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_unauthorized_is_final() {
    let mut line = registered_line(calling_settings(&[PRIMARY_1], &[BACKUP_1])).await;
    line.client.keepalive_err(PRIMARY_1, MobiusError::http(401));

    run_for(Duration::from_secs(31)).await;

    let events = line.drain_events();
    assert_eq!(events.len(), 2);
    match &events[0] {
        LineEvent::Error(err) => assert_eq!(err.error_type, ErrorType::TokenError),
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(events[1], LineEvent::Unregistered);

    run_for(Duration::from_secs(600)).await;

    assert_eq!(line.client.count_op(MobiusOp::Register), 1);
    assert_eq!(line.client.count_op(MobiusOp::Keepalive), 1);
    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Inactive);
    assert!(!snapshot.keepalive_running);
    assert!(!snapshot.failover_scheduled);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_deferred_until_calls_cleared() {
    let mut line = registered_line(calling_settings(&[PRIMARY_1], &[])).await;
    line.calls.set_active_calls(1);
    line.client.keepalive_err(PRIMARY_1, MobiusError::http(503));

    run_for(Duration::from_secs(151)).await;

    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Inactive);
    assert!(snapshot.reconnect_pending);
    assert!(!snapshot.keepalive_running);
    assert!(line.registration.is_reconnect_pending().await);
    assert_eq!(line.client.count_op(MobiusOp::Register), 1);

    // A calls-cleared notification while calls remain keeps it deferred
    line.registration.handle_calls_cleared().await;
    assert!(line.registration.is_reconnect_pending().await);
    assert_eq!(line.client.count_op(MobiusOp::Register), 1);

    line.calls.set_active_calls(0);
    line.client.keepalive_ok(PRIMARY_1);
    line.drain_events();
    line.registration.handle_calls_cleared().await;

    assert_eq!(line.drain_event_names(), vec!["connecting", "registered"]);
    let snapshot = line.registration.snapshot().await;
    assert_eq!(snapshot.status, RegistrationStatus::Active);
    assert!(!snapshot.reconnect_pending);
    assert_eq!(line.client.count_op(MobiusOp::Register), 2);
}

#[tokio::test(start_paused = true)]
async fn test_calls_cleared_without_pending_reconnect_is_noop() {
    let mut line = registered_line(calling_settings(&[PRIMARY_1], &[])).await;

    line.registration.handle_calls_cleared().await;

    assert!(line.drain_events().is_empty());
    assert_eq!(line.client.count_op(MobiusOp::Register), 1);
}
