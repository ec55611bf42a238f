// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client integration tests against the in-memory runtime.
//!
//! Reconnect timing tests run with paused time so the 30 second reconnect
//! timer elapses instantly.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use common::{config, params, wait_until, MockClientRuntime, ReconnectScript};
use trap_opcua_helper::client::{
    CertificatePolicy, ChannelHandler, MonitoredItemNotification, ReconnectPhase,
    SessionController, SessionHandle,
};
use trap_opcua_helper::{
    ControllerConfig, DataValue, NodeClass, NodeId, OpcUaError, ReferenceDescription,
    RuntimeError, SessionError, StatusCode, SubscriptionError, Variant,
};

fn noop(_: &MonitoredItemNotification) {}

async fn connected() -> (Arc<MockClientRuntime>, SessionController<MockClientRuntime>, SessionHandle) {
    common::init_tracing();
    let runtime = MockClientRuntime::new();
    let controller = SessionController::new(Arc::clone(&runtime), config()).unwrap();
    let session = controller
        .initialize_connection(params(), None)
        .await
        .unwrap();
    (runtime, controller, session)
}

// =============================================================================
// Connection setup
// =============================================================================

#[tokio::test]
async fn test_initialize_connection() {
    let (runtime, controller, session) = connected().await;

    assert!(controller.has_session());
    assert_eq!(controller.session().unwrap().id, session.id);
    assert_eq!(session.name, "test-session");
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert_eq!(controller.stats().sessions_created(), 1);
    assert_eq!(runtime.policies(), vec![CertificatePolicy::AcceptAll]);

    controller.dispose().await;
}

#[tokio::test]
async fn test_initialize_connection_rejects_blank_arguments() {
    let runtime = MockClientRuntime::new();
    let controller = SessionController::new(Arc::clone(&runtime), config()).unwrap();

    let mut bad = params();
    bad.server_url = "  ".to_string();
    let err = controller.initialize_connection(bad, None).await.unwrap_err();
    assert_eq!(err.argument_name(), Some("server_url"));

    let mut bad = params();
    bad.session_timeout = Duration::ZERO;
    let err = controller.initialize_connection(bad, None).await.unwrap_err();
    assert_eq!(err.argument_name(), Some("session_timeout"));

    assert_eq!(runtime.create_session_calls.load(Ordering::SeqCst), 0);
    assert!(!controller.has_session());
}

#[tokio::test]
async fn test_initialize_connection_rejects_invalid_certificate() {
    let runtime = MockClientRuntime::new();
    runtime.reject_certificate.store(true, Ordering::SeqCst);
    let controller = SessionController::new(Arc::clone(&runtime), config()).unwrap();

    let err = controller
        .initialize_connection(params(), None)
        .await
        .unwrap_err();

    assert!(err.is_certificate_invalid());
    assert!(!controller.has_session());
    assert_eq!(runtime.create_session_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_initialize_connection_reports_config_load_failure() {
    let runtime = MockClientRuntime::new();
    runtime.fail_config_load.store(true, Ordering::SeqCst);
    let controller = SessionController::new(Arc::clone(&runtime), config()).unwrap();

    let err = controller
        .initialize_connection(params(), None)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        OpcUaError::Runtime(RuntimeError::ConfigurationLoad { path, .. }) if path == "client.config.xml"
    ));
    assert!(!err.is_retryable());
    assert_eq!(runtime.create_session_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_endpoint_discovery_times_out() {
    let runtime = MockClientRuntime::new();
    runtime.hang_discovery.store(true, Ordering::SeqCst);
    let controller = SessionController::new(Arc::clone(&runtime), config()).unwrap();

    let started = Instant::now();
    let err = controller
        .initialize_connection(params(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, OpcUaError::Runtime(RuntimeError::Timeout { .. })));
    assert!(err.is_retryable());
    assert!(started.elapsed() >= config().endpoint_discovery_timeout);
    assert!(!controller.has_session());
    assert_eq!(runtime.create_session_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_replacing_session_closes_previous() {
    let (runtime, controller, first) = connected().await;

    let second = controller
        .initialize_connection(params(), None)
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(controller.session().unwrap().id, second.id);
    assert_eq!(runtime.closed(), vec![first.id]);
}

#[tokio::test]
async fn test_controller_requires_runtime_config() {
    let runtime = MockClientRuntime::new();
    let config = ControllerConfig {
        reconnect_timeout: Duration::ZERO,
        ..ControllerConfig::default()
    };
    assert!(SessionController::new(runtime, config).is_err());
}

// =============================================================================
// Session preconditions
// =============================================================================

#[tokio::test]
async fn test_operations_without_session() {
    let runtime = MockClientRuntime::new();
    let controller = SessionController::new(Arc::clone(&runtime), config()).unwrap();
    let node = NodeId::OBJECTS_FOLDER;

    assert!(controller.browse(&node).await.unwrap_err().is_session_not_ready());
    assert!(controller.read_value(&node).await.unwrap_err().is_session_not_ready());
    assert!(controller.namespace_uris().await.unwrap_err().is_session_not_ready());
    assert!(controller.keep_alive_stopped().unwrap_err().is_session_not_ready());
    assert!(controller
        .server_subscription_count()
        .await
        .unwrap_err()
        .is_session_not_ready());

    let subscriptions = controller.subscriptions();
    let item = subscriptions.create_monitored_item("Tank/Level", noop).unwrap();
    let err = subscriptions
        .create_subscription(vec![item], Duration::from_millis(100), false)
        .await
        .unwrap_err();
    assert!(err.is_session_not_ready());

    assert!(subscriptions
        .cleanup_all_subscriptions()
        .await
        .unwrap_err()
        .is_session_not_ready());
    assert!(subscriptions
        .delete_all_subscriptions()
        .await
        .unwrap_err()
        .is_session_not_ready());
}

#[tokio::test]
async fn test_close_session_without_session_is_noop() {
    let runtime = MockClientRuntime::new();
    let controller = SessionController::new(Arc::clone(&runtime), config()).unwrap();

    controller.close_session(true).await.unwrap();
    assert_eq!(runtime.close_session_calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn test_create_subscription_validates_arguments() {
    let (_runtime, controller, _) = connected().await;
    let subscriptions = controller.subscriptions();

    let err = subscriptions.create_monitored_item(" ", noop).unwrap_err();
    assert_eq!(err.argument_name(), Some("node_identifier"));

    let item = subscriptions.create_monitored_item("Tank/Level", noop).unwrap();
    let err = subscriptions
        .create_subscription(vec![item], Duration::ZERO, false)
        .await
        .unwrap_err();
    assert_eq!(err.argument_name(), Some("publishing_interval"));

    let none = subscriptions
        .create_subscription(Vec::new(), Duration::from_millis(100), false)
        .await
        .unwrap();
    assert!(none.is_none());
    assert_eq!(subscriptions.subscription_count(), 0);
}

#[tokio::test]
async fn test_subscription_delivers_notifications() {
    let (_runtime, controller, session) = connected().await;
    let subscriptions = controller.subscriptions();

    let (handler, mut rx) = ChannelHandler::with_channel(8);
    let item = subscriptions.create_monitored_item("Tank/Level", handler).unwrap();
    let handle = item.client_handle();

    let subscription = subscriptions
        .create_subscription(vec![item], Duration::from_millis(500), true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(subscription.session_id(), session.id);
    assert_eq!(subscription.priority(), u8::MAX);
    assert_eq!(subscription.publishing_interval(), Duration::from_millis(500));
    assert!(Uuid::parse_str(subscription.display_name()).is_ok());
    assert!(subscription.items()[0].is_created());

    assert!(subscription.dispatch(handle, DataValue::new(Variant::Double(3.5))));
    let notification = rx.recv().await.unwrap();
    assert_eq!(notification.node_id, NodeId::string(2, "Tank/Level"));
    assert_eq!(notification.value.value, Variant::Double(3.5));
}

#[tokio::test]
async fn test_cleanup_removes_orphaned_items() {
    let (runtime, controller, _) = connected().await;
    let subscriptions = controller.subscriptions();
    runtime.reject_item(NodeId::string(2, "Missing"));

    let items = vec![
        subscriptions.create_monitored_item("Tank/Level", noop).unwrap(),
        subscriptions.create_monitored_item("Missing", noop).unwrap(),
        subscriptions.create_monitored_item("Tank/Temp", noop).unwrap(),
    ];
    let subscription = subscriptions
        .create_subscription(items, Duration::from_millis(100), false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscription.orphaned_items().len(), 1);

    let report = subscriptions.cleanup_all_subscriptions().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.items_removed, 1);

    assert_eq!(subscription.item_count(), 2);
    assert!(subscription.orphaned_items().is_empty());
    assert_eq!(runtime.subscription_items(subscription.server_id()).len(), 2);
    assert_eq!(subscriptions.subscription_count(), 1);
    assert_eq!(subscriptions.stats().items_removed(), 1);
}

#[tokio::test]
async fn test_cleanup_all_fans_out_across_subscriptions() {
    let (runtime, controller, _) = connected().await;
    let subscriptions = controller.subscriptions();

    let mut created = Vec::new();
    for line in 0..4 {
        let mut items = vec![
            subscriptions.create_monitored_item(&format!("Line{line}/Level"), noop).unwrap(),
            subscriptions.create_monitored_item(&format!("Line{line}/Temp"), noop).unwrap(),
        ];
        for slot in 0..=line {
            let missing = format!("Line{line}/Missing{slot}");
            runtime.reject_item(NodeId::string(2, missing.as_str()));
            items.push(subscriptions.create_monitored_item(&missing, noop).unwrap());
        }
        created.push(
            subscriptions
                .create_subscription(items, Duration::from_millis(100), false)
                .await
                .unwrap()
                .unwrap(),
        );
    }

    let report = subscriptions.cleanup_all_subscriptions().await.unwrap();
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.items_removed, 1 + 2 + 3 + 4);

    for subscription in &created {
        assert_eq!(subscription.item_count(), 2);
        assert!(subscription.items().iter().all(|item| item.is_created()));
        assert_eq!(runtime.subscription_items(subscription.server_id()).len(), 2);
    }
    assert_eq!(runtime.delete_items_calls.load(Ordering::SeqCst), 4);
    assert_eq!(subscriptions.subscription_count(), 4);
}

#[tokio::test]
async fn test_subscription_creation_failure() {
    let (runtime, controller, _) = connected().await;
    let subscriptions = controller.subscriptions();
    runtime.fail_create_subscription.store(true, Ordering::SeqCst);

    let item = subscriptions.create_monitored_item("Tank/Level", noop).unwrap();
    let err = subscriptions
        .create_subscription(vec![item], Duration::from_millis(100), false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OpcUaError::Subscription(SubscriptionError::CreationFailed { .. })
    ));
    assert!(err.is_retryable());
    assert_eq!(subscriptions.subscription_count(), 0);
    assert_eq!(subscriptions.stats().errors(), 1);
}

#[tokio::test]
async fn test_delete_all_isolates_failures() {
    let (runtime, controller, _) = connected().await;
    let subscriptions = controller.subscriptions();

    let mut created = Vec::new();
    for path in ["A", "B", "C"] {
        let item = subscriptions.create_monitored_item(path, noop).unwrap();
        created.push(
            subscriptions
                .create_subscription(vec![item], Duration::from_millis(100), false)
                .await
                .unwrap()
                .unwrap(),
        );
    }
    runtime.fail_subscription(created[1].server_id());

    let report = subscriptions.delete_all_subscriptions().await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 0);

    let remaining = subscriptions.subscriptions();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].server_id(), created[1].server_id());
    assert_eq!(runtime.delete_subscription_calls.load(Ordering::SeqCst), 3);
    assert_eq!(subscriptions.stats().deleted(), 2);
    assert_eq!(subscriptions.stats().errors(), 1);
}

#[tokio::test]
async fn test_delete_unregistered_subscription() {
    let (_runtime, controller, _) = connected().await;
    let subscriptions = controller.subscriptions();

    let item = subscriptions.create_monitored_item("A", noop).unwrap();
    let subscription = subscriptions
        .create_subscription(vec![item], Duration::from_millis(100), false)
        .await
        .unwrap()
        .unwrap();

    subscriptions.delete_subscription(&subscription).await.unwrap();
    let err = subscriptions
        .delete_subscription(&subscription)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpcUaError::Subscription(SubscriptionError::NotRegistered { .. })
    ));
}

// =============================================================================
// Queries and writes
// =============================================================================

#[tokio::test]
async fn test_browse_follows_continuation_points() {
    let (runtime, controller, _) = connected().await;
    let reference = |path: &str| {
        ReferenceDescription::new(NodeId::string(2, path), path, NodeClass::Variable)
    };
    runtime.set_browse_pages(vec![
        vec![reference("A"), reference("B")],
        vec![reference("C")],
        vec![reference("D")],
    ]);

    let references = controller.browse(&NodeId::OBJECTS_FOLDER).await.unwrap();
    let names: Vec<&str> = references
        .iter()
        .map(|r| r.display_name.text.as_str())
        .collect();
    assert_eq!(names, vec!["A", "B", "C", "D"]);
}

#[tokio::test]
async fn test_server_subscription_count() {
    let (runtime, controller, _) = connected().await;

    assert_eq!(controller.server_subscription_count().await.unwrap(), i32::MAX);

    runtime.set_value(
        NodeId::string(1, "ObjectStatistics_MonitoredItemData"),
        DataValue::new(Variant::Int32(42)),
    );
    assert_eq!(controller.server_subscription_count().await.unwrap(), 42);

    runtime.set_value(
        NodeId::string(1, "ObjectStatistics_MonitoredItemData"),
        DataValue::new(Variant::String("n/a".into())),
    );
    assert_eq!(controller.server_subscription_count().await.unwrap(), i32::MAX);
}

#[tokio::test]
async fn test_read_after_connection_closed() {
    let (runtime, controller, session) = connected().await;
    let node = NodeId::string(2, "Tank/Level");
    runtime.set_value(node.clone(), DataValue::new(Variant::Int32(7)));
    assert_eq!(controller.read_value(&node).await.unwrap().value, Variant::Int32(7));

    runtime.disconnect(session.id);

    let err = controller.read_value(&node).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Runtime(RuntimeError::ConnectionClosed)));
    assert!(err.is_retryable());
    assert_eq!(controller.server_subscription_count().await.unwrap(), i32::MAX);
}

#[tokio::test]
async fn test_is_byte_string() {
    let (runtime, controller, _) = connected().await;
    let variable = ReferenceDescription::new(NodeId::string(2, "Blob"), "Blob", NodeClass::Variable);

    runtime.set_browse_pages(vec![vec![ReferenceDescription::new(
        NodeId::string(2, "Blob/Size"),
        "Size",
        NodeClass::Variable,
    )]]);
    assert!(controller.is_byte_string(&variable).await.unwrap());

    assert!(!controller.is_byte_string(&variable).await.unwrap());

    let object = ReferenceDescription::new(NodeId::string(2, "Pump"), "Pump", NodeClass::Object);
    runtime.set_browse_pages(vec![vec![ReferenceDescription::new(
        NodeId::string(2, "Pump/Speed"),
        "Speed",
        NodeClass::Variable,
    )]]);
    assert!(!controller.is_byte_string(&object).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_pending_writes_are_flushed_in_one_batch() {
    let (runtime, controller, _) = connected().await;

    controller.enqueue_write(NodeId::string(2, "Valve/Open"), true).await;
    controller.enqueue_write(NodeId::string(2, "Valve/Setpoint"), 42.0f64).await;

    wait_until(|| !runtime.writes().is_empty()).await;
    let batches = runtime.writes();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert!(controller.write_queue().is_empty().await);
    assert_eq!(controller.write_queue().stats().written(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_batch_is_discarded() {
    let (runtime, controller, _) = connected().await;
    runtime.fail_writes.store(true, Ordering::SeqCst);

    controller.enqueue_write(NodeId::string(2, "Valve/Open"), true).await;
    wait_until(|| controller.write_queue().stats().batches() == 1).await;

    assert!(controller.write_queue().is_empty().await);
    assert!(runtime.writes().is_empty());
}

// =============================================================================
// Reconnect supervision
// =============================================================================

#[tokio::test]
async fn test_good_keep_alive_is_ignored() {
    let (runtime, controller, session) = connected().await;

    assert!(runtime.fire_keep_alive(session.id, StatusCode::GOOD));
    common::settle().await;

    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert_eq!(runtime.reconnect_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_keep_alive_failure_reconnects() {
    let (runtime, controller, session) = connected().await;
    let item = controller
        .subscriptions()
        .create_monitored_item("A", noop)
        .unwrap();
    controller
        .subscriptions()
        .create_subscription(vec![item], Duration::from_millis(100), false)
        .await
        .unwrap();
    runtime.script_reconnect(ReconnectScript::Succeed);

    runtime.fire_keep_alive(session.id, StatusCode::BAD_CONNECTION_CLOSED);
    wait_until(|| controller.stats().reconnections() == 1).await;

    let restored = controller.session().unwrap();
    assert_ne!(restored.id, session.id);
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert!(controller.active_reconnect().is_none());
    assert_eq!(controller.stats().keep_alive_failures(), 1);
    assert_eq!(controller.subscriptions().subscription_count(), 1);

    // Keep-alive is registered on the restored session.
    runtime.script_reconnect(ReconnectScript::Succeed);
    assert!(runtime.fire_keep_alive(restored.id, StatusCode::BAD_TIMEOUT));
    wait_until(|| controller.stats().reconnections() == 2).await;
}

#[tokio::test]
async fn test_repeated_keep_alive_failures_start_one_reconnect() {
    let (runtime, controller, session) = connected().await;

    for _ in 0..5 {
        runtime.fire_keep_alive(session.id, StatusCode::BAD_TIMEOUT);
    }
    wait_until(|| controller.reconnect_phase() == ReconnectPhase::Reconnecting).await;
    common::settle().await;

    assert_eq!(runtime.reconnect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.stats().keep_alive_failures(), 1);
    assert!(controller.active_reconnect().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_expiry_creates_new_session() {
    let (runtime, controller, session) = connected().await;
    let mut events = controller.subscribe_new_session();
    let item = controller
        .subscriptions()
        .create_monitored_item("A", noop)
        .unwrap();
    controller
        .subscriptions()
        .create_subscription(vec![item], Duration::from_millis(100), false)
        .await
        .unwrap();

    let started = Instant::now();
    runtime.fire_keep_alive(session.id, StatusCode::BAD_SERVER_HALTED);

    let event = tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .unwrap()
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(30));
    let current = controller.session().unwrap();
    assert_eq!(event.session_id, current.id);
    assert_ne!(current.id, session.id);
    assert!(Uuid::parse_str(&event.session_name).is_ok());
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert_eq!(controller.stats().expired_recoveries(), 1);
    assert!(runtime.closed().contains(&session.id));
    assert_eq!(controller.subscriptions().subscription_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_handler_give_up_recovers_immediately() {
    let (runtime, controller, session) = connected().await;
    runtime.script_reconnect(ReconnectScript::Fail);

    let started = Instant::now();
    runtime.fire_keep_alive(session.id, StatusCode::BAD_NOT_CONNECTED);
    wait_until(|| controller.stats().expired_recoveries() == 1).await;

    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert_ne!(controller.session().unwrap().id, session.id);
}

#[tokio::test(start_paused = true)]
async fn test_failed_recovery_is_retried() {
    let (runtime, controller, session) = connected().await;
    runtime.create_failures.store(1, Ordering::SeqCst);

    let started = Instant::now();
    runtime.fire_keep_alive(session.id, StatusCode::BAD_TIMEOUT);

    wait_until(|| controller.stats().expired_retries() == 1).await;
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::KeepAliveFailing);
    assert_eq!(controller.session().unwrap().id, session.id);

    wait_until(|| controller.stats().expired_recoveries() == 1).await;
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert_eq!(runtime.create_session_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stale_reconnect_completion_is_discarded() {
    let (runtime, controller, session) = connected().await;
    let (tx, rx) = oneshot::channel();
    runtime.script_reconnect(ReconnectScript::Wait(rx));

    runtime.fire_keep_alive(session.id, StatusCode::BAD_TIMEOUT);
    wait_until(|| controller.stats().expired_recoveries() == 1).await;
    let recovered = controller.session().unwrap();

    let orphan = SessionHandle::new("late", "opc.tcp://localhost:4840", Duration::from_secs(60));
    tx.send(Ok(orphan.clone())).unwrap();
    wait_until(|| controller.stats().stale_completions() == 1).await;
    common::settle().await;

    assert_eq!(controller.session().unwrap().id, recovered.id);
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert_eq!(controller.stats().reconnections(), 0);
    assert!(runtime.closed().contains(&orphan.id));
}

#[tokio::test(start_paused = true)]
async fn test_only_current_reconnect_completion_is_adopted() {
    let (runtime, controller, session) = connected().await;
    let (superseded_tx, superseded_rx) = oneshot::channel();
    let (current_tx, current_rx) = oneshot::channel();
    runtime.script_reconnect(ReconnectScript::Wait(superseded_rx));
    runtime.script_reconnect(ReconnectScript::Wait(current_rx));

    // The first attempt outlives its timer and is replaced by a new session.
    runtime.fire_keep_alive(session.id, StatusCode::BAD_TIMEOUT);
    wait_until(|| controller.stats().expired_recoveries() == 1).await;
    let recovered = controller.session().unwrap();

    runtime.fire_keep_alive(recovered.id, StatusCode::BAD_TIMEOUT);
    wait_until(|| controller.reconnect_phase() == ReconnectPhase::Reconnecting).await;
    assert!(controller.active_reconnect().is_some());
    assert_eq!(runtime.reconnect_calls.load(Ordering::SeqCst), 2);

    let stale = SessionHandle::new("stale", "opc.tcp://localhost:4840", Duration::from_secs(60));
    let current = SessionHandle::new("current", "opc.tcp://localhost:4840", Duration::from_secs(60));
    superseded_tx.send(Ok(stale.clone())).unwrap();
    current_tx.send(Ok(current.clone())).unwrap();

    wait_until(|| {
        controller.stats().reconnections() == 1 && controller.stats().stale_completions() == 1
    })
    .await;
    common::settle().await;

    assert_eq!(controller.session().unwrap().id, current.id);
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert!(controller.active_reconnect().is_none());
    assert_eq!(controller.stats().reconnections(), 1);
    assert_eq!(controller.stats().stale_completions(), 1);

    let closed = runtime.closed();
    assert!(closed.contains(&stale.id));
    assert!(closed.contains(&recovered.id));
    assert!(!closed.contains(&current.id));
}

#[tokio::test]
async fn test_adopted_session_uses_custom_keep_alive() {
    let (runtime, controller, first) = connected().await;
    let handler_calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let calls = Arc::clone(&handler_calls);

    controller
        .adopt_session(
            SessionHandle::new("adopted", "opc.tcp://localhost:4840", Duration::from_secs(60)),
            Some(Arc::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();

    assert!(!runtime.fire_keep_alive(first.id, StatusCode::BAD_TIMEOUT));
    let adopted = controller.session().unwrap();
    assert!(runtime.fire_keep_alive(adopted.id, StatusCode::BAD_TIMEOUT));
    common::settle().await;

    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert_eq!(runtime.reconnect_calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn test_close_session_abandons_reconnect() {
    let (runtime, controller, session) = connected().await;
    runtime.fire_keep_alive(session.id, StatusCode::BAD_TIMEOUT);
    wait_until(|| controller.reconnect_phase() == ReconnectPhase::Reconnecting).await;

    controller.close_session(true).await.unwrap();

    assert!(!controller.has_session());
    assert_eq!(controller.reconnect_phase(), ReconnectPhase::Connected);
    assert!(controller.active_reconnect().is_none());
    assert_eq!(runtime.closed(), vec![session.id]);
}

#[tokio::test]
async fn test_dispose_is_idempotent() {
    let (runtime, controller, session) = connected().await;

    controller.dispose().await;
    controller.dispose().await;

    assert!(controller.is_disposed());
    assert!(!controller.has_session());
    assert_eq!(runtime.closed(), vec![session.id]);

    let err = controller
        .initialize_connection(params(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, OpcUaError::Session(SessionError::Disposed)));
}

#[tokio::test]
async fn test_session_created_during_dispose_is_closed() {
    common::init_tracing();
    let runtime = MockClientRuntime::new();
    let controller = SessionController::new(Arc::clone(&runtime), config()).unwrap();
    let release = runtime.gate_create_session();

    let connecting = controller.initialize_connection(params(), None);
    let disposing = async {
        wait_until(|| runtime.create_session_calls.load(Ordering::SeqCst) == 1).await;
        controller.dispose().await;
        release.send(()).unwrap();
    };
    let (result, ()) = tokio::join!(connecting, disposing);

    let err = result.unwrap_err();
    assert!(matches!(err, OpcUaError::Session(SessionError::Disposed)));
    assert!(!controller.has_session());

    let created = runtime.sessions();
    assert_eq!(created.len(), 1);
    assert_eq!(runtime.closed(), vec![created[0].id]);
    assert!(!runtime.fire_keep_alive(created[0].id, StatusCode::BAD_TIMEOUT));
}

#[tokio::test]
async fn test_scoped_disposes_controller() {
    let runtime = MockClientRuntime::new();

    let session = SessionController::scoped(Arc::clone(&runtime), config(), |controller| async move {
        controller.initialize_connection(params(), None).await
    })
    .await
    .unwrap();

    assert_eq!(runtime.closed(), vec![session.id]);
}
