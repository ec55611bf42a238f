// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Runtimes
//!
//! In-memory client and server runtimes for exercising the helper without
//! a protocol stack.
//!
//! - Recording of interactions for verification
//! - Scripted reconnect outcomes
//! - Error injection per operation

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use trap_opcua_helper::client::{
    ApplicationConfig, BrowseDescription, BrowsePage, CertificatePolicy, ClientRuntime,
    ContinuationPoint, CreatedSubscription, EndpointDescription, KeepAliveEvent,
    KeepAliveHandler, MonitoredItemResult, SessionHandle, SubscriptionRequest,
};
use trap_opcua_helper::server::{AddressSpaceNode, NodeReference, ServerRuntime};
use trap_opcua_helper::{
    ConnectionParams, ControllerConfig, DataValue, NodeId, OpcUaError, OpcUaResult,
    ReferenceDescription, RuntimeError, StatusCode, UserIdentity, WriteValue,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Connection parameters pointing at the mock server.
pub fn params() -> ConnectionParams {
    ConnectionParams::new(
        "test-client",
        "client.config.xml",
        "opc.tcp://localhost:4840",
        "test-session",
        Duration::from_secs(60),
    )
}

/// Controller configuration with the default timings.
pub fn config() -> ControllerConfig {
    ControllerConfig::default()
}

/// Installs a test subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("trap_opcua_helper=debug")
        .with_test_writer()
        .try_init();
}

/// Yields until spawned tasks have drained their queues.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Polls `condition` every 10ms until it holds.
///
/// Under paused time each poll auto-advances the clock.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn app(name: &str, config_path: &str) -> ApplicationConfig {
    ApplicationConfig {
        application_name: name.to_string(),
        application_uri: format!("urn:localhost:{name}"),
        config_path: config_path.to_string(),
    }
}

// =============================================================================
// MockClientRuntime
// =============================================================================

/// Outcome of one `reconnect` call.
pub enum ReconnectScript {
    /// Restore a session with a new identifier.
    Succeed,
    /// Give up with an error.
    Fail,
    /// Wait for the test to deliver the outcome.
    Wait(oneshot::Receiver<OpcUaResult<SessionHandle>>),
}

/// A configurable client runtime that records every call.
#[derive(Default)]
pub struct MockClientRuntime {
    /// Reject the application certificate.
    pub reject_certificate: AtomicBool,
    /// Number of upcoming `create_session` calls that fail.
    pub create_failures: AtomicU32,
    /// Fail every `create_subscription`.
    pub fail_create_subscription: AtomicBool,
    /// Fail every `write`.
    pub fail_writes: AtomicBool,
    /// Fail `load_application_config` as if the file were missing.
    pub fail_config_load: AtomicBool,
    /// Never answer `resolve_endpoint`.
    pub hang_discovery: AtomicBool,

    pub create_session_calls: AtomicU64,
    pub close_session_calls: AtomicU64,
    pub reconnect_calls: AtomicU64,
    pub delete_items_calls: AtomicU64,
    pub delete_subscription_calls: AtomicU64,

    next_subscription_id: AtomicU32,
    next_item_id: AtomicU32,

    sessions: Mutex<Vec<SessionHandle>>,
    closed: Mutex<Vec<Uuid>>,
    disconnected: Mutex<HashSet<Uuid>>,
    keep_alive: Mutex<HashMap<Uuid, KeepAliveHandler>>,
    policies: Mutex<Vec<CertificatePolicy>>,
    reconnects: Mutex<VecDeque<ReconnectScript>>,
    create_gate: Mutex<Option<oneshot::Receiver<()>>>,
    rejected_nodes: Mutex<HashSet<NodeId>>,
    failing_subscriptions: Mutex<HashSet<u32>>,
    subscriptions: Mutex<HashMap<u32, Vec<u32>>>,
    deleted_subscriptions: Mutex<Vec<u32>>,
    browse_pages: Mutex<VecDeque<BrowsePage>>,
    values: Mutex<HashMap<NodeId, DataValue>>,
    writes: Mutex<Vec<Vec<WriteValue>>>,
    namespaces: Mutex<Vec<String>>,
}

impl MockClientRuntime {
    /// Creates a mock runtime.
    pub fn new() -> Arc<Self> {
        let runtime = Self::default();
        runtime.next_subscription_id.store(1, Ordering::SeqCst);
        runtime.next_item_id.store(1000, Ordering::SeqCst);
        *runtime.namespaces.lock() = vec![
            "http://opcfoundation.org/UA/".to_string(),
            "urn:localhost:server".to_string(),
        ];
        Arc::new(runtime)
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    /// Queues the outcome of the next `reconnect` call.
    ///
    /// With nothing queued, `reconnect` never completes.
    pub fn script_reconnect(&self, script: ReconnectScript) {
        self.reconnects.lock().push_back(script);
    }

    /// Holds the next `create_session` call until the returned sender fires.
    pub fn gate_create_session(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.create_gate.lock() = Some(rx);
        tx
    }

    /// Makes the server reject monitored items on `node_id`.
    pub fn reject_item(&self, node_id: NodeId) {
        self.rejected_nodes.lock().insert(node_id);
    }

    /// Makes operations on subscription `server_id` fail.
    pub fn fail_subscription(&self, server_id: u32) {
        self.failing_subscriptions.lock().insert(server_id);
    }

    /// Queues browse pages; every page but the last carries a continuation
    /// point.
    pub fn set_browse_pages(&self, pages: Vec<Vec<ReferenceDescription>>) {
        let count = pages.len();
        let mut queue = self.browse_pages.lock();
        queue.clear();
        for (index, references) in pages.into_iter().enumerate() {
            let continuation_point =
                (index + 1 < count).then(|| ContinuationPoint(vec![index as u8 + 1]));
            queue.push_back(BrowsePage {
                references,
                continuation_point,
            });
        }
    }

    /// Sets the value returned by reads of `node_id`.
    pub fn set_value(&self, node_id: NodeId, value: DataValue) {
        self.values.lock().insert(node_id, value);
    }

    /// Marks a session's channel as disconnected.
    pub fn disconnect(&self, session_id: Uuid) {
        self.disconnected.lock().insert(session_id);
    }

    /// Delivers a keep-alive to the handler registered for `session_id`.
    ///
    /// Returns `false` if no handler is registered.
    pub fn fire_keep_alive(&self, session_id: Uuid, status: StatusCode) -> bool {
        let handler = self.keep_alive.lock().get(&session_id).cloned();
        match handler {
            Some(handler) => {
                handler(KeepAliveEvent { session_id, status });
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Returns every session created or restored, oldest first.
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions.lock().clone()
    }

    /// Returns the ids of closed sessions.
    pub fn closed(&self) -> Vec<Uuid> {
        self.closed.lock().clone()
    }

    /// Returns the write batches received.
    pub fn writes(&self) -> Vec<Vec<WriteValue>> {
        self.writes.lock().clone()
    }

    /// Returns the server ids of deleted subscriptions.
    pub fn deleted_subscriptions(&self) -> Vec<u32> {
        self.deleted_subscriptions.lock().clone()
    }

    /// Returns the client handles still attached to subscription `server_id`.
    pub fn subscription_items(&self, server_id: u32) -> Vec<u32> {
        self.subscriptions
            .lock()
            .get(&server_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the certificate policies installed.
    pub fn policies(&self) -> Vec<CertificatePolicy> {
        self.policies.lock().clone()
    }

    fn check_connected(&self, session: &SessionHandle) -> OpcUaResult<()> {
        if self.disconnected.lock().contains(&session.id) {
            Err(OpcUaError::runtime(RuntimeError::ConnectionClosed))
        } else {
            Ok(())
        }
    }

    fn check_subscription(&self, server_id: u32) -> OpcUaResult<()> {
        if self.failing_subscriptions.lock().contains(&server_id) {
            Err(OpcUaError::service_fault("DeleteSubscriptions", 0x8028_0000))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClientRuntime for MockClientRuntime {
    async fn load_application_config(
        &self,
        client_name: &str,
        config_path: &str,
    ) -> OpcUaResult<ApplicationConfig> {
        if self.fail_config_load.load(Ordering::SeqCst) {
            return Err(OpcUaError::runtime(RuntimeError::configuration_load(
                config_path,
                "file not found",
            )));
        }
        Ok(app(client_name, config_path))
    }

    async fn check_application_certificate(&self, _app: &ApplicationConfig) -> OpcUaResult<bool> {
        Ok(!self.reject_certificate.load(Ordering::SeqCst))
    }

    fn install_certificate_policy(&self, _app: &ApplicationConfig, policy: CertificatePolicy) {
        self.policies.lock().push(policy);
    }

    async fn resolve_endpoint(
        &self,
        discovery_url: &str,
        use_security: bool,
        _timeout: Duration,
    ) -> OpcUaResult<EndpointDescription> {
        if self.hang_discovery.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(EndpointDescription {
            endpoint_url: discovery_url.to_string(),
            security_policy_uri: if use_security {
                "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256".to_string()
            } else {
                "http://opcfoundation.org/UA/SecurityPolicy#None".to_string()
            },
            secured: use_security,
        })
    }

    async fn create_session(
        &self,
        _app: &ApplicationConfig,
        endpoint: &EndpointDescription,
        session_name: &str,
        timeout: Duration,
        _identity: &UserIdentity,
    ) -> OpcUaResult<SessionHandle> {
        self.create_session_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.create_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let fail = self
            .create_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(OpcUaError::endpoint_unreachable(
                &endpoint.endpoint_url,
                "connection refused",
            ));
        }

        let handle = SessionHandle::new(session_name, &endpoint.endpoint_url, timeout);
        self.sessions.lock().push(handle.clone());
        Ok(handle)
    }

    async fn close_session(
        &self,
        session: &SessionHandle,
        _delete_subscriptions: bool,
    ) -> OpcUaResult<()> {
        self.close_session_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.lock().push(session.id);
        self.disconnected.lock().insert(session.id);
        self.keep_alive.lock().remove(&session.id);
        Ok(())
    }

    fn is_connected(&self, session: &SessionHandle) -> bool {
        !self.disconnected.lock().contains(&session.id)
    }

    fn keep_alive_stopped(&self, session: &SessionHandle) -> bool {
        self.disconnected.lock().contains(&session.id)
    }

    fn register_keep_alive(&self, session: &SessionHandle, handler: KeepAliveHandler) {
        self.keep_alive.lock().insert(session.id, handler);
    }

    async fn reconnect(
        &self,
        session: &SessionHandle,
        _period: Duration,
    ) -> OpcUaResult<SessionHandle> {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);

        let script = self.reconnects.lock().pop_front();
        let result = match script {
            Some(ReconnectScript::Succeed) => Ok(SessionHandle::new(
                &session.name,
                &session.endpoint_url,
                session.timeout,
            )),
            Some(ReconnectScript::Fail) => Err(OpcUaError::endpoint_unreachable(
                &session.endpoint_url,
                "reconnect abandoned",
            )),
            Some(ReconnectScript::Wait(rx)) => match rx.await {
                Ok(result) => result,
                Err(_) => std::future::pending::<OpcUaResult<SessionHandle>>().await,
            },
            None => std::future::pending::<OpcUaResult<SessionHandle>>().await,
        };

        if let Ok(handle) = &result {
            self.sessions.lock().push(handle.clone());
        }
        result
    }

    async fn browse(
        &self,
        _session: &SessionHandle,
        _request: &BrowseDescription,
    ) -> OpcUaResult<BrowsePage> {
        Ok(self.browse_pages.lock().pop_front().unwrap_or_default())
    }

    async fn browse_next(
        &self,
        _session: &SessionHandle,
        _continuation_point: &ContinuationPoint,
    ) -> OpcUaResult<BrowsePage> {
        Ok(self.browse_pages.lock().pop_front().unwrap_or_default())
    }

    async fn fetch_references(
        &self,
        _session: &SessionHandle,
        _node_id: &NodeId,
    ) -> OpcUaResult<Vec<ReferenceDescription>> {
        let pages = std::mem::take(&mut *self.browse_pages.lock());
        Ok(pages.into_iter().flat_map(|page| page.references).collect())
    }

    async fn read_value(&self, session: &SessionHandle, node_id: &NodeId) -> OpcUaResult<DataValue> {
        self.check_connected(session)?;
        self.values
            .lock()
            .get(node_id)
            .cloned()
            .ok_or_else(|| OpcUaError::service_fault("Read", StatusCode::BAD_NODE_ID_UNKNOWN.0))
    }

    async fn write(
        &self,
        session: &SessionHandle,
        values: &[WriteValue],
    ) -> OpcUaResult<Vec<StatusCode>> {
        self.check_connected(session)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OpcUaError::service_fault("Write", StatusCode::BAD_TIMEOUT.0));
        }
        self.writes.lock().push(values.to_vec());
        Ok(vec![StatusCode::GOOD; values.len()])
    }

    async fn namespace_uris(&self, _session: &SessionHandle) -> OpcUaResult<Vec<String>> {
        Ok(self.namespaces.lock().clone())
    }

    async fn create_subscription(
        &self,
        _session: &SessionHandle,
        request: &SubscriptionRequest,
    ) -> OpcUaResult<CreatedSubscription> {
        if self.fail_create_subscription.load(Ordering::SeqCst) {
            return Err(OpcUaError::service_fault(
                "CreateSubscription",
                StatusCode::BAD_TIMEOUT.0,
            ));
        }

        let server_id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        let rejected = self.rejected_nodes.lock().clone();
        let item_results: Vec<MonitoredItemResult> = request
            .items
            .iter()
            .map(|item| MonitoredItemResult {
                client_handle: item.client_handle,
                server_id: self.next_item_id.fetch_add(1, Ordering::SeqCst),
                status: if rejected.contains(&item.node_id) {
                    StatusCode::BAD_NODE_ID_UNKNOWN
                } else {
                    StatusCode::GOOD
                },
            })
            .collect();

        self.subscriptions.lock().insert(
            server_id,
            request.items.iter().map(|item| item.client_handle).collect(),
        );

        Ok(CreatedSubscription {
            server_id,
            revised_publishing_interval: request.publishing_interval,
            item_results,
        })
    }

    async fn delete_monitored_items(
        &self,
        _session: &SessionHandle,
        subscription_id: u32,
        client_handles: &[u32],
    ) -> OpcUaResult<()> {
        self.delete_items_calls.fetch_add(1, Ordering::SeqCst);
        self.check_subscription(subscription_id)?;

        if let Some(items) = self.subscriptions.lock().get_mut(&subscription_id) {
            items.retain(|handle| !client_handles.contains(handle));
        }
        Ok(())
    }

    async fn delete_subscription(
        &self,
        _session: &SessionHandle,
        subscription_id: u32,
    ) -> OpcUaResult<()> {
        self.delete_subscription_calls.fetch_add(1, Ordering::SeqCst);
        self.check_subscription(subscription_id)?;

        self.subscriptions.lock().remove(&subscription_id);
        self.deleted_subscriptions.lock().push(subscription_id);
        Ok(())
    }
}

// =============================================================================
// MockServerRuntime
// =============================================================================

/// A server runtime backed by an in-memory node store.
#[derive(Default)]
pub struct MockServerRuntime {
    /// Reject the application certificate.
    pub reject_certificate: AtomicBool,
    /// Namespace index assigned on start.
    pub namespace_index: AtomicU32,

    pub start_calls: AtomicU64,
    pub stop_calls: AtomicU64,

    running: AtomicBool,
    nodes: Mutex<HashMap<NodeId, AddressSpaceNode>>,
    predefined_batches: Mutex<Vec<Vec<NodeId>>>,
    notifiers: Mutex<Vec<NodeId>>,
    external_references: Mutex<Vec<(NodeId, NodeReference)>>,
}

impl MockServerRuntime {
    /// Creates a mock server assigning namespace 2.
    pub fn new() -> Arc<Self> {
        let runtime = Self::default();
        runtime.namespace_index.store(2, Ordering::SeqCst);
        Arc::new(runtime)
    }

    /// Publishes a node as if another node manager owned it.
    pub fn insert_foreign(&self, node: AddressSpaceNode) {
        self.nodes.lock().insert(node.node_id.clone(), node);
    }

    /// Returns `true` while the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns `true` if `node_id` is published.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.lock().contains_key(node_id)
    }

    /// Returns a published node.
    pub fn node(&self, node_id: &NodeId) -> Option<AddressSpaceNode> {
        self.nodes.lock().get(node_id).cloned()
    }

    /// Returns the node ids of every `add_predefined_nodes` call.
    pub fn predefined_batches(&self) -> Vec<Vec<NodeId>> {
        self.predefined_batches.lock().clone()
    }

    /// Returns the registered root notifiers.
    pub fn notifiers(&self) -> Vec<NodeId> {
        self.notifiers.lock().clone()
    }

    /// Returns the external references added.
    pub fn external_references(&self) -> Vec<(NodeId, NodeReference)> {
        self.external_references.lock().clone()
    }
}

#[async_trait]
impl ServerRuntime for MockServerRuntime {
    async fn load_application_config(&self, config_path: &str) -> OpcUaResult<ApplicationConfig> {
        Ok(app("test-server", config_path))
    }

    async fn check_application_certificate(&self, _app: &ApplicationConfig) -> OpcUaResult<bool> {
        Ok(!self.reject_certificate.load(Ordering::SeqCst))
    }

    async fn start(&self, _app: &ApplicationConfig, _port: u16) -> OpcUaResult<u16> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(self.namespace_index.load(Ordering::SeqCst) as u16)
    }

    async fn stop(&self) -> OpcUaResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn add_predefined_nodes(&self, nodes: Vec<AddressSpaceNode>) -> OpcUaResult<()> {
        self.predefined_batches
            .lock()
            .push(nodes.iter().map(|n| n.node_id.clone()).collect());

        let mut store = self.nodes.lock();
        for node in nodes {
            store.insert(node.node_id.clone(), node);
        }
        Ok(())
    }

    async fn find_node(&self, node_id: &NodeId) -> OpcUaResult<Option<AddressSpaceNode>> {
        Ok(self.node(node_id))
    }

    async fn delete_node(&self, node_id: &NodeId) -> OpcUaResult<bool> {
        let mut store = self.nodes.lock();
        if store.remove(node_id).is_none() {
            return Ok(false);
        }

        let mut pending = vec![node_id.clone()];
        while let Some(parent) = pending.pop() {
            let children: Vec<NodeId> = store
                .values()
                .filter(|n| n.parent.as_ref() == Some(&parent))
                .map(|n| n.node_id.clone())
                .collect();
            for child in children {
                store.remove(&child);
                pending.push(child);
            }
        }
        Ok(true)
    }

    async fn add_root_notifier(&self, node_id: &NodeId) -> OpcUaResult<()> {
        self.notifiers.lock().push(node_id.clone());
        Ok(())
    }

    async fn add_external_reference(
        &self,
        source: &NodeId,
        reference: NodeReference,
    ) -> OpcUaResult<()> {
        self.external_references
            .lock()
            .push((source.clone(), reference));
        Ok(())
    }
}
