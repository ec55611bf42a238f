// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client-side boundary to the protocol runtime.
//!
//! [`ClientRuntime`] is the seam between the orchestration in this crate and
//! whichever stack actually speaks the wire protocol. Everything above it
//! (session supervision, subscriptions, write batching) is expressed against
//! this trait, which keeps the logic testable with an in-memory mock.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::subscription::NotificationHandler;
use crate::config::UserIdentity;
use crate::error::OpcUaResult;
use crate::types::{
    DataValue, NodeClass, NodeClassMask, NodeId, ReferenceDescription, StatusCode, WriteValue,
};

// =============================================================================
// Application and endpoint
// =============================================================================

/// Application instance configuration loaded by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name.
    pub application_name: String,
    /// Application URI.
    pub application_uri: String,
    /// Path the configuration was loaded from.
    pub config_path: String,
}

/// How the runtime treats server certificates it does not trust yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificatePolicy {
    /// Accept every certificate.
    AcceptAll,
    /// Reject certificates missing from the trust list.
    RejectUntrusted,
}

impl CertificatePolicy {
    /// Returns the policy for an auto-accept flag.
    pub fn from_auto_accept(auto_accept: bool) -> Self {
        if auto_accept {
            Self::AcceptAll
        } else {
            Self::RejectUntrusted
        }
    }
}

/// Endpoint selected during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    /// Endpoint URL.
    pub endpoint_url: String,
    /// Security policy URI.
    pub security_policy_uri: String,
    /// `true` if the endpoint signs or encrypts messages.
    pub secured: bool,
}

// =============================================================================
// Session
// =============================================================================

/// Handle to a live session owned by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Session identifier.
    pub id: Uuid,
    /// Session name.
    pub name: String,
    /// Endpoint URL the session is bound to.
    pub endpoint_url: String,
    /// Session timeout.
    pub timeout: Duration,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl SessionHandle {
    /// Creates a handle with a fresh identifier.
    pub fn new(name: impl Into<String>, endpoint_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            endpoint_url: endpoint_url.into(),
            timeout,
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Keep-alive result reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveEvent {
    /// Session the keep-alive belongs to.
    pub session_id: Uuid,
    /// Keep-alive status.
    pub status: StatusCode,
}

/// Callback invoked on every keep-alive.
pub type KeepAliveHandler = Arc<dyn Fn(KeepAliveEvent) + Send + Sync>;

// =============================================================================
// Browse
// =============================================================================

/// Browse direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowseDirection {
    /// Follow forward references.
    #[default]
    Forward,
    /// Follow inverse references.
    Inverse,
    /// Follow both.
    Both,
}

/// A browse request for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseDescription {
    /// Node to browse.
    pub node_id: NodeId,
    /// Direction.
    pub direction: BrowseDirection,
    /// Reference type to follow.
    pub reference_type: NodeId,
    /// Follow subtypes of `reference_type`.
    pub include_subtypes: bool,
    /// Node classes to return.
    pub node_class_mask: NodeClassMask,
}

impl BrowseDescription {
    /// Forward hierarchical browse of objects, variables and methods.
    pub fn hierarchical(node_id: NodeId) -> Self {
        Self {
            node_id,
            direction: BrowseDirection::Forward,
            reference_type: NodeId::HIERARCHICAL_REFERENCES,
            include_subtypes: true,
            node_class_mask: NodeClassMask::OBJECT_VARIABLE_METHOD,
        }
    }
}

/// Opaque continuation point returned by a partial browse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationPoint(pub Vec<u8>);

/// One page of browse results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowsePage {
    /// References on this page.
    pub references: Vec<ReferenceDescription>,
    /// Present when more results are available.
    pub continuation_point: Option<ContinuationPoint>,
}

// =============================================================================
// Subscription primitives
// =============================================================================

/// A monitored item to attach to a new subscription.
#[derive(Clone)]
pub struct MonitoredItemRequest {
    /// Client-assigned handle.
    pub client_handle: u32,
    /// Monitored node.
    pub node_id: NodeId,
    /// Node class filter.
    pub node_class: NodeClass,
    /// Sampling interval.
    pub sampling_interval: Duration,
    /// Receiver of data change notifications.
    pub handler: Arc<dyn NotificationHandler>,
}

impl fmt::Debug for MonitoredItemRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredItemRequest")
            .field("client_handle", &self.client_handle)
            .field("node_id", &self.node_id)
            .field("node_class", &self.node_class)
            .field("sampling_interval", &self.sampling_interval)
            .finish_non_exhaustive()
    }
}

/// A subscription to add to a session and create on the server.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    /// Display name.
    pub display_name: String,
    /// Publishing interval.
    pub publishing_interval: Duration,
    /// Lifetime count.
    pub lifetime_count: u32,
    /// Max keep-alive count.
    pub keepalive_count: u32,
    /// Maximum notifications per publish (0 = unlimited).
    pub max_notifications_per_publish: u32,
    /// Publishing enabled.
    pub publishing_enabled: bool,
    /// Priority.
    pub priority: u8,
    /// Items to attach.
    pub items: Vec<MonitoredItemRequest>,
}

/// Server acknowledgement of a single monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoredItemResult {
    /// Client handle of the item.
    pub client_handle: u32,
    /// Server-assigned item id.
    pub server_id: u32,
    /// Creation status.
    pub status: StatusCode,
}

/// Result of creating a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSubscription {
    /// Server-assigned subscription id.
    pub server_id: u32,
    /// Publishing interval granted by the server.
    pub revised_publishing_interval: Duration,
    /// Per-item results.
    pub item_results: Vec<MonitoredItemResult>,
}

// =============================================================================
// ClientRuntime
// =============================================================================

/// Protocol runtime operations consumed by the client helper.
///
/// Implementations wrap a concrete stack. All methods must be cancel-safe:
/// the controller may drop a pending future when it is disposed.
#[async_trait]
pub trait ClientRuntime: Send + Sync + 'static {
    // =========================================================================
    // Application
    // =========================================================================

    /// Loads the application configuration.
    async fn load_application_config(
        &self,
        client_name: &str,
        config_path: &str,
    ) -> OpcUaResult<ApplicationConfig>;

    /// Validates the application instance certificate.
    async fn check_application_certificate(&self, app: &ApplicationConfig) -> OpcUaResult<bool>;

    /// Installs the server certificate validation policy.
    fn install_certificate_policy(&self, app: &ApplicationConfig, policy: CertificatePolicy);

    /// Selects an endpoint of the server at `discovery_url`.
    ///
    /// The controller abandons the call with `RuntimeError::Timeout` once
    /// `timeout` has elapsed.
    async fn resolve_endpoint(
        &self,
        discovery_url: &str,
        use_security: bool,
        timeout: Duration,
    ) -> OpcUaResult<EndpointDescription>;

    // =========================================================================
    // Session
    // =========================================================================

    /// Creates and activates a session.
    async fn create_session(
        &self,
        app: &ApplicationConfig,
        endpoint: &EndpointDescription,
        session_name: &str,
        timeout: Duration,
        identity: &UserIdentity,
    ) -> OpcUaResult<SessionHandle>;

    /// Closes a session.
    async fn close_session(
        &self,
        session: &SessionHandle,
        delete_subscriptions: bool,
    ) -> OpcUaResult<()>;

    /// Returns `true` if the session's channel is connected.
    fn is_connected(&self, session: &SessionHandle) -> bool;

    /// Returns `true` if the session's keep-alive has stopped.
    fn keep_alive_stopped(&self, session: &SessionHandle) -> bool;

    /// Registers the keep-alive callback, replacing any previous one.
    fn register_keep_alive(&self, session: &SessionHandle, handler: KeepAliveHandler);

    /// Restores a session whose keep-alive failed.
    ///
    /// Retries every `period` until the session is restored or the runtime
    /// gives up.
    async fn reconnect(
        &self,
        session: &SessionHandle,
        period: Duration,
    ) -> OpcUaResult<SessionHandle>;

    // =========================================================================
    // Services
    // =========================================================================

    /// Browses the first page of references.
    async fn browse(
        &self,
        session: &SessionHandle,
        request: &BrowseDescription,
    ) -> OpcUaResult<BrowsePage>;

    /// Continues a browse.
    async fn browse_next(
        &self,
        session: &SessionHandle,
        continuation_point: &ContinuationPoint,
    ) -> OpcUaResult<BrowsePage>;

    /// Fetches every reference of a node.
    async fn fetch_references(
        &self,
        session: &SessionHandle,
        node_id: &NodeId,
    ) -> OpcUaResult<Vec<ReferenceDescription>>;

    /// Reads the Value attribute.
    async fn read_value(&self, session: &SessionHandle, node_id: &NodeId)
        -> OpcUaResult<DataValue>;

    /// Writes a batch of values.
    async fn write(
        &self,
        session: &SessionHandle,
        values: &[WriteValue],
    ) -> OpcUaResult<Vec<StatusCode>>;

    /// Returns the session's namespace table.
    async fn namespace_uris(&self, session: &SessionHandle) -> OpcUaResult<Vec<String>>;

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Adds a subscription to the session and creates it with its items.
    async fn create_subscription(
        &self,
        session: &SessionHandle,
        request: &SubscriptionRequest,
    ) -> OpcUaResult<CreatedSubscription>;

    /// Removes monitored items, identified by client handle, and applies
    /// the change.
    async fn delete_monitored_items(
        &self,
        session: &SessionHandle,
        subscription_id: u32,
        client_handles: &[u32],
    ) -> OpcUaResult<()>;

    /// Removes a subscription from the session.
    async fn delete_subscription(
        &self,
        session: &SessionHandle,
        subscription_id: u32,
    ) -> OpcUaResult<()>;
}
