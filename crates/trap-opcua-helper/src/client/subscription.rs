// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription and monitored item lifecycle.
//!
//! ```text
//! SubscriptionManager ──► session's active set
//!          │
//!          ├── Subscription "5c1e…" (priority 255)
//!          │      ├── MonitoredItem ns=2;s=Tank/Level    created
//!          │      └── MonitoredItem ns=2;s=Tank/Missing  orphaned
//!          └── Subscription "91ab…" (priority 0)
//!                 └── MonitoredItem ns=2;s=Pump/Speed    created
//! ```
//!
//! Items are built without a session and attached when a subscription is
//! created. Items the server did not acknowledge stay attached as orphans
//! until a cleanup removes them. Every operation except item construction
//! requires a live session.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::runtime::{
    ClientRuntime, MonitoredItemRequest, SessionHandle, SubscriptionRequest,
};
use crate::client::session::SessionSlot;
use crate::config::{ControllerConfig, SubscriptionDefaults};
use crate::error::{
    ensure_non_zero_duration, OpcUaError, OpcUaResult, SubscriptionError,
};
use crate::types::{DataValue, NodeClass, NodeId};

// =============================================================================
// Notifications
// =============================================================================

/// A data change delivered for one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemNotification {
    /// Client handle of the item.
    pub client_handle: u32,
    /// Monitored node.
    pub node_id: NodeId,
    /// New value.
    pub value: DataValue,
}

/// Receiver of monitored item notifications.
///
/// Called from the runtime's delivery context, so implementations should
/// return quickly.
pub trait NotificationHandler: Send + Sync {
    /// Handles one notification.
    fn on_notification(&self, notification: &MonitoredItemNotification);
}

impl<F> NotificationHandler for F
where
    F: Fn(&MonitoredItemNotification) + Send + Sync,
{
    fn on_notification(&self, notification: &MonitoredItemNotification) {
        self(notification)
    }
}

/// Forwards notifications into a bounded channel.
///
/// Notifications are dropped when the channel is full or closed.
pub struct ChannelHandler {
    sender: mpsc::Sender<MonitoredItemNotification>,
}

impl ChannelHandler {
    /// Creates a handler with a receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<MonitoredItemNotification>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl NotificationHandler for ChannelHandler {
    fn on_notification(&self, notification: &MonitoredItemNotification) {
        if self.sender.try_send(notification.clone()).is_err() {
            tracing::trace!(
                client_handle = notification.client_handle,
                "Notification dropped, channel full or closed"
            );
        }
    }
}

// =============================================================================
// MonitoredItem
// =============================================================================

/// A node watched for data changes.
#[derive(Clone)]
pub struct MonitoredItem {
    client_handle: u32,
    node_id: NodeId,
    node_class: NodeClass,
    sampling_interval: Duration,
    handler: Arc<dyn NotificationHandler>,
    created: bool,
    server_id: Option<u32>,
}

impl MonitoredItem {
    /// Returns the client handle.
    pub fn client_handle(&self) -> u32 {
        self.client_handle
    }

    /// Returns the monitored node.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns the node class filter.
    pub fn node_class(&self) -> NodeClass {
        self.node_class
    }

    /// Returns `true` once the server has acknowledged the item.
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Returns the server-assigned id of an acknowledged item.
    pub fn server_id(&self) -> Option<u32> {
        self.server_id
    }

    /// Delivers a notification to the item's handler.
    pub fn notify(&self, value: DataValue) {
        self.handler.on_notification(&MonitoredItemNotification {
            client_handle: self.client_handle,
            node_id: self.node_id.clone(),
            value,
        });
    }

    fn to_request(&self) -> MonitoredItemRequest {
        MonitoredItemRequest {
            client_handle: self.client_handle,
            node_id: self.node_id.clone(),
            node_class: self.node_class,
            sampling_interval: self.sampling_interval,
            handler: Arc::clone(&self.handler),
        }
    }
}

impl fmt::Debug for MonitoredItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredItem")
            .field("client_handle", &self.client_handle)
            .field("node_id", &self.node_id)
            .field("created", &self.created)
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A subscription registered with the current session.
pub struct Subscription {
    display_name: String,
    server_id: u32,
    session_id: Uuid,
    publishing_interval: Duration,
    priority: u8,
    created_at: DateTime<Utc>,
    items: RwLock<Vec<MonitoredItem>>,
}

impl Subscription {
    /// Returns the generated display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the server-assigned id.
    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    /// Returns the session the subscription was created on.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns the publishing interval granted by the server.
    pub fn publishing_interval(&self) -> Duration {
        self.publishing_interval
    }

    /// Returns the priority.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Returns the creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns a snapshot of the attached items.
    pub fn items(&self) -> Vec<MonitoredItem> {
        self.items.read().clone()
    }

    /// Returns the number of attached items.
    pub fn item_count(&self) -> usize {
        self.items.read().len()
    }

    /// Returns the items the server never acknowledged.
    pub fn orphaned_items(&self) -> Vec<MonitoredItem> {
        self.items
            .read()
            .iter()
            .filter(|item| !item.created)
            .cloned()
            .collect()
    }

    /// Delivers a notification to the item with `client_handle`.
    ///
    /// Returns `false` if no such item is attached.
    pub fn dispatch(&self, client_handle: u32, value: DataValue) -> bool {
        let item = self
            .items
            .read()
            .iter()
            .find(|item| item.client_handle == client_handle)
            .cloned();
        match item {
            Some(item) => {
                item.notify(value);
                true
            }
            None => false,
        }
    }

    fn detach(&self, client_handles: &[u32]) -> usize {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|item| !client_handles.contains(&item.client_handle));
        before - items.len()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("display_name", &self.display_name)
            .field("server_id", &self.server_id)
            .field("priority", &self.priority)
            .field("items", &self.item_count())
            .finish()
    }
}

// =============================================================================
// FanOutReport
// =============================================================================

/// Summary of a cleanup or delete fanned out over every subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Subscriptions processed successfully.
    pub succeeded: usize,
    /// Subscriptions whose operation failed.
    pub failed: usize,
    /// Subscriptions not scheduled because of cancellation.
    pub skipped: usize,
    /// Monitored items removed (cleanup only).
    pub items_removed: usize,
}

// =============================================================================
// SubscriptionManager
// =============================================================================

/// Owns the subscriptions of the controller's session.
pub struct SubscriptionManager<R: ClientRuntime> {
    runtime: Arc<R>,
    session: Arc<SessionSlot>,
    defaults: SubscriptionDefaults,
    default_namespace_index: u16,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    next_client_handle: AtomicU32,
    cancel: CancellationToken,
    stats: SubscriptionManagerStats,
}

impl<R: ClientRuntime> SubscriptionManager<R> {
    /// Creates a manager bound to `session`.
    ///
    /// `cancel` stops fan-out scheduling.
    pub fn new(
        runtime: Arc<R>,
        session: Arc<SessionSlot>,
        config: &ControllerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            session,
            defaults: config.subscription.clone(),
            default_namespace_index: config.default_namespace_index,
            subscriptions: RwLock::new(Vec::new()),
            next_client_handle: AtomicU32::new(1),
            cancel,
            stats: SubscriptionManagerStats::default(),
        }
    }

    /// Returns the manager statistics.
    pub fn stats(&self) -> &SubscriptionManagerStats {
        &self.stats
    }

    /// Returns a snapshot of the registered subscriptions.
    pub fn subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.subscriptions.read().clone()
    }

    /// Returns the number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Finds a registered subscription by display name.
    pub fn find(&self, display_name: &str) -> Option<Arc<Subscription>> {
        self.subscriptions
            .read()
            .iter()
            .find(|s| s.display_name == display_name)
            .cloned()
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Builds a variable-class item in the default namespace.
    pub fn create_monitored_item<H>(
        &self,
        node_identifier: &str,
        handler: H,
    ) -> OpcUaResult<MonitoredItem>
    where
        H: NotificationHandler + 'static,
    {
        self.create_monitored_item_in(node_identifier, handler, self.default_namespace_index)
    }

    /// Builds a variable-class item for `ns=<namespace_index>;s=<node_identifier>`.
    ///
    /// No session is required; the item is attached by
    /// [`create_subscription`](Self::create_subscription).
    pub fn create_monitored_item_in<H>(
        &self,
        node_identifier: &str,
        handler: H,
        namespace_index: u16,
    ) -> OpcUaResult<MonitoredItem>
    where
        H: NotificationHandler + 'static,
    {
        crate::error::ensure_not_blank("node_identifier", node_identifier)?;

        Ok(MonitoredItem {
            client_handle: self.next_client_handle.fetch_add(1, Ordering::Relaxed),
            node_id: NodeId::string(namespace_index, node_identifier),
            node_class: NodeClass::Variable,
            sampling_interval: self.defaults.sampling_interval,
            handler: Arc::new(handler),
            created: false,
            server_id: None,
        })
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Creates a subscription holding `items`.
    ///
    /// Returns `Ok(None)` and registers nothing when `items` is empty.
    pub async fn create_subscription(
        &self,
        items: Vec<MonitoredItem>,
        publishing_interval: Duration,
        prioritize: bool,
    ) -> OpcUaResult<Option<Arc<Subscription>>> {
        ensure_non_zero_duration("publishing_interval", publishing_interval)?;
        let session = self.session.require()?;

        if items.is_empty() {
            return Ok(None);
        }

        let request = SubscriptionRequest {
            display_name: Uuid::new_v4().to_string(),
            publishing_interval,
            lifetime_count: self.defaults.lifetime_count,
            keepalive_count: self.defaults.keepalive_count,
            max_notifications_per_publish: self.defaults.max_notifications_per_publish,
            publishing_enabled: self.defaults.publishing_enabled,
            priority: if prioritize { u8::MAX } else { u8::MIN },
            items: items.iter().map(MonitoredItem::to_request).collect(),
        };

        let created = match self.runtime.create_subscription(&session, &request).await {
            Ok(created) => created,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                e.log("create_subscription");
                return Err(OpcUaError::subscription(SubscriptionError::creation_failed(
                    e.to_string(),
                )));
            }
        };

        let mut items = items;
        for item in &mut items {
            let result = created
                .item_results
                .iter()
                .find(|r| r.client_handle == item.client_handle);
            match result {
                Some(r) if r.status.is_good() => {
                    item.created = true;
                    item.server_id = Some(r.server_id);
                }
                Some(r) => tracing::warn!(
                    node_id = %item.node_id,
                    status = %r.status,
                    "Monitored item rejected by server"
                ),
                None => tracing::warn!(
                    node_id = %item.node_id,
                    "Monitored item missing from create response"
                ),
            }
        }

        let subscription = Arc::new(Subscription {
            display_name: request.display_name,
            server_id: created.server_id,
            session_id: session.id,
            publishing_interval: created.revised_publishing_interval,
            priority: request.priority,
            created_at: Utc::now(),
            items: RwLock::new(items),
        });

        self.subscriptions.write().push(Arc::clone(&subscription));
        self.stats.created.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            subscription = %subscription.display_name,
            server_id = subscription.server_id,
            monitored_items = subscription.item_count(),
            publishing_interval_ms = subscription.publishing_interval.as_millis() as u64,
            priority = subscription.priority,
            "Subscription created"
        );

        Ok(Some(subscription))
    }

    /// Removes `items` from `subscription` and applies the change.
    pub async fn remove_items(
        &self,
        subscription: &Subscription,
        items: &[MonitoredItem],
    ) -> OpcUaResult<usize> {
        let session = self.session.require()?;
        self.ensure_registered(subscription)?;

        let removed = remove_items(self.runtime.as_ref(), &session, subscription, items).await?;
        self.stats
            .items_removed
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    /// Removes the orphaned items of one subscription.
    ///
    /// Returns the number of items removed.
    pub async fn cleanup_subscription(&self, subscription: &Subscription) -> OpcUaResult<usize> {
        let orphaned = subscription.orphaned_items();
        self.remove_items(subscription, &orphaned).await
    }

    /// Removes orphaned items from every subscription concurrently.
    pub async fn cleanup_all_subscriptions(&self) -> OpcUaResult<FanOutReport> {
        let session = self.session.require()?;
        let report = self
            .fan_out(session, false, |runtime, session, subscription| async move {
                let orphaned = subscription.orphaned_items();
                remove_items(runtime.as_ref(), &session, &subscription, &orphaned).await
            })
            .await;

        self.stats
            .items_removed
            .fetch_add(report.items_removed as u64, Ordering::Relaxed);
        tracing::debug!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            items_removed = report.items_removed,
            "Subscription cleanup finished"
        );
        Ok(report)
    }

    /// Deletes one subscription from the session.
    pub async fn delete_subscription(&self, subscription: &Subscription) -> OpcUaResult<()> {
        let session = self.session.require()?;
        self.ensure_registered(subscription)?;

        self.runtime
            .delete_subscription(&session, subscription.server_id)
            .await?;
        self.unregister(subscription);
        Ok(())
    }

    /// Deletes every subscription concurrently.
    pub async fn delete_all_subscriptions(&self) -> OpcUaResult<FanOutReport> {
        let session = self.session.require()?;
        let report = self
            .fan_out(session, true, |runtime, session, subscription| async move {
                runtime
                    .delete_subscription(&session, subscription.server_id)
                    .await
                    .map(|()| 0)
            })
            .await;

        tracing::debug!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "Subscription delete finished"
        );
        Ok(report)
    }

    /// Forgets every subscription without contacting the server.
    ///
    /// Used when the session they belonged to is gone.
    pub fn detach_all(&self) -> Vec<Arc<Subscription>> {
        let detached = std::mem::take(&mut *self.subscriptions.write());
        if !detached.is_empty() {
            tracing::debug!(count = detached.len(), "Subscriptions detached from session");
        }
        detached
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Runs `op` for a snapshot of the subscriptions, one task each.
    ///
    /// With `unregister` set, subscriptions are dropped from the registry
    /// once their operation succeeds.
    async fn fan_out<F, Fut>(&self, session: SessionHandle, unregister: bool, op: F) -> FanOutReport
    where
        F: Fn(Arc<R>, SessionHandle, Arc<Subscription>) -> Fut,
        Fut: std::future::Future<Output = OpcUaResult<usize>> + Send + 'static,
    {
        let snapshot = self.subscriptions();
        let mut report = FanOutReport::default();
        let mut tasks = JoinSet::new();

        for (index, subscription) in snapshot.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.skipped = snapshot.len() - index;
                break;
            }
            let subscription = Arc::clone(subscription);
            let fut = op(Arc::clone(&self.runtime), session.clone(), Arc::clone(&subscription));
            tasks.spawn(async move { (subscription, fut.await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((subscription, Ok(removed))) => {
                    report.succeeded += 1;
                    report.items_removed += removed;
                    if unregister {
                        self.unregister(&subscription);
                    }
                }
                Ok((subscription, Err(e))) => {
                    report.failed += 1;
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        subscription = %subscription.display_name,
                        error_code = %e.error_code(),
                        "Subscription operation failed: {e}"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "Subscription task aborted");
                }
            }
        }

        report
    }

    fn ensure_registered(&self, subscription: &Subscription) -> OpcUaResult<()> {
        let registered = self
            .subscriptions
            .read()
            .iter()
            .any(|s| std::ptr::eq(Arc::as_ptr(s), subscription));
        if registered {
            Ok(())
        } else {
            Err(OpcUaError::subscription(SubscriptionError::not_registered(
                &subscription.display_name,
            )))
        }
    }

    fn unregister(&self, subscription: &Subscription) {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| !std::ptr::eq(Arc::as_ptr(s), subscription));
        if subscriptions.len() < before {
            self.stats.deleted.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                subscription = %subscription.display_name,
                server_id = subscription.server_id,
                "Subscription deleted"
            );
        }
    }
}

impl<R: ClientRuntime> fmt::Debug for SubscriptionManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

async fn remove_items<R>(
    runtime: &R,
    session: &SessionHandle,
    subscription: &Subscription,
    items: &[MonitoredItem],
) -> OpcUaResult<usize>
where
    R: ClientRuntime + ?Sized,
{
    if items.is_empty() {
        return Ok(0);
    }

    let handles: Vec<u32> = items.iter().map(|item| item.client_handle).collect();
    runtime
        .delete_monitored_items(session, subscription.server_id, &handles)
        .await?;
    let removed = subscription.detach(&handles);

    tracing::debug!(
        subscription = %subscription.display_name,
        removed,
        "Monitored items removed"
    );
    Ok(removed)
}

// =============================================================================
// SubscriptionManagerStats
// =============================================================================

/// Statistics for the subscription manager.
#[derive(Debug, Default)]
pub struct SubscriptionManagerStats {
    created: AtomicU64,
    deleted: AtomicU64,
    items_removed: AtomicU64,
    errors: AtomicU64,
}

impl SubscriptionManagerStats {
    /// Returns the number of subscriptions created.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Returns the number of subscriptions deleted.
    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    /// Returns the number of monitored items removed.
    pub fn items_removed(&self) -> u64 {
        self.items_removed.load(Ordering::Relaxed)
    }

    /// Returns the number of failed operations.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.created.store(0, Ordering::Relaxed);
        self.deleted.store(0, Ordering::Relaxed);
        self.items_removed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
