// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session-scoped reads, browses and queued writes.

use crate::client::runtime::{BrowseDescription, BrowsePage, ClientRuntime};
use crate::client::session::SessionController;
use crate::error::OpcUaResult;
use crate::types::{DataValue, NodeClass, NodeId, ReferenceDescription, Variant, WriteValue};

/// Server statistics variable holding the monitored item count.
const MONITORED_ITEM_COUNT_NODE: &str = "ObjectStatistics_MonitoredItemData";

impl<R: ClientRuntime> SessionController<R> {
    /// Browses the hierarchical children of `node_id`, following
    /// continuation points until every page has been read.
    pub async fn browse(&self, node_id: &NodeId) -> OpcUaResult<Vec<ReferenceDescription>> {
        let session = self.require_session()?;
        let runtime = self.runtime();

        let mut page = runtime
            .browse(&session, &BrowseDescription::hierarchical(node_id.clone()))
            .await?;
        let mut references = std::mem::take(&mut page.references);

        while let Some(point) = page.continuation_point.take() {
            page = runtime.browse_next(&session, &point).await?;
            references.append(&mut page.references);
        }

        tracing::trace!(node_id = %node_id, references = references.len(), "Node browsed");
        Ok(references)
    }

    /// Browses the first page of hierarchical children of `node_id`.
    pub async fn browse_page(&self, node_id: &NodeId) -> OpcUaResult<BrowsePage> {
        let session = self.require_session()?;
        self.runtime()
            .browse(&session, &BrowseDescription::hierarchical(node_id.clone()))
            .await
    }

    /// Fetches every reference of `node_id`.
    pub async fn references(&self, node_id: &NodeId) -> OpcUaResult<Vec<ReferenceDescription>> {
        let session = self.require_session()?;
        self.runtime().fetch_references(&session, node_id).await
    }

    /// Reads the Value attribute of `node_id`.
    pub async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<DataValue> {
        let session = self.require_session()?;
        self.runtime().read_value(&session, node_id).await
    }

    /// Returns the session's namespace table.
    pub async fn namespace_uris(&self) -> OpcUaResult<Vec<String>> {
        let session = self.require_session()?;
        self.runtime().namespace_uris(&session).await
    }

    /// Returns `true` if the runtime reports the keep-alive as stopped.
    pub fn keep_alive_stopped(&self) -> OpcUaResult<bool> {
        let session = self.require_session()?;
        Ok(self.runtime().keep_alive_stopped(&session))
    }

    /// Returns the server's monitored item count.
    ///
    /// Returns `i32::MAX` when the value cannot be read or is not an
    /// integer, which usually means the server is unreachable.
    pub async fn server_subscription_count(&self) -> OpcUaResult<i32> {
        let session = self.require_session()?;
        let node_id = NodeId::string(1, MONITORED_ITEM_COUNT_NODE);

        match self.runtime().read_value(&session, &node_id).await {
            Ok(value) => Ok(value.value.to_i32().unwrap_or(i32::MAX)),
            Err(e) => {
                tracing::debug!(error = %e, "Monitored item count unavailable");
                Ok(i32::MAX)
            }
        }
    }

    /// Returns `true` if `reference` is a variable whose references are all
    /// forward and non-empty, the shape of a byte string value.
    pub async fn is_byte_string(&self, reference: &ReferenceDescription) -> OpcUaResult<bool> {
        let session = self.require_session()?;
        let references = self
            .runtime()
            .fetch_references(&session, &reference.node_id)
            .await?;

        Ok(reference.node_class == NodeClass::Variable
            && !references.is_empty()
            && references.iter().all(|r| r.is_forward))
    }

    /// Queues a write for the next flush.
    pub async fn enqueue_write(&self, node_id: NodeId, value: impl Into<Variant>) {
        self.write_queue()
            .enqueue(WriteValue::new(node_id, value))
            .await;
    }
}
