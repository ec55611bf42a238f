// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server-side boundary to the protocol runtime.

use async_trait::async_trait;

use crate::client::runtime::ApplicationConfig;
use crate::error::OpcUaResult;
use crate::server::node::{AddressSpaceNode, NodeReference};
use crate::types::NodeId;

/// Server runtime operations consumed by the address space manager.
///
/// The runtime owns the node store; the manager only decides which nodes
/// to publish and how they are linked.
#[async_trait]
pub trait ServerRuntime: Send + Sync + 'static {
    /// Loads the server application configuration.
    async fn load_application_config(&self, config_path: &str) -> OpcUaResult<ApplicationConfig>;

    /// Validates the application instance certificate.
    async fn check_application_certificate(&self, app: &ApplicationConfig) -> OpcUaResult<bool>;

    /// Starts the server on `port`.
    ///
    /// Returns the namespace index assigned to the helper's node manager.
    async fn start(&self, app: &ApplicationConfig, port: u16) -> OpcUaResult<u16>;

    /// Stops the server.
    async fn stop(&self) -> OpcUaResult<()>;

    /// Adds nodes to the predefined node set.
    async fn add_predefined_nodes(&self, nodes: Vec<AddressSpaceNode>) -> OpcUaResult<()>;

    /// Finds a published node.
    async fn find_node(&self, node_id: &NodeId) -> OpcUaResult<Option<AddressSpaceNode>>;

    /// Deletes a node and the nodes it owns.
    ///
    /// Returns `false` if the node did not exist.
    async fn delete_node(&self, node_id: &NodeId) -> OpcUaResult<bool>;

    /// Registers a node as a root event notifier.
    async fn add_root_notifier(&self, node_id: &NodeId) -> OpcUaResult<()>;

    /// Adds a reference to a node owned by the runtime or already published.
    async fn add_external_reference(
        &self,
        source: &NodeId,
        reference: NodeReference,
    ) -> OpcUaResult<()>;
}
