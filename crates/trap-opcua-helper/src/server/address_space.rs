// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server startup and the helper's address space.
//!
//! [`AddressSpaceManager::initialize`] starts the server and builds the node
//! manager: a root folder organized under the standard Objects folder. Every
//! other operation fails with [`NodeManagerError::NotReady`] until then.
//!
//! Nodes are kept in an arena keyed by node id. A node created under a
//! published parent is published immediately; a detached subtree is
//! published as a whole by [`AddressSpaceManager::add_predefined_node`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::error::{ensure_not_blank, NodeManagerError, OpcUaError, OpcUaResult};
use crate::server::node::{AddressSpaceNode, NodeFactory, NodeReference, VariableOutcome};
use crate::server::runtime::ServerRuntime;
use crate::types::{DataValue, NodeId, ReferenceDescription};

/// Namespace used by identifier-based lookups when none is given.
pub const DEFAULT_NAMESPACE_INDEX: u16 = 2;

// =============================================================================
// NodeManager
// =============================================================================

struct NodeManager {
    factory: NodeFactory,
    root: NodeId,
    nodes: HashMap<NodeId, AddressSpaceNode>,
    published: HashSet<NodeId>,
}

impl NodeManager {
    fn get_mut(&mut self, node_id: &NodeId) -> OpcUaResult<&mut AddressSpaceNode> {
        self.nodes.get_mut(node_id).ok_or_else(|| {
            OpcUaError::node_manager(NodeManagerError::node_not_found(node_id.to_string()))
        })
    }

    fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Makes `node` a child of `parent`. Returns `true` if the parent is
    /// published.
    fn attach(&mut self, node: &mut AddressSpaceNode, parent: Option<&NodeId>) -> OpcUaResult<bool> {
        let Some(parent_id) = parent else {
            return Ok(false);
        };

        let parent = self.get_mut(parent_id)?;
        if !parent.children.contains(&node.node_id) {
            parent.children.push(node.node_id.clone());
        }
        node.parent = Some(parent_id.clone());
        Ok(self.published.contains(parent_id))
    }

    fn insert(&mut self, node: AddressSpaceNode) {
        if self.contains(&node.node_id) {
            tracing::debug!(node_id = %node.node_id, "Replacing existing node");
            self.remove_subtree(&node.node_id);
        }
        self.nodes.insert(node.node_id.clone(), node);
    }

    /// Removes `node_id` and everything it owns. Returns `true` if the node
    /// was in the arena.
    fn remove_subtree(&mut self, node_id: &NodeId) -> bool {
        let Some(node) = self.nodes.remove(node_id) else {
            return false;
        };
        self.published.remove(node_id);

        if let Some(parent) = node.parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|child| child != node_id);
        }

        let mut pending = node.children;
        while let Some(child_id) = pending.pop() {
            if let Some(child) = self.nodes.remove(&child_id) {
                self.published.remove(&child_id);
                pending.extend(child.children);
            }
        }
        true
    }

    /// Returns the unpublished nodes of the subtree at `root`, parents first.
    fn unpublished_subtree(&self, root: &NodeId) -> Vec<AddressSpaceNode> {
        let mut nodes = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(node_id) = pending.pop() {
            if let Some(node) = self.nodes.get(&node_id) {
                pending.extend(node.children.iter().rev().cloned());
                if !self.published.contains(&node_id) {
                    nodes.push(node.clone());
                }
            }
        }
        nodes
    }
}

// =============================================================================
// AddressSpaceManager
// =============================================================================

/// Owns the server lifecycle and the helper's node tree.
pub struct AddressSpaceManager<S: ServerRuntime> {
    runtime: Arc<S>,
    config: ServerConfig,
    state: RwLock<Option<NodeManager>>,
    lifecycle: Mutex<()>,
    stats: AddressSpaceStats,
}

impl<S: ServerRuntime> AddressSpaceManager<S> {
    /// Creates a manager for a server listening on `config.port`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument("port")` for port 0.
    pub fn new(runtime: Arc<S>, config: ServerConfig) -> OpcUaResult<Self> {
        config.validate()?;
        Ok(Self {
            runtime,
            config,
            state: RwLock::new(None),
            lifecycle: Mutex::new(()),
            stats: AddressSpaceStats::default(),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the address space statistics.
    pub fn stats(&self) -> &AddressSpaceStats {
        &self.stats
    }

    /// Returns `true` once the node manager has been built.
    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Returns the namespace index of the node manager.
    pub fn namespace_index(&self) -> OpcUaResult<u16> {
        self.read(|m| m.factory.namespace_index())
    }

    /// Returns the id of the root folder.
    pub fn root_folder(&self) -> OpcUaResult<NodeId> {
        self.read(|m| m.root.clone())
    }

    /// Returns the number of nodes held by the node manager.
    pub fn node_count(&self) -> OpcUaResult<usize> {
        self.read(|m| m.nodes.len())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Loads the configuration, checks the certificate, starts the server
    /// and builds the node manager.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument("config_path")` for a blank path
    /// - `CertificateInvalid` if the application certificate is rejected
    /// - `AlreadyInitialized` on a second call
    pub async fn initialize(&self, config_path: &str) -> OpcUaResult<()> {
        ensure_not_blank("config_path", config_path)?;
        let _lifecycle = self.lifecycle.lock().await;

        if self.is_initialized() {
            return Err(OpcUaError::node_manager(NodeManagerError::AlreadyInitialized));
        }

        let app = self.runtime.load_application_config(config_path).await?;
        if !self.runtime.check_application_certificate(&app).await? {
            return Err(OpcUaError::certificate_invalid(&app.application_name));
        }

        let namespace_index = self.runtime.start(&app, self.config.port).await?;
        let factory = NodeFactory::new(namespace_index, &self.config.locale);
        let root = factory.root_folder(&self.config.root_folder_name);
        let root_id = root.node_id.clone();

        self.runtime.add_predefined_nodes(vec![root.clone()]).await?;
        self.runtime
            .add_external_reference(
                &NodeId::OBJECTS_FOLDER,
                NodeReference::forward(NodeId::ORGANIZES, root_id.clone()),
            )
            .await?;

        let mut manager = NodeManager {
            factory,
            root: root_id.clone(),
            nodes: HashMap::new(),
            published: HashSet::new(),
        };
        manager.insert(root);
        manager.published.insert(root_id.clone());
        *self.state.write() = Some(manager);

        tracing::info!(
            application = %app.application_name,
            port = self.config.port,
            namespace_index,
            root = %root_id,
            "Address space initialized"
        );
        Ok(())
    }

    /// Stops the server and drops the node manager.
    ///
    /// A no-op if the manager was never initialized or is already shut down.
    pub async fn shutdown(&self) -> OpcUaResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let Some(manager) = self.state.write().take() else {
            return Ok(());
        };
        self.runtime.stop().await?;

        tracing::info!(nodes = manager.nodes.len(), "Address space shut down");
        Ok(())
    }

    // =========================================================================
    // Node creation
    // =========================================================================

    /// Creates an event-source folder at `path` and registers it as a root
    /// notifier.
    ///
    /// Without a parent the folder stays detached until published through
    /// [`add_predefined_node`](Self::add_predefined_node).
    pub async fn create_folder(
        &self,
        parent: Option<&NodeId>,
        path: &str,
        name: &str,
    ) -> OpcUaResult<NodeId> {
        ensure_not_blank("path", path)?;
        ensure_not_blank("name", name)?;

        let (node, publish) = self.write(|m| -> OpcUaResult<_> {
            let mut node = m.factory.folder(path, name);
            let publish = m.attach(&mut node, parent)?;
            m.insert(node.clone());
            Ok((node, publish))
        })??;

        let node_id = node.node_id.clone();
        if publish {
            self.publish(vec![node]).await?;
        }
        self.runtime.add_root_notifier(&node_id).await?;
        self.stats.folders.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(node_id = %node_id, published = publish, "Folder created");
        Ok(node_id)
    }

    /// Creates an object mirroring `source` under `parent`.
    ///
    /// An existing node with the same id is replaced.
    pub async fn create_object(
        &self,
        parent: &NodeId,
        source: &ReferenceDescription,
    ) -> OpcUaResult<NodeId> {
        ensure_not_blank("source", &NodeFactory::source_path(source))?;

        let (node, publish) = self.write(|m| -> OpcUaResult<_> {
            let mut node = m.factory.object(source);
            let publish = m.attach(&mut node, Some(parent))?;
            m.insert(node.clone());
            Ok((node, publish))
        })??;

        let node_id = node.node_id.clone();
        if publish {
            self.publish(vec![node]).await?;
        }
        self.stats.objects.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(node_id = %node_id, parent = %parent, "Object created");
        Ok(node_id)
    }

    /// Creates a variable mirroring `source` under `parent`, unless a node
    /// with the derived id exists.
    ///
    /// The value is normalized in place before the check (string arrays are
    /// joined). An existing node is linked from `parent` with a
    /// `HasComponent` reference instead of being created again.
    pub async fn create_variable(
        &self,
        parent: &NodeId,
        source: &ReferenceDescription,
        value: &mut DataValue,
        is_static: bool,
    ) -> OpcUaResult<VariableOutcome> {
        ensure_not_blank("source", &NodeFactory::source_path(source))?;

        let (node, known) = self.read(|m| {
            let node = m.factory.variable(source, value, is_static);
            let known = m.contains(&node.node_id);
            (node, known)
        })?;
        let node_id = node.node_id.clone();

        let exists = known || self.runtime.find_node(&node_id).await?.is_some();
        if exists {
            return self.link_existing(parent, node_id).await;
        }

        let inserted = self.write(|m| -> OpcUaResult<_> {
            if m.contains(&node_id) {
                return Ok(None);
            }
            let mut node = node;
            let publish = m.attach(&mut node, Some(parent))?;
            m.insert(node.clone());
            Ok(Some((node, publish)))
        })??;

        let Some((node, publish)) = inserted else {
            return self.link_existing(parent, node_id).await;
        };
        if publish {
            self.publish(vec![node]).await?;
        }
        self.stats.variables.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(node_id = %node_id, parent = %parent, "Variable created");
        Ok(VariableOutcome::Created(node_id))
    }

    async fn link_existing(&self, parent: &NodeId, node_id: NodeId) -> OpcUaResult<VariableOutcome> {
        let reference = NodeReference::forward(NodeId::HAS_COMPONENT, node_id.clone());

        let publish = self.write(|m| -> OpcUaResult<bool> {
            let published = m.published.contains(parent);
            let parent = m.get_mut(parent)?;
            if !parent.has_reference(&reference.reference_type, &reference.target) {
                parent.references.push(reference.clone());
            }
            Ok(published)
        })??;

        if publish {
            self.runtime.add_external_reference(parent, reference).await?;
        }
        self.stats.references_added.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(node_id = %node_id, parent = %parent, "Variable exists, reference added");
        Ok(VariableOutcome::AlreadyExists(node_id))
    }

    // =========================================================================
    // Publishing, lookup and deletion
    // =========================================================================

    /// Publishes the subtree rooted at `root` to the server.
    ///
    /// Returns the number of nodes newly published.
    pub async fn add_predefined_node(&self, root: &NodeId) -> OpcUaResult<usize> {
        let nodes = self.read(|m| {
            if m.contains(root) {
                Ok(m.unpublished_subtree(root))
            } else {
                Err(OpcUaError::node_manager(NodeManagerError::node_not_found(
                    root.to_string(),
                )))
            }
        })??;

        let count = nodes.len();
        if count > 0 {
            self.publish(nodes).await?;
        }

        tracing::debug!(root = %root, nodes = count, "Predefined nodes added");
        Ok(count)
    }

    /// Finds a node held by the node manager or published by others.
    pub async fn find_node(&self, node_id: &NodeId) -> OpcUaResult<Option<AddressSpaceNode>> {
        if let Some(node) = self.read(|m| m.nodes.get(node_id).cloned())? {
            return Ok(Some(node));
        }
        self.runtime.find_node(node_id).await
    }

    /// Deletes a node and the nodes it owns.
    ///
    /// Returns `false` if no such node existed.
    pub async fn delete_node(&self, node_id: &NodeId) -> OpcUaResult<bool> {
        let (removed, was_published) = self.write(|m| {
            let was_published = m.published.contains(node_id);
            (m.remove_subtree(node_id), was_published)
        })?;

        let deleted = if was_published || !removed {
            self.runtime.delete_node(node_id).await?
        } else {
            false
        };

        let existed = removed || deleted;
        if existed {
            self.stats.deleted.fetch_add(1, Ordering::Relaxed);
            tracing::info!(node_id = %node_id, "Node deleted");
        }
        Ok(existed)
    }

    /// Deletes `ns=2;s=<identifier>`.
    pub async fn delete_node_by_identifier(&self, identifier: &str) -> OpcUaResult<bool> {
        self.delete_node_by_identifier_in(identifier, DEFAULT_NAMESPACE_INDEX)
            .await
    }

    /// Deletes `ns=<namespace_index>;s=<identifier>`.
    pub async fn delete_node_by_identifier_in(
        &self,
        identifier: &str,
        namespace_index: u16,
    ) -> OpcUaResult<bool> {
        ensure_not_blank("node_identifier", identifier)?;
        self.delete_node(&NodeId::string(namespace_index, identifier))
            .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn publish(&self, nodes: Vec<AddressSpaceNode>) -> OpcUaResult<()> {
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.node_id.clone()).collect();
        self.runtime.add_predefined_nodes(nodes).await?;

        if let Some(manager) = self.state.write().as_mut() {
            manager.published.extend(ids);
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&NodeManager) -> T) -> OpcUaResult<T> {
        self.state
            .read()
            .as_ref()
            .map(f)
            .ok_or_else(OpcUaError::node_manager_not_ready)
    }

    fn write<T>(&self, f: impl FnOnce(&mut NodeManager) -> T) -> OpcUaResult<T> {
        self.state
            .write()
            .as_mut()
            .map(f)
            .ok_or_else(OpcUaError::node_manager_not_ready)
    }
}

impl<S: ServerRuntime> fmt::Debug for AddressSpaceManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpaceManager")
            .field("port", &self.config.port)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

// =============================================================================
// AddressSpaceStats
// =============================================================================

/// Statistics for the address space manager.
#[derive(Debug, Default)]
pub struct AddressSpaceStats {
    folders: AtomicU64,
    objects: AtomicU64,
    variables: AtomicU64,
    references_added: AtomicU64,
    deleted: AtomicU64,
}

impl AddressSpaceStats {
    /// Returns the number of folders created.
    pub fn folders(&self) -> u64 {
        self.folders.load(Ordering::Relaxed)
    }

    /// Returns the number of objects created.
    pub fn objects(&self) -> u64 {
        self.objects.load(Ordering::Relaxed)
    }

    /// Returns the number of variables created.
    pub fn variables(&self) -> u64 {
        self.variables.load(Ordering::Relaxed)
    }

    /// Returns the number of references added to existing variables.
    pub fn references_added(&self) -> u64 {
        self.references_added.load(Ordering::Relaxed)
    }

    /// Returns the number of nodes deleted.
    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.folders.store(0, Ordering::Relaxed);
        self.objects.store(0, Ordering::Relaxed);
        self.variables.store(0, Ordering::Relaxed);
        self.references_added.store(0, Ordering::Relaxed);
        self.deleted.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
