// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address space node records and their factory.
//!
//! Nodes form a tree: a parent owns its children, which are listed by id in
//! [`AddressSpaceNode::children`]. Non-owning links (a second parent pointing
//! at an existing variable, the root folder's link to the Objects folder)
//! are plain [`NodeReference`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::server::type_mapper::map_built_in_type;
use crate::types::{
    AccessLevel, BuiltInType, DataValue, EventNotifier, LocalizedText, NodeClass, NodeId,
    QualifiedName, ReferenceDescription,
};

static FOLDER_TYPE: NodeId = NodeId::FOLDER_TYPE;

// =============================================================================
// NodeReference
// =============================================================================

/// A typed link from one node to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeReference {
    /// Reference type.
    pub reference_type: NodeId,
    /// `true` if the reference points from the target to the owner.
    pub is_inverse: bool,
    /// Other end of the reference.
    pub target: NodeId,
}

impl NodeReference {
    /// Creates a forward reference.
    pub fn forward(reference_type: NodeId, target: NodeId) -> Self {
        Self {
            reference_type,
            is_inverse: false,
            target,
        }
    }

    /// Creates an inverse reference.
    pub fn inverse(reference_type: NodeId, target: NodeId) -> Self {
        Self {
            reference_type,
            is_inverse: true,
            target,
        }
    }
}

// =============================================================================
// NodeKind
// =============================================================================

/// Per-class attributes of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Folder; always typed `FolderType`.
    Folder {
        /// Event notifier bits.
        event_notifier: EventNotifier,
    },

    /// Object.
    Object {
        /// Type definition.
        type_definition: NodeId,
        /// Event notifier bits.
        event_notifier: EventNotifier,
    },

    /// Variable carrying a value.
    Variable {
        /// `BaseDataVariableType` or `PropertyType`.
        type_definition: NodeId,
        /// Declared data type.
        data_type: BuiltInType,
        /// Access level.
        access_level: AccessLevel,
        /// Current value.
        value: DataValue,
        /// Time the value was set.
        timestamp: DateTime<Utc>,
    },
}

// =============================================================================
// AddressSpaceNode
// =============================================================================

/// A folder, object or variable in the helper's namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSpaceNode {
    /// Node id, `ns=<namespace>;s=<path>`.
    pub node_id: NodeId,
    /// Symbolic name.
    pub symbolic_name: String,
    /// Browse name.
    pub browse_name: QualifiedName,
    /// Display name.
    pub display_name: LocalizedText,
    /// Reference type linking the node to its parent.
    pub reference_type: NodeId,
    /// Owning parent.
    pub parent: Option<NodeId>,
    /// Owned children.
    pub children: Vec<NodeId>,
    /// Non-owning references.
    pub references: Vec<NodeReference>,
    /// Class-specific attributes.
    pub kind: NodeKind,
}

impl AddressSpaceNode {
    /// Returns the node class.
    pub fn node_class(&self) -> NodeClass {
        match self.kind {
            NodeKind::Folder { .. } | NodeKind::Object { .. } => NodeClass::Object,
            NodeKind::Variable { .. } => NodeClass::Variable,
        }
    }

    /// Returns the type definition.
    pub fn type_definition(&self) -> &NodeId {
        match &self.kind {
            NodeKind::Folder { .. } => &FOLDER_TYPE,
            NodeKind::Object {
                type_definition, ..
            }
            | NodeKind::Variable {
                type_definition, ..
            } => type_definition,
        }
    }

    /// Returns `true` for folders.
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder { .. })
    }

    /// Returns `true` for objects.
    pub fn is_object(&self) -> bool {
        matches!(self.kind, NodeKind::Object { .. })
    }

    /// Returns `true` for variables.
    pub fn is_variable(&self) -> bool {
        matches!(self.kind, NodeKind::Variable { .. })
    }

    /// Returns `true` for property-style variables.
    pub fn is_property(&self) -> bool {
        self.is_variable() && *self.type_definition() == NodeId::PROPERTY_TYPE
    }

    /// Returns the event notifier of folders and objects.
    pub fn event_notifier(&self) -> Option<EventNotifier> {
        match self.kind {
            NodeKind::Folder { event_notifier } | NodeKind::Object { event_notifier, .. } => {
                Some(event_notifier)
            }
            NodeKind::Variable { .. } => None,
        }
    }

    /// Returns the declared data type of variables.
    pub fn data_type(&self) -> Option<BuiltInType> {
        match self.kind {
            NodeKind::Variable { data_type, .. } => Some(data_type),
            _ => None,
        }
    }

    /// Returns the value of variables.
    pub fn value(&self) -> Option<&DataValue> {
        match &self.kind {
            NodeKind::Variable { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns `true` if a reference of `reference_type` to `target` exists.
    pub fn has_reference(&self, reference_type: &NodeId, target: &NodeId) -> bool {
        self.references
            .iter()
            .any(|r| r.reference_type == *reference_type && r.target == *target)
    }
}

// =============================================================================
// VariableOutcome
// =============================================================================

/// Result of a variable creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableOutcome {
    /// A new variable was created.
    Created(NodeId),
    /// A node with the derived id already existed; the parent now references
    /// it instead.
    AlreadyExists(NodeId),
}

impl VariableOutcome {
    /// Returns the id of the new variable, or `None` if none was created.
    pub fn created(&self) -> Option<&NodeId> {
        match self {
            Self::Created(id) => Some(id),
            Self::AlreadyExists(_) => None,
        }
    }

    /// Returns the id of the variable the parent now points at.
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Created(id) | Self::AlreadyExists(id) => id,
        }
    }
}

// =============================================================================
// NodeFactory
// =============================================================================

/// Builds unattached node records in one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFactory {
    namespace_index: u16,
    locale: String,
}

impl NodeFactory {
    /// Creates a factory for `namespace_index`.
    pub fn new(namespace_index: u16, locale: impl Into<String>) -> Self {
        Self {
            namespace_index,
            locale: locale.into(),
        }
    }

    /// Returns the namespace index.
    pub fn namespace_index(&self) -> u16 {
        self.namespace_index
    }

    /// Returns the id of the node at `path`.
    pub fn node_id(&self, path: &str) -> NodeId {
        NodeId::string(self.namespace_index, path)
    }

    /// Returns the path a node mirrored from `source` is stored under.
    pub fn source_path(source: &ReferenceDescription) -> String {
        source.node_id.identifier.value_string()
    }

    /// Builds an event-source folder at `path` named `name`.
    pub fn folder(&self, path: &str, name: &str) -> AddressSpaceNode {
        AddressSpaceNode {
            node_id: self.node_id(path),
            symbolic_name: name.to_string(),
            browse_name: QualifiedName::new(self.namespace_index, path),
            display_name: LocalizedText::new(&self.locale, name),
            reference_type: NodeId::ORGANIZES,
            parent: None,
            children: Vec::new(),
            references: Vec::new(),
            kind: NodeKind::Folder {
                event_notifier: EventNotifier::SUBSCRIBE_TO_EVENTS,
            },
        }
    }

    /// Builds the folder every helper node lives under, organized by the
    /// standard Objects folder.
    pub fn root_folder(&self, name: &str) -> AddressSpaceNode {
        let mut folder = self.folder(name, name);
        folder
            .references
            .push(NodeReference::inverse(NodeId::ORGANIZES, NodeId::OBJECTS_FOLDER));
        folder
    }

    /// Builds an object mirroring `source`.
    pub fn object(&self, source: &ReferenceDescription) -> AddressSpaceNode {
        let path = Self::source_path(source);
        let name = source.display_name.text.clone();

        AddressSpaceNode {
            node_id: self.node_id(&path),
            symbolic_name: name.clone(),
            browse_name: QualifiedName::new(self.namespace_index, name.clone()),
            display_name: LocalizedText::new("", name),
            reference_type: NodeId::ORGANIZES,
            parent: None,
            children: Vec::new(),
            references: Vec::new(),
            kind: NodeKind::Object {
                type_definition: NodeId::BASE_OBJECT_TYPE,
                event_notifier: EventNotifier::NONE,
            },
        }
    }

    /// Builds a read/write variable mirroring `source` with `value`.
    ///
    /// The data type is derived from the value, which is normalized in place
    /// (string arrays become one comma separated string). `is_static` makes
    /// the variable a property.
    pub fn variable(
        &self,
        source: &ReferenceDescription,
        value: &mut DataValue,
        is_static: bool,
    ) -> AddressSpaceNode {
        let data_type = map_built_in_type(&mut value.value);
        let path = Self::source_path(source);
        let name = source.display_name.text.clone();

        let (type_definition, reference_type) = if is_static {
            (NodeId::PROPERTY_TYPE, NodeId::HAS_PROPERTY)
        } else {
            (NodeId::BASE_DATA_VARIABLE_TYPE, NodeId::ORGANIZES)
        };

        AddressSpaceNode {
            node_id: self.node_id(&path),
            symbolic_name: name.clone(),
            browse_name: QualifiedName::new(self.namespace_index, path),
            display_name: LocalizedText::new(&self.locale, name),
            reference_type,
            parent: None,
            children: Vec::new(),
            references: Vec::new(),
            kind: NodeKind::Variable {
                type_definition,
                data_type,
                access_level: AccessLevel::CURRENT_READ_OR_WRITE,
                value: value.clone(),
                timestamp: Utc::now(),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
