// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server-side address space mirroring.
//!
//! ```text
//! Objects
//! └── <root folder>            (Organizes, created on startup)
//!     └── folder               (event source, root notifier)
//!         └── object           (BaseObjectType)
//!             ├── variable     (BaseDataVariableType, Organizes)
//!             └── property     (PropertyType, HasProperty)
//! ```
//!
//! [`AddressSpaceManager`] owns the lifecycle, [`NodeFactory`] builds node
//! records and [`map_built_in_type`] derives variable data types.

pub mod address_space;
pub mod node;
pub mod runtime;
pub mod type_mapper;

pub use address_space::{AddressSpaceManager, AddressSpaceStats, DEFAULT_NAMESPACE_INDEX};
pub use node::{AddressSpaceNode, NodeFactory, NodeKind, NodeReference, VariableOutcome};
pub use runtime::ServerRuntime;
pub use type_mapper::{classify, map_built_in_type, STRING_ARRAY_SEPARATOR};
