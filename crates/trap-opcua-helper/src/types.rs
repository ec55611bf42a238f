// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol value types shared by the client and server helpers.
//!
//! - **NodeId**: node identifiers with `ns=<index>;<type>=<value>` parsing
//! - **QualifiedName / LocalizedText**: browse and display names
//! - **Variant / DataValue**: runtime values with status and timestamps
//! - **BuiltInType**: the type tag the server assigns to a variable
//! - **ReferenceDescription**: one browse result entry
//!
//! # Examples
//!
//! ```
//! use trap_opcua_helper::types::{NodeId, Variant};
//!
//! let node: NodeId = "ns=2;s=Line1.Temperature".parse().unwrap();
//! assert_eq!(node.identifier.value_string(), "Line1.Temperature");
//!
//! let value = Variant::from(21.5_f64);
//! assert_eq!(value.to_i32(), Some(22));
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, OpcUaError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// A NodeId consists of a namespace index and an identifier which can be
/// numeric, string, GUID, or opaque (byte string).
///
/// # Examples
///
/// ```
/// use trap_opcua_helper::types::NodeId;
///
/// let node = NodeId::string(2, "Plant/Line1");
/// assert_eq!(node.to_opc_string(), "ns=2;s=Plant/Line1");
///
/// let objects = NodeId::OBJECTS_FOLDER;
/// assert_eq!(objects.to_opc_string(), "i=85");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a numeric node ID.
    #[inline]
    pub const fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// Returns the null node ID (ns=0, i=0).
    #[inline]
    pub const fn null() -> Self {
        Self::numeric(0, 0)
    }

    // =========================================================================
    // Standard Node IDs
    // =========================================================================

    /// Objects folder node (ns=0, i=85).
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);

    /// HierarchicalReferences reference type (ns=0, i=33).
    pub const HIERARCHICAL_REFERENCES: NodeId = NodeId::numeric(0, 33);

    /// Organizes reference type (ns=0, i=35).
    pub const ORGANIZES: NodeId = NodeId::numeric(0, 35);

    /// HasProperty reference type (ns=0, i=46).
    pub const HAS_PROPERTY: NodeId = NodeId::numeric(0, 46);

    /// HasComponent reference type (ns=0, i=47).
    pub const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);

    /// BaseObjectType (ns=0, i=58).
    pub const BASE_OBJECT_TYPE: NodeId = NodeId::numeric(0, 58);

    /// FolderType (ns=0, i=61).
    pub const FOLDER_TYPE: NodeId = NodeId::numeric(0, 61);

    /// BaseDataVariableType (ns=0, i=63).
    pub const BASE_DATA_VARIABLE_TYPE: NodeId = NodeId::numeric(0, 63);

    /// PropertyType (ns=0, i=68).
    pub const PROPERTY_TYPE: NodeId = NodeId::numeric(0, 68);

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns `true` if this is a null node ID (ns=0, i=0).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }

    /// Returns the string value if this is a string identifier.
    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match &self.identifier {
            NodeIdentifier::String(v) => Some(v),
            _ => None,
        }
    }

    /// Converts to the OPC UA string format.
    ///
    /// Format: `ns=<namespace>;{i|s|g|b}=<identifier>`, with the namespace
    /// omitted for ns=0.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats: `ns=2;i=1001`, `ns=2;s=MyNode`,
    /// `ns=2;g=<uuid>`, `ns=2;b=<base64>`, and the same without `ns=` for
    /// namespace 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| {
            OpcUaError::configuration(ConfigurationError::invalid_node_id(s, reason))
        };

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, identifier) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("Missing identifier after namespace".into()))?;
                let ns: u16 = ns_str
                    .parse()
                    .map_err(|_| invalid("Invalid namespace index".into()))?;
                (ns, identifier)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(
                id.parse()
                    .map_err(|_| invalid("Invalid numeric identifier".into()))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(
                Uuid::parse_str(id).map_err(|e| invalid(format!("Invalid GUID: {}", e)))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(
                BASE64
                    .decode(id)
                    .map_err(|e| invalid(format!("Invalid base64: {}", e)))?,
            )
        } else {
            return Err(invalid(
                "Unknown identifier type. Expected i=, s=, g=, or b=".into(),
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// OPC UA node identifier types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),

    /// String identifier (path-derived identifiers use this form).
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier.
    Opaque(Vec<u8>),
}

impl NodeIdentifier {
    /// Returns the identifier value without its type prefix.
    ///
    /// This is the form used to derive paths of nodes mirrored from a
    /// browse result.
    pub fn value_string(&self) -> String {
        match self {
            Self::Numeric(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::Guid(v) => v.to_string(),
            Self::Opaque(v) => BASE64.encode(v),
        }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// Names
// =============================================================================

/// A name qualified by a namespace index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// Name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

/// Human readable text with a locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale, e.g. `en`.
    pub locale: String,
    /// Text.
    pub text: String,
}

impl LocalizedText {
    /// Creates localized text.
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the OPC UA bit mask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }
}

/// Node class filter used by browse requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodeClassMask(pub u32);

impl NodeClassMask {
    /// Objects, variables and methods.
    pub const OBJECT_VARIABLE_METHOD: NodeClassMask = NodeClassMask(1 | 2 | 4);

    /// Returns `true` if the mask admits `class`.
    pub const fn contains(&self, class: NodeClass) -> bool {
        self.0 & class.value() != 0
    }
}

// =============================================================================
// Node attributes
// =============================================================================

/// Variable access level bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AccessLevel(pub u8);

impl AccessLevel {
    /// CurrentRead.
    pub const CURRENT_READ: AccessLevel = AccessLevel(0x01);
    /// CurrentWrite.
    pub const CURRENT_WRITE: AccessLevel = AccessLevel(0x02);
    /// CurrentRead | CurrentWrite.
    pub const CURRENT_READ_OR_WRITE: AccessLevel = AccessLevel(0x03);
}

/// Event notifier bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EventNotifier(pub u8);

impl EventNotifier {
    /// Not an event source.
    pub const NONE: EventNotifier = EventNotifier(0);
    /// SubscribeToEvents.
    pub const SUBSCRIBE_TO_EVENTS: EventNotifier = EventNotifier(0x01);
}

// =============================================================================
// BuiltInType
// =============================================================================

/// Built-in data type tags, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BuiltInType {
    /// No type.
    Null = 0,
    /// Boolean.
    Boolean = 1,
    /// Signed byte.
    SByte = 2,
    /// Unsigned byte.
    Byte = 3,
    /// 16-bit signed integer.
    Int16 = 4,
    /// 16-bit unsigned integer.
    UInt16 = 5,
    /// 32-bit signed integer.
    Int32 = 6,
    /// 32-bit unsigned integer.
    UInt32 = 7,
    /// 64-bit signed integer.
    Int64 = 8,
    /// 64-bit unsigned integer.
    UInt64 = 9,
    /// 32-bit float.
    Float = 10,
    /// 64-bit float.
    Double = 11,
    /// String.
    String = 12,
    /// Date and time.
    DateTime = 13,
    /// GUID.
    Guid = 14,
    /// Byte string.
    ByteString = 15,
    /// Enumeration.
    Enumeration = 29,
}

impl BuiltInType {
    /// Returns the numeric identifier of the type.
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Returns the data type node of this built-in type (ns=0).
    pub const fn data_type_id(self) -> NodeId {
        NodeId::numeric(0, self as u32)
    }

    /// Returns the type name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Guid => "Guid",
            Self::ByteString => "ByteString",
            Self::Enumeration => "Enumeration",
        }
    }
}

impl fmt::Display for BuiltInType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
///
/// The top two bits carry the severity: `00` good, `01` uncertain, `10` bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// BadCommunicationError.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    /// BadTimeout.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// BadServerHalted.
    pub const BAD_SERVER_HALTED: StatusCode = StatusCode(0x800E_0000);
    /// BadSessionClosed.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// BadNotConnected.
    pub const BAD_NOT_CONNECTED: StatusCode = StatusCode(0x808A_0000);
    /// BadConnectionClosed.
    pub const BAD_CONNECTION_CLOSED: StatusCode = StatusCode(0x80AE_0000);

    /// Returns `true` for good status codes.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` for bad status codes.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns `true` for uncertain status codes.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns the symbolic name of well-known codes.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::GOOD => "Good",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_SERVER_HALTED => "BadServerHalted",
            Self::BAD_SESSION_CLOSED => "BadSessionClosed",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_NOT_CONNECTED => "BadNotConnected",
            Self::BAD_CONNECTION_CLOSED => "BadConnectionClosed",
            _ if self.is_uncertain() => "Uncertain",
            _ if self.is_bad() => "Bad",
            _ => "Good",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

// =============================================================================
// Variant
// =============================================================================

/// A runtime value carried by a variable node, a read or a write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Variant {
    /// No value.
    #[default]
    Null,
    /// Boolean.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// String.
    String(String),
    /// Array of strings.
    StringArray(Vec<String>),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// GUID.
    Guid(Uuid),
    /// Member of an enumeration.
    Enumeration {
        /// Member name.
        name: String,
        /// Member value.
        value: i32,
    },
    /// Raw bytes.
    ByteString(Vec<u8>),
    /// Array of other values.
    Array(Vec<Variant>),
}

impl Variant {
    /// Returns `true` for [`Variant::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts a numeric, boolean or numeric-string value to `i32`.
    ///
    /// Floating point values are rounded to the nearest integer, ties to
    /// even. Returns `None` when the value does not fit or has no numeric
    /// meaning.
    pub fn to_i32(&self) -> Option<i32> {
        match self {
            Self::Boolean(v) => Some(i32::from(*v)),
            Self::SByte(v) => Some(i32::from(*v)),
            Self::Byte(v) => Some(i32::from(*v)),
            Self::Int16(v) => Some(i32::from(*v)),
            Self::UInt16(v) => Some(i32::from(*v)),
            Self::Int32(v) => Some(*v),
            Self::UInt32(v) => i32::try_from(*v).ok(),
            Self::Int64(v) => i32::try_from(*v).ok(),
            Self::UInt64(v) => i32::try_from(*v).ok(),
            Self::Float(v) => float_to_i32(f64::from(*v)),
            Self::Double(v) => float_to_i32(*v),
            Self::String(v) => v.trim().parse().ok(),
            Self::Enumeration { value, .. } => Some(*value),
            _ => None,
        }
    }
}

fn float_to_i32(v: f64) -> Option<i32> {
    let rounded = v.round_ties_even();
    if rounded.is_finite() && rounded >= f64::from(i32::MIN) && rounded <= f64::from(i32::MAX) {
        Some(rounded as i32)
    } else {
        None
    }
}

macro_rules! variant_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

variant_from! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<String> => StringArray,
    DateTime<Utc> => DateTime,
    Uuid => Guid,
    Vec<u8> => ByteString,
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A value with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataValue {
    /// The value.
    pub value: Variant,
    /// Quality of the value.
    pub status: StatusCode,
    /// Timestamp assigned by the data source.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Timestamp assigned by the server.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good value without timestamps.
    pub fn new(value: impl Into<Variant>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Sets the status code.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(timestamp);
        self
    }
}

// =============================================================================
// ReferenceDescription
// =============================================================================

/// One reference returned by a browse or reference fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    /// Reference type.
    pub reference_type: NodeId,
    /// `true` if the reference points from the browsed node to the target.
    pub is_forward: bool,
    /// Target node.
    pub node_id: NodeId,
    /// Browse name of the target.
    pub browse_name: QualifiedName,
    /// Display name of the target.
    pub display_name: LocalizedText,
    /// Node class of the target.
    pub node_class: NodeClass,
    /// Type definition of the target.
    pub type_definition: NodeId,
}

impl ReferenceDescription {
    /// Creates a forward `HasComponent` reference to `node_id`.
    pub fn new(node_id: NodeId, display_name: impl Into<String>, node_class: NodeClass) -> Self {
        let display_name = display_name.into();
        Self {
            reference_type: NodeId::HAS_COMPONENT,
            is_forward: true,
            browse_name: QualifiedName::new(node_id.namespace_index, display_name.clone()),
            display_name: LocalizedText::new("", display_name),
            node_id,
            node_class,
            type_definition: NodeId::null(),
        }
    }
}

// =============================================================================
// WriteValue
// =============================================================================

/// A value queued for a batched write of the Value attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteValue {
    /// Target node.
    pub node_id: NodeId,
    /// Value to write.
    pub value: DataValue,
}

impl WriteValue {
    /// Creates a write of `value` to `node_id`.
    pub fn new(node_id: NodeId, value: impl Into<Variant>) -> Self {
        Self {
            node_id,
            value: DataValue::new(value),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
