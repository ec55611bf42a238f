// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Mapping of runtime values onto built-in type tags.

use crate::types::{BuiltInType, Variant};

/// Separator used when a string array is flattened into one string.
pub const STRING_ARRAY_SEPARATOR: &str = ",";

/// Returns the built-in type a variable holding `value` is declared with.
///
/// String arrays are rewritten in place into a single comma separated
/// string and tagged [`BuiltInType::String`]. Values without a scalar
/// mapping (null, byte strings, generic arrays) are tagged
/// [`BuiltInType::Null`]. Never fails.
///
/// # Examples
///
/// ```
/// use trap_opcua_helper::server::map_built_in_type;
/// use trap_opcua_helper::types::{BuiltInType, Variant};
///
/// let mut value = Variant::StringArray(vec!["a".into(), "b".into()]);
/// assert_eq!(map_built_in_type(&mut value), BuiltInType::String);
/// assert_eq!(value, Variant::String("a,b".into()));
/// ```
pub fn map_built_in_type(value: &mut Variant) -> BuiltInType {
    if let Variant::StringArray(items) = value {
        *value = Variant::String(items.join(STRING_ARRAY_SEPARATOR));
        return BuiltInType::String;
    }
    classify(value)
}

/// Returns the built-in type of `value` without rewriting it.
pub fn classify(value: &Variant) -> BuiltInType {
    match value {
        Variant::Boolean(_) => BuiltInType::Boolean,
        Variant::Byte(_) => BuiltInType::Byte,
        Variant::DateTime(_) => BuiltInType::DateTime,
        Variant::Double(_) => BuiltInType::Double,
        Variant::Enumeration { .. } => BuiltInType::Enumeration,
        Variant::Float(_) => BuiltInType::Float,
        Variant::Guid(_) => BuiltInType::Guid,
        Variant::Int16(_) => BuiltInType::Int16,
        Variant::Int32(_) => BuiltInType::Int32,
        Variant::Int64(_) => BuiltInType::Int64,
        Variant::SByte(_) => BuiltInType::SByte,
        Variant::String(_) | Variant::StringArray(_) => BuiltInType::String,
        Variant::UInt16(_) => BuiltInType::UInt16,
        Variant::UInt32(_) => BuiltInType::UInt32,
        Variant::UInt64(_) => BuiltInType::UInt64,
        Variant::Null | Variant::ByteString(_) | Variant::Array(_) => BuiltInType::Null,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_scalar_mapping() {
        let cases = [
            (Variant::Boolean(true), BuiltInType::Boolean),
            (Variant::Byte(1), BuiltInType::Byte),
            (Variant::DateTime(Utc::now()), BuiltInType::DateTime),
            (Variant::Double(1.0), BuiltInType::Double),
            (
                Variant::Enumeration {
                    name: "Running".into(),
                    value: 2,
                },
                BuiltInType::Enumeration,
            ),
            (Variant::Float(1.0), BuiltInType::Float),
            (Variant::Guid(Uuid::nil()), BuiltInType::Guid),
            (Variant::Int16(-1), BuiltInType::Int16),
            (Variant::Int32(-1), BuiltInType::Int32),
            (Variant::Int64(-1), BuiltInType::Int64),
            (Variant::SByte(-1), BuiltInType::SByte),
            (Variant::String("x".into()), BuiltInType::String),
            (Variant::UInt16(1), BuiltInType::UInt16),
            (Variant::UInt32(1), BuiltInType::UInt32),
            (Variant::UInt64(1), BuiltInType::UInt64),
        ];

        for (value, expected) in cases {
            let mut mapped = value.clone();
            assert_eq!(map_built_in_type(&mut mapped), expected, "{value:?}");
            assert_eq!(mapped, value, "scalar values are left untouched");
        }
    }

    #[test]
    fn test_unmapped_values_are_null() {
        for mut value in [
            Variant::Null,
            Variant::ByteString(vec![1, 2]),
            Variant::Array(vec![Variant::Int32(1)]),
        ] {
            assert_eq!(map_built_in_type(&mut value), BuiltInType::Null);
        }
    }

    #[test]
    fn test_string_array_is_joined() {
        let mut value = Variant::StringArray(vec!["a".into(), "b".into()]);
        assert_eq!(classify(&value), BuiltInType::String);
        assert_eq!(map_built_in_type(&mut value), BuiltInType::String);
        assert_eq!(value, Variant::String("a,b".into()));

        let mut empty = Variant::StringArray(Vec::new());
        assert_eq!(map_built_in_type(&mut empty), BuiltInType::String);
        assert_eq!(empty, Variant::String(String::new()));
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let mut first = Variant::StringArray(vec!["x".into(), "y".into(), "z".into()]);
        let tag = map_built_in_type(&mut first);
        let mut second = first.clone();
        assert_eq!(map_built_in_type(&mut second), tag);
        assert_eq!(first, second);
    }
}
