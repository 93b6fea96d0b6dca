//! Column data types and their classification table.

use serde::{Deserialize, Serialize};

/// Primitive column types, grouped into families for compatibility checks.
///
/// Parameterized variants carry their declared sizing; `None` means the
/// dialect default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    // Integer family
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    // Decimal / float family
    Decimal { precision: u8, scale: u8 },
    Real,
    Double,
    // String family
    Char(Option<u32>),
    VarChar(Option<u32>),
    Text,
    // Temporal family
    Date,
    Time,
    Timestamp,
    TimestampTz,
    // Boolean
    Boolean,
    // Binary family
    Binary(Option<u32>),
    VarBinary(Option<u32>),
    // Semi-structured
    Json,
    Variant,
}

/// Type family. Every `DataType` belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Integer,
    Decimal,
    String,
    Temporal,
    Boolean,
    Binary,
    SemiStructured,
}

impl DataType {
    pub fn family(&self) -> TypeFamily {
        match self {
            DataType::TinyInt | DataType::SmallInt | DataType::Int | DataType::BigInt => {
                TypeFamily::Integer
            }
            DataType::Decimal { .. } | DataType::Real | DataType::Double => TypeFamily::Decimal,
            DataType::Char(_) | DataType::VarChar(_) | DataType::Text => TypeFamily::String,
            DataType::Date | DataType::Time | DataType::Timestamp | DataType::TimestampTz => {
                TypeFamily::Temporal
            }
            DataType::Boolean => TypeFamily::Boolean,
            DataType::Binary(_) | DataType::VarBinary(_) => TypeFamily::Binary,
            DataType::Json | DataType::Variant => TypeFamily::SemiStructured,
        }
    }

    /// Whether this type holds character data.
    pub fn is_string_type(&self) -> bool {
        self.family() == TypeFamily::String
    }

    /// Whether values of this type carry a total ordering usable for
    /// version comparison, partitioning and merge keys.
    pub fn is_comparable(&self) -> bool {
        matches!(
            self.family(),
            TypeFamily::Integer | TypeFamily::Decimal | TypeFamily::String | TypeFamily::Temporal
        )
    }

    /// Canonical list of comparable types, one per variant (parameterized
    /// variants use their dialect-default sizing).
    pub fn comparable_types() -> Vec<DataType> {
        vec![
            DataType::TinyInt,
            DataType::SmallInt,
            DataType::Int,
            DataType::BigInt,
            DataType::Decimal {
                precision: 18,
                scale: 4,
            },
            DataType::Real,
            DataType::Double,
            DataType::Char(None),
            DataType::VarChar(None),
            DataType::Text,
            DataType::Date,
            DataType::Time,
            DataType::Timestamp,
            DataType::TimestampTz,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_one_family() {
        let all = vec![
            DataType::TinyInt,
            DataType::SmallInt,
            DataType::Int,
            DataType::BigInt,
            DataType::Decimal {
                precision: 10,
                scale: 2,
            },
            DataType::Real,
            DataType::Double,
            DataType::Char(Some(1)),
            DataType::VarChar(Some(64)),
            DataType::Text,
            DataType::Date,
            DataType::Time,
            DataType::Timestamp,
            DataType::TimestampTz,
            DataType::Boolean,
            DataType::Binary(None),
            DataType::VarBinary(None),
            DataType::Json,
            DataType::Variant,
        ];
        for t in all {
            // family() is total; this would panic on an unhandled variant.
            let _ = t.family();
        }
    }

    #[test]
    fn test_string_types() {
        assert!(DataType::VarChar(Some(32)).is_string_type());
        assert!(DataType::Text.is_string_type());
        assert!(!DataType::Int.is_string_type());
        assert!(!DataType::Json.is_string_type());
    }

    #[test]
    fn test_comparability() {
        assert!(DataType::BigInt.is_comparable());
        assert!(DataType::Timestamp.is_comparable());
        assert!(DataType::Text.is_comparable());
        assert!(!DataType::Boolean.is_comparable());
        assert!(!DataType::Binary(None).is_comparable());
        assert!(!DataType::Variant.is_comparable());
    }

    #[test]
    fn test_comparable_types_are_all_comparable() {
        let types = DataType::comparable_types();
        assert!(!types.is_empty());
        for t in types {
            assert!(t.is_comparable(), "{:?} listed but not comparable", t);
        }
    }
}
