//! Dialect layer: lowering the logical plan to vendor SQL.
//!
//! `RelationalSink` centralizes everything a dialect decides: identifier
//! quoting, type literals, timestamp syntax, capability gaps and the
//! type-compatibility tables the planner and executor consult. The
//! transpiler walks the closed `Operation` set exhaustively, so an
//! unrenderable node is a typed `UnsupportedOperation` error, never a
//! silently skipped statement.

pub mod ansi;
pub mod compiler;
pub mod postgres;
pub mod snowflake;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::plan::{ShowKind, StatementTag};
use crate::schema::{DataType, TypeFamily};

pub use ansi::AnsiSink;
pub use compiler::transpile;
pub use postgres::PostgresSink;
pub use snowflake::SnowflakeSink;

/// Optional dialect features the planner may exploit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// `MERGE INTO ... WHEN MATCHED ...`
    Merge,
    /// Bulk CSV load (`COPY` and friends).
    LoadCsv,
}

/// One dialect-bound statement, tagged for statistics attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub tag: StatementTag,
}

/// Ordered, immutable, single-use textual plan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlPlan {
    pub statements: Vec<SqlStatement>,
}

impl SqlPlan {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// A vendor dialect profile. Pure: every method is a function of its
/// arguments, so plans can be rendered concurrently.
pub trait RelationalSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &'static [Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Single quoting point: every generated identifier goes through here.
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Column type literal for CREATE TABLE and casts.
    fn type_literal(&self, data_type: &DataType) -> Result<String>;

    fn timestamp_literal(&self, ts: &NaiveDateTime) -> String {
        format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S"))
    }

    /// Whether `src` values flow into a `dst` column without a cast.
    fn supports_implicit_mapping(&self, src: &DataType, dst: &DataType) -> bool {
        default_implicit_mapping(src, dst)
    }

    /// Whether an explicit cast from `src` to `dst` is defined.
    fn supports_explicit_mapping(&self, src: &DataType, dst: &DataType) -> bool {
        default_explicit_mapping(src, dst)
    }

    /// Bulk CSV load statement; dialects without one refuse the node.
    fn render_load_csv(
        &self,
        _target: &str,
        _fields: &[String],
        _locator: &str,
    ) -> Result<String> {
        Err(IngestError::UnsupportedOperation {
            sink: self.name().to_string(),
            node: "LoadCsv",
        })
    }

    /// Table introspection statement.
    fn render_show(&self, kind: &ShowKind) -> String {
        let ShowKind::Tables { group, like } = kind;
        let mut sql =
            String::from("SELECT table_name FROM information_schema.tables");
        let mut clauses = Vec::new();
        if let Some(group) = group {
            clauses.push(format!("table_schema = '{}'", escape_string(group)));
        }
        if let Some(like) = like {
            clauses.push(format!("table_name LIKE '{}'", escape_string(like)));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql
    }
}

/// Doubles embedded single quotes, the one escaping rule shared by every
/// supported dialect.
pub(crate) fn escape_string(s: &str) -> String {
    s.replace('\'', "''")
}

/// ANSI-baseline implicit compatibility: identical types, widening within
/// a family, and the standard cross-family widenings.
pub(crate) fn default_implicit_mapping(src: &DataType, dst: &DataType) -> bool {
    if src == dst {
        return true;
    }
    match (src.family(), dst.family()) {
        (TypeFamily::Integer, TypeFamily::Integer) => {
            integer_rank(src) <= integer_rank(dst)
        }
        (TypeFamily::Integer, TypeFamily::Decimal) => true,
        (TypeFamily::Decimal, TypeFamily::Decimal) => decimal_rank(src) <= decimal_rank(dst),
        (TypeFamily::String, TypeFamily::String) => string_rank(src) <= string_rank(dst),
        (TypeFamily::Temporal, TypeFamily::Temporal) => match (src, dst) {
            (DataType::Date, DataType::Timestamp)
            | (DataType::Date, DataType::TimestampTz)
            | (DataType::Timestamp, DataType::TimestampTz) => true,
            _ => false,
        },
        (TypeFamily::Binary, TypeFamily::Binary) => true,
        (TypeFamily::SemiStructured, TypeFamily::SemiStructured) => true,
        _ => false,
    }
}

/// ANSI-baseline explicit casts: everything implicit, plus the usual
/// to/from-string conversions and numeric narrowing.
pub(crate) fn default_explicit_mapping(src: &DataType, dst: &DataType) -> bool {
    if default_implicit_mapping(src, dst) {
        return true;
    }
    match (src.family(), dst.family()) {
        // Narrowing within numeric families is cast-only.
        (TypeFamily::Integer, TypeFamily::Integer)
        | (TypeFamily::Decimal, TypeFamily::Decimal)
        | (TypeFamily::Decimal, TypeFamily::Integer) => true,
        (TypeFamily::String, TypeFamily::String) => true,
        // To and from strings.
        (TypeFamily::Integer, TypeFamily::String)
        | (TypeFamily::Decimal, TypeFamily::String)
        | (TypeFamily::Temporal, TypeFamily::String)
        | (TypeFamily::Boolean, TypeFamily::String)
        | (TypeFamily::SemiStructured, TypeFamily::String) => true,
        (TypeFamily::String, TypeFamily::Integer)
        | (TypeFamily::String, TypeFamily::Decimal)
        | (TypeFamily::String, TypeFamily::Temporal)
        | (TypeFamily::String, TypeFamily::Boolean) => true,
        (TypeFamily::Temporal, TypeFamily::Temporal) => true,
        _ => false,
    }
}

fn integer_rank(t: &DataType) -> u8 {
    match t {
        DataType::TinyInt => 0,
        DataType::SmallInt => 1,
        DataType::Int => 2,
        DataType::BigInt => 3,
        _ => u8::MAX,
    }
}

fn decimal_rank(t: &DataType) -> u8 {
    match t {
        DataType::Real => 0,
        DataType::Double => 1,
        DataType::Decimal { .. } => 2,
        _ => u8::MAX,
    }
}

fn string_rank(t: &DataType) -> u8 {
    match t {
        DataType::Char(_) => 0,
        DataType::VarChar(_) => 1,
        DataType::Text => 2,
        _ => u8::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_widening() {
        assert!(default_implicit_mapping(&DataType::Int, &DataType::BigInt));
        assert!(default_implicit_mapping(&DataType::Int, &DataType::Double));
        assert!(default_implicit_mapping(
            &DataType::Char(Some(3)),
            &DataType::Text
        ));
        assert!(default_implicit_mapping(
            &DataType::Date,
            &DataType::Timestamp
        ));
        assert!(!default_implicit_mapping(&DataType::BigInt, &DataType::Int));
        assert!(!default_implicit_mapping(&DataType::Text, &DataType::Int));
    }

    #[test]
    fn test_explicit_superset_of_implicit() {
        let types = DataType::comparable_types();
        for src in &types {
            for dst in &types {
                if default_implicit_mapping(src, dst) {
                    assert!(
                        default_explicit_mapping(src, dst),
                        "{:?} -> {:?} implicit but not explicit",
                        src,
                        dst
                    );
                }
            }
        }
    }

    #[test]
    fn test_explicit_narrowing_and_strings() {
        assert!(default_explicit_mapping(&DataType::BigInt, &DataType::Int));
        assert!(default_explicit_mapping(&DataType::Text, &DataType::BigInt));
        assert!(default_explicit_mapping(
            &DataType::Timestamp,
            &DataType::Text
        ));
        assert!(!default_explicit_mapping(
            &DataType::Boolean,
            &DataType::Timestamp
        ));
        assert!(!default_explicit_mapping(
            &DataType::Binary(None),
            &DataType::Int
        ));
    }

    #[test]
    fn test_every_comparable_type_renders_on_every_sink() {
        let sinks: Vec<Box<dyn RelationalSink>> = vec![
            Box::new(AnsiSink),
            Box::new(PostgresSink),
            Box::new(SnowflakeSink),
        ];
        for sink in &sinks {
            for data_type in DataType::comparable_types() {
                let literal = sink.type_literal(&data_type).unwrap_or_else(|_| {
                    panic!("{} cannot render {:?}", sink.name(), data_type)
                });
                assert!(!literal.is_empty());
            }
        }
    }

    #[test]
    fn test_default_quoting_escapes_quotes() {
        struct BareSink;
        impl RelationalSink for BareSink {
            fn name(&self) -> &'static str {
                "bare"
            }
            fn capabilities(&self) -> &'static [Capability] {
                &[]
            }
            fn type_literal(&self, _: &DataType) -> Result<String> {
                Ok("X".into())
            }
        }
        assert_eq!(BareSink.quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
