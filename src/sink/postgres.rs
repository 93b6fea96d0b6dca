//! PostgreSQL sink.

use crate::error::Result;
use crate::schema::DataType;
use crate::sink::{Capability, RelationalSink};

/// PostgreSQL dialect. No native `MERGE` here: the planner falls back to
/// the update-then-insert shape. Bulk loads use `COPY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSink;

impl RelationalSink for PostgresSink {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::LoadCsv]
    }

    fn type_literal(&self, data_type: &DataType) -> Result<String> {
        Ok(match data_type {
            // No single-byte integer in Postgres; SMALLINT is the
            // narrowest that round-trips.
            DataType::TinyInt | DataType::SmallInt => "SMALLINT".to_string(),
            DataType::Int => "INTEGER".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Decimal { precision, scale } => {
                format!("NUMERIC({}, {})", precision, scale)
            }
            DataType::Real => "REAL".to_string(),
            DataType::Double => "DOUBLE PRECISION".to_string(),
            DataType::Char(len) => sized("CHAR", *len),
            DataType::VarChar(len) => sized("VARCHAR", *len),
            DataType::Text => "TEXT".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::Time => "TIME".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::TimestampTz => "TIMESTAMPTZ".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Binary(_) | DataType::VarBinary(_) => "BYTEA".to_string(),
            DataType::Json | DataType::Variant => "JSONB".to_string(),
        })
    }

    fn render_load_csv(
        &self,
        target: &str,
        fields: &[String],
        locator: &str,
    ) -> Result<String> {
        Ok(format!(
            "COPY {} ({}) FROM '{}' WITH (FORMAT csv, HEADER true)",
            target,
            fields.join(", "),
            locator.replace('\'', "''")
        ))
    }
}

fn sized(base: &str, len: Option<u32>) -> String {
    match len {
        Some(len) => format!("{}({})", base, len),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_type_names() {
        assert_eq!(
            PostgresSink.type_literal(&DataType::Double).unwrap(),
            "DOUBLE PRECISION"
        );
        assert_eq!(
            PostgresSink.type_literal(&DataType::TinyInt).unwrap(),
            "SMALLINT"
        );
        assert_eq!(
            PostgresSink.type_literal(&DataType::VarBinary(Some(16))).unwrap(),
            "BYTEA"
        );
        assert_eq!(
            PostgresSink.type_literal(&DataType::Variant).unwrap(),
            "JSONB"
        );
    }

    #[test]
    fn test_copy_statement() {
        let sql = PostgresSink
            .render_load_csv(
                "\"staging\"",
                &["\"id\"".to_string(), "\"name\"".to_string()],
                "/data/batch.csv",
            )
            .unwrap();
        assert_eq!(
            sql,
            "COPY \"staging\" (\"id\", \"name\") FROM '/data/batch.csv' \
             WITH (FORMAT csv, HEADER true)"
        );
    }

    #[test]
    fn test_no_merge_capability() {
        assert!(!PostgresSink.supports(Capability::Merge));
        assert!(PostgresSink.supports(Capability::LoadCsv));
    }
}
