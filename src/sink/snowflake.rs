//! Snowflake sink.

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::plan::ShowKind;
use crate::schema::DataType;
use crate::sink::{escape_string, Capability, RelationalSink};

/// Snowflake dialect: native `MERGE`, stage-based `COPY INTO` loads,
/// `VARIANT` columns, and timestamp literals cast to `TIMESTAMP_NTZ`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnowflakeSink;

impl RelationalSink for SnowflakeSink {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Merge, Capability::LoadCsv]
    }

    fn type_literal(&self, data_type: &DataType) -> Result<String> {
        Ok(match data_type {
            DataType::TinyInt => "TINYINT".to_string(),
            DataType::SmallInt => "SMALLINT".to_string(),
            DataType::Int => "INTEGER".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Decimal { precision, scale } => {
                format!("NUMBER({}, {})", precision, scale)
            }
            DataType::Real => "FLOAT".to_string(),
            DataType::Double => "DOUBLE".to_string(),
            DataType::Char(len) => sized("CHAR", *len),
            DataType::VarChar(len) => sized("VARCHAR", *len),
            DataType::Text => "STRING".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::Time => "TIME".to_string(),
            DataType::Timestamp => "TIMESTAMP_NTZ".to_string(),
            DataType::TimestampTz => "TIMESTAMP_TZ".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Binary(len) => sized("BINARY", *len),
            DataType::VarBinary(len) => sized("VARBINARY", *len),
            DataType::Json | DataType::Variant => "VARIANT".to_string(),
        })
    }

    fn timestamp_literal(&self, ts: &NaiveDateTime) -> String {
        format!(
            "CAST('{}' AS TIMESTAMP_NTZ)",
            ts.format("%Y-%m-%d %H:%M:%S")
        )
    }

    fn render_load_csv(
        &self,
        target: &str,
        fields: &[String],
        locator: &str,
    ) -> Result<String> {
        Ok(format!(
            "COPY INTO {} ({}) FROM '{}' FILE_FORMAT = (TYPE = CSV SKIP_HEADER = 1)",
            target,
            fields.join(", "),
            locator.replace('\'', "''")
        ))
    }

    fn render_show(&self, kind: &ShowKind) -> String {
        let ShowKind::Tables { group, like } = kind;
        let mut sql = String::from("SHOW TABLES");
        if let Some(like) = like {
            sql.push_str(&format!(" LIKE '{}'", escape_string(like)));
        }
        if let Some(group) = group {
            sql.push_str(&format!(" IN SCHEMA {}", self.quote_identifier(group)));
        }
        sql
    }
}

fn sized(base: &str, len: Option<u32>) -> String {
    match len {
        Some(len) => format!("{}({})", base, len),
        None => base.to_string(),
    }
}
