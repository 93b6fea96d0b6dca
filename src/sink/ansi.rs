//! ANSI SQL:2016 baseline sink.

use crate::error::{IngestError, Result};
use crate::schema::DataType;
use crate::sink::{Capability, RelationalSink};

/// Vendor-neutral dialect. Renders standard type names and `MERGE`, and
/// refuses anything the standard leaves vendor-defined (bulk CSV load,
/// semi-structured columns).
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiSink;

impl RelationalSink for AnsiSink {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Merge]
    }

    fn type_literal(&self, data_type: &DataType) -> Result<String> {
        Ok(match data_type {
            DataType::TinyInt => "TINYINT".to_string(),
            DataType::SmallInt => "SMALLINT".to_string(),
            DataType::Int => "INTEGER".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Decimal { precision, scale } => {
                format!("DECIMAL({}, {})", precision, scale)
            }
            DataType::Real => "REAL".to_string(),
            DataType::Double => "DOUBLE".to_string(),
            DataType::Char(len) => sized("CHAR", *len),
            DataType::VarChar(len) => sized("VARCHAR", *len),
            DataType::Text => "CLOB".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::Time => "TIME".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::TimestampTz => "TIMESTAMP WITH TIME ZONE".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Binary(len) => sized("BINARY", *len),
            DataType::VarBinary(len) => sized("VARBINARY", *len),
            DataType::Json | DataType::Variant => {
                return Err(IngestError::UnsupportedOperation {
                    sink: self.name().to_string(),
                    node: "semi-structured column type",
                })
            }
        })
    }
}

fn sized(base: &str, len: Option<u32>) -> String {
    match len {
        Some(len) => format!("{}({})", base, len),
        None => base.to_string(),
    }
}
