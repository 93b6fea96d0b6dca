//! `tokio-postgres` implementations of the executor collaborators.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{json, Value as JsonValue};
use tokio_postgres::{types::Type, Client, Row};

use crate::exec::client::{SchemaIntrospector, SqlClient, TabularResult};
use crate::schema::{DataType, Field};

#[async_trait]
impl SqlClient for Client {
    async fn execute(&self, sql: &str) -> anyhow::Result<u64> {
        Ok(Client::execute(self, sql, &[]).await?)
    }

    async fn query(&self, sql: &str) -> anyhow::Result<TabularResult> {
        let rows = Client::query(self, sql, &[]).await?;
        Ok(parse_rows(&rows))
    }
}

fn parse_rows(rows: &[Row]) -> TabularResult {
    let Some(first) = rows.first() else {
        return TabularResult::default();
    };
    let columns: Vec<String> = first
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let mut result_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(columns.len());
        for (i, col) in row.columns().iter().enumerate() {
            cells.push(extract_value(row, i, col.type_()));
        }
        result_rows.push(cells);
    }
    TabularResult {
        columns,
        rows: result_rows,
    }
}

fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> JsonValue {
    match *pg_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(JsonValue::Null),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(JsonValue::Null),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(JsonValue::Null),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(JsonValue::Null),
        Type::FLOAT8 | Type::NUMERIC => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(JsonValue::Null),
        Type::TEXT | Type::VARCHAR | Type::NAME | Type::CHAR | Type::BPCHAR => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v.to_string()))
            .unwrap_or(JsonValue::Null),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v.to_string()))
            .unwrap_or(JsonValue::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v.to_string()))
            .unwrap_or(JsonValue::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v.to_rfc3339()))
            .unwrap_or(JsonValue::Null),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<JsonValue>>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
    }
}

#[async_trait]
impl SchemaIntrospector for Client {
    async fn table_exists(&self, group: Option<&str>, table: &str) -> anyhow::Result<bool> {
        let schema = group.unwrap_or("public");
        let rows = Client::query(
            self,
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2",
            &[&schema, &table],
        )
        .await?;
        Ok(!rows.is_empty())
    }

    async fn describe_columns(
        &self,
        group: Option<&str>,
        table: &str,
    ) -> anyhow::Result<Vec<Field>> {
        let schema = group.unwrap_or("public");
        let rows = Client::query(
            self,
            r#"
            SELECT
                c.column_name as name,
                c.data_type,
                c.is_nullable = 'YES' as is_nullable,
                COALESCE(tc.constraint_type = 'PRIMARY KEY', false) as is_primary_key,
                c.character_maximum_length,
                c.numeric_precision,
                c.numeric_scale
            FROM information_schema.columns c
            LEFT JOIN information_schema.key_column_usage kcu
                ON c.table_schema = kcu.table_schema
                AND c.table_name = kcu.table_name
                AND c.column_name = kcu.column_name
            LEFT JOIN information_schema.table_constraints tc
                ON kcu.constraint_name = tc.constraint_name
                AND kcu.table_schema = tc.table_schema
                AND tc.constraint_type = 'PRIMARY KEY'
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
            "#,
            &[&schema, &table],
        )
        .await?;

        let mut fields = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get("name");
            let type_name: String = row.get("data_type");
            let length: Option<i32> = row.get("character_maximum_length");
            let precision: Option<i32> = row.get("numeric_precision");
            let scale: Option<i32> = row.get("numeric_scale");
            let data_type = pg_type_to_data_type(&type_name, length, precision, scale)?;
            let nullable: bool = row.get("is_nullable");
            let primary_key: bool = row.get("is_primary_key");
            let field = if primary_key {
                Field::primary_key(name, data_type)?
            } else if nullable {
                Field::new(name, data_type)?
            } else {
                Field::required(name, data_type)?
            };
            fields.push(field);
        }
        Ok(fields)
    }
}

/// `information_schema` type name to crate type.
fn pg_type_to_data_type(
    type_name: &str,
    length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> anyhow::Result<DataType> {
    let length = length.and_then(|l| u32::try_from(l).ok());
    Ok(match type_name {
        "smallint" => DataType::SmallInt,
        "integer" => DataType::Int,
        "bigint" => DataType::BigInt,
        "numeric" => DataType::Decimal {
            precision: precision.and_then(|p| u8::try_from(p).ok()).unwrap_or(38),
            scale: scale.and_then(|s| u8::try_from(s).ok()).unwrap_or(0),
        },
        "real" => DataType::Real,
        "double precision" => DataType::Double,
        "character" => DataType::Char(length),
        "character varying" => DataType::VarChar(length),
        "text" => DataType::Text,
        "date" => DataType::Date,
        "time without time zone" | "time with time zone" => DataType::Time,
        "timestamp without time zone" => DataType::Timestamp,
        "timestamp with time zone" => DataType::TimestampTz,
        "boolean" => DataType::Boolean,
        "bytea" => DataType::VarBinary(None),
        "json" | "jsonb" => DataType::Json,
        other => anyhow::bail!("unmapped postgres column type {other:?}"),
    })
}
