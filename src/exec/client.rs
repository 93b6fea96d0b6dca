//! Sink-side collaborator traits.
//!
//! The executor talks to the database exclusively through these traits, so
//! tests run against in-memory fakes and production against the
//! `tokio-postgres` implementations in [`super::postgres`].

use async_trait::async_trait;

use crate::schema::Field;

/// Column-major-labelled, row-major result set. Cells are `serde_json`
/// values: the executor only ever inspects scalar counts, everything else
/// passes through untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TabularResult {
    /// The single scalar a count query produces, if the shape matches.
    pub fn single_i64(&self) -> Option<i64> {
        match self.rows.as_slice() {
            [row] => match row.as_slice() {
                [cell] => cell.as_i64(),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Executes rendered SQL against a live sink.
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Run a non-returning statement; yields the affected-row count.
    async fn execute(&self, sql: &str) -> anyhow::Result<u64>;

    /// Run a row-returning statement.
    async fn query(&self, sql: &str) -> anyhow::Result<TabularResult>;
}

/// Reads live table metadata for pre-flight validation.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn table_exists(&self, group: Option<&str>, table: &str) -> anyhow::Result<bool>;

    /// Live column declarations in ordinal order.
    async fn describe_columns(
        &self,
        group: Option<&str>,
        table: &str,
    ) -> anyhow::Result<Vec<Field>>;
}
