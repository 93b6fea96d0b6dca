//! Sequential plan executor with tagged statistics.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::exec::client::{SchemaIntrospector, SqlClient};
use crate::plan::{LogicalPlan, StatementTag};
use crate::schema::{Dataset, Datasets};
use crate::sink::{transpile, RelationalSink, SqlPlan};

/// Per-ingest row accounting, attributed by statement tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IngestStatistics {
    /// Rows counted in staging before milestoning (after dedup).
    pub incoming_records: u64,
    /// Freshly opened rows.
    pub rows_inserted: u64,
    /// Rows closed because a changed version arrived.
    pub rows_updated: u64,
    /// Rows closed because a delete indicator arrived.
    pub rows_terminated: u64,
    /// Physical deletes.
    pub rows_deleted: u64,
    /// Statements that failed. At most one, since the first failure
    /// aborts the run.
    pub rows_errored: u64,
}

/// Runs a rendered plan statement by statement. The first failure aborts
/// the run; statements already applied are not rolled back here, the
/// caller decides whether to wrap the run in a transaction.
pub struct Executor<'a> {
    client: &'a dyn SqlClient,
}

impl<'a> Executor<'a> {
    pub fn new(client: &'a dyn SqlClient) -> Executor<'a> {
        Executor { client }
    }

    pub async fn execute(&self, plan: &SqlPlan) -> Result<IngestStatistics> {
        let mut stats = IngestStatistics::default();
        for (index, statement) in plan.statements.iter().enumerate() {
            debug!(index, tag = ?statement.tag, sql = %statement.sql, "executing");
            match statement.tag {
                StatementTag::StagedCount => {
                    let result = self
                        .client
                        .query(&statement.sql)
                        .await
                        .map_err(|source| abort(index, &statement.sql, stats, source))?;
                    // One count per data split; the totals add up.
                    stats.incoming_records += result.single_i64().unwrap_or(0).max(0) as u64;
                }
                StatementTag::Query => {
                    self.client
                        .query(&statement.sql)
                        .await
                        .map_err(|source| abort(index, &statement.sql, stats, source))?;
                }
                tag => {
                    let affected = self
                        .client
                        .execute(&statement.sql)
                        .await
                        .map_err(|source| abort(index, &statement.sql, stats, source))?;
                    match tag {
                        StatementTag::Close => stats.rows_updated += affected,
                        StatementTag::Terminate => stats.rows_terminated += affected,
                        StatementTag::Insert | StatementTag::Load => {
                            stats.rows_inserted += affected
                        }
                        StatementTag::Delete => stats.rows_deleted += affected,
                        StatementTag::Ddl | StatementTag::Metadata => {}
                        StatementTag::StagedCount | StatementTag::Query => unreachable!(),
                    }
                }
            }
        }
        info!(
            incoming = stats.incoming_records,
            inserted = stats.rows_inserted,
            updated = stats.rows_updated,
            terminated = stats.rows_terminated,
            deleted = stats.rows_deleted,
            "ingest complete"
        );
        Ok(stats)
    }
}

fn abort(
    index: usize,
    sql: &str,
    mut statistics: IngestStatistics,
    source: anyhow::Error,
) -> IngestError {
    statistics.rows_errored += 1;
    warn!(index, sql = %sql, error = %source, "statement failed, aborting ingest");
    IngestError::StatementExecution {
        index,
        sql: sql.to_string(),
        statistics,
        source,
    }
}

/// End-to-end ingest: pre-flight schema checks against the live sink,
/// then render the plan and run it. A main table that does not exist yet
/// skips validation, its DDL is part of the plan.
pub async fn ingest(
    client: &dyn SqlClient,
    introspector: &dyn SchemaIntrospector,
    sink: &dyn RelationalSink,
    datasets: &Datasets,
    plan: &LogicalPlan,
) -> Result<IngestStatistics> {
    if dataset_exists(introspector, &datasets.main).await? {
        validate_main_dataset_schema(introspector, sink, &datasets.main).await?;
    }
    let rendered = transpile(plan, sink)?;
    Executor::new(client).execute(&rendered).await
}

/// Whether the dataset's table already exists at the sink.
pub async fn dataset_exists(
    introspector: &dyn SchemaIntrospector,
    dataset: &Dataset,
) -> Result<bool> {
    introspector
        .table_exists(dataset.group.as_deref(), &dataset.name)
        .await
        .map_err(|source| IngestError::StatementExecution {
            index: 0,
            sql: format!("table_exists({})", dataset.reference().qualified_name()),
            statistics: IngestStatistics::default(),
            source,
        })
}

/// Pre-flight check: every planned column must exist at the sink with a
/// type the live column accepts implicitly. Extra live columns are fine,
/// the planner never writes them.
pub async fn validate_main_dataset_schema(
    introspector: &dyn SchemaIntrospector,
    sink: &dyn RelationalSink,
    dataset: &Dataset,
) -> Result<()> {
    let live = introspector
        .describe_columns(dataset.group.as_deref(), &dataset.name)
        .await
        .map_err(|source| IngestError::StatementExecution {
            index: 0,
            sql: format!("describe_columns({})", dataset.reference().qualified_name()),
            statistics: IngestStatistics::default(),
            source,
        })?;
    for planned in &dataset.schema {
        let Some(live_field) = live.iter().find(|f| f.name == planned.name) else {
            return Err(IngestError::SchemaMismatch {
                dataset: dataset.name.clone(),
                column: planned.name.clone(),
                detail: "column missing at sink".to_string(),
            });
        };
        if !sink.supports_implicit_mapping(&planned.data_type, &live_field.data_type) {
            return Err(IngestError::SchemaMismatch {
                dataset: dataset.name.clone(),
                column: planned.name.clone(),
                detail: format!(
                    "live column {:?} cannot implicitly accept planned {:?}",
                    live_field.data_type, planned.data_type
                ),
            });
        }
        if planned.nullable && !live_field.nullable {
            return Err(IngestError::SchemaMismatch {
                dataset: dataset.name.clone(),
                column: planned.name.clone(),
                detail: "live column is NOT NULL but planned column is nullable".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::client::TabularResult;
    use crate::schema::{DataType, Field};
    use crate::sink::{AnsiSink, SqlStatement};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Scripted client: records every statement, fails on a marker.
    struct ScriptedClient {
        log: Mutex<Vec<String>>,
        affected: u64,
        count: i64,
    }

    impl ScriptedClient {
        fn new(affected: u64, count: i64) -> ScriptedClient {
            ScriptedClient {
                log: Mutex::new(Vec::new()),
                affected,
                count,
            }
        }
    }

    #[async_trait]
    impl SqlClient for ScriptedClient {
        async fn execute(&self, sql: &str) -> anyhow::Result<u64> {
            self.log.lock().unwrap().push(sql.to_string());
            if sql.contains("boom") {
                anyhow::bail!("duplicate key value violates unique constraint");
            }
            Ok(self.affected)
        }

        async fn query(&self, sql: &str) -> anyhow::Result<TabularResult> {
            self.log.lock().unwrap().push(sql.to_string());
            Ok(TabularResult {
                columns: vec!["count".into()],
                rows: vec![vec![json!(self.count)]],
            })
        }
    }

    fn plan(steps: &[(&str, StatementTag)]) -> SqlPlan {
        SqlPlan {
            statements: steps
                .iter()
                .map(|(sql, tag)| SqlStatement {
                    sql: sql.to_string(),
                    tag: *tag,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_statistics_attribution() {
        let client = ScriptedClient::new(3, 17);
        let plan = plan(&[
            ("CREATE TABLE t (x INT)", StatementTag::Ddl),
            ("SELECT COUNT(*) FROM stage", StatementTag::StagedCount),
            ("UPDATE t SET o = 1", StatementTag::Close),
            ("UPDATE t SET o = 2", StatementTag::Terminate),
            ("INSERT INTO t SELECT 1", StatementTag::Insert),
            ("INSERT INTO ledger VALUES (1)", StatementTag::Metadata),
        ]);
        let stats = Executor::new(&client).execute(&plan).await.unwrap();
        assert_eq!(stats.incoming_records, 17);
        assert_eq!(stats.rows_updated, 3);
        assert_eq!(stats.rows_terminated, 3);
        assert_eq!(stats.rows_inserted, 3);
        assert_eq!(stats.rows_deleted, 0);
        assert_eq!(client.log.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_incoming_count_accumulates_across_splits() {
        // Two data splits means two staged counts; the totals add up.
        let client = ScriptedClient::new(1, 17);
        let plan = plan(&[
            ("SELECT COUNT(*) FROM stage WHERE s = 1", StatementTag::StagedCount),
            ("UPDATE t SET o = 1", StatementTag::Close),
            ("SELECT COUNT(*) FROM stage WHERE s = 2", StatementTag::StagedCount),
            ("UPDATE t SET o = 2", StatementTag::Close),
        ]);
        let stats = Executor::new(&client).execute(&plan).await.unwrap();
        assert_eq!(stats.incoming_records, 34);
        assert_eq!(stats.rows_updated, 2);
    }

    #[tokio::test]
    async fn test_failure_aborts_and_keeps_position() {
        let client = ScriptedClient::new(1, 0);
        let plan = plan(&[
            ("UPDATE t SET o = 1", StatementTag::Close),
            ("INSERT boom", StatementTag::Insert),
            ("INSERT INTO t SELECT 2", StatementTag::Insert),
        ]);
        let err = Executor::new(&client).execute(&plan).await.unwrap_err();
        match err {
            IngestError::StatementExecution {
                index,
                sql,
                statistics,
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(sql, "INSERT boom");
                // The error carries the accounting so far, plus the
                // failed statement itself.
                assert_eq!(statistics.rows_updated, 1);
                assert_eq!(statistics.rows_errored, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The statement after the failure never ran.
        assert_eq!(client.log.lock().unwrap().len(), 2);
    }

    struct FakeIntrospector {
        exists: bool,
        columns: Vec<Field>,
    }

    #[async_trait]
    impl SchemaIntrospector for FakeIntrospector {
        async fn table_exists(&self, _: Option<&str>, _: &str) -> anyhow::Result<bool> {
            Ok(self.exists)
        }

        async fn describe_columns(
            &self,
            _: Option<&str>,
            _: &str,
        ) -> anyhow::Result<Vec<Field>> {
            Ok(self.columns.clone())
        }
    }

    fn main_dataset() -> Dataset {
        Dataset::new(
            "orders",
            vec![
                Field::primary_key("id", DataType::Int).unwrap(),
                Field::new("amount", DataType::Int).unwrap(),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_schema_validation_accepts_widened_live_column() {
        let introspector = FakeIntrospector {
            exists: true,
            columns: vec![
                Field::primary_key("id", DataType::BigInt).unwrap(),
                Field::new("amount", DataType::BigInt).unwrap(),
                Field::new("extra_live_only", DataType::Text).unwrap(),
            ],
        };
        validate_main_dataset_schema(&introspector, &AnsiSink, &main_dataset())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_schema_validation_rejects_missing_and_narrow_columns() {
        let missing = FakeIntrospector {
            exists: true,
            columns: vec![Field::primary_key("id", DataType::BigInt).unwrap()],
        };
        let err = validate_main_dataset_schema(&missing, &AnsiSink, &main_dataset())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SchemaMismatch { ref column, .. } if column == "amount"));

        let narrow = FakeIntrospector {
            exists: true,
            columns: vec![
                Field::primary_key("id", DataType::Int).unwrap(),
                Field::new("amount", DataType::SmallInt).unwrap(),
            ],
        };
        let err = validate_main_dataset_schema(&narrow, &AnsiSink, &main_dataset())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SchemaMismatch { ref column, .. } if column == "amount"));
    }

    #[tokio::test]
    async fn test_ingest_validates_schema_before_running() {
        use crate::plan::{Assignment, Operation, Value};

        let mut logical = LogicalPlan::new();
        logical.push(
            Operation::update(
                main_dataset().reference().clone(),
                vec![Assignment::new("amount", Value::int(1))],
                Some(Value::eq(Value::bare_field("id"), Value::int(1))),
            )
            .unwrap(),
            StatementTag::Close,
        );
        let datasets = Datasets::new(main_dataset(), main_dataset());

        // A live table missing a planned column fails before any
        // statement reaches the sink.
        let client = ScriptedClient::new(2, 0);
        let narrow = FakeIntrospector {
            exists: true,
            columns: vec![Field::primary_key("id", DataType::Int).unwrap()],
        };
        let err = ingest(&client, &narrow, &AnsiSink, &datasets, &logical)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SchemaMismatch { .. }));
        assert!(client.log.lock().unwrap().is_empty());

        let matching = FakeIntrospector {
            exists: true,
            columns: main_dataset().schema.clone(),
        };
        let stats = ingest(&client, &matching, &AnsiSink, &datasets, &logical)
            .await
            .unwrap();
        assert_eq!(stats.rows_updated, 2);
    }

    #[tokio::test]
    async fn test_dataset_exists_passthrough() {
        let introspector = FakeIntrospector {
            exists: false,
            columns: vec![],
        };
        assert!(!dataset_exists(&introspector, &main_dataset()).await.unwrap());
    }
}
