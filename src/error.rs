//! Typed error taxonomy for the ingestion pipeline.
//!
//! Every failure surfaced by this crate is one of these variants; nothing
//! is downgraded to a warning. Planning-time errors are raised before any
//! SQL text is generated, validation errors before any statement runs.

use thiserror::Error;

use crate::exec::IngestStatistics;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed `Field`/`Dataset` construction (e.g. a nullable primary key).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A logical-plan node violates its shape contract (e.g. row arity
    /// differing from the declared field list).
    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    /// The requested ingest mode is missing or incompatible with the
    /// declared schemas (absent milestoning columns, non-comparable
    /// version field, partitioning on an unsupported mode, ...).
    #[error("ingest mode error: {0}")]
    IngestMode(String),

    /// The target sink has no rendering for a required plan node. This is
    /// a capability gap of the dialect, not a bug in the plan.
    #[error("sink {sink:?} cannot render {node}")]
    UnsupportedOperation { sink: String, node: &'static str },

    /// The live main-table schema is incompatible with the planned write.
    #[error("schema mismatch on {dataset:?}.{column:?}: {detail}")]
    SchemaMismatch {
        dataset: String,
        column: String,
        detail: String,
    },

    /// A generated statement failed at the sink. Carries the statement
    /// text, its position in the plan, and the row accounting of the
    /// statements already applied, so the failure can be diagnosed
    /// without re-running the ingest.
    #[error("statement {index} failed: {sql}")]
    StatementExecution {
        index: usize,
        sql: String,
        statistics: IngestStatistics,
        #[source]
        source: anyhow::Error,
    },
}

impl IngestError {
    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        IngestError::InvalidSchema(msg.into())
    }

    pub fn malformed_plan(msg: impl Into<String>) -> Self {
        IngestError::MalformedPlan(msg.into())
    }

    pub fn ingest_mode(msg: impl Into<String>) -> Self {
        IngestError::IngestMode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = IngestError::SchemaMismatch {
            dataset: "main".into(),
            column: "amount".into(),
            detail: "live DOUBLE cannot accept planned VARCHAR".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("main"));
        assert!(msg.contains("amount"));
        assert!(msg.contains("DOUBLE"));
    }

    #[test]
    fn test_statement_error_keeps_position() {
        let err = IngestError::StatementExecution {
            index: 3,
            sql: "UPDATE t SET x = 1".into(),
            statistics: IngestStatistics::default(),
            source: anyhow::anyhow!("connection reset"),
        };
        assert!(err.to_string().contains("statement 3"));
        assert!(err.to_string().contains("UPDATE t"));
    }
}
