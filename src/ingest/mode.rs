//! Declarative description of how staging data merges into main.
//!
//! All of these are immutable configuration values constructed once per
//! ingest invocation; the planner matches exhaustively over them so a new
//! mode cannot be added without handling every algorithm site.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::sink::Capability;

/// The closed set of ingestion strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IngestMode {
    /// Plain append, no milestoning. Optionally stamps an audit column.
    Nontemporal { auditing: Auditing },
    /// Staging is the complete replacement set, optionally per partition.
    UnitemporalSnapshot {
        transaction: TransactionMilestoning,
        partitioning: Option<Partitioning>,
        empty_handling: EmptyDatasetHandling,
        /// When present, unchanged rows (equal digest) are left untouched.
        digest_field: Option<String>,
    },
    /// Staging carries new and changed rows, detected via digest.
    UnitemporalDelta {
        transaction: TransactionMilestoning,
        digest_field: String,
        merge: MergeStrategy,
    },
    /// Snapshot semantics over both transaction and valid time.
    BitemporalSnapshot {
        transaction: TransactionMilestoning,
        validity: ValidityMilestoning,
        partitioning: Option<Partitioning>,
        empty_handling: EmptyDatasetHandling,
        digest_field: Option<String>,
    },
    /// Delta semantics over both transaction and valid time.
    BitemporalDelta {
        transaction: TransactionMilestoning,
        validity: ValidityMilestoning,
        digest_field: String,
        merge: MergeStrategy,
    },
}

impl IngestMode {
    pub fn name(&self) -> &'static str {
        match self {
            IngestMode::Nontemporal { .. } => "Nontemporal",
            IngestMode::UnitemporalSnapshot { .. } => "UnitemporalSnapshot",
            IngestMode::UnitemporalDelta { .. } => "UnitemporalDelta",
            IngestMode::BitemporalSnapshot { .. } => "BitemporalSnapshot",
            IngestMode::BitemporalDelta { .. } => "BitemporalDelta",
        }
    }
}

/// Audit stamping for nontemporal loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Auditing {
    None,
    /// Stamp each inserted row with the planning-time instant.
    DateTime { field: String },
}

/// Which columns mark a row's processing-time validity window and how the
/// current batch id / timestamp is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionMilestoning {
    /// Paired batch-id columns; the next id is `max(ledger) + 1`.
    BatchId {
        in_column: String,
        out_column: String,
    },
    /// Paired timestamp columns stamped from the injected clock.
    DateTime {
        in_column: String,
        out_column: String,
    },
    /// Both pairs, stamped atomically from the same planning call.
    BatchIdAndDateTime {
        batch_in_column: String,
        batch_out_column: String,
        time_in_column: String,
        time_out_column: String,
    },
}

impl TransactionMilestoning {
    /// Whether this milestoning derives a batch id from the metadata ledger.
    pub fn uses_batch_id(&self) -> bool {
        matches!(
            self,
            TransactionMilestoning::BatchId { .. }
                | TransactionMilestoning::BatchIdAndDateTime { .. }
        )
    }

    /// Milestoning columns the main schema must declare.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            TransactionMilestoning::BatchId {
                in_column,
                out_column,
            }
            | TransactionMilestoning::DateTime {
                in_column,
                out_column,
            } => vec![in_column, out_column],
            TransactionMilestoning::BatchIdAndDateTime {
                batch_in_column,
                batch_out_column,
                time_in_column,
                time_out_column,
            } => vec![
                batch_in_column,
                batch_out_column,
                time_in_column,
                time_out_column,
            ],
        }
    }
}

/// The bitemporal valid-time dimension, independent of transaction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityMilestoning {
    /// Main-table column holding the validity window start.
    pub start_column: String,
    /// Main-table column holding the validity window end.
    pub end_column: String,
    pub derivation: ValidityDerivation,
}

/// How staging supplies the validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidityDerivation {
    /// Staging carries both boundaries.
    SourceSpecifiesFromAndThrough {
        from_field: String,
        through_field: String,
    },
    /// Staging carries only "from"; "through" is derived as the next
    /// row's "from" for the same key, open-ended until superseded.
    SourceSpecifiesFromOnly { from_field: String },
}

impl ValidityDerivation {
    pub fn from_field(&self) -> &str {
        match self {
            ValidityDerivation::SourceSpecifiesFromAndThrough { from_field, .. } => from_field,
            ValidityDerivation::SourceSpecifiesFromOnly { from_field } => from_field,
        }
    }
}

/// Version handling within one staging batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Deduplication {
    /// Collapse exact duplicates (`SELECT DISTINCT`).
    AnyVersion,
    /// Keep, per key, only the row with the greatest version.
    MaxVersion { version_field: String },
    /// Every version is ingested; requires data splits so each version
    /// lands in its own sequential pass.
    AllVersions,
}

/// Rows flagged with one of `delete_values` in `field` close the open
/// main row without opening a replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteIndicator {
    pub field: String,
    pub delete_values: Vec<String>,
}

/// Delta-mode composition of deduplication and delete handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStrategy {
    pub deduplication: Deduplication,
    pub delete_indicator: Option<DeleteIndicator>,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy {
            deduplication: Deduplication::AnyVersion,
            delete_indicator: None,
        }
    }
}

/// Snapshot closure scope: only keys within a partition present in
/// staging are eligible for closure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partitioning {
    pub fields: Vec<String>,
}

/// What an empty staging batch does to a snapshot target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyDatasetHandling {
    /// Close nothing: the close statement is guarded on staging being
    /// non-empty (per partition when partitioned).
    NoOp,
    /// Close every open row not re-asserted by staging, even when staging
    /// is empty.
    CloseAll,
}

/// Identifier case conversion applied before plan construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaseConversion {
    #[default]
    None,
    ToUpper,
    ToLower,
}

impl CaseConversion {
    pub fn apply(&self, ident: &str) -> String {
        match self {
            CaseConversion::None => ident.to_string(),
            CaseConversion::ToUpper => ident.to_uppercase(),
            CaseConversion::ToLower => ident.to_lowercase(),
        }
    }
}

/// Ordered, non-overlapping sub-partitions of one staging batch,
/// processed strictly in ascending range order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSplits {
    /// Staging column holding the split ordinal.
    pub field: String,
    /// Inclusive `(lo, hi)` ranges.
    pub ranges: Vec<(i64, i64)>,
}

/// Planner knobs orthogonal to the ingest mode.
#[derive(Debug, Clone, Default)]
pub struct PlannerOptions {
    /// Prefix the plan with a staging row count recorded as
    /// `incoming_records`.
    pub collect_statistics: bool,
    pub case_conversion: CaseConversion,
    pub data_splits: Option<DataSplits>,
    /// Capabilities of the target sink the planner may exploit
    /// (e.g. emitting `Merge` instead of paired updates).
    pub capabilities: HashSet<Capability>,
    /// Emit `CREATE TABLE IF NOT EXISTS` for the target (and ledger)
    /// ahead of the milestoning statements.
    pub create_datasets: bool,
}

impl PlannerOptions {
    pub fn new() -> PlannerOptions {
        PlannerOptions {
            create_datasets: true,
            ..Default::default()
        }
    }
}
