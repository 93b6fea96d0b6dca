//! Ingest modes and the milestoning planner.
//!
//! The planner is the algorithmic heart of the crate:
//!
//! ```text
//! IngestMode + Datasets + PlannerOptions + Clock
//!       ↓
//! validation (fail fast, no partial plan)
//!       ↓
//! milestoning derivation (per mode, per data split)
//!       ↓
//! LogicalPlan (ordered, tagged relational operations)
//! ```
//!
//! It is a pure synchronous function of its arguments; all I/O concerns
//! (batch-id lookup, timestamps) are expressed as SQL subqueries or taken
//! from the injected clock.

pub mod mode;
pub mod planner;

mod delta;
mod nontemporal;
mod snapshot;

pub use mode::{
    Auditing, CaseConversion, DataSplits, DeleteIndicator, Deduplication, EmptyDatasetHandling,
    IngestMode, MergeStrategy, Partitioning, PlannerOptions, TransactionMilestoning,
    ValidityDerivation, ValidityMilestoning,
};
pub use planner::{
    batch_metadata_dataset, max_batch_id_selection, plan, plan_show_tables, plan_staging_load,
    INFINITE_BATCH_ID, INFINITE_TIMESTAMP,
};
