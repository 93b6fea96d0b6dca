//! Vendor-neutral logical plan.
//!
//! This is the single representation every sink must be able to render:
//! an ordered list of relational operations built from scalar `Value`
//! expressions. The model performs no I/O and makes no dialect-specific
//! decision; shape violations are rejected at construction.

pub mod ops;
pub mod values;

pub use ops::{
    Assignment, InsertSource, LogicalPlan, MatchedClause, NotMatchedClause, Operation, PlanStep,
    ShowKind, StatementTag,
};
pub use values::{BinaryOperator, Literal, Selection, SelectItem, Source, TabularValues, Value};
