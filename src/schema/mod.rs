//! Vendor-neutral schema model.
//!
//! `DataType` classifies column types into families and answers the
//! comparability questions the planner relies on; `Field` and `Dataset`
//! are immutable value objects describing tables the way the caller (or
//! schema introspection) declared them.

pub mod dataset;
pub mod types;

pub use dataset::{Dataset, DatasetReference, Datasets, Field, SchemaReference};
pub use types::{DataType, TypeFamily};
