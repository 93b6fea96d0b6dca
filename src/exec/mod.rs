//! Executing rendered plans against a live sink.
//!
//! The unit here is the whole `SqlPlan`: statements run in order, each
//! failure carries its plan position, and affected-row counts fold into
//! [`IngestStatistics`] by statement tag.

pub mod client;
pub mod executor;
pub mod postgres;

pub use client::{SchemaIntrospector, SqlClient, TabularResult};
pub use executor::{
    dataset_exists, ingest, validate_main_dataset_schema, Executor, IngestStatistics,
};
