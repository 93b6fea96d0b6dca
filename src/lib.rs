pub mod clock;
pub mod error;
pub mod exec;
pub mod ingest;
pub mod plan;
pub mod schema;
pub mod sink;

pub use error::{IngestError, Result};
