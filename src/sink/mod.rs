//! SQL synthesis and execution against the local store

pub mod schema;
pub mod writer;

pub use schema::{schema_for, TableSchema};
pub use writer::{build_upsert, SinkError, SinkWriter};
