//! Backend-agnostic checkpoint table, migrations and row operations shared by
//! the Postgres and SQLite checkpointers.

pub mod convert;
pub mod error;
pub mod migrations;
pub mod ops;
pub mod schema;

pub use error::CheckpointSqlError;
pub use ops::{CheckpointRow, StoredCheckpoint};
