//! Table catalog for Tally.
//!
//! Schemas describe the columns of a table and validate candidate records.
//! The [`Registry`] owns every registered table together with its primary
//! index and any secondary indexes, and routes record writes through all of
//! them.

pub mod column;
pub mod registry;
pub mod schema;

pub use column::ColumnDefinition;
pub use registry::{PrimaryIndex, Registry, SecondaryIndex, TableEntry};
pub use schema::{Schema, SchemaBuilder};
