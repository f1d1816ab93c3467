//! TallyDB common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all TallyDB components.

pub mod config;
pub mod error;
pub mod record;
pub mod types;

pub use config::{RegistryConfig, TreeConfig, DEFAULT_TREE_ORDER, MIN_TREE_ORDER};
pub use error::{ErrorKind, Result, TallyError};
pub use record::Record;
pub use types::{DataType, IndexKey, Value};
