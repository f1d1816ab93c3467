//! Column definitions.

use serde::{Deserialize, Serialize};
use tally_common::DataType;

/// Definition of a single table column.
///
/// Columns are nullable and non-unique unless stated otherwise. Marking a
/// column as the primary key also makes it non-nullable and unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
}

impl ColumnDefinition {
    /// Creates a nullable, non-unique column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            unique: false,
            primary_key: false,
        }
    }

    /// Disallows missing values.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Requires values to be distinct across rows.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks this column as the table's primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self.unique = true;
        self
    }
}
