//! Table schemas and record validation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use tally_common::{IndexKey, Record, Result, TallyError};

use crate::column::ColumnDefinition;

/// Immutable, ordered set of column definitions with exactly one primary key.
///
/// Built through [`Schema::builder`]; a schema that exists always has a
/// single primary-key column and unique, non-empty column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColumnDefinition>", into = "Vec<ColumnDefinition>")]
pub struct Schema {
    /// Columns in declaration order.
    columns: Vec<ColumnDefinition>,
    /// Column name -> position in `columns`.
    positions: HashMap<String, usize>,
    /// Position of the primary-key column.
    primary_key: usize,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Looks up a column by name in O(1).
    pub fn get_column(&self, name: &str) -> Result<&ColumnDefinition> {
        if name.is_empty() {
            return Err(TallyError::MissingArgument("column name"));
        }
        self.positions
            .get(name)
            .map(|&pos| &self.columns[pos])
            .ok_or_else(|| TallyError::ColumnNotFound(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn primary_key_column(&self) -> &ColumnDefinition {
        &self.columns[self.primary_key]
    }

    pub fn primary_key_column_name(&self) -> &str {
        &self.columns[self.primary_key].name
    }

    /// Checks a candidate record against every column definition.
    ///
    /// Reports the first problem found: a missing value for a non-nullable
    /// column, a value of the wrong type, or a value for a column the schema
    /// does not define. Uniqueness is not checked here.
    pub fn validate_record(&self, record: &Record) -> Result<()> {
        for column in &self.columns {
            match record.value(&column.name) {
                None if !column.nullable => {
                    return Err(TallyError::NullNotAllowed {
                        column: column.name.clone(),
                    });
                }
                None => {}
                Some(value) if !value.matches(column.data_type) => {
                    return Err(TallyError::TypeMismatch {
                        column: column.name.clone(),
                        expected: column.data_type.to_string(),
                        actual: value.type_name(),
                    });
                }
                Some(_) => {}
            }
        }

        if let Some(unknown) = record.columns().find(|name| !self.has_column(name)) {
            return Err(TallyError::UnknownColumn {
                column: unknown.to_string(),
            });
        }
        Ok(())
    }

    /// Returns true if `record` passes [`Schema::validate_record`].
    pub fn is_valid_record(&self, record: &Record) -> bool {
        self.validate_record(record).is_ok()
    }

    /// Extracts the primary-key value of a record as an index key.
    pub fn primary_key_of(&self, record: &Record) -> Result<IndexKey> {
        let column = self.primary_key_column();
        match record.value(&column.name) {
            Some(value) => IndexKey::try_from(value),
            None => Err(TallyError::NullNotAllowed {
                column: column.name.clone(),
            }),
        }
    }
}

impl TryFrom<Vec<ColumnDefinition>> for Schema {
    type Error = TallyError;

    fn try_from(columns: Vec<ColumnDefinition>) -> Result<Self> {
        SchemaBuilder { columns }.build()
    }
}

impl From<Schema> for Vec<ColumnDefinition> {
    fn from(schema: Schema) -> Self {
        schema.columns
    }
}

/// Accumulates column definitions for a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    columns: Vec<ColumnDefinition>,
}

impl SchemaBuilder {
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnDefinition>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Finalizes the schema.
    ///
    /// Fails unless exactly one column is the primary key and all column
    /// names are non-empty and distinct.
    pub fn build(self) -> Result<Schema> {
        let mut positions = HashMap::with_capacity(self.columns.len());
        let mut primary_keys = Vec::new();

        for (pos, column) in self.columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(TallyError::MissingArgument("column name"));
            }
            if positions.insert(column.name.clone(), pos).is_some() {
                return Err(TallyError::DuplicateColumn(column.name.clone()));
            }
            if column.primary_key {
                primary_keys.push(pos);
            }
        }

        let primary_key = match primary_keys.as_slice() {
            [pos] => *pos,
            [] => return Err(TallyError::InvalidSchema("no primary key column".to_string())),
            many => {
                let names: Vec<&str> = many.iter().map(|&p| self.columns[p].name.as_str()).collect();
                return Err(TallyError::InvalidSchema(format!(
                    "multiple primary key columns: {}",
                    names.join(", ")
                )));
            }
        };

        Ok(Schema {
            columns: self.columns,
            positions,
            primary_key,
        })
    }
}
