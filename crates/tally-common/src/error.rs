//! Error types for TallyDB.

use thiserror::Error;

/// Result type alias using TallyError.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Broad classification of a [`TallyError`].
///
/// Callers branch on the kind rather than on individual variants when they
/// only need to know whether a failure was their fault, a rejected write, a
/// missing object, or a broken engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required argument was absent or empty.
    Precondition,
    /// The operation would violate a key, schema or record constraint.
    Constraint,
    /// A named table, column or index does not exist.
    NotFound,
    /// An internal invariant does not hold.
    Internal,
}

/// Errors that can occur in TallyDB operations.
#[derive(Debug, Error)]
pub enum TallyError {
    // Precondition errors
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    // B+ tree errors
    #[error("Duplicate key")]
    DuplicateKey,

    #[error("B+ tree corrupted: {0}")]
    BTreeCorrupted(String),

    // Schema errors
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    // Record errors
    #[error("Null value not allowed in column {column}")]
    NullNotAllowed { column: String },

    #[error("Type mismatch in column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Unique constraint violated on column {column}")]
    UniqueViolation { column: String },

    #[error("Record has a value for unknown column {column}")]
    UnknownColumn { column: String },

    // Catalog errors
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists on {table}.{column}")]
    IndexAlreadyExists { table: String, column: String },

    // Configuration errors
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}

impl TallyError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TallyError::MissingArgument(_) => ErrorKind::Precondition,

            TallyError::DuplicateKey
            | TallyError::InvalidSchema(_)
            | TallyError::DuplicateColumn(_)
            | TallyError::NullNotAllowed { .. }
            | TallyError::TypeMismatch { .. }
            | TallyError::UniqueViolation { .. }
            | TallyError::UnknownColumn { .. }
            | TallyError::TableAlreadyExists(_)
            | TallyError::IndexAlreadyExists { .. }
            | TallyError::InvalidParameter { .. } => ErrorKind::Constraint,

            TallyError::TableNotFound(_)
            | TallyError::ColumnNotFound(_)
            | TallyError::IndexNotFound(_) => ErrorKind::NotFound,

            TallyError::BTreeCorrupted(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the error was raised by a rejected write or definition.
    pub fn is_constraint_violation(&self) -> bool {
        self.kind() == ErrorKind::Constraint
    }

    /// Returns true if a named catalog object could not be found.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
