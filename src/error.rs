use thiserror::Error;

use crate::dataset::RowId;

/// Errors raised while reading the tabular input.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Row limit exceeded: only {limit} rows allowed")]
    RowLimitExceeded { limit: usize },

    /// `size` is the file length, or for streams the bytes read before the cap tripped.
    #[error("Input of {size} bytes exceeds the {limit} byte limit")]
    InputTooLarge { size: u64, limit: u64 },

    #[error("Malformed input: {detail}")]
    MalformedInput { detail: String },
}

impl ParseError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        ParseError::MalformedInput {
            detail: detail.into(),
        }
    }
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::malformed(err.to_string())
    }
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        ParseError::malformed(err.to_string())
    }
}

/// Structural problems in the schema or the mapping set.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Field '{target_key}' is mapped more than once")]
    MappingConflict { target_key: String },

    #[error("Required field(s) not mapped: {}", missing_fields.join(", "))]
    MappingIncomplete { missing_fields: Vec<String> },

    #[error("Field '{field}' has unknown type '{type_name}'. Supported types: {supported}")]
    UnknownFieldType {
        field: String,
        type_name: String,
        supported: String,
    },

    #[error("Column '{column}' is mapped to undeclared field '{target_key}'")]
    UnknownTarget { column: String, target_key: String },

    #[error("Column '{column}' does not exist in the input")]
    UnknownColumn { column: String },

    #[error("Column '{column}' cannot be kept as a custom field: custom fields are disabled")]
    CustomFieldsDisabled { column: String },

    #[error("Field key '{key}' is declared more than once")]
    DuplicateField { key: String },

    #[error("Invalid pattern for field '{field}': {detail}")]
    InvalidPattern { field: String, detail: String },

    #[error("Invalid expression for field '{field}': {detail}")]
    InvalidExpression { field: String, detail: String },
}

/// Errors raised by edits or deletes addressed at a [`Dataset`](crate::dataset::Dataset).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("Row {0} does not exist")]
    UnknownRow(RowId),

    #[error("Field '{0}' is not part of the mapped dataset")]
    UnknownField(String),

    #[error("Dataset has already been finalized")]
    AlreadyFinalized,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FinalizeError {
    #[error("{count} row(s) still carry error diagnostics")]
    UnresolvedErrors { count: usize },

    #[error("Dataset has already been finalized")]
    AlreadyFinalized,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
