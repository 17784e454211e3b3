use rusqlite::ffi;
use thiserror::Error;

use crate::types::FieldType;

/// Sqliter Error type
#[derive(Debug, Error)]
pub enum SqliterError {
    #[error("No such table: {0}")]
    NoSuchTable(String),
    #[error("No entry in table {table} matching {lookup}")]
    NoSuchEntry { table: String, lookup: String },
    #[error("Multiple entries in table {table} match {lookup}")]
    MultipleEntries { table: String, lookup: String },
    #[error("Table {table} has no field {field}")]
    NoSuchField { table: String, field: String },
    #[error("Invalid field name: {0}")]
    InvalidFieldName(String),
    #[error("Unknown field type {declared:?} for column {table}.{column}")]
    UnknownFieldType {
        table: String,
        column: String,
        declared: String,
    },
    #[error("Foreign key error: {0}")]
    ForeignKey(String),
    #[error("Mismatching types for field {field}: expected {expected}, found {found}")]
    MismatchingTypes {
        field: String,
        expected: FieldType,
        found: &'static str,
    },
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    #[error("Invalid field descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("Table {table} must have exactly one primary key column, found {count}")]
    UnsupportedPrimaryKey { table: String, count: usize },
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Engine(rusqlite::Error),
}

/// Sqliter Result type
pub type SqliterResult<T> = Result<T, SqliterError>;

impl From<rusqlite::Error> for SqliterError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                SqliterError::ForeignKey(
                    message
                        .clone()
                        .unwrap_or_else(|| "FOREIGN KEY constraint failed".to_string()),
                )
            }
            _ => SqliterError::Engine(error),
        }
    }
}
