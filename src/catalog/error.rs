//! Catalog error types.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CatalogError {
    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Index {index} already exists on table {table}")]
    IndexExists { table: String, index: String },

    #[error("Index {index} not found on table {table}")]
    IndexNotFound { table: String, index: String },

    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("Index key of {width} bytes exceeds the maximum of {max}")]
    KeyTooWide { width: usize, max: usize },

    #[error("Duplicate key in unique index {0}")]
    DuplicateKey(String),
}
