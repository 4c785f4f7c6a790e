//! Record format error types.

use crate::access::value::TypeId;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("{what} magic number mismatch: expected {expected}, found {actual}")]
    MagicMismatch {
        what: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("Buffer too short: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("Unknown type id: {0}")]
    UnknownType(u8),

    #[error("Field of type {actual:?} does not match column type {expected:?}")]
    TypeMismatch { expected: TypeId, actual: TypeId },

    #[error("Row has {actual} fields but the schema has {expected} columns")]
    FieldCountMismatch { expected: usize, actual: usize },

    #[error("Value of {len} bytes exceeds column {column} length {max}")]
    ValueTooLong { column: String, len: usize, max: u32 },

    #[error("Column index {0} is out of range")]
    ColumnOutOfRange(usize),

    #[error("Invalid UTF-8 in char field")]
    InvalidUtf8,
}

pub type RecordResult<T> = Result<T, RecordError>;
