//! Access layer: everything that interprets page contents as records or index entries.
//!
//! - **TableHeap**: a table stored as a chain of slotted pages
//! - **Row** / **RowId**: records and their physical location
//! - **Schema** / **Column** / **Field**: the typed record format
//! - **BPlusTree**: a unique-key index over fixed-width keys
//!
//! Everything here talks to storage through the buffer pool; page ids are the only links
//! between pages.

pub mod btree;
pub mod error;
pub mod heap;
pub mod scan;
pub mod schema;
pub mod tuple;
pub mod value;

pub use btree::{BPlusTree, GenericKey, IndexIterator, IndexKey, IndexValue};
pub use error::{RecordError, RecordResult};
pub use heap::TableHeap;
pub use scan::TableIterator;
pub use schema::{Column, Schema};
pub use tuple::{Row, RowId};
pub use value::{Field, TypeId};
