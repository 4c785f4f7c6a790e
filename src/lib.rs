//! tidedb: a page-based storage engine.
//!
//! Layers, bottom up:
//! - [`storage`]: disk manager, buffer pool and page layouts
//! - [`access`]: record format, table heaps and the B+tree index
//! - [`catalog`]: tables and indexes persisted in the database file
//! - [`database`]: engine bootstrap and configuration

pub mod access;
pub mod catalog;
pub mod database;
pub mod storage;
