use crate::access::{Row, RowId, Schema};
use crate::catalog::{Catalog, IndexInfo, NodeSizes, TableInfo};
use crate::storage::buffer::lru::LruReplacer;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::disk::{DiskManager, DiskMetaSnapshot};
use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Number of frames in the buffer pool.
    pub buffer_pool_size: usize,
    /// Leaf split threshold for every index; page-derived when unset.
    pub leaf_max_size: Option<usize>,
    /// Internal node split threshold for every index; page-derived when unset.
    pub internal_max_size: Option<usize>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 64,
            leaf_max_size: None,
            internal_max_size: None,
        }
    }
}

impl DatabaseConfig {
    pub fn with_buffer_pool_size(mut self, frames: usize) -> Self {
        self.buffer_pool_size = frames;
        self
    }

    pub fn with_leaf_max_size(mut self, size: usize) -> Self {
        self.leaf_max_size = Some(size);
        self
    }

    pub fn with_internal_max_size(mut self, size: usize) -> Self {
        self.internal_max_size = Some(size);
        self
    }

    fn node_sizes(&self) -> NodeSizes {
        NodeSizes {
            leaf_max_size: self.leaf_max_size,
            internal_max_size: self.internal_max_size,
        }
    }

    fn buffer_pool(&self, disk: DiskManager) -> Result<BufferPoolManager> {
        ensure!(self.buffer_pool_size > 0, "buffer pool needs at least one frame");
        let replacer = Box::new(LruReplacer::new(self.buffer_pool_size));
        Ok(BufferPoolManager::new(disk, replacer, self.buffer_pool_size))
    }
}

/// High-level database interface that integrates all layers
pub struct Database {
    buffer_pool: BufferPoolManager,
    catalog: Catalog,
}

impl Database {
    /// Create a new database at the specified path
    pub fn create(path: &Path, config: DatabaseConfig) -> Result<Self> {
        // Check if database already exists
        if path.exists() {
            bail!("Database file already exists at {:?}", path);
        }

        let buffer_pool = config.buffer_pool(DiskManager::create(path)?)?;
        let catalog = Catalog::initialize(buffer_pool.clone(), config.node_sizes())?;

        Ok(Self {
            buffer_pool,
            catalog,
        })
    }

    /// Open an existing database
    pub fn open(path: &Path, config: DatabaseConfig) -> Result<Self> {
        // Check if database exists
        if !path.exists() {
            bail!("Database file does not exist at {:?}", path);
        }

        let buffer_pool = config.buffer_pool(DiskManager::open(path)?)?;
        let catalog = Catalog::open(buffer_pool.clone(), config.node_sizes())?;

        Ok(Self {
            buffer_pool,
            catalog,
        })
    }

    /// Open the database at `path`, creating it first if needed
    pub fn open_or_create(path: &Path, config: DatabaseConfig) -> Result<Self> {
        if path.exists() {
            Self::open(path, config)
        } else {
            Self::create(path, config)
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.buffer_pool
    }

    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<&TableInfo> {
        self.catalog.create_table(name, schema)
    }

    pub fn create_index(&mut self, table: &str, index: &str, columns: &[&str]) -> Result<&IndexInfo> {
        self.catalog.create_index(table, index, columns)
    }

    /// Insert a row into a table and all of its indexes
    pub fn insert(&mut self, table: &str, row: &mut Row) -> Result<RowId> {
        self.catalog.insert_row(table, row)
    }

    /// List all tables in the database
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog
            .tables()
            .into_iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    pub fn disk_meta(&self) -> DiskMetaSnapshot {
        self.buffer_pool.disk_meta()
    }

    /// Flush all dirty pages to disk
    pub fn flush(&self) -> Result<()> {
        self.buffer_pool.flush_all_pages()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Best effort flush on drop
        if let Err(e) = self.flush() {
            log::error!("flush on close failed: {:#}", e);
        }
    }
}
