//! # Rhea
//! Iteration operators over the strata storage engine, and the glue that
//! wires one database instance together.

use std::path::Path;
use std::sync::Arc;
use strata::buffer_pool::{BufferPool, DEFAULT_PAGES};
use strata::catalog::Catalog;
use strata::error::DbError;
use strata::log::LogFile;

pub mod aggregate;
pub mod delete;
pub mod executor;
pub mod insert;
pub mod scan;

/// One database instance: catalog, log, and buffer pool wired together.
/// Everything is handed around by `Arc`; there is no process-global state.
pub struct Database {
    pub catalog: Arc<Catalog>,
    pub log: Arc<LogFile>,
    pub pool: Arc<BufferPool>,
}

impl Database {
    /// Opens a database rooted at `dir` with the default pool capacity.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, DbError> {
        Self::with_capacity(dir, DEFAULT_PAGES)
    }

    pub fn with_capacity<P: AsRef<Path>>(dir: P, capacity: usize) -> Result<Self, DbError> {
        let catalog = Arc::new(Catalog::new());
        let log = Arc::new(LogFile::open(dir.as_ref().join("rhea.log"))?);
        let pool = Arc::new(BufferPool::new(capacity, catalog.clone(), log.clone()));
        Ok(Self { catalog, log, pool })
    }
}
