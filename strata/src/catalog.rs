//! The table catalog: resolves a table identifier to its file and schema.

use crate::error::DbError;
use crate::heap_file::DbFile;
use crate::tuple::TupleDesc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct CatalogEntry {
    file: Arc<dyn DbFile>,
    name: String,
}

/// In-memory registry of the tables the engine knows about.
#[derive(Default)]
pub struct Catalog {
    tables: Mutex<HashMap<u32, CatalogEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table under a name, replacing any previous table with the
    /// same id or name. Returns the table id.
    pub fn add_table(&self, file: Arc<dyn DbFile>, name: &str) -> u32 {
        let id = file.id();
        let mut tables = self.tables.lock().unwrap();
        tables.retain(|_, entry| entry.name != name);
        tables.insert(
            id,
            CatalogEntry {
                file,
                name: name.to_string(),
            },
        );
        id
    }

    pub fn get_file(&self, table_id: u32) -> Result<Arc<dyn DbFile>, DbError> {
        self.tables
            .lock()
            .unwrap()
            .get(&table_id)
            .map(|entry| entry.file.clone())
            .ok_or(DbError::TableNotFound(table_id))
    }

    pub fn tuple_desc(&self, table_id: u32) -> Result<TupleDesc, DbError> {
        Ok(self.get_file(table_id)?.tuple_desc().clone())
    }

    pub fn table_id(&self, name: &str) -> Option<u32> {
        self.tables
            .lock()
            .unwrap()
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
    }
}
