//! Error types surfaced by the storage engine.

use crate::lock_manager::LockError;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum DbError {
    /// The calling transaction was picked as the victim of a deadlock.
    TransactionAborted,
    TableNotFound(u32),
    /// A page reference that cannot be satisfied: read past the end of a
    /// file, a record id pointing at the wrong page, malformed page bytes.
    InvalidPage(String),
    SchemaMismatch(String),
    Io(io::Error),
    /// Irrecoverable inside the engine, e.g. an eviction victim that could
    /// not be flushed.
    Storage(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::TransactionAborted => write!(f, "transaction aborted by deadlock detection"),
            DbError::TableNotFound(id) => write!(f, "no table with id {id} in the catalog"),
            DbError::InvalidPage(msg) => write!(f, "invalid page: {msg}"),
            DbError::SchemaMismatch(msg) => write!(f, "schema mismatch: {msg}"),
            DbError::Io(err) => write!(f, "io error: {err}"),
            DbError::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DbError {
    fn from(err: io::Error) -> Self {
        DbError::Io(err)
    }
}

impl From<LockError> for DbError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Deadlock => DbError::TransactionAborted,
        }
    }
}
