//! The operator interface and the in-memory tuple source.

use strata::error::DbError;
use strata::tuple::{Tuple, TupleDesc};

/// A pull-based operator: a stream of tuples with a fixed schema.
pub trait Executor {
    fn tuple_desc(&self) -> &TupleDesc;

    fn next(&mut self) -> Result<Option<Tuple>, DbError>;

    /// Restarts the stream from the beginning.
    fn rewind(&mut self) -> Result<(), DbError>;
}

/// Executor over a materialized list of tuples.
pub struct TupleIterator {
    td: TupleDesc,
    tuples: Vec<Tuple>,
    pos: usize,
}

impl TupleIterator {
    pub fn new(td: TupleDesc, tuples: Vec<Tuple>) -> Self {
        Self { td, tuples, pos: 0 }
    }
}

impl Executor for TupleIterator {
    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        let tuple = self.tuples.get(self.pos).cloned();
        if tuple.is_some() {
            self.pos += 1;
        }
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        self.pos = 0;
        Ok(())
    }
}
