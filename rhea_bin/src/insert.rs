//! The insert operator.

use crate::executor::Executor;
use strata::buffer_pool::BufferPool;
use strata::error::DbError;
use strata::transaction::TransactionId;
use strata::tuple::{Field, FieldType, Tuple, TupleDesc};

/// Drains its child into a table through the buffer pool. Yields a single
/// one-field tuple holding the number of rows inserted, then `None`.
pub struct InsertExecutor<'a> {
    pool: &'a BufferPool,
    tid: TransactionId,
    table_id: u32,
    child: Box<dyn Executor + 'a>,
    td: TupleDesc,
    done: bool,
}

impl<'a> std::fmt::Debug for InsertExecutor<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertExecutor")
            .field("tid", &self.tid)
            .field("table_id", &self.table_id)
            .field("td", &self.td)
            .field("done", &self.done)
            .finish()
    }
}

impl<'a> InsertExecutor<'a> {
    pub fn new(
        pool: &'a BufferPool,
        tid: TransactionId,
        table_id: u32,
        child: Box<dyn Executor + 'a>,
    ) -> Result<Self, DbError> {
        let table_td = pool.catalog().tuple_desc(table_id)?;
        if !child.tuple_desc().matches(&table_td) {
            return Err(DbError::SchemaMismatch(format!(
                "child schema [{}] does not fit table schema [{table_td}]",
                child.tuple_desc()
            )));
        }
        Ok(Self {
            pool,
            tid,
            table_id,
            child,
            td: TupleDesc::new(vec![(FieldType::Int, "count")]),
            done: false,
        })
    }
}

impl Executor for InsertExecutor<'_> {
    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut count = 0;
        while let Some(tuple) = self.child.next()? {
            self.pool.insert_tuple(self.tid, self.table_id, tuple)?;
            count += 1;
        }
        Ok(Some(Tuple::new(self.td.clone(), vec![Field::Int(count)])?))
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        self.child.rewind()?;
        self.done = false;
        Ok(())
    }
}
