//! The delete operator.

use crate::executor::Executor;
use strata::buffer_pool::BufferPool;
use strata::error::DbError;
use strata::transaction::TransactionId;
use strata::tuple::{Field, FieldType, Tuple, TupleDesc};

/// Deletes every tuple its child produces, addressed by record id, through
/// the buffer pool. Yields a single one-field count tuple, then `None`.
pub struct DeleteExecutor<'a> {
    pool: &'a BufferPool,
    tid: TransactionId,
    child: Box<dyn Executor + 'a>,
    td: TupleDesc,
    done: bool,
}

impl<'a> DeleteExecutor<'a> {
    pub fn new(pool: &'a BufferPool, tid: TransactionId, child: Box<dyn Executor + 'a>) -> Self {
        Self {
            pool,
            tid,
            child,
            td: TupleDesc::new(vec![(FieldType::Int, "count")]),
            done: false,
        }
    }
}

impl Executor for DeleteExecutor<'_> {
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
            self.pool.delete_tuple(self.tid, &tuple)?;
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
