//! Sequential table scan through the buffer pool.

use crate::executor::Executor;
use std::sync::Arc;
use strata::buffer_pool::BufferPool;
use strata::error::DbError;
use strata::heap_file::DbFile;
use strata::page::PageId;
use strata::transaction::{Permission, TransactionId};
use strata::tuple::{Tuple, TupleDesc};

/// Reads a table front to back, fetching each page read-only through the
/// pool so the scan participates in page locking like everyone else.
pub struct SeqScanExecutor<'a> {
    pool: &'a BufferPool,
    tid: TransactionId,
    table_id: u32,
    file: Arc<dyn DbFile>,
    td: TupleDesc,
    next_page: usize,
    buffered: std::vec::IntoIter<Tuple>,
}

impl<'a> SeqScanExecutor<'a> {
    pub fn new(pool: &'a BufferPool, tid: TransactionId, table_id: u32) -> Result<Self, DbError> {
        let file = pool.catalog().get_file(table_id)?;
        let td = file.tuple_desc().clone();
        Ok(Self {
            pool,
            tid,
            table_id,
            file,
            td,
            next_page: 0,
            buffered: Vec::new().into_iter(),
        })
    }
}

impl Executor for SeqScanExecutor<'_> {
    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            if let Some(tuple) = self.buffered.next() {
                return Ok(Some(tuple));
            }
            if self.next_page >= self.file.num_pages()? {
                return Ok(None);
            }

            let pid = PageId::new(self.table_id, self.next_page);
            self.next_page += 1;
            let shared = self.pool.get_page(self.tid, pid, Permission::ReadOnly)?;
            let tuples: Vec<Tuple> = shared.read().iter().cloned().collect();
            self.buffered = tuples.into_iter();
        }
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        self.next_page = 0;
        self.buffered = Vec::new().into_iter();
        Ok(())
    }
}
