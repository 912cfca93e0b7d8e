//! The buffer pool: the page cache and the only safe gateway to stored
//! pages.
//!
//! Every fetch goes through the lock manager first; only then does the pool
//! touch its cache, reading through the catalog's file on a miss and
//! evicting a random victim under capacity pressure. Dirty pages may reach
//! disk before their transaction commits (STEAL) because every flush of a
//! live transaction's page logs the before/after images first; commit forces
//! only the log, never the pages (NO-FORCE).

use crate::catalog::Catalog;
use crate::error::DbError;
use crate::heap_file::DbFile;
use crate::lock_manager::{LockManager, LockMode};
use crate::log::LogFile;
use crate::page::{HeapPage, PageId};
use crate::transaction::{Permission, TransactionId};
use crate::tuple::Tuple;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Bytes per page, including the slot header.
const DEFAULT_PAGE_SIZE: usize = 4096;

/// Pages a pool caches when the caller does not choose a capacity.
pub const DEFAULT_PAGES: usize = 50;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// A cached page, shared by reference with callers. The convention the core
/// relies on: mutate only while holding an exclusive page lock, read only
/// while holding any lock.
pub type SharedPage = Arc<RwLock<HeapPage>>;

pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    log: Arc<LogFile>,
    lock_manager: LockManager,
    cache: Mutex<HashMap<PageId, SharedPage>>,
}

impl BufferPool {
    pub fn new(capacity: usize, catalog: Arc<Catalog>, log: Arc<LogFile>) -> Self {
        Self {
            capacity,
            catalog,
            log,
            lock_manager: LockManager::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn page_size() -> usize {
        PAGE_SIZE.load(Ordering::SeqCst)
    }

    /// Overrides the process-wide page size. Test harness use only.
    pub fn set_page_size(page_size: usize) {
        PAGE_SIZE.store(page_size, Ordering::SeqCst);
    }

    /// Restores the default page size. Test harness use only.
    pub fn reset_page_size() {
        PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::SeqCst);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Number of pages currently cached. Never exceeds the capacity after a
    /// public call returns.
    pub fn cached_pages(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// Fetches a page with the requested permission.
    ///
    /// Blocks until the page lock is granted and fails with
    /// [`DbError::TransactionAborted`] when the wait would deadlock. The
    /// lock is taken before the cache monitor, so a blocked fetch never
    /// stalls other pool traffic.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> Result<SharedPage, DbError> {
        self.lock_manager.acquire(pid, tid, perm)?;

        let mut cache = self.cache.lock().unwrap();
        if let Some(page) = cache.get(&pid) {
            return Ok(page.clone());
        }

        let file = self.catalog.get_file(pid.table_id)?;
        let page = file.read_page(pid)?;
        if cache.len() >= self.capacity {
            self.evict(&mut cache)?;
        }
        let shared: SharedPage = Arc::new(RwLock::new(page));
        cache.insert(pid, shared.clone());
        crate::strata_debug_log!("[BufferPool::get_page] miss on {pid}, cached");
        Ok(shared)
    }

    /// Early release of one page lock. Advisory: safe only for pages the
    /// transaction used read-only.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(pid, tid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds(pid, tid, LockMode::Any)
    }

    /// Adds a tuple to a table on behalf of `tid`, write-locking every page
    /// the table's file touches and marking each dirty.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: u32,
        tuple: Tuple,
    ) -> Result<(), DbError> {
        let file = self.catalog.get_file(table_id)?;
        let touched = file.insert_tuple(tid, tuple, self)?;
        self.admit_dirty(tid, touched)
    }

    /// Removes a stored tuple on behalf of `tid`; the owning table comes
    /// from the tuple's record id.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<(), DbError> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::InvalidPage("tuple has no record id".to_string()))?;
        let file = self.catalog.get_file(rid.pid.table_id)?;
        let touched = file.delete_tuple(tid, tuple, self)?;
        self.admit_dirty(tid, touched)
    }

    fn admit_dirty(&self, tid: TransactionId, pages: Vec<SharedPage>) -> Result<(), DbError> {
        let mut cache = self.cache.lock().unwrap();
        for shared in pages {
            let pid = {
                let mut page = shared.write();
                page.mark_dirty(Some(tid));
                page.id()
            };
            if !cache.contains_key(&pid) && cache.len() >= self.capacity {
                self.evict(&mut cache)?;
            }
            cache.insert(pid, shared.clone());
        }
        Ok(())
    }

    /// Commits or aborts `tid`, then releases all of its locks exactly once.
    ///
    /// Abort drops the transaction's dirty pages from the cache without
    /// writing anything. Commit appends before/after images for the cached
    /// pages and forces the log before any lock is released; the pages
    /// themselves stay in memory, dirty markers intact, until a later flush.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<(), DbError> {
        {
            let mut cache = self.cache.lock().unwrap();
            if commit {
                for (pid, shared) in cache.iter() {
                    let mut page = shared.write();
                    let after = page.serialize();
                    self.log.log_write(tid, *pid, page.before_image(), &after)?;
                    self.log.force()?;
                    page.set_before_image();
                }
            } else {
                cache.retain(|_, shared| shared.read().is_dirty() != Some(tid));
            }
        }
        self.lock_manager.release_all(tid);
        crate::strata_debug_log!(
            "[BufferPool::transaction_complete] {tid} {}",
            if commit { "committed" } else { "aborted" }
        );
        Ok(())
    }

    /// Writes every cached dirty page through to disk.
    pub fn flush_all(&self) -> Result<(), DbError> {
        let cache = self.cache.lock().unwrap();
        let pids: Vec<PageId> = cache.keys().copied().collect();
        for pid in pids {
            self.flush_locked(&cache, pid)?;
        }
        Ok(())
    }

    /// Writes every page dirtied by `tid` through to disk.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<(), DbError> {
        let cache = self.cache.lock().unwrap();
        let pids: Vec<PageId> = cache
            .iter()
            .filter(|(_, shared)| shared.read().is_dirty() == Some(tid))
            .map(|(pid, _)| *pid)
            .collect();
        for pid in pids {
            self.flush_locked(&cache, pid)?;
        }
        Ok(())
    }

    pub fn flush_page(&self, pid: PageId) -> Result<(), DbError> {
        let cache = self.cache.lock().unwrap();
        self.flush_locked(&cache, pid)
    }

    /// Writes one cached page to disk if dirty. When the dirtying
    /// transaction still holds any lock on the page it is live, so the
    /// before/after images go to the log and the log is forced before the
    /// data write.
    fn flush_locked(
        &self,
        cache: &HashMap<PageId, SharedPage>,
        pid: PageId,
    ) -> Result<(), DbError> {
        let Some(shared) = cache.get(&pid) else {
            return Ok(());
        };
        let mut page = shared.write();
        let Some(dirtier) = page.is_dirty() else {
            return Ok(());
        };

        let file = self.catalog.get_file(pid.table_id)?;
        let after = page.serialize();
        if self.lock_manager.holds(pid, dirtier, LockMode::Any) {
            self.log.log_write(dirtier, pid, page.before_image(), &after)?;
            self.log.force()?;
        }
        file.write_page(&page)?;
        page.mark_dirty(None);
        crate::strata_debug_log!("[BufferPool::flush] wrote {pid}");
        Ok(())
    }

    /// Drops a page from the cache without writing it. Used by abort, and by
    /// external recovery logic to evict rolled-back pages.
    pub fn discard_page(&self, pid: PageId) {
        self.cache.lock().unwrap().remove(&pid);
    }

    /// Evicts one entry chosen uniformly at random, flushing it first.
    /// Dirty pages are fair game; the flush's log record keeps them
    /// recoverable. A victim that cannot be flushed is irrecoverable here.
    fn evict(&self, cache: &mut HashMap<PageId, SharedPage>) -> Result<(), DbError> {
        if cache.is_empty() {
            return Err(DbError::Storage("no page available to evict".to_string()));
        }
        let index = rand::thread_rng().gen_range(0..cache.len());
        let Some(pid) = cache.keys().nth(index).copied() else {
            return Err(DbError::Storage("no page available to evict".to_string()));
        };

        self.flush_locked(cache, pid)
            .map_err(|e| DbError::Storage(format!("eviction flush of page {pid} failed: {e}")))?;
        cache.remove(&pid);
        crate::strata_debug_log!("[BufferPool::evict] evicted {pid}");
        Ok(())
    }
}
