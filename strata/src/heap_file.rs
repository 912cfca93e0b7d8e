//! Heap files: on-disk arrays of slotted pages, one file per table.

use crate::buffer_pool::{BufferPool, SharedPage};
use crate::error::DbError;
use crate::page::{HeapPage, PageId};
use crate::transaction::{Permission, TransactionId};
use crate::tuple::{Tuple, TupleDesc};
use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Capability interface through which the buffer pool and the operators
/// reach a table's storage.
pub trait DbFile: Send + Sync {
    /// Stable identifier of the table this file stores.
    fn id(&self) -> u32;

    fn tuple_desc(&self) -> &TupleDesc;

    /// Reads one page straight from disk. Reading past the end of the file
    /// is a caller bug and fails with [`DbError::InvalidPage`].
    fn read_page(&self, pid: PageId) -> Result<HeapPage, DbError>;

    fn write_page(&self, page: &HeapPage) -> Result<(), DbError>;

    fn num_pages(&self) -> Result<usize, DbError>;

    /// Places a tuple somewhere in the file, fetching candidate pages through
    /// the buffer pool with write permission. Returns every page it touched.
    fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<SharedPage>, DbError>;

    /// Removes a stored tuple, addressed by its record id, through the
    /// buffer pool. Returns every page it touched.
    fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<SharedPage>, DbError>;
}

/// A table stored as an unordered collection of pages in one file.
pub struct HeapFile {
    file: Mutex<File>,
    path: PathBuf,
    id: u32,
    td: TupleDesc,
    fail_writes: AtomicBool,
}

impl HeapFile {
    pub fn open<P: AsRef<Path>>(path: P, td: TupleDesc) -> Result<Self, DbError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;

        // The table id must be stable across re-opens of the same file, so
        // derive it from the canonical path.
        let path = std::fs::canonicalize(path_ref)?;
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let id = hasher.finish() as u32;
        crate::strata_debug_log!("[HeapFile::open] {} -> table {id}", path.display());

        Ok(Self {
            file: Mutex::new(file),
            path,
            id,
            td,
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Makes every subsequent `write_page` on this file fail. Test harness
    /// use only.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Appends a zeroed page to the end of the file and returns its id.
    fn extend(&self) -> Result<PageId, DbError> {
        let page_size = BufferPool::page_size();
        let mut file = self.file.lock().unwrap();
        let page_no = file.metadata()?.len() as usize / page_size;
        file.seek(SeekFrom::Start((page_no * page_size) as u64))?;
        file.write_all(&HeapPage::empty_page_data())?;
        crate::strata_debug_log!("[HeapFile::extend] table {} grew to page {page_no}", self.id);
        Ok(PageId::new(self.id, page_no))
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> u32 {
        self.id
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn read_page(&self, pid: PageId) -> Result<HeapPage, DbError> {
        if pid.table_id != self.id {
            return Err(DbError::InvalidPage(format!(
                "page {pid} does not belong to table {}",
                self.id
            )));
        }

        let page_size = BufferPool::page_size();
        let offset = (pid.page_no * page_size) as u64;
        let mut file = self.file.lock().unwrap();
        if offset >= file.metadata()?.len() {
            return Err(DbError::InvalidPage(format!(
                "page {pid} does not exist in {}",
                self.path.display()
            )));
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; page_size];
        let mut read = 0;
        while read < page_size {
            let n = file.read(&mut data[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        drop(file);
        crate::strata_debug_log!("[HeapFile::read_page] {pid} ({read} bytes)");

        HeapPage::parse(pid, self.td.clone(), &data)
    }

    fn write_page(&self, page: &HeapPage) -> Result<(), DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Io(io::Error::other("injected write failure")));
        }
        let page_size = BufferPool::page_size();
        let data = page.serialize();
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((page.id().page_no * page_size) as u64))?;
        file.write_all(&data)?;
        file.sync_all()?;
        crate::strata_debug_log!("[HeapFile::write_page] {}", page.id());
        Ok(())
    }

    fn num_pages(&self) -> Result<usize, DbError> {
        let len = self.file.lock().unwrap().metadata()?.len() as usize;
        Ok(len.div_ceil(BufferPool::page_size()))
    }

    fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<SharedPage>, DbError> {
        let mut pending = Some(tuple);
        for page_no in 0..self.num_pages()? {
            let pid = PageId::new(self.id, page_no);
            let shared = pool.get_page(tid, pid, Permission::ReadWrite)?;
            let mut page = shared.write();
            if page.num_unused_slots() > 0 {
                if let Some(tuple) = pending.take() {
                    page.insert_tuple(tuple)?;
                }
                drop(page);
                return Ok(vec![shared]);
            }
        }

        // Every existing page is full. The file lock is not held while the
        // new page goes through the pool.
        let pid = self.extend()?;
        let shared = pool.get_page(tid, pid, Permission::ReadWrite)?;
        if let Some(tuple) = pending.take() {
            shared.write().insert_tuple(tuple)?;
        }
        Ok(vec![shared])
    }

    fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<SharedPage>, DbError> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::InvalidPage("tuple has no record id".to_string()))?;
        let shared = pool.get_page(tid, rid.pid, Permission::ReadWrite)?;
        shared.write().delete_tuple(rid)?;
        Ok(vec![shared])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{Field, FieldType};
    use tempfile::tempdir;

    fn int_desc() -> TupleDesc {
        TupleDesc::new(vec![(FieldType::Int, "v")])
    }

    #[test]
    fn open_is_stable_across_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.dat");
        let a = HeapFile::open(&path, int_desc()).unwrap();
        let b = HeapFile::open(&path, int_desc()).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.num_pages().unwrap(), 0);
    }

    #[test]
    fn pages_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let file = HeapFile::open(dir.path().join("table.dat"), int_desc()).unwrap();

        let pid = file.extend().unwrap();
        let mut page = file.read_page(pid).unwrap();
        page.insert_tuple(Tuple::new(int_desc(), vec![Field::Int(99)]).unwrap())
            .unwrap();
        file.write_page(&page).unwrap();

        let reread = file.read_page(pid).unwrap();
        assert_eq!(reread.iter().count(), 1);
        assert_eq!(file.num_pages().unwrap(), 1);
    }

    #[test]
    fn reading_past_the_end_is_a_caller_bug() {
        let dir = tempdir().unwrap();
        let file = HeapFile::open(dir.path().join("table.dat"), int_desc()).unwrap();
        let err = file.read_page(PageId::new(file.id(), 0)).unwrap_err();
        assert!(matches!(err, DbError::InvalidPage(_)));
    }

    #[test]
    fn reading_a_foreign_page_id_is_rejected() {
        let dir = tempdir().unwrap();
        let file = HeapFile::open(dir.path().join("table.dat"), int_desc()).unwrap();
        let err = file
            .read_page(PageId::new(file.id().wrapping_add(1), 0))
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidPage(_)));
    }

    #[test]
    fn injected_write_failures_propagate() {
        let dir = tempdir().unwrap();
        let file = HeapFile::open(dir.path().join("table.dat"), int_desc()).unwrap();
        let pid = file.extend().unwrap();
        let page = file.read_page(pid).unwrap();

        file.fail_writes(true);
        assert!(matches!(file.write_page(&page), Err(DbError::Io(_))));
        file.fail_writes(false);
        file.write_page(&page).unwrap();
    }
}
