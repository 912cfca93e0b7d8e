//! The before/after-image log file.
//!
//! The buffer pool appends an [`LogRecord::Update`] for a page before that
//! page can reach disk, and [`LogFile::force`] makes everything appended so
//! far durable. Replay itself belongs to an external recovery manager; this
//! module only guarantees the records are on disk and checksummed.

use crate::page::PageId;
use crate::transaction::TransactionId;
use crc32fast::Hasher;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A log sequence number: the byte offset of a record in the log file.
pub type Lsn = u64;

/// Bytes of the per-record header: payload length and CRC.
const RECORD_HEADER_LEN: usize = 8;

/// A single record in the log.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum LogRecord {
    /// Before and after images of one page touched by a transaction.
    Update {
        tid: TransactionId,
        pid: PageId,
        before_image: Vec<u8>,
        after_image: Vec<u8>,
    },
}

/// The log manager.
pub struct LogFile {
    file: Mutex<File>,
    next_lsn: AtomicU64,
    flushed_lsn: AtomicU64,
    fail_force: AtomicBool,
}

impl LogFile {
    /// Opens (or creates) the log file and positions the append cursor at
    /// its end.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
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
        let len = file.metadata()?.len();

        Ok(Self {
            file: Mutex::new(file),
            next_lsn: AtomicU64::new(len),
            flushed_lsn: AtomicU64::new(len),
            fail_force: AtomicBool::new(false),
        })
    }

    /// Makes every subsequent `force` fail. Test harness use only.
    pub fn fail_force(&self, fail: bool) {
        self.fail_force.store(fail, Ordering::SeqCst);
    }

    /// Appends an update record and returns its LSN. The record is not
    /// durable until the next [`force`](Self::force).
    pub fn log_write(
        &self,
        tid: TransactionId,
        pid: PageId,
        before_image: &[u8],
        after_image: &[u8],
    ) -> io::Result<Lsn> {
        crate::strata_debug_log!("[LogFile::log_write] {tid} page {pid}");
        self.append(&LogRecord::Update {
            tid,
            pid,
            before_image: before_image.to_vec(),
            after_image: after_image.to_vec(),
        })
    }

    fn append(&self, record: &LogRecord) -> io::Result<Lsn> {
        let payload = bincode::serialize(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let total_len = (RECORD_HEADER_LEN + payload.len()) as u64;
        let lsn = self.next_lsn.fetch_add(total_len, Ordering::SeqCst);

        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(lsn))?;
        file.write_all(&(payload.len() as u32).to_be_bytes())?;
        file.write_all(&crc.to_be_bytes())?;
        file.write_all(&payload)?;
        Ok(lsn)
    }

    /// Flushes the log to durable storage.
    pub fn force(&self) -> io::Result<()> {
        if self.fail_force.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected force failure"));
        }
        let file = self.file.lock().unwrap();
        file.sync_all()?;
        let durable = file.metadata()?.len();
        self.flushed_lsn.store(durable, Ordering::SeqCst);
        Ok(())
    }

    /// Everything below this offset has been forced to disk.
    pub fn flushed_lsn(&self) -> Lsn {
        self.flushed_lsn.load(Ordering::SeqCst)
    }

    /// Scans the whole log, verifying each record's checksum. Used by tests
    /// and by external recovery tooling.
    pub fn read_records(&self) -> io::Result<Vec<LogRecord>> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        drop(file);

        let mut records = Vec::new();
        let mut pos = 0;
        while pos + RECORD_HEADER_LEN <= buf.len() {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&buf[pos..pos + 4]);
            let payload_len = u32::from_be_bytes(raw) as usize;
            raw.copy_from_slice(&buf[pos + 4..pos + 8]);
            let crc = u32::from_be_bytes(raw);

            let start = pos + RECORD_HEADER_LEN;
            let end = start + payload_len;
            if end > buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated log record",
                ));
            }
            let payload = &buf[start..end];

            let mut hasher = Hasher::new();
            hasher.update(payload);
            if hasher.finalize() != crc {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "log record CRC mismatch",
                ));
            }

            let record = bincode::deserialize(payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            records.push(record);
            pos = end;
        }
        Ok(records)
    }
}
