//! The slotted page layout: an occupancy bitmap followed by fixed-size
//! tuple slots.

use crate::buffer_pool::BufferPool;
use crate::error::DbError;
use crate::transaction::TransactionId;
use crate::tuple::{RecordId, Tuple, TupleDesc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a page: the owning table and the page's position in that
/// table's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: u32,
    pub page_no: usize,
}

impl PageId {
    pub fn new(table_id: u32, page_no: usize) -> Self {
        PageId { table_id, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// One page of a heap file.
///
/// A header bitmap records which slots hold a tuple; slots are laid out back
/// to back after the header, each exactly `TupleDesc::size()` bytes. The page
/// also carries the transactional bookkeeping the buffer pool observes: the
/// dirtying transaction, if any, and the byte image of the page at its last
/// stable point (load or commit).
#[derive(Debug)]
pub struct HeapPage {
    pid: PageId,
    td: TupleDesc,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtier: Option<TransactionId>,
    before_image: Vec<u8>,
}

impl HeapPage {
    /// Tuples a page can hold: each slot costs its tuple bytes plus one
    /// header bit.
    pub fn slots_per_page(td: &TupleDesc) -> usize {
        (BufferPool::page_size() * 8) / (td.size() * 8 + 1)
    }

    fn header_len(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// A page-sized run of zeroes: the on-disk form of a page with no tuples.
    pub fn empty_page_data() -> Vec<u8> {
        vec![0; BufferPool::page_size()]
    }

    pub fn parse(pid: PageId, td: TupleDesc, data: &[u8]) -> Result<Self, DbError> {
        let page_size = BufferPool::page_size();
        if data.len() != page_size {
            return Err(DbError::InvalidPage(format!(
                "page {pid} is {} bytes, expected {page_size}",
                data.len()
            )));
        }

        let num_slots = Self::slots_per_page(&td);
        let header_len = Self::header_len(num_slots);
        let tuple_size = td.size();
        let header = data[..header_len].to_vec();

        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) != 0 {
                let offset = header_len + slot * tuple_size;
                let mut tuple = Tuple::decode(&td, &data[offset..offset + tuple_size])?;
                tuple.set_record_id(Some(RecordId { pid, slot }));
                tuples.push(Some(tuple));
            } else {
                tuples.push(None);
            }
        }

        Ok(HeapPage {
            pid,
            td,
            header,
            tuples,
            dirtier: None,
            before_image: data.to_vec(),
        })
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![0u8; BufferPool::page_size()];
        let header_len = self.header.len();
        out[..header_len].copy_from_slice(&self.header);

        let tuple_size = self.td.size();
        for (slot, tuple) in self.tuples.iter().enumerate() {
            if let Some(tuple) = tuple {
                let offset = header_len + slot * tuple_size;
                out[offset..offset + tuple_size].copy_from_slice(&tuple.encode());
            }
        }
        out
    }

    fn slot_used(&self, slot: usize) -> bool {
        self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        if used {
            self.header[slot / 8] |= 1 << (slot % 8);
        } else {
            self.header[slot / 8] &= !(1 << (slot % 8));
        }
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_unused_slots(&self) -> usize {
        (0..self.tuples.len()).filter(|&s| !self.slot_used(s)).count()
    }

    /// Places a tuple in the first free slot and assigns its record id.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<RecordId, DbError> {
        if !tuple.tuple_desc().matches(&self.td) {
            return Err(DbError::SchemaMismatch(format!(
                "tuple [{}] does not fit page schema [{}]",
                tuple.tuple_desc(),
                self.td
            )));
        }

        let slot = (0..self.tuples.len())
            .find(|&s| !self.slot_used(s))
            .ok_or_else(|| DbError::Storage(format!("page {} has no free slot", self.pid)))?;

        let rid = RecordId {
            pid: self.pid,
            slot,
        };
        tuple.set_record_id(Some(rid));
        self.set_slot(slot, true);
        self.tuples[slot] = Some(tuple);
        Ok(rid)
    }

    pub fn delete_tuple(&mut self, rid: RecordId) -> Result<(), DbError> {
        if rid.pid != self.pid {
            return Err(DbError::InvalidPage(format!(
                "record {}/{} does not belong to page {}",
                rid.pid, rid.slot, self.pid
            )));
        }
        if rid.slot >= self.tuples.len() || !self.slot_used(rid.slot) {
            return Err(DbError::InvalidPage(format!(
                "slot {} of page {} holds no tuple",
                rid.slot, self.pid
            )));
        }
        self.set_slot(rid.slot, false);
        self.tuples[rid.slot] = None;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }

    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn mark_dirty(&mut self, dirtier: Option<TransactionId>) {
        self.dirtier = dirtier;
    }

    /// The page bytes as of the last stable point.
    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    /// Captures the current contents as the new stable point.
    pub fn set_before_image(&mut self) {
        self.before_image = self.serialize();
    }
}
