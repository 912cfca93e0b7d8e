//! Page-level shared/exclusive locks with deadlock detection.
//!
//! All state lives under one monitor. A blocked `acquire` records its
//! dependencies in the waits-for graph, checks for a cycle, and parks on the
//! condition variable; every release broadcasts and every woken waiter
//! re-examines the grant conditions from scratch. Locks are two-phase: they
//! are normally released only when a transaction completes.

use crate::page::PageId;
use crate::transaction::{Permission, TransactionId};
use crate::waits_for::WaitsForGraph;
use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};

/// Lock modes a holder can be queried for. `Any` matches either mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
    Any,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LockError {
    /// The requester was picked as the victim of a detected deadlock.
    Deadlock,
}

enum Grant {
    Granted,
    Blocked(Vec<TransactionId>),
}

#[derive(Debug, Default)]
struct LockTables {
    /// Readers of a page. A key is present iff its set is non-empty.
    shared: HashMap<PageId, HashSet<TransactionId>>,
    /// At most one writer per page.
    exclusive: HashMap<PageId, TransactionId>,
    waits_for: WaitsForGraph,
}

impl LockTables {
    fn holds(&self, pid: PageId, tid: TransactionId, mode: LockMode) -> bool {
        let shared = self
            .shared
            .get(&pid)
            .map_or(false, |holders| holders.contains(&tid));
        let exclusive = self.exclusive.get(&pid) == Some(&tid);
        match mode {
            LockMode::Shared => shared,
            LockMode::Exclusive => exclusive,
            LockMode::Any => shared || exclusive,
        }
    }

    /// One grant examination. Mutates the tables on success; otherwise
    /// returns the holders the requester must wait on.
    fn try_grant(&mut self, pid: PageId, tid: TransactionId, perm: Permission) -> Grant {
        match perm {
            Permission::ReadOnly => {
                // A stronger lock subsumes a weaker request.
                if self.holds(pid, tid, LockMode::Any) {
                    return Grant::Granted;
                }
                if let Some(&holder) = self.exclusive.get(&pid) {
                    return Grant::Blocked(vec![holder]);
                }
                self.shared.entry(pid).or_default().insert(tid);
                Grant::Granted
            }
            Permission::ReadWrite => {
                if self.holds(pid, tid, LockMode::Exclusive) {
                    return Grant::Granted;
                }
                if let Some(&holder) = self.exclusive.get(&pid) {
                    return Grant::Blocked(vec![holder]);
                }
                if let Some(holders) = self.shared.get(&pid) {
                    let others: Vec<TransactionId> =
                        holders.iter().copied().filter(|h| *h != tid).collect();
                    if !others.is_empty() {
                        return Grant::Blocked(others);
                    }
                    // The requester is the sole reader: upgrade. The shared
                    // entry goes away with the exclusive install.
                    self.shared.remove(&pid);
                }
                self.exclusive.insert(pid, tid);
                Grant::Granted
            }
        }
    }

    fn release(&mut self, pid: PageId, tid: TransactionId) {
        if let Some(holders) = self.shared.get_mut(&pid) {
            holders.remove(&tid);
            if holders.is_empty() {
                self.shared.remove(&pid);
            }
        }
        if self.exclusive.get(&pid) == Some(&tid) {
            self.exclusive.remove(&pid);
        }
    }
}

/// The lock manager.
#[derive(Debug, Default)]
pub struct LockManager {
    tables: Mutex<LockTables>,
    cvar: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires a shared lock for `ReadOnly` or an exclusive lock for
    /// `ReadWrite`. Blocks until the lock is grantable; the only failure is
    /// a deadlock involving the requester, which aborts the request and
    /// leaves no trace of `tid` in the waits-for graph.
    pub fn acquire(
        &self,
        pid: PageId,
        tid: TransactionId,
        perm: Permission,
    ) -> Result<(), LockError> {
        let mut tables = self.tables.lock().unwrap();
        loop {
            match tables.try_grant(pid, tid, perm) {
                Grant::Granted => {
                    tables.waits_for.remove_node(tid);
                    crate::strata_debug_log!("[LockManager::acquire] {tid} got {perm:?} on {pid}");
                    return Ok(());
                }
                Grant::Blocked(holders) => {
                    tables.waits_for.add_edges(tid, holders);
                    if tables.waits_for.has_cycle_from(tid) {
                        tables.waits_for.remove_node(tid);
                        self.cvar.notify_all();
                        crate::strata_debug_log!(
                            "[LockManager::acquire] deadlock, aborting {tid}"
                        );
                        return Err(LockError::Deadlock);
                    }
                    // Spurious wake-ups are fine: the loop re-derives the
                    // grant decision from the tables.
                    tables = self.cvar.wait(tables).unwrap();
                }
            }
        }
    }

    pub fn holds(&self, pid: PageId, tid: TransactionId, mode: LockMode) -> bool {
        self.tables.lock().unwrap().holds(pid, tid, mode)
    }

    /// Releases `tid`'s lock on one page and wakes every waiter.
    pub fn release(&self, pid: PageId, tid: TransactionId) {
        let mut tables = self.tables.lock().unwrap();
        tables.release(pid, tid);
        self.cvar.notify_all();
    }

    /// Releases every lock held by `tid`, purges it from the waits-for
    /// graph, and wakes every waiter.
    pub fn release_all(&self, tid: TransactionId) {
        let mut tables = self.tables.lock().unwrap();
        let held: Vec<PageId> = tables
            .shared
            .iter()
            .filter(|(_, holders)| holders.contains(&tid))
            .map(|(pid, _)| *pid)
            .chain(
                tables
                    .exclusive
                    .iter()
                    .filter(|(_, holder)| **holder == tid)
                    .map(|(pid, _)| *pid),
            )
            .collect();
        for pid in held {
            tables.release(pid, tid);
        }
        tables.waits_for.remove_node(tid);
        crate::strata_debug_log!("[LockManager::release_all] {tid}");
        self.cvar.notify_all();
    }

    #[cfg(test)]
    fn in_waits_for(&self, tid: TransactionId) -> bool {
        self.tables.lock().unwrap().waits_for.contains(tid)
    }
}
