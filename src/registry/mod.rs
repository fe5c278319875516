//! The resource registry: the handle → descriptor table shared
//! by every tracked primitive.

pub mod thread;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::ids::{self, LockId, ThreadId};
use crate::log;

/// Which primitive a [`LockId`] was created for. Needed so the sync engines
/// can reject an operation aimed at the wrong kind of handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Mutex,
    RwLock,
    Condvar,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Descriptor {
    pub kind: Kind,
    pub creator: ThreadId,
    /// Set when the creating thread exits while this lock is still held or
    /// waited on by someone else. An orphaned lock cannot be reaped at exit
    /// time; [`Registry::destroy_if_orphaned`] finishes the job the next
    /// time it becomes unreferenced.
    pub orphaned: bool,
}

/// The process-wide table of live lock handles.
///
/// Each entry is independently synchronized by `DashMap`'s sharding: registry
/// operations never need to take a single global lock the way the wait-for
/// graph does.
pub(crate) struct Registry {
    locks: DashMap<LockId, Descriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Allocates a fresh handle for a new lock of the given `kind`, owned by
    /// `creator`. Handles are never reused: a destroyed handle never refers
    /// to a new lock.
    pub fn create(&self, kind: Kind, creator: ThreadId) -> LockId {
        let lid = ids::allocate_lid();
        self.locks.insert(
            lid,
            Descriptor {
                kind,
                creator,
                orphaned: false,
            },
        );
        log::record_lock_created(lid, creator);
        lid
    }

    /// Looks up the descriptor for `lid`.
    pub fn resolve(&self, lid: LockId) -> Result<Descriptor> {
        self.locks
            .get(&lid)
            .map(|entry| *entry)
            .ok_or(Error::NullHandle(lid))
    }

    /// Destroys `lid`, refusing if it is still held or waited on by anyone.
    pub fn destroy(&self, lid: LockId, graph: &Graph) -> Result<()> {
        self.resolve(lid)?;
        if graph.is_in_use(lid) {
            return Err(Error::StillInUse(lid));
        }
        self.remove(lid);
        graph.remove_lock(lid);
        Ok(())
    }

    /// Removes `lid` unconditionally. Used by [`Self::destroy`] after the
    /// in-use check, and by thread-exit orphan cleanup which performs its
    /// own check against the graph first.
    pub(crate) fn remove(&self, lid: LockId) {
        self.locks.remove(&lid);
        log::record_lock_destroyed(lid);
    }

    pub(crate) fn locks_created_by(&self, tid: ThreadId) -> Vec<LockId> {
        self.locks
            .iter()
            .filter(|entry| entry.value().creator == tid)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Marks `lid` as orphaned: its creator has exited but it is still
    /// referenced, so thread-exit cleanup could not destroy it outright.
    pub(crate) fn mark_orphaned(&self, lid: LockId) {
        if let Some(mut entry) = self.locks.get_mut(&lid) {
            entry.orphaned = true;
        }
    }

    /// If `lid` is orphaned and no longer held or waited on by anyone,
    /// destroys it. Called after every release so a lock whose creator
    /// already exited is reaped the moment its last holder lets go, instead
    /// of staying in the registry forever.
    pub(crate) fn destroy_if_orphaned(&self, lid: LockId, graph: &Graph) {
        let orphaned = self
            .locks
            .get(&lid)
            .map(|entry| entry.orphaned)
            .unwrap_or(false);
        if orphaned && !graph.is_in_use(lid) {
            self.remove(lid);
            graph.remove_lock(lid);
        }
    }
}
