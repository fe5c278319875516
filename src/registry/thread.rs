//! Thread identity and lifecycle

use std::collections::{HashMap, HashSet};

use crate::graph::Graph;
use crate::ids::ThreadId;
use crate::log;

use super::Registry;

#[derive(Default)]
struct ThreadTable {
    parent: HashMap<ThreadId, ThreadId>,
    children: HashMap<ThreadId, HashSet<ThreadId>>,
}

/// Tracks parent/child relationships between threads and drives the cleanup
/// that runs when a thread exits.
pub(crate) struct ThreadRegistry {
    table: parking_lot::Mutex<ThreadTable>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            table: parking_lot::Mutex::new(ThreadTable::default()),
        }
    }

    /// Records that `tid` was spawned by `parent`.
    pub fn register_spawn(&self, tid: ThreadId, parent: ThreadId) {
        let mut table = self.table.lock();
        table.parent.insert(tid, parent);
        table.children.entry(parent).or_default().insert(tid);
        log::record_thread_spawn(tid, parent);
    }

    /// Cleans up after `tid` exits: every lock it still held or was waiting
    /// for is cleared from the wait-for graph (so it can never again
    /// contribute to a cycle), and any lock it created is reaped — either
    /// destroyed outright if nothing else references it, or marked orphaned
    /// so the last thread to release it finishes the destruction later.
    ///
    /// This runs regardless of whether `tid` released its locks cleanly
    /// first — a thread that panics mid-section, or that is torn down by the
    /// host program, must not leave a dangling hold edge behind.
    pub fn register_exit(&self, tid: ThreadId, registry: &Registry, graph: &Graph) {
        graph.remove_thread(tid);
        for lid in registry.locks_created_by(tid) {
            if graph.is_in_use(lid) {
                registry.mark_orphaned(lid);
            } else {
                registry.remove(lid);
                graph.remove_lock(lid);
            }
        }

        let mut table = self.table.lock();
        if let Some(parent) = table.parent.remove(&tid) {
            if let Some(siblings) = table.children.get_mut(&parent) {
                siblings.remove(&tid);
            }
        }
        table.children.remove(&tid);
        drop(table);

        log::record_thread_exit(tid);
    }

    /// Returns the parent a thread was registered with, if any.
    pub fn parent_of(&self, tid: ThreadId) -> Option<ThreadId> {
        self.table.lock().parent.get(&tid).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Kind;

    #[test]
    fn register_spawn_records_parent() {
        let threads = ThreadRegistry::new();
        let (parent, child) = (ThreadId(1), ThreadId(2));
        threads.register_spawn(child, parent);
        assert_eq!(threads.parent_of(child), Some(parent));
    }

    #[test]
    fn exit_destroys_unreferenced_locks_created_by_the_thread() {
        let threads = ThreadRegistry::new();
        let registry = Registry::new();
        let graph = Graph::new();
        let tid = ThreadId(1);
        let lid = registry.create(Kind::Mutex, tid);

        threads.register_exit(tid, &registry, &graph);

        assert!(registry.resolve(lid).is_err());
    }

    #[test]
    fn exit_clears_held_locks_from_the_graph() {
        let threads = ThreadRegistry::new();
        let registry = Registry::new();
        let graph = Graph::new();
        let owner = ThreadId(1);
        let other = ThreadId(2);
        let lid = registry.create(Kind::Mutex, owner);
        graph.on_acquired(owner, lid, crate::graph::Mode::Exclusive);

        threads.register_exit(owner, &registry, &graph);

        assert!(graph.exclusive_holder(lid).is_none());
        // other threads can now acquire it without a stale hold edge blocking them
        graph.on_acquired(other, lid, crate::graph::Mode::Exclusive);
        assert_eq!(graph.exclusive_holder(lid), Some(other));
    }

    #[test]
    fn exit_orphans_a_lock_still_held_by_another_thread() {
        let threads = ThreadRegistry::new();
        let registry = Registry::new();
        let graph = Graph::new();
        let owner = ThreadId(1);
        let other = ThreadId(2);
        let lid = registry.create(Kind::Mutex, owner);
        graph.on_acquired(other, lid, crate::graph::Mode::Exclusive);

        threads.register_exit(owner, &registry, &graph);

        // Still referenced by `other`, so it survives exit...
        assert!(registry.resolve(lid).is_ok());
        // ...but once the last holder releases it, it's reaped.
        graph.on_released(other, lid, crate::graph::Mode::Exclusive);
        registry.destroy_if_orphaned(lid, &graph);
        assert!(registry.resolve(lid).is_err());
    }
}
