//! The reference-count engine shared by all three entity kinds.
//!
//! Nodes live in one slab arena guarded by one mutex: directory, entry and
//! statistic counts form a single lock domain, which is sufficient because
//! this is an administrative path, not a hot data path. The mutex is held
//! only around count mutation and the zero check; teardown work (backing
//! store removal, hook invocation) always runs with the lock dropped, and
//! the cascade up parent links is an explicit loop over arena ids rather
//! than recursion.

use std::sync::{Arc, Mutex};

use slab::Slab;
use tracing::{debug, trace, warn};

use crate::error::{InspectError, InspectResult};
use crate::session::EntryContext;
use crate::stat::{StatMemoryHooks, StatState};
use crate::stats::FsMetrics;
use crate::traits::BackingStore;
use crate::types::{NodeHandle, NodeId};

/// What a node slot holds, by entity kind.
pub(crate) enum NodeKind {
    Dir {
        node: NodeHandle,
        parent: Option<NodeId>,
    },
    Entry {
        node: NodeHandle,
        parent: Option<NodeId>,
        ctx: Arc<EntryContext>,
    },
    Stat {
        state: Arc<StatState>,
        entry: Option<NodeId>,
        hooks: Option<StatMemoryHooks>,
    },
}

impl NodeKind {
    fn name(&self) -> &'static str {
        match self {
            NodeKind::Dir { .. } => "directory",
            NodeKind::Entry { .. } => "entry",
            NodeKind::Stat { .. } => "statistic",
        }
    }
}

struct Slot {
    refs: u32,
    kind: NodeKind,
}

/// Outcome of one decrement step, computed under the lock.
enum Step {
    Alive(u32),
    Destroy(NodeKind),
    Stale,
}

pub(crate) struct Engine {
    slots: Mutex<Slab<Slot>>,
    backing: Arc<dyn BackingStore>,
    metrics: Arc<FsMetrics>,
}

impl Engine {
    pub(crate) fn new(backing: Arc<dyn BackingStore>, metrics: Arc<FsMetrics>) -> Self {
        Engine {
            slots: Mutex::new(Slab::new()),
            backing,
            metrics,
        }
    }

    pub(crate) fn metrics(&self) -> &FsMetrics {
        &self.metrics
    }

    /// Inserts a new node with a count of 1 (the creator's reference).
    pub(crate) fn insert(&self, kind: NodeKind) -> NodeId {
        let id = self.slots.lock().unwrap().insert(Slot { refs: 1, kind });
        trace!(id, "node inserted");
        id
    }

    /// Takes a reference on a node. Fails if the node is already gone:
    /// an entity mid-destruction must never be resurrected.
    pub(crate) fn acquire(&self, id: NodeId) -> bool {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(id) {
            Some(slot) if slot.refs > 0 => {
                slot.refs += 1;
                trace!(id, refs = slot.refs, "acquire");
                true
            }
            _ => {
                drop(slots);
                warn!(id, "acquire on destroyed node");
                self.metrics.record_stale_operation();
                false
            }
        }
    }

    /// Takes a reference on a directory and returns its physical handle,
    /// in one critical section so a concurrent release cannot slip between
    /// the lookup and the increment.
    pub(crate) fn acquire_dir(&self, id: NodeId) -> InspectResult<NodeHandle> {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(id) {
            Some(slot) => match slot.kind {
                NodeKind::Dir { node, .. } => {
                    slot.refs += 1;
                    trace!(id, refs = slot.refs, "acquire directory");
                    Ok(node)
                }
                _ => Err(InspectError::StaleHandle { kind: "directory" }),
            },
            None => {
                drop(slots);
                self.metrics.record_stale_operation();
                Err(InspectError::StaleHandle { kind: "directory" })
            }
        }
    }

    /// Takes a reference on a statistic for the duration of a read iteration.
    /// The caller proves which statistic it means by identity: arena slots
    /// are reused after removal, so an id alone could name an unrelated node
    /// that later took over the slot.
    pub(crate) fn acquire_stat(&self, id: NodeId, state: &Arc<StatState>) -> bool {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(id) {
            Some(Slot {
                refs,
                kind: NodeKind::Stat { state: held, .. },
            }) if Arc::ptr_eq(held, state) && *refs > 0 => {
                *refs += 1;
                trace!(id, refs = *refs, "acquire statistic");
                true
            }
            // Lost the race against removal, or the slot was recycled.
            // Either way the statistic is gone and the read yields nothing.
            _ => false,
        }
    }

    /// Records a statistic's back-reference to its owning entry and attaches
    /// the memory hooks, once entry creation has succeeded.
    pub(crate) fn bind_stat(
        &self,
        stat_id: NodeId,
        entry_id: NodeId,
        hooks: Option<StatMemoryHooks>,
    ) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(Slot {
            kind: NodeKind::Stat { entry, hooks: slot_hooks, .. },
            ..
        }) = slots.get_mut(stat_id)
        {
            *entry = Some(entry_id);
            *slot_hooks = hooks;
        }
    }

    /// Drops a reference, destroying the node if the count reaches zero and
    /// cascading the release up parent links.
    ///
    /// Each step decrements one node under the lock; when a count hits zero
    /// the slot is taken out of the arena and its teardown runs unlocked,
    /// yielding at most one ancestor to release next. Worst case is
    /// O(depth) lock round-trips, never one lock held across the cascade.
    ///
    /// Returns false if `id` does not name a live node — a double-release,
    /// counted and logged but never fatal.
    pub(crate) fn release(&self, id: NodeId) -> bool {
        let mut next = Some(id);
        let mut first = true;
        let mut pending_hooks: Option<StatMemoryHooks> = None;

        while let Some(id) = next.take() {
            let step = {
                let mut slots = self.slots.lock().unwrap();
                match slots.get_mut(id) {
                    None => Step::Stale,
                    Some(slot) => {
                        slot.refs -= 1;
                        if slot.refs == 0 {
                            Step::Destroy(slots.remove(id).kind)
                        } else {
                            Step::Alive(slot.refs)
                        }
                    }
                }
            };

            match step {
                Step::Alive(refs) => {
                    trace!(id, refs, "release");
                }
                Step::Destroy(kind) => {
                    debug!(id, kind = kind.name(), "destroying node");
                    let (ancestor, hooks) = self.teardown(kind);
                    next = ancestor;
                    if hooks.is_some() {
                        pending_hooks = hooks;
                    }
                    if next.is_some() {
                        self.metrics.record_cascade_release();
                    }
                }
                Step::Stale => {
                    warn!(id, "release on destroyed node");
                    self.metrics.record_stale_operation();
                    if first {
                        return false;
                    }
                }
            }
            first = false;
        }

        // The memory owner is told last, once the cascade has removed every
        // physical node that could still surface the statistic.
        if let Some(hooks) = pending_hooks {
            hooks.release();
        }

        true
    }

    /// Kind-specific destruction, run without the lock. Returns the node
    /// whose reference this one held, if any, to continue the cascade, plus
    /// any memory hooks whose release must wait until the cascade is done.
    fn teardown(&self, kind: NodeKind) -> (Option<NodeId>, Option<StatMemoryHooks>) {
        match kind {
            NodeKind::Dir { node, parent } => {
                self.backing.remove_node(node);
                self.metrics.record_node_removed();
                (parent, None)
            }
            NodeKind::Entry { node, parent, ctx } => {
                // Invalidate first: a session opened concurrently but not
                // yet started must be rejected before the node disappears.
                ctx.invalidate();
                self.backing.remove_node(node);
                self.metrics.record_node_removed();
                (parent, None)
            }
            NodeKind::Stat { entry, hooks, .. } => (entry, hooks),
        }
    }

    /// Number of live nodes in the arena.
    pub(crate) fn live_nodes(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::MemoryBackingStore;

    fn engine_with_store() -> (Arc<Engine>, Arc<MemoryBackingStore>) {
        let store = Arc::new(MemoryBackingStore::new());
        let engine = Arc::new(Engine::new(store.clone(), Arc::new(FsMetrics::new())));
        (engine, store)
    }

    fn make_dir(
        engine: &Engine,
        store: &MemoryBackingStore,
        name: &str,
        parent: Option<NodeId>,
    ) -> (NodeId, NodeHandle) {
        let node = store.create_dir_node(name, None).unwrap();
        let id = engine.insert(NodeKind::Dir { node, parent });
        if let Some(parent) = parent {
            assert!(engine.acquire(parent));
        }
        (id, node)
    }

    #[test]
    fn test_removed_exactly_once_at_zero() {
        let (engine, store) = engine_with_store();
        let (id, node) = make_dir(&engine, &store, "a", None);

        assert!(engine.acquire(id));
        assert!(engine.acquire(id));

        assert!(engine.release(id));
        assert!(engine.release(id));
        assert!(store.contains(node), "removed before count reached zero");

        assert!(engine.release(id));
        assert_eq!(store.removal_order(), vec![node]);
        assert_eq!(engine.live_nodes(), 0);
    }

    #[test]
    fn test_release_on_destroyed_node_is_failed_noop() {
        let (engine, store) = engine_with_store();
        let (id, node) = make_dir(&engine, &store, "a", None);

        assert!(engine.release(id));
        assert!(!engine.release(id));
        assert!(!engine.acquire(id));

        assert_eq!(store.removal_order(), vec![node]);
        assert_eq!(engine.metrics().snapshot().stale_operations, 2);
    }

    #[test]
    fn test_cascade_up_directory_chain() {
        let (engine, store) = engine_with_store();
        let (a, node_a) = make_dir(&engine, &store, "a", None);
        let (b, node_b) = make_dir(&engine, &store, "b", Some(a));
        let (c, node_c) = make_dir(&engine, &store, "c", Some(b));

        // Drop the creators' references top-down: nothing is destroyed
        // while children still hold their parents.
        assert!(engine.release(a));
        assert!(engine.release(b));
        assert_eq!(store.removal_order(), Vec::new());

        // Releasing the leaf tears down the whole chain, leaf first.
        assert!(engine.release(c));
        assert_eq!(store.removal_order(), vec![node_c, node_b, node_a]);
        assert_eq!(engine.live_nodes(), 0);
        assert_eq!(engine.metrics().snapshot().cascade_releases, 2);
    }

    #[test]
    fn test_acquire_dir_returns_physical_handle() {
        let (engine, store) = engine_with_store();
        let (id, node) = make_dir(&engine, &store, "a", None);

        assert_eq!(engine.acquire_dir(id).unwrap(), node);
        assert!(engine.release(id));
        assert!(engine.release(id));

        match engine.acquire_dir(id) {
            Err(InspectError::StaleHandle { kind }) => assert_eq!(kind, "directory"),
            other => panic!("expected stale handle, got {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_acquire_release_single_removal() {
        let (engine, store) = engine_with_store();
        let (id, node) = make_dir(&engine, &store, "a", None);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if engine.acquire(id) {
                            engine.release(id);
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert!(store.contains(node));
        assert!(engine.release(id));
        assert_eq!(store.removal_order(), vec![node]);
    }
}
