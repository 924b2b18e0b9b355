//! In-memory backing store.
//!
//! The default [`BackingStore`] for embedders without a physical inspection
//! filesystem, and the test double for everything in this crate: it records
//! the order in which physical nodes are removed and can inject creation
//! failures.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::warn;

use crate::error::{InspectError, InspectResult};
use crate::session::{EntryContext, EntrySession};
use crate::traits::BackingStore;
use crate::types::{EntryMode, NodeHandle};

enum StoredKind {
    Dir,
    File {
        #[allow(dead_code)]
        mode: EntryMode,
        ctx: Arc<EntryContext>,
    },
}

struct StoredNode {
    name: String,
    #[allow(dead_code)]
    parent: Option<NodeHandle>,
    kind: StoredKind,
}

/// Stores physical nodes in a concurrent map keyed by handle.
#[derive(Default)]
pub struct MemoryBackingStore {
    nodes: DashMap<NodeHandle, StoredNode>,
    next_handle: AtomicU64,
    removed: Mutex<Vec<NodeHandle>>,
    fail_next_create: AtomicBool,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next node creation fail, for unwind testing.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    /// True if the physical node is still present.
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    /// Number of physical nodes currently present.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Handles of removed nodes, in removal order.
    pub fn removal_order(&self) -> Vec<NodeHandle> {
        self.removed.lock().unwrap().clone()
    }

    /// Finds a node by name. Names are not required to be unique across
    /// directories; this returns an arbitrary match and is intended for
    /// tests with distinct names.
    pub fn find(&self, name: &str) -> Option<NodeHandle> {
        self.nodes
            .iter()
            .find(|item| item.value().name == name)
            .map(|item| *item.key())
    }

    /// Opens a session on a file node, the way a real inspection filesystem
    /// would when the node is opened for reading or writing.
    pub fn open(&self, handle: NodeHandle) -> InspectResult<EntrySession> {
        let node = self.nodes.get(&handle).ok_or_else(|| InspectError::Io {
            reason: format!("no such node: {}", handle),
        })?;
        match &node.kind {
            StoredKind::File { ctx, .. } => {
                // Clone the Arc so the session does not borrow the map.
                let ctx = Arc::clone(ctx);
                drop(node);
                ctx.open()
            }
            StoredKind::Dir => Err(InspectError::Io {
                reason: format!("{} is a directory", handle),
            }),
        }
    }

    fn insert(&self, name: &str, parent: Option<NodeHandle>, kind: StoredKind) -> InspectResult<NodeHandle> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(InspectError::BackingStore {
                name: name.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(&parent) {
                return Err(InspectError::BackingStore {
                    name: name.to_string(),
                    reason: format!("parent {} does not exist", parent),
                });
            }
        }
        let handle = NodeHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.nodes.insert(
            handle,
            StoredNode {
                name: name.to_string(),
                parent,
                kind,
            },
        );
        Ok(handle)
    }
}

impl BackingStore for MemoryBackingStore {
    fn create_dir_node(
        &self,
        name: &str,
        parent: Option<NodeHandle>,
    ) -> InspectResult<NodeHandle> {
        self.insert(name, parent, StoredKind::Dir)
    }

    fn create_file_node(
        &self,
        name: &str,
        parent: NodeHandle,
        mode: EntryMode,
        ctx: Arc<EntryContext>,
    ) -> InspectResult<NodeHandle> {
        self.insert(name, Some(parent), StoredKind::File { mode, ctx })
    }

    fn remove_node(&self, handle: NodeHandle) {
        if self.nodes.remove(&handle).is_some() {
            self.removed.lock().unwrap().push(handle);
        } else {
            // The engine guarantees exactly-once removal; reaching this
            // means a contract breach worth surfacing in logs.
            warn!(%handle, "remove of unknown physical node");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_remove_bookkeeping() {
        let store = MemoryBackingStore::new();
        let root = store.create_dir_node("root", None).unwrap();
        let child = store.create_dir_node("child", Some(root)).unwrap();

        assert_ne!(root, child);
        assert_eq!(store.node_count(), 2);
        assert!(store.contains(child));

        store.remove_node(child);
        store.remove_node(root);
        assert_eq!(store.node_count(), 0);
        assert_eq!(store.removal_order(), vec![child, root]);
    }

    #[test]
    fn test_create_under_missing_parent_fails() {
        let store = MemoryBackingStore::new();
        let result = store.create_dir_node("orphan", Some(NodeHandle::new(99)));
        assert!(matches!(result, Err(InspectError::BackingStore { .. })));
    }

    #[test]
    fn test_fail_next_create_injects_one_failure() {
        let store = MemoryBackingStore::new();
        store.fail_next_create();

        assert!(store.create_dir_node("a", None).is_err());
        assert!(store.create_dir_node("a", None).is_ok());
    }

    #[test]
    fn test_open_on_directory_rejected() {
        let store = MemoryBackingStore::new();
        let root = store.create_dir_node("root", None).unwrap();
        assert!(matches!(store.open(root), Err(InspectError::Io { .. })));
        assert!(matches!(
            store.open(NodeHandle::new(99)),
            Err(InspectError::Io { .. })
        ));
    }
}
