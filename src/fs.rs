//! The inspection-filesystem entry manager.
//!
//! [`InspectFs`] owns the root directory of the tree and exposes the
//! create/remove operations for the three entity kinds. All lifetime
//! decisions are delegated to the reference-count engine; this module is
//! responsible for argument validation, parent resolution and unwinding
//! partially constructed state when the backing store rejects a node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::engine::{Engine, NodeKind};
use crate::error::{InspectError, InspectResult};
use crate::session::EntryContext;
use crate::stat::{StatMemoryHooks, StatState};
use crate::stats::{FsMetrics, MetricsSnapshot};
use crate::traits::{BackingStore, SeqSource, StatSource, WriteHandler};
use crate::types::{
    DirHandle, EntryHandle, EntryMode, InspectFsConfig, NodeHandle, NodeId, StatHandle,
};

/// A reference-counted tree of directories, entries and statistic entries
/// hosted on a [`BackingStore`].
///
/// Creating an instance creates the root directory in the backing store;
/// dropping it (or calling [`shutdown`](InspectFs::shutdown)) removes it.
/// Every public operation is safe under arbitrary thread interleaving.
pub struct InspectFs {
    engine: Arc<Engine>,
    backing: Arc<dyn BackingStore>,
    metrics: Arc<FsMetrics>,
    root: NodeHandle,
    root_removed: AtomicBool,
    config: InspectFsConfig,
}

impl InspectFs {
    /// Initializes the entry manager, creating the root directory named by
    /// `config.root_name` in the backing store.
    pub fn new(backing: Arc<dyn BackingStore>, config: InspectFsConfig) -> InspectResult<Self> {
        validate_name(&config.root_name)?;
        let root = backing.create_dir_node(&config.root_name, None)?;
        let metrics = Arc::new(FsMetrics::new());
        let engine = Arc::new(Engine::new(backing.clone(), metrics.clone()));
        debug!(root_name = %config.root_name, %root, "inspectfs initialized");
        Ok(InspectFs {
            engine,
            backing,
            metrics,
            root,
            root_removed: AtomicBool::new(false),
            config,
        })
    }

    /// Initializes with the default configuration.
    pub fn with_defaults(backing: Arc<dyn BackingStore>) -> InspectResult<Self> {
        Self::new(backing, InspectFsConfig::default())
    }

    /// Physical handle of the root directory.
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    pub fn config(&self) -> &InspectFsConfig {
        &self.config
    }

    /// Copy of the operation counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Creates a directory under `parent`, or under the root if `parent` is
    /// `None`. The new directory starts with one reference (its creator's)
    /// and takes a reference on its parent.
    pub fn create_dir(
        &self,
        name: &str,
        parent: Option<&DirHandle>,
    ) -> InspectResult<DirHandle> {
        validate_name(name)?;
        let (parent_node, parent_id) = self.resolve_parent(parent)?;

        match self.backing.create_dir_node(name, Some(parent_node)) {
            Ok(node) => {
                let id = self.engine.insert(NodeKind::Dir {
                    node,
                    parent: parent_id,
                });
                self.metrics.record_dir_created();
                debug!(name, %node, "directory created");
                Ok(DirHandle(id))
            }
            Err(err) => {
                self.unwind_parent(parent_id);
                Err(err)
            }
        }
    }

    /// Drops the creator's reference on a directory. The directory is
    /// physically removed once all children have released it; the handle
    /// must not be used afterwards either way (enforced by consumption).
    pub fn remove_dir(&self, handle: DirHandle) {
        debug!(id = handle.0, "remove directory");
        self.engine.release(handle.0);
    }

    /// Creates an entry under `parent` (or the root). Mode bits derive from
    /// the capabilities: readable iff `reader` is supplied, writable iff
    /// `writer` is supplied.
    pub fn create_entry(
        &self,
        name: &str,
        parent: Option<&DirHandle>,
        reader: Option<Arc<dyn SeqSource>>,
        writer: Option<Arc<dyn WriteHandler>>,
    ) -> InspectResult<EntryHandle> {
        validate_name(name)?;
        let id = self.create_entry_node(name, parent, reader, writer, None)?;
        Ok(EntryHandle(id))
    }

    /// Drops the creator's reference on an entry. On the last reference the
    /// entry's session metadata is invalidated, the physical node removed,
    /// and the parent directory released.
    pub fn remove_entry(&self, handle: EntryHandle) {
        debug!(id = handle.0, "remove entry");
        self.engine.release(handle.0);
    }

    /// Creates a statistic entry: an entry whose read protocol iterates the
    /// values produced by `source`. If `hooks` are supplied, `retain` is
    /// invoked exactly once now and `release` exactly once at final
    /// destruction.
    pub fn create_stat(
        &self,
        name: &str,
        parent: Option<&DirHandle>,
        source: Arc<dyn StatSource>,
        hooks: Option<StatMemoryHooks>,
    ) -> InspectResult<StatHandle> {
        validate_name(name)?;
        let state = Arc::new(StatState::new(source));
        let stat_id = self.engine.insert(NodeKind::Stat {
            state: state.clone(),
            entry: None,
            hooks: None,
        });

        match self.create_entry_node(name, parent, None, None, Some((state, stat_id))) {
            Ok(entry_id) => {
                if let Some(hooks) = &hooks {
                    hooks.retain();
                }
                self.engine.bind_stat(stat_id, entry_id, hooks);
                self.metrics.record_stat_created();
                debug!(name, "statistic entry created");
                Ok(StatHandle(stat_id))
            }
            Err(err) => {
                // Unwind the statistic slot; no hooks were attached, so
                // neither callback fires.
                self.engine.release(stat_id);
                Err(err)
            }
        }
    }

    /// Drops the creator's reference on a statistic entry. On the last
    /// reference the owning entry is released (cascading to its parent) and
    /// the `release` hook fires. A reader mid-iteration holds a transient
    /// reference, in which case the teardown is deferred to its `stop`.
    pub fn remove_stat(&self, handle: StatHandle) {
        debug!(id = handle.0, "remove statistic entry");
        self.engine.release(handle.0);
    }

    /// Tears the manager down. Fails with
    /// [`TreeNotEmpty`](InspectError::TreeNotEmpty) if directories or
    /// entries are still live; on success the root directory is removed
    /// from the backing store.
    pub fn shutdown(&self) -> InspectResult<()> {
        let live = self.engine.live_nodes();
        if live > 0 {
            return Err(InspectError::TreeNotEmpty { live });
        }
        self.remove_root();
        Ok(())
    }

    fn create_entry_node(
        &self,
        name: &str,
        parent: Option<&DirHandle>,
        reader: Option<Arc<dyn SeqSource>>,
        writer: Option<Arc<dyn WriteHandler>>,
        stat: Option<(Arc<StatState>, NodeId)>,
    ) -> InspectResult<NodeId> {
        let mode = EntryMode::new(reader.is_some() || stat.is_some(), writer.is_some());
        let (parent_node, parent_id) = self.resolve_parent(parent)?;

        let ctx = Arc::new(EntryContext::new(
            Arc::downgrade(&self.engine),
            mode,
            reader,
            writer,
            stat,
        ));

        match self
            .backing
            .create_file_node(name, parent_node, mode, ctx.clone())
        {
            Ok(node) => {
                let id = self.engine.insert(NodeKind::Entry {
                    node,
                    parent: parent_id,
                    ctx,
                });
                self.metrics.record_entry_created();
                debug!(name, %node, %mode, "entry created");
                Ok(id)
            }
            Err(err) => {
                self.unwind_parent(parent_id);
                Err(err)
            }
        }
    }

    /// Resolves the parent's physical handle, taking a reference on it in
    /// the same critical section. `None` means the root, which is owned by
    /// the manager's lifetime and not reference-counted.
    fn resolve_parent(
        &self,
        parent: Option<&DirHandle>,
    ) -> InspectResult<(NodeHandle, Option<NodeId>)> {
        match parent {
            Some(handle) => Ok((self.engine.acquire_dir(handle.0)?, Some(handle.0))),
            None => Ok((self.root, None)),
        }
    }

    fn unwind_parent(&self, parent_id: Option<NodeId>) {
        if let Some(id) = parent_id {
            self.engine.release(id);
        }
    }

    fn remove_root(&self) {
        if !self.root_removed.swap(true, Ordering::SeqCst) {
            self.backing.remove_node(self.root);
            debug!(root = %self.root, "root directory removed");
        }
    }
}

impl Drop for InspectFs {
    fn drop(&mut self) {
        self.remove_root();
    }
}

fn validate_name(name: &str) -> InspectResult<()> {
    if name.is_empty() {
        return Err(InspectError::InvalidArgument {
            reason: "empty name".to_string(),
        });
    }
    Ok(())
}
