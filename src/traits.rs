//! Capability traits at the boundaries of the entry manager.
//!
//! [`BackingStore`] is the seam towards the physical inspection filesystem;
//! [`SeqSource`], [`WriteHandler`] and [`StatSource`] are the capabilities a
//! caller attaches to the entries it creates.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::InspectResult;
use crate::session::EntryContext;
use crate::stat::StatValue;
use crate::types::{EntryMode, NodeHandle};

/// The physical inspection filesystem hosting the tree.
///
/// Implementations create and remove physical nodes; the entry manager
/// guarantees [`remove_node`](BackingStore::remove_node) is called exactly
/// once per logical node, precisely when its reference count reaches zero.
pub trait BackingStore: Send + Sync {
    /// Creates a physical directory node. `parent` is `None` only for the
    /// root directory created at init.
    fn create_dir_node(
        &self,
        name: &str,
        parent: Option<NodeHandle>,
    ) -> InspectResult<NodeHandle>;

    /// Creates a physical file node with the entry's private session
    /// metadata attached. The store must route any open of the node through
    /// [`EntryContext::open`], which enforces the validity flag; holding the
    /// `Arc` keeps the metadata alive for in-flight sessions even after
    /// logical removal.
    fn create_file_node(
        &self,
        name: &str,
        parent: NodeHandle,
        mode: EntryMode,
        ctx: Arc<EntryContext>,
    ) -> InspectResult<NodeHandle>;

    /// Removes a physical node. Called exactly once per logical node.
    fn remove_node(&self, handle: NodeHandle);
}

/// Sequential read protocol for plain entries.
///
/// Mirrors the session iteration: `start` opens an iteration at a position,
/// `next` advances it, `show` renders the record at the current position,
/// `stop` ends the iteration. Positions are monotonically increasing from 0
/// within one session; a source shared by concurrent sessions must not keep
/// per-iteration state on itself.
pub trait SeqSource: Send + Sync {
    /// Begins an iteration. Returns true if a record exists at `position`.
    fn start(&self, position: u64) -> bool;

    /// Advances to `position`. Returns true if a record exists there.
    fn next(&self, position: u64) -> bool;

    /// Ends an iteration.
    fn stop(&self) {}

    /// Renders the record at `position`.
    fn show(&self, position: u64, out: &mut String) -> InspectResult<()>;
}

/// Write callback for writable entries.
///
/// Receives the raw bytes and offset of a write on an open session and
/// returns the number of bytes consumed.
pub trait WriteHandler: Send + Sync {
    fn write(&self, data: Bytes, offset: u64) -> InspectResult<usize>;
}

/// Produces the values of a statistic series.
///
/// Called with monotonically increasing positions starting at 0 for each
/// read iteration; returns `None` to signal end of sequence. Values are
/// best-effort snapshots: no stability is assumed across calls if the
/// underlying source mutates concurrently.
pub trait StatSource: Send + Sync {
    fn next_stat(&self, position: u64) -> Option<StatValue>;
}
