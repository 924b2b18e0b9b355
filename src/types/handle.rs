//! Handle types identifying nodes in the tree and in the backing store.

use std::fmt;

/// Arena index of a node slot inside the reference-count engine.
pub(crate) type NodeId = usize;

/// Identifier of a physical node inside the backing store.
///
/// Issued by the [`BackingStore`](crate::traits::BackingStore) when a node
/// is created and passed back to it exactly once for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(u64);

impl NodeHandle {
    /// Creates a handle from a raw backing-store identifier.
    pub fn new(raw: u64) -> Self {
        NodeHandle(raw)
    }

    /// Returns the raw backing-store identifier.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHandle({})", self.0)
    }
}

/// Handle to a directory created by
/// [`InspectFs::create_dir`](crate::fs::InspectFs::create_dir).
///
/// Handles are single-use for removal: `remove_dir` consumes the handle, and
/// the handle types are deliberately not `Clone` so a removed node cannot be
/// referenced again.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DirHandle(pub(crate) NodeId);

/// Handle to an entry created by
/// [`InspectFs::create_entry`](crate::fs::InspectFs::create_entry).
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EntryHandle(pub(crate) NodeId);

/// Handle to a statistic entry created by
/// [`InspectFs::create_stat`](crate::fs::InspectFs::create_stat).
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StatHandle(pub(crate) NodeId);

/// Access mode of an entry, derived from its capabilities: readable iff a
/// read protocol was supplied, writable iff a write handler was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMode {
    pub readable: bool,
    pub writable: bool,
}

impl EntryMode {
    pub fn new(readable: bool, writable: bool) -> Self {
        EntryMode { readable, writable }
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.readable { 'r' } else { '-' };
        let w = if self.writable { 'w' } else { '-' };
        write!(f, "{}{}", r, w)
    }
}
