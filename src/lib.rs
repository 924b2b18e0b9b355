//! # inspectfs
//!
//! A reference-counted entry manager for debug/inspection filesystems: a
//! tree of named nodes — directories, entries, and statistic entries —
//! hosted on a pluggable backing store, with explicit lifetime management
//! so nodes can be unlinked while concurrent readers still safely traverse
//! them.
//!
//! ## Overview
//!
//! Callers create directories (optionally nested), create entries inside
//! them (optionally backed by a statistic source), and later remove them in
//! any order. The reference-count engine guarantees that a node is removed
//! from the backing store exactly once, only after every reference — the
//! creator's, each child's hold on its parent, and any reader mid-iteration
//! — has been dropped, cascading releases up the parent chain.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use inspectfs::{InspectFs, MemoryBackingStore, StatSource, StatValue};
//!
//! struct Uptime;
//!
//! impl StatSource for Uptime {
//!     fn next_stat(&self, position: u64) -> Option<StatValue> {
//!         (position == 0).then(|| StatValue::new(42, "uptime: {}\n"))
//!     }
//! }
//!
//! let store = Arc::new(MemoryBackingStore::new());
//! let fs = InspectFs::with_defaults(store.clone()).unwrap();
//!
//! let dir = fs.create_dir("gpu", None).unwrap();
//! let stat = fs.create_stat("uptime", Some(&dir), Arc::new(Uptime), None).unwrap();
//!
//! let mut session = store.open(store.find("uptime").unwrap()).unwrap();
//! assert_eq!(session.read_to_string().unwrap(), "uptime: 42\n");
//!
//! fs.remove_stat(stat);
//! fs.remove_dir(dir);
//! fs.shutdown().unwrap();
//! ```
//!
//! ## Architecture
//!
//! - [`traits`]: capability traits — the [`BackingStore`](traits::BackingStore)
//!   seam towards the physical filesystem, and the read/write/statistic
//!   capabilities attached to entries
//! - [`fs`]: the [`InspectFs`](fs::InspectFs) entry manager
//! - [`session`]: per-entry private metadata and open read/write sessions
//! - [`stat`]: statistic entry state and external memory-refcount hooks
//! - [`backing`]: the in-memory backing store
//! - [`error`]: error types
//! - [`stats`]: operation counters

pub mod backing;
pub mod error;
pub mod fs;
pub mod session;
pub mod stat;
pub mod stats;
pub mod traits;
pub mod types;

mod engine;

pub use backing::MemoryBackingStore;
pub use error::{InspectError, InspectResult};
pub use fs::InspectFs;
pub use session::{EntryContext, EntrySession};
pub use stat::{StatMemoryHooks, StatValue};
pub use stats::{FsMetrics, MetricsSnapshot};
pub use traits::{BackingStore, SeqSource, StatSource, WriteHandler};
pub use types::{
    DirHandle, EntryHandle, EntryMode, InspectFsConfig, NodeHandle, StatHandle,
    DEFAULT_ROOT_NAME,
};
