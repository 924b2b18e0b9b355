// Module declarations
pub mod config;
pub mod handle;

// Re-export all types from submodules
pub use config::{InspectFsConfig, DEFAULT_ROOT_NAME};
pub use handle::{DirHandle, EntryHandle, EntryMode, NodeHandle, StatHandle};

pub(crate) use handle::NodeId;
