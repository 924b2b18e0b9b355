//! Error types for inspectfs operations.

use thiserror::Error;

/// Comprehensive error type for all inspectfs operations.
///
/// The taxonomy is deliberately small: every operation either succeeds or
/// fails synchronously with one of these variants. There are no retries and
/// no partially applied mutations; constructors unwind any allocated state
/// before returning an error.
#[derive(Debug, Error)]
pub enum InspectError {
    /// A required argument was missing or malformed. No state was mutated.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        reason: String,
    },

    /// The backing store refused to create a physical node.
    #[error("backing store rejected '{name}': {reason}")]
    BackingStore {
        name: String,
        reason: String,
    },

    /// An operation was attempted through a handle whose node no longer
    /// exists (already destroyed, or never of the expected kind).
    #[error("stale {kind} handle")]
    StaleHandle {
        kind: &'static str,
    },

    /// An open or read/write was rejected at the session boundary, e.g.
    /// opening an entry that has been removed, or writing to an entry with
    /// no write handler. Surfaced to the opener, never fatal to the tree.
    #[error("I/O rejected: {reason}")]
    Io {
        reason: String,
    },

    /// Shutdown was requested while directories or entries are still live.
    #[error("tree still has {live} live nodes")]
    TreeNotEmpty {
        live: usize,
    },
}

/// Type alias for Results in the inspectfs system.
pub type InspectResult<T> = Result<T, InspectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases = vec![
            (
                InspectError::InvalidArgument { reason: "empty name".to_string() },
                "invalid argument: empty name",
            ),
            (
                InspectError::BackingStore {
                    name: "stats".to_string(),
                    reason: "injected failure".to_string(),
                },
                "backing store rejected 'stats': injected failure",
            ),
            (
                InspectError::StaleHandle { kind: "directory" },
                "stale directory handle",
            ),
            (
                InspectError::Io { reason: "entry removed".to_string() },
                "I/O rejected: entry removed",
            ),
            (
                InspectError::TreeNotEmpty { live: 3 },
                "tree still has 3 live nodes",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }
}
