//! Runtime configuration for an inspectfs instance.

/// Name of the top-level mount-point directory when none is configured.
pub const DEFAULT_ROOT_NAME: &str = "inspect";

/// Configuration for an [`InspectFs`](crate::fs::InspectFs) instance.
#[derive(Debug, Clone)]
pub struct InspectFsConfig {
    /// Name of the root directory created at init and removed at shutdown.
    /// All other directories and entries nest under it.
    pub root_name: String,
}

impl Default for InspectFsConfig {
    fn default() -> Self {
        Self {
            root_name: DEFAULT_ROOT_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InspectFsConfig::default();
        assert_eq!(config.root_name, DEFAULT_ROOT_NAME);
    }
}
