//! Transaction manager configuration.

use remtx_types::{Properties, property_usize};
use serde::{Deserialize, Serialize};

pub const KEY_MAX_NESTING_DEPTH: &str = "remtx.txn.max_nesting_depth";

/// Default limit on nested transactional calls.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Maximum number of simultaneously active `run_within_transaction`
    /// frames, the outermost included.
    pub max_nesting_depth: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl ManagerConfig {
    /// Build from flat properties; unknown or malformed values keep defaults.
    #[must_use]
    pub fn from_properties(props: &Properties) -> Self {
        let mut config = Self::default();
        config.set_max_nesting_depth(property_usize(
            props,
            KEY_MAX_NESTING_DEPTH,
            DEFAULT_MAX_NESTING_DEPTH,
        ));
        config
    }

    /// Clamped to at least 1 so the outermost frame can always run.
    pub fn set_max_nesting_depth(&mut self, depth: usize) {
        self.max_nesting_depth = depth.max(1);
    }
}
