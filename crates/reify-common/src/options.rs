//! Behavior switches for the type system.

use crate::limits::MAX_DISPATCH_DEPTH;
use serde::{Deserialize, Serialize};

/// Options shared by the resolution engine and the dispatch layer.
///
/// Deserialized from camelCase JSON; every field is optional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReifyOptions {
    /// When a bare declaration is resolved and the originating parameter has
    /// no default, use the first bound found along the resolution path.
    pub fallback_to_bound: bool,
    /// Memoize resolution results on each specialization.
    pub memoize_resolutions: bool,
    /// Nesting limit for dispatched calls.
    pub max_dispatch_depth: u32,
}

impl Default for ReifyOptions {
    fn default() -> Self {
        ReifyOptions {
            fallback_to_bound: false,
            memoize_resolutions: true,
            max_dispatch_depth: MAX_DISPATCH_DEPTH,
        }
    }
}

impl ReifyOptions {
    /// Parse options from a JSON document such as `{"fallbackToBound": true}`.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_fallback_to_bound(mut self, enabled: bool) -> Self {
        self.fallback_to_bound = enabled;
        self
    }

    pub fn with_memoize_resolutions(mut self, enabled: bool) -> Self {
        self.memoize_resolutions = enabled;
        self
    }

    pub fn with_max_dispatch_depth(mut self, depth: u32) -> Self {
        self.max_dispatch_depth = depth;
        self
    }
}

#[cfg(test)]
#[path = "../tests/options_tests.rs"]
mod tests;
