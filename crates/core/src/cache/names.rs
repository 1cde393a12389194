//! Generation naming.

use serde::{Deserialize, Serialize};

/// Names of the generations that are current for one version tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNames {
    /// Shell, document and metadata assets seeded at install.
    pub static_name: String,
    /// Runtime data and third-party assets populated lazily.
    pub dynamic_name: String,
    /// Umbrella name from older releases; survives activation.
    pub legacy_name: String,
}

impl CacheNames {
    pub fn for_version(app_name: &str, version: &str) -> Self {
        Self {
            static_name: format!("static-{version}"),
            dynamic_name: format!("dynamic-{version}"),
            legacy_name: format!("{app_name}-{version}"),
        }
    }

    /// Whether `name` must survive activation.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name || name == self.legacy_name
    }

    /// Generations searched by a cross-generation lookup, in order.
    pub fn lookup_order(&self) -> [&str; 2] {
        [self.static_name.as_str(), self.dynamic_name.as_str()]
    }
}
