//! Process-level runtime options.
//!
//! These correspond to server startup flags; they are plumbed through the
//! planner explicitly so tests can construct isolated configurations.

use serde::Deserialize;

/// Runtime options affecting plan admission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    /// When set, a plan that resolves to a table scan fails at cursor
    /// creation time unless the predicate is unconstrained or the namespace
    /// is a system or local collection.
    #[serde(default)]
    pub no_table_scan: bool,
}

impl RuntimeConfig {
    /// Returns the default configuration (table scans permitted).
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a configuration with table scans forbidden.
    pub fn forbid_table_scans() -> Self {
        Self {
            no_table_scan: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_table_scans() {
        assert!(!RuntimeConfig::new().no_table_scan);
        assert!(RuntimeConfig::forbid_table_scans().no_table_scan);
    }

    #[test]
    fn test_deserialize_from_json() {
        let cfg: RuntimeConfig = serde_json::from_str(r#"{"no_table_scan": true}"#).unwrap();
        assert!(cfg.no_table_scan);

        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert!(!cfg.no_table_scan);
    }
}
