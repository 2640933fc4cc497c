//! Context configuration.

use serde::{Deserialize, Serialize};

use crate::handle::DEFAULT_HANDLE_FLOOR;

/// Settings of a [`Context`](crate::Context).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use itemgraph_core::ContextConfig;
///
/// let config: ContextConfig = serde_json::from_str(r#"{"alias_separator": ":"}"#).unwrap();
/// assert_eq!(config.alias_separator, ":");
/// assert!(config.auto_session);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Lowest value the handle counter is seeded with.
    pub handle_floor: u64,
    /// Start the host session lazily on first item operation.
    pub auto_session: bool,
    /// Register types whose names start with `_`.
    pub register_private: bool,
    /// Separator between handle and random suffix in generated aliases.
    pub alias_separator: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            handle_floor: DEFAULT_HANDLE_FLOOR,
            auto_session: true,
            register_private: false,
            alias_separator: "-".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.handle_floor, 100_000);
        assert!(config.auto_session);
        assert!(!config.register_private);
        assert_eq!(config.alias_separator, "-");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ContextConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ContextConfig::default());
    }
}
