//! Error types for item operations.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::host::HostFault;
use crate::types::TypeError;

/// Result type for item operations.
pub type ItemResult<T> = Result<T, ItemError>;

/// Why a configuration request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFault {
    /// The keys are not accepted by the item's kind.
    Unexpected,
    /// The keys exist but cannot be written after creation.
    ReadOnly,
}

impl std::fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unexpected => f.write_str("unexpected"),
            Self::ReadOnly => f.write_str("read-only"),
        }
    }
}

/// Errors that can occur while working with host items.
///
/// Host faults are never surfaced raw when a kind-aware diagnosis is
/// possible: the core re-checks existence, keys and parents itself and
/// reports one of the structured variants below.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The host command catalog could not be extracted.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A type could not be composed or registered.
    #[error(transparent)]
    TypeComposition(#[from] TypeError),

    /// Unknown or read-only configuration keys.
    #[error("{kind}: {fault} configuration key(s) {}", .keys.join(", "))]
    Configuration {
        /// Kind name of the item the request targeted.
        kind: String,
        /// Offending keys, in request order.
        keys: Vec<String>,
        /// Reason the keys were refused.
        fault: ConfigFault,
    },

    /// The targeted handle or alias does not refer to a live item.
    #[error("item {tag} ({kind}) does not exist")]
    MissingItem {
        /// Handle or alias that was targeted.
        tag: String,
        /// Kind the caller expected, or `unknown`.
        kind: String,
    },

    /// An explicit handle passed to a constructor is already taken.
    #[error("handle {uuid} is already in use by {existing}")]
    ItemInUse {
        /// Requested handle.
        uuid: u64,
        /// Kind of the item that owns it.
        existing: String,
    },

    /// A deferred `source` reference was never satisfied during restore.
    #[error("unresolved `source` reference {0:?}")]
    UnresolvedReference(String),

    /// The requested parent cannot hold an item of this kind.
    #[error("invalid parent for {kind}: {reason}")]
    InvalidParent {
        /// Kind name of the item being created.
        kind: String,
        /// Human readable diagnosis.
        reason: String,
    },

    /// The type has no creation command (generic or abstract interface).
    #[error("type {0} cannot create items")]
    NotCreatable(String),

    /// Sequence index outside of an item's value array.
    #[error("index {index} out of range for value of length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Current length of the value.
        len: usize,
    },

    /// A host fault that no kind-aware check could explain.
    #[error("host fault in {kind}: {fault}")]
    Host {
        /// Kind name of the item involved.
        kind: String,
        /// The raw host fault.
        fault: HostFault,
    },

    /// Save state serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ItemError {
    /// Build a [`ItemError::MissingItem`] for a tag.
    #[must_use]
    pub fn missing(tag: impl std::fmt::Display, kind: impl Into<String>) -> Self {
        Self::MissingItem {
            tag: tag.to_string(),
            kind: kind.into(),
        }
    }

    /// Wrap a raw host fault for a kind.
    #[must_use]
    pub fn host(kind: impl Into<String>, fault: HostFault) -> Self {
        Self::Host {
            kind: kind.into(),
            fault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message_names_keys() {
        let err = ItemError::Configuration {
            kind: "mvButton".to_string(),
            keys: vec!["colour".to_string(), "size".to_string()],
            fault: ConfigFault::Unexpected,
        };
        let msg = err.to_string();
        assert!(msg.contains("mvButton"));
        assert!(msg.contains("colour, size"));
        assert!(msg.contains("unexpected"));
    }

    #[test]
    fn test_missing_item_names_handle() {
        let err = ItemError::missing(100_042, "mvText");
        assert_eq!(err.to_string(), "item 100042 (mvText) does not exist");
    }
}
