//! Handles, aliases and the collision-free handle counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::host::{HandleGenerator, HostEngine};
use crate::{ItemError, ItemResult};

/// Lowest value the handle counter is ever seeded with.
pub const DEFAULT_HANDLE_FLOOR: u64 = 100_000;

/// Raw integer handle of a host item.
///
/// Layout-identical to the host's handle, so it can be passed wherever the
/// host expects one. The integer is the sole truthiness signal: `0` is the
/// null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Item(u64);

impl Item {
    /// The null handle.
    pub const NULL: Item = Item(0);

    /// Wrap a raw handle.
    #[must_use]
    pub const fn new(uuid: u64) -> Self {
        Self(uuid)
    }

    /// The raw handle.
    #[must_use]
    pub const fn uuid(self) -> u64 {
        self.0
    }

    /// Whether this is a non-null handle.
    #[must_use]
    pub const fn is_truthy(self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for Item {
    fn from(uuid: u64) -> Self {
        Self(uuid)
    }
}

impl From<Item> for u64 {
    fn from(item: Item) -> Self {
        item.0
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an item: integer handle or string alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tag {
    /// Integer handle.
    Uuid(u64),
    /// String alias.
    Alias(String),
}

impl Tag {
    /// Whether the tag is the null handle or an empty alias.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Uuid(uuid) => *uuid == 0,
            Self::Alias(alias) => alias.is_empty(),
        }
    }

    /// Interpret a JSON value as a tag (`0`, `""` and `null` yield `None`).
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let tag = match value {
            serde_json::Value::Number(n) => Self::Uuid(n.as_u64()?),
            serde_json::Value::String(s) => Self::Alias(s.clone()),
            _ => return None,
        };
        (!tag.is_null()).then_some(tag)
    }
}

impl From<u64> for Tag {
    fn from(uuid: u64) -> Self {
        Self::Uuid(uuid)
    }
}

impl From<Item> for Tag {
    fn from(item: Item) -> Self {
        Self::Uuid(item.uuid())
    }
}

impl From<&str> for Tag {
    fn from(alias: &str) -> Self {
        Self::Alias(alias.to_string())
    }
}

impl From<String> for Tag {
    fn from(alias: String) -> Self {
        Self::Alias(alias)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uuid(uuid) => write!(f, "{uuid}"),
            Self::Alias(alias) => write!(f, "{alias:?}"),
        }
    }
}

/// Monotonic handle counter seeded above the host's reserved range.
///
/// The host's own allocator cannot be queried, so every auto-generated handle
/// is redirected here through [`generator`](Self::generator).
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU64,
    seed: u64,
}

impl HandleAllocator {
    /// Create a counter starting above both `floor` and `reserved`.
    #[must_use]
    pub fn new(floor: u64, reserved: u64) -> Self {
        let seed = floor.max(reserved.saturating_add(1)).max(1);
        Self {
            next: AtomicU64::new(seed),
            seed,
        }
    }

    /// Issue the next handle.
    pub fn next_handle(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// First handle this counter issued.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generator closure handed to the host.
    #[must_use]
    pub fn generator(self: &Arc<Self>) -> HandleGenerator {
        let allocator = Arc::clone(self);
        Arc::new(move || allocator.next_handle())
    }
}

/// Alias table backed by the host's authoritative alias registry.
///
/// The host refuses to overwrite an alias, so re-binding is done as
/// remove-then-add. Bind, release and lookup share one lock so lookups made
/// through this table never see the gap.
pub struct AliasTable {
    host: Arc<dyn HostEngine>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for AliasTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasTable").finish_non_exhaustive()
    }
}

impl AliasTable {
    /// Create a table over the host's registry.
    #[must_use]
    pub fn new(host: Arc<dyn HostEngine>) -> Self {
        Self {
            host,
            lock: Mutex::new(()),
        }
    }

    /// Handle bound to an alias.
    #[must_use]
    pub fn resolve(&self, alias: &str) -> Option<Item> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.host.alias_id(alias).map(Item::new)
    }

    /// Alias bound to a handle.
    #[must_use]
    pub fn alias_of(&self, item: Item) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.host.item_alias(item.uuid())
    }

    /// Resolve any tag to a handle. Integer tags are returned as-is.
    #[must_use]
    pub fn resolve_tag(&self, tag: &Tag) -> Option<Item> {
        match tag {
            Tag::Uuid(uuid) => Some(Item::new(*uuid)),
            Tag::Alias(alias) => self.resolve(alias),
        }
    }

    /// Bind `alias` to `item`, replacing whatever either side was bound to.
    /// An empty alias releases the item's current alias.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::Host`] if the host rejects the final registration.
    pub fn bind(&self, item: Item, alias: &str) -> ItemResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.host.item_alias(item.uuid());
        if alias.is_empty() {
            if let Some(current) = current {
                self.drop_alias(&current);
            }
            return Ok(());
        }
        if current.as_deref() == Some(alias) {
            return Ok(());
        }
        if let Some(current) = current {
            self.drop_alias(&current);
        }
        if self.host.alias_id(alias).is_some() {
            tracing::debug!(alias, item = item.uuid(), "re-binding alias");
            self.drop_alias(alias);
        }
        self.host
            .add_alias(alias, item.uuid())
            .map_err(|fault| ItemError::host("alias", fault))
    }

    fn drop_alias(&self, alias: &str) {
        if let Err(fault) = self.host.remove_alias(alias) {
            tracing::trace!(alias, %fault, "alias removal ignored host fault");
        }
    }

    /// Unregister an alias.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] naming the alias if it is not registered.
    pub fn release(&self, alias: &str) -> ItemResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.host
            .remove_alias(alias)
            .map_err(|_| ItemError::missing(format!("{alias:?}"), "alias"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_seed_above_reserved_range() {
        let allocator = HandleAllocator::new(10, 5_000);
        assert_eq!(allocator.seed(), 5_001);
        assert_eq!(allocator.next_handle(), 5_001);
        assert_eq!(allocator.next_handle(), 5_002);

        let allocator = HandleAllocator::new(DEFAULT_HANDLE_FLOOR, 20);
        assert_eq!(allocator.next_handle(), DEFAULT_HANDLE_FLOOR);
    }

    #[test]
    fn test_generator_shares_counter() {
        let allocator = Arc::new(HandleAllocator::new(100, 0));
        let generate = allocator.generator();
        assert_eq!(generate(), 100);
        assert_eq!(allocator.next_handle(), 101);
        assert_eq!(generate(), 102);
    }

    #[test]
    fn test_concurrent_handles_are_distinct() {
        let allocator = Arc::new(HandleAllocator::new(1_000, 0));
        let handles: Vec<u64> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let allocator = Arc::clone(&allocator);
                    s.spawn(move || (0..250).map(|_| allocator.next_handle()).collect::<Vec<_>>())
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|w| w.join().unwrap_or_default())
                .collect()
        });
        let unique: HashSet<_> = handles.iter().copied().collect();
        assert_eq!(unique.len(), 1_000);
        assert!(handles.iter().all(|h| *h >= 1_000));
    }

    #[test]
    fn test_tag_from_value() {
        assert_eq!(Tag::from_value(&serde_json::json!(7)), Some(Tag::Uuid(7)));
        assert_eq!(
            Tag::from_value(&serde_json::json!("slider")),
            Some(Tag::Alias("slider".to_string()))
        );
        assert_eq!(Tag::from_value(&serde_json::json!(0)), None);
        assert_eq!(Tag::from_value(&serde_json::json!("")), None);
        assert_eq!(Tag::from_value(&serde_json::Value::Null), None);
    }

    #[test]
    fn test_item_truthiness() {
        assert!(!Item::NULL.is_truthy());
        assert!(Item::new(3).is_truthy());
        assert_eq!(u64::from(Item::new(3)), 3);
    }

    proptest! {
        #[test]
        fn prop_sequential_handles_unique_and_above_reserved(
            n in 1usize..500,
            reserved in 0u64..1_000_000,
        ) {
            let allocator = HandleAllocator::new(DEFAULT_HANDLE_FLOOR, reserved);
            let handles: Vec<u64> = (0..n).map(|_| allocator.next_handle()).collect();
            let unique: HashSet<_> = handles.iter().copied().collect();
            prop_assert_eq!(unique.len(), n);
            prop_assert!(handles.iter().all(|h| *h > reserved));
        }
    }
}
