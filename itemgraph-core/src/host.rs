//! The host-engine boundary.
//!
//! The host exposes its scene graph only as a flat namespace of commands
//! operating on integer handles and string aliases. Every failure comes back
//! as an undifferentiated [`HostFault`]; turning that into structured errors
//! is the core's job, not the host's.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::handle::Item;

/// Number of ordered child slots every item carries.
pub const SLOT_COUNT: usize = 4;

/// Opaque low-level failure reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFault(pub String);

impl HostFault {
    /// Create a fault with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for HostFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HostFault {}

/// Result of a host call.
pub type HostResult<T> = Result<T, HostFault>;

/// Generator the host must call whenever it would auto-generate a handle.
pub type HandleGenerator = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Callback bound to an item: `(sender, app_data, user_data)`.
pub type ItemCallback = Arc<dyn Fn(Item, &Value, &Value) + Send + Sync>;

/// How a command is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandForm {
    /// Plain call.
    Simple,
    /// Begin/end pair that pushes the created item on the container stack.
    Scoped,
}

/// What a command hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnKind {
    /// An item handle.
    Handle,
    /// Anything else.
    Other,
}

/// Calling convention of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Positional or keyword.
    Positional,
    /// Keyword only.
    KeywordOnly,
    /// Catch-all keyword arguments.
    VarKeyword,
}

/// One parameter of a host command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Calling convention.
    pub kind: ParamKind,
    /// Default value, `None` when required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    /// Keyword-only parameter with a default.
    #[must_use]
    pub fn keyword(name: &str, default: Value) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::KeywordOnly,
            default: Some(default),
        }
    }

    /// Required positional parameter.
    #[must_use]
    pub fn positional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Positional,
            default: None,
        }
    }

    /// Catch-all keyword parameter.
    #[must_use]
    pub fn var_keyword(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::VarKeyword,
            default: None,
        }
    }
}

/// Introspected signature of a host command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Command name in the host namespace.
    pub name: String,
    /// Invocation form.
    pub form: CommandForm,
    /// Return kind.
    pub returns: ReturnKind,
    /// Ordered parameter list.
    pub params: Vec<ParamSpec>,
}

impl CommandSpec {
    /// Look up a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Arguments for an item-creating command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateArgs {
    /// Explicit parent; `None` lets the host use the container stack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    /// Insert before this sibling instead of appending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<u64>,
    /// Remaining keyword arguments.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl CreateArgs {
    /// Arguments with only keyword parameters.
    #[must_use]
    pub fn with_params(params: Map<String, Value>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Set the parent.
    #[must_use]
    pub fn parent(mut self, parent: impl Into<Item>) -> Self {
        self.parent = Some(parent.into().uuid());
        self
    }

    /// Add a keyword argument.
    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// True when no argument beyond defaults was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_none() && self.before.is_none() && self.params.is_empty()
    }
}

/// Structural information the host keeps for an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    /// Qualified host type name, e.g. `mvAppItemType::mvButton`.
    pub type_name: String,
    /// Parent handle, if parented.
    pub parent: Option<u64>,
    /// Children grouped into the four ordered slots.
    pub children: [Vec<u64>; SLOT_COUNT],
    /// Whether the item can hold children.
    pub container: bool,
    /// Slot this item occupies in its parent.
    pub target_slot: usize,
    /// Bound theme item.
    pub theme: Option<u64>,
    /// Bound font item.
    pub font: Option<u64>,
    /// Bound handler registry.
    pub handlers: Option<u64>,
}

/// Cross-reference bindings an item can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    /// Theme item.
    Theme,
    /// Font item.
    Font,
    /// Item handler registry.
    Handlers,
}

impl Binding {
    /// All bindings in restore order.
    pub const ALL: [Binding; 3] = [Binding::Theme, Binding::Font, Binding::Handlers];

    /// Read the binding out of host info.
    #[must_use]
    pub fn of(self, info: &ItemInfo) -> Option<u64> {
        match self {
            Self::Theme => info.theme,
            Self::Font => info.font,
            Self::Handlers => info.handlers,
        }
    }
}

/// The flat command API of a host UI engine.
///
/// Implementations must be safe to share, but callers only mutate items from
/// the thread that owns the session. The one exception is
/// [`item_type_ids`](Self::item_type_ids), which catalog extraction calls from
/// a short-lived worker thread.
pub trait HostEngine: Send + Sync {
    // -- session --

    /// Start the host session. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a fault if the host cannot start.
    fn create_session(&self) -> HostResult<()>;

    /// Tear the host session down, deleting every item. Idempotent.
    fn teardown_session(&self);

    /// Whether a session is live.
    fn session_ready(&self) -> bool;

    // -- introspection --

    /// Every command exposed by the host.
    fn commands(&self) -> Vec<CommandSpec>;

    /// Kind name to numeric type id. Requires a live session.
    ///
    /// # Errors
    ///
    /// Returns a fault when no session is live.
    fn item_type_ids(&self) -> HostResult<BTreeMap<String, i64>>;

    /// Highest handle the host reserves for its own items.
    fn reserved_handles(&self) -> u64;

    /// Replace the host's internal handle allocator.
    fn install_handle_generator(&self, generator: HandleGenerator);

    // -- items --

    /// Run an item-creating command. `uuid` of `None` asks the host to generate one.
    ///
    /// # Errors
    ///
    /// Returns a fault on any invalid argument, parent or handle.
    fn create_item(&self, command: &str, uuid: Option<u64>, args: CreateArgs) -> HostResult<u64>;

    /// Delete an item and its descendants, or only its descendants.
    ///
    /// # Errors
    ///
    /// Returns a fault if the item does not exist.
    fn delete_item(&self, uuid: u64, children_only: bool) -> HostResult<()>;

    /// Whether the handle refers to a live item.
    fn item_exists(&self, uuid: u64) -> bool;

    /// Update configuration keys.
    ///
    /// # Errors
    ///
    /// Returns a fault for missing items, unknown or read-only keys.
    fn configure_item(&self, uuid: u64, config: &Map<String, Value>) -> HostResult<()>;

    /// Full configuration mapping, possibly with host-internal keys.
    ///
    /// # Errors
    ///
    /// Returns a fault if the item does not exist.
    fn item_configuration(&self, uuid: u64) -> HostResult<Map<String, Value>>;

    /// Structural information.
    ///
    /// # Errors
    ///
    /// Returns a fault if the item does not exist.
    fn item_info(&self, uuid: u64) -> HostResult<ItemInfo>;

    /// Frame state (`pos`, `rect_min`, `hovered`, ...).
    ///
    /// # Errors
    ///
    /// Returns a fault if the item does not exist.
    fn item_state(&self, uuid: u64) -> HostResult<Map<String, Value>>;

    /// Stored value, following `source` indirection.
    ///
    /// # Errors
    ///
    /// Returns a fault if the item does not exist.
    fn value(&self, uuid: u64) -> HostResult<Value>;

    /// Store a value, following `source` indirection.
    ///
    /// # Errors
    ///
    /// Returns a fault if the item does not exist.
    fn set_value(&self, uuid: u64, value: Value) -> HostResult<()>;

    /// Bind or clear a theme, font or handler registry.
    ///
    /// # Errors
    ///
    /// Returns a fault if either item does not exist.
    fn bind(&self, uuid: u64, binding: Binding, target: Option<u64>) -> HostResult<()>;

    // -- aliases --

    /// Register an alias. The host refuses to overwrite an existing alias.
    ///
    /// # Errors
    ///
    /// Returns a fault if the alias is already registered.
    fn add_alias(&self, alias: &str, uuid: u64) -> HostResult<()>;

    /// Unregister an alias.
    ///
    /// # Errors
    ///
    /// Returns a fault if the alias is not registered.
    fn remove_alias(&self, alias: &str) -> HostResult<()>;

    /// Handle bound to an alias.
    fn alias_id(&self, alias: &str) -> Option<u64>;

    /// Alias bound to a handle.
    fn item_alias(&self, uuid: u64) -> Option<String>;

    // -- container stack --

    /// Push a container on the stack.
    ///
    /// # Errors
    ///
    /// Returns a fault if the item is missing or not a container.
    fn push_container(&self, uuid: u64) -> HostResult<()>;

    /// Pop the top container.
    fn pop_container(&self) -> Option<u64>;

    /// Current top of the container stack.
    fn top_container(&self) -> Option<u64>;

    // -- callbacks --

    /// Bind or clear an item's callback.
    ///
    /// # Errors
    ///
    /// Returns a fault if the item does not exist.
    fn set_callback(&self, uuid: u64, callback: Option<ItemCallback>) -> HostResult<()>;

    /// Callback bound to an item.
    fn callback(&self, uuid: u64) -> Option<ItemCallback>;
}
