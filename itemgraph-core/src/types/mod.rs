//! Synthesized item types.
//!
//! An [`ItemType`] is built once per kind by the [`factory`], or by hand with
//! a [`TypeBuilder`], and registered in the [`TypeRegistry`]. Per-kind
//! constructors and accessors are driven by the parameter tables of the
//! kind's [`ItemDefinition`]: one generic constructor validates against them
//! instead of a generated function per kind.

pub mod builder;
pub mod factory;
pub mod registry;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::catalog::{ItemDefinition, TYPE_NAMESPACE};
use crate::item::Interface;
use crate::mixin::{Accessor, Mixin, Shape};
use crate::ItemResult;

pub use builder::{Registration, TypeBuilder};
pub use registry::TypeRegistry;

/// Kind name of the generic fallback type.
pub const GENERIC_KIND: &str = "mvAll";

/// Errors raised while composing or registering a type. Never caught
/// internally: they make the affected kind unavailable.
#[derive(Debug, Error)]
pub enum TypeError {
    /// The identity is not a well-formed `(id, "mvAppItemType::name")` pair.
    #[error("malformed type identity {0}")]
    MalformedIdentity(String),

    /// Bases disagree on creation command or host identity.
    #[error("cannot create type {type_name:?}: incompatible union of bases ({reason})")]
    IncompatibleBases {
        /// Type being built.
        type_name: String,
        /// Which members disagree.
        reason: String,
    },

    /// A member would shadow the handle's identity or truthiness.
    #[error("type {type_name:?} cannot override identity member {member:?}")]
    TruthinessOverride {
        /// Type being built.
        type_name: String,
        /// Offending member name.
        member: String,
    },

    /// Another type is already registered under the same id or name.
    #[error("type {type_name:?} collides with registered identity {existing}")]
    DuplicateIdentity {
        /// Type being registered.
        type_name: String,
        /// Identity already in the registry.
        existing: TypeIdentity,
    },

    /// The catalog has no definition for the kind.
    #[error("unknown item kind {0:?}")]
    UnknownKind(String),
}

/// Host identity of a type: numeric id and qualified type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeIdentity {
    id: i64,
    name: String,
}

impl TypeIdentity {
    /// Build an identity.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::MalformedIdentity`] for a negative id or a name
    /// outside the `mvAppItemType::` namespace.
    pub fn new(id: i64, name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        let well_formed = id >= 0
            && name
                .strip_prefix(TYPE_NAMESPACE)
                .and_then(|rest| rest.strip_prefix("::"))
                .is_some_and(|kind| !kind.is_empty() && !kind.contains(':'));
        if !well_formed {
            return Err(TypeError::MalformedIdentity(format!("({id}, {name:?})")));
        }
        Ok(Self { id, name })
    }

    /// Parse an identity from a JSON `[id, name]` pair.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::MalformedIdentity`] unless the value is a
    /// two-element array of an integer and a string.
    pub fn from_value(value: &Value) -> Result<Self, TypeError> {
        let malformed = || TypeError::MalformedIdentity(value.to_string());
        match value.as_array().map(Vec::as_slice) {
            Some([Value::Number(id), Value::String(name)]) => {
                let id = id.as_i64().ok_or_else(malformed)?;
                Self::new(id, name.clone())
            }
            _ => Err(malformed()),
        }
    }

    /// Identity of the generic fallback type.
    #[must_use]
    pub fn generic() -> Self {
        Self {
            id: 0,
            name: format!("{TYPE_NAMESPACE}::{GENERIC_KIND}"),
        }
    }

    /// Numeric type id.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Qualified type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind name without the namespace.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.name
            .rsplit_once("::")
            .map_or(self.name.as_str(), |(_, kind)| kind)
    }

    /// Whether this is the generic identity.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.id == 0 && self.kind() == GENERIC_KIND
    }
}

impl std::fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.id, self.name)
    }
}

/// Getter of a custom property.
pub type PropertyGetter = Arc<dyn Fn(&Interface<'_>) -> ItemResult<Value> + Send + Sync>;
/// Setter of a custom property.
pub type PropertySetter = Arc<dyn Fn(&Interface<'_>, Value) -> ItemResult<()> + Send + Sync>;

/// How a named attribute of an interface is read and written.
#[derive(Clone)]
pub enum Property {
    /// Forwards to a configuration key.
    Config(String),
    /// Reads a state key.
    State(String),
    /// Computed by a mixin.
    Derived(Accessor),
    /// User-supplied accessor.
    Custom {
        /// Reads the attribute.
        get: PropertyGetter,
        /// Writes the attribute; read-only when absent.
        set: Option<PropertySetter>,
    },
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(key) => f.debug_tuple("Config").field(key).finish(),
            Self::State(key) => f.debug_tuple("State").field(key).finish(),
            Self::Derived(accessor) => f.debug_tuple("Derived").field(accessor).finish(),
            Self::Custom { set, .. } => f
                .debug_struct("Custom")
                .field("writable", &set.is_some())
                .finish_non_exhaustive(),
        }
    }
}

/// Runs after the host created the item.
pub type InitHook = Arc<dyn Fn(&Interface<'_>) -> ItemResult<()> + Send + Sync>;
/// Intercepts a configure call; returns the keys still meant for the host.
pub type ConfigureHook =
    Arc<dyn Fn(&Interface<'_>, Map<String, Value>) -> ItemResult<Map<String, Value>> + Send + Sync>;
/// Amends the configuration read back from the host.
pub type ConfigurationHook =
    Arc<dyn Fn(&Interface<'_>, &mut Map<String, Value>) -> ItemResult<()> + Send + Sync>;
/// Produces auxiliary custom state for a save state.
pub type GetStateHook =
    Arc<dyn Fn(&Interface<'_>) -> ItemResult<Option<Map<String, Value>>> + Send + Sync>;
/// Applies auxiliary custom state from a save state.
pub type SetStateHook = Arc<dyn Fn(&Interface<'_>, &Map<String, Value>) -> ItemResult<()> + Send + Sync>;

/// Optional overrides of a type's generated behavior.
#[derive(Clone, Default)]
pub struct TypeHooks {
    /// Post-creation hook.
    pub init: Option<InitHook>,
    /// Configure interceptor.
    pub configure: Option<ConfigureHook>,
    /// Configuration amender.
    pub configuration: Option<ConfigurationHook>,
    /// Custom state producer.
    pub get_state: Option<GetStateHook>,
    /// Custom state consumer.
    pub set_state: Option<SetStateHook>,
}

impl TypeHooks {
    /// Fill unset hooks from `base`.
    pub(crate) fn inherit(&mut self, base: &TypeHooks) {
        self.init = self.init.take().or_else(|| base.init.clone());
        self.configure = self.configure.take().or_else(|| base.configure.clone());
        self.configuration = self
            .configuration
            .take()
            .or_else(|| base.configuration.clone());
        self.get_state = self.get_state.take().or_else(|| base.get_state.clone());
        self.set_state = self.set_state.take().or_else(|| base.set_state.clone());
    }
}

impl std::fmt::Debug for TypeHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeHooks")
            .field("init", &self.init.is_some())
            .field("configure", &self.configure.is_some())
            .field("configuration", &self.configuration.is_some())
            .field("get_state", &self.get_state.is_some())
            .field("set_state", &self.set_state.is_some())
            .finish()
    }
}

/// A synthesized item type. Immutable once built.
pub struct ItemType {
    pub(crate) name: String,
    pub(crate) identity: TypeIdentity,
    pub(crate) definition: Option<Arc<ItemDefinition>>,
    pub(crate) shape: Option<Shape>,
    pub(crate) bases: Vec<Mixin>,
    pub(crate) mro: Vec<Mixin>,
    pub(crate) properties: BTreeMap<String, Property>,
    pub(crate) custom_properties: Vec<(String, Property)>,
    pub(crate) hooks: TypeHooks,
    pub(crate) registration: Registration,
}

impl std::fmt::Debug for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemType")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("shape", &self.shape)
            .field("bases", &self.bases)
            .finish_non_exhaustive()
    }
}

impl ItemType {
    /// Type name (the kind name for synthesized types).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host identity.
    #[must_use]
    pub fn identity(&self) -> &TypeIdentity {
        &self.identity
    }

    /// Kind definition, absent for the generic type.
    #[must_use]
    pub fn definition(&self) -> Option<&Arc<ItemDefinition>> {
        self.definition.as_ref()
    }

    /// Creation command.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.definition.as_deref().map(|d| d.creation_command.as_str())
    }

    /// Low-level shape.
    #[must_use]
    pub fn shape(&self) -> Option<Shape> {
        self.shape
    }

    /// Declared bases, in composition order.
    #[must_use]
    pub fn bases(&self) -> &[Mixin] {
        &self.bases
    }

    /// Mixin resolution order.
    #[must_use]
    pub fn mro(&self) -> &[Mixin] {
        &self.mro
    }

    /// Whether the type composes a mixin, directly or through another.
    #[must_use]
    pub fn has(&self, mixin: Mixin) -> bool {
        self.mro.contains(&mixin)
    }

    /// Whether this is the generic fallback type.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.identity.is_generic()
    }

    /// Resolved property for an attribute name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// All attribute names, sorted.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Type hooks.
    #[must_use]
    pub fn hooks(&self) -> &TypeHooks {
        &self.hooks
    }

    /// Child slot items of this type occupy in their parent.
    #[must_use]
    pub fn target_slot(&self) -> usize {
        factory::target_slot(self.identity.kind())
    }

    /// Constructor keyword arguments this type does not accept, in order.
    #[must_use]
    pub fn unexpected_args(&self, params: &Map<String, Value>) -> Vec<String> {
        let Some(def) = &self.definition else {
            return Vec::new();
        };
        params
            .keys()
            .filter(|key| !def.has_param(key))
            .cloned()
            .collect()
    }

    /// Configuration keys this type does not know, in order.
    #[must_use]
    pub fn unknown_config(&self, config: &Map<String, Value>) -> Vec<String> {
        let Some(def) = &self.definition else {
            return Vec::new();
        };
        config
            .keys()
            .filter(|key| !def.knows_config(key))
            .cloned()
            .collect()
    }

    /// Whether configuration read from the host should be filtered to the
    /// kind's readable keys.
    pub(crate) fn readable(&self, key: &str) -> bool {
        self.definition
            .as_deref()
            .map_or(true, |def| def.read_config.contains(key))
    }
}
