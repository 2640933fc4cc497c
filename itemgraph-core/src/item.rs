//! Typed interfaces over host items.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::Context;
use crate::handle::{Item, Tag};
use crate::host::{Binding, HostFault, ItemInfo, SLOT_COUNT};
use crate::mixin::{
    linearize, Accessor, CallbackView, ContainerView, Mixin, Shape, SizedItem, SizedView,
    ValueArray, ValueArrayView,
};
use crate::types::{factory, ItemType, Property};
use crate::{ConfigFault, ItemError, ItemResult};

/// A host item seen through its synthesized type.
///
/// The interface holds nothing but the handle, the type and the context; all
/// item state lives in the host. It dereferences to [`Item`], so it can be
/// passed wherever a raw handle is expected, and two interfaces are equal
/// exactly when their handles are.
#[derive(Clone)]
pub struct Interface<'c> {
    ctx: &'c Context,
    ty: Arc<ItemType>,
    item: Item,
}

impl std::fmt::Debug for Interface<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("item", &self.item)
            .field("type", &self.ty.name())
            .finish()
    }
}

impl Deref for Interface<'_> {
    type Target = Item;

    fn deref(&self) -> &Item {
        &self.item
    }
}

impl PartialEq for Interface<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.item == other.item
    }
}

impl Eq for Interface<'_> {}

impl From<&Interface<'_>> for Item {
    fn from(itf: &Interface<'_>) -> Self {
        itf.item
    }
}

impl From<&Interface<'_>> for Tag {
    fn from(itf: &Interface<'_>) -> Self {
        Tag::Uuid(itf.item.uuid())
    }
}

impl<'c> Interface<'c> {
    pub(crate) fn new(ctx: &'c Context, ty: Arc<ItemType>, item: Item) -> Self {
        Self { ctx, ty, item }
    }

    /// The handle.
    #[must_use]
    pub fn item(&self) -> Item {
        self.item
    }

    /// The interface's type.
    #[must_use]
    pub fn ty(&self) -> &Arc<ItemType> {
        &self.ty
    }

    /// The owning context.
    #[must_use]
    pub fn context(&self) -> &'c Context {
        self.ctx
    }

    /// Kind name used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.ty.identity().kind()
    }

    /// Whether the item still exists in the host.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.ctx.host().item_exists(self.item.uuid())
    }

    /// Re-check existence and turn a raw fault into a structured error.
    pub(crate) fn translate(&self, fault: HostFault) -> ItemError {
        if self.exists() {
            ItemError::host(self.kind(), fault)
        } else {
            self.missing()
        }
    }

    pub(crate) fn missing(&self) -> ItemError {
        ItemError::missing(self.item, self.kind())
    }

    // -- configuration --

    /// Update configuration.
    ///
    /// # Errors
    ///
    /// - [`ItemError::MissingItem`] if the item no longer exists.
    /// - [`ItemError::Configuration`] naming unknown or read-only keys.
    pub fn configure(&self, config: Map<String, Value>) -> ItemResult<()> {
        let config = match &self.ty.hooks().configure {
            Some(hook) => hook(self, config)?,
            None => config,
        };
        if config.is_empty() {
            return Ok(());
        }
        match self.ctx.host().configure_item(self.item.uuid(), &config) {
            Ok(()) => Ok(()),
            Err(fault) => Err(self.diagnose_configure(&config, fault)),
        }
    }

    fn diagnose_configure(&self, config: &Map<String, Value>, fault: HostFault) -> ItemError {
        if !self.exists() {
            return self.missing();
        }
        let unknown = self.ty.unknown_config(config);
        if !unknown.is_empty() {
            return ItemError::Configuration {
                kind: self.kind().to_string(),
                keys: unknown,
                fault: ConfigFault::Unexpected,
            };
        }
        if let Some(def) = self.ty.definition() {
            let read_only: Vec<String> = config
                .keys()
                .filter(|k| !def.write_config.contains(*k) && !def.callback_params.contains(*k))
                .cloned()
                .collect();
            if !read_only.is_empty() {
                return ItemError::Configuration {
                    kind: self.kind().to_string(),
                    keys: read_only,
                    fault: ConfigFault::ReadOnly,
                };
            }
        }
        ItemError::host(self.kind(), fault)
    }

    /// Configuration restricted to the kind's readable keys.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn configuration(&self) -> ItemResult<Map<String, Value>> {
        let mut config: Map<String, Value> = self
            .raw_configuration()?
            .into_iter()
            .filter(|(key, _)| self.ty.readable(key))
            .collect();
        if let Some(hook) = &self.ty.hooks().configuration {
            hook(self, &mut config)?;
        }
        Ok(config)
    }

    /// Configuration exactly as the host reports it.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn raw_configuration(&self) -> ItemResult<Map<String, Value>> {
        self.ctx
            .host()
            .item_configuration(self.item.uuid())
            .map_err(|fault| self.translate(fault))
    }

    // -- attributes --

    /// Read a named attribute through the type's property table.
    ///
    /// # Errors
    ///
    /// - [`ItemError::Configuration`] if the type has no such attribute.
    /// - [`ItemError::MissingItem`] if the item no longer exists.
    pub fn get(&self, name: &str) -> ItemResult<Value> {
        match self.ty.property(name) {
            Some(Property::Config(key)) => {
                Ok(self.raw_configuration()?.remove(key).unwrap_or(Value::Null))
            }
            Some(Property::State(key)) => Ok(self.state()?.remove(key).unwrap_or(Value::Null)),
            Some(Property::Derived(accessor)) => self.derived(*accessor),
            Some(Property::Custom { get, .. }) => get(self),
            None if self.ty.is_generic() => {
                let mut config = self.raw_configuration()?;
                match config.remove(name) {
                    Some(value) => Ok(value),
                    None => Ok(self.state()?.remove(name).unwrap_or(Value::Null)),
                }
            }
            None => Err(self.config_error(name, ConfigFault::Unexpected)),
        }
    }

    /// Write a named attribute through the type's property table.
    ///
    /// # Errors
    ///
    /// - [`ItemError::Configuration`] if the attribute is unknown or read-only.
    /// - [`ItemError::MissingItem`] if the item no longer exists.
    pub fn set(&self, name: &str, value: Value) -> ItemResult<()> {
        let writable = self
            .ty
            .definition()
            .map_or(self.ty.is_generic(), |def| def.write_config.contains(name));
        match self.ty.property(name) {
            Some(Property::Derived(Accessor::Value)) => self.set_value(value),
            Some(Property::Derived(Accessor::Alias)) => match value {
                Value::String(alias) => self.set_alias(&alias),
                Value::Null => self.set_alias(""),
                _ => Err(self.config_error(name, ConfigFault::Unexpected)),
            },
            Some(Property::Custom { set: Some(set), .. }) => set(self, value),
            Some(Property::Custom { set: None, .. }) => {
                Err(self.config_error(name, ConfigFault::ReadOnly))
            }
            Some(_) | None if writable => self.configure(single(name, value)),
            Some(_) => Err(self.config_error(name, ConfigFault::ReadOnly)),
            None => Err(self.config_error(name, ConfigFault::Unexpected)),
        }
    }

    fn config_error(&self, key: &str, fault: ConfigFault) -> ItemError {
        ItemError::Configuration {
            kind: self.kind().to_string(),
            keys: vec![key.to_string()],
            fault,
        }
    }

    fn derived(&self, accessor: Accessor) -> ItemResult<Value> {
        let sized = || SizedView(self.clone());
        let point = |[x, y]: [f64; 2]| serde_json::json!([x, y]);
        match accessor {
            Accessor::Value => self.value(),
            Accessor::Alias => Ok(self.alias().map_or(Value::Null, Value::String)),
            Accessor::Parent => Ok(self
                .info()?
                .parent
                .map_or(Value::Null, Value::from)),
            Accessor::Children => Ok(Value::from(
                self.info()?
                    .children
                    .into_iter()
                    .flatten()
                    .collect::<Vec<u64>>(),
            )),
            Accessor::Length => Ok(Value::from(ValueArrayView(self.clone()).len()?)),
            Accessor::Pos => sized().pos().map(point),
            Accessor::RectMin => sized().rect_min().map(point),
            Accessor::RectMax => sized().rect_max().map(point),
            Accessor::RectSize => sized().rect_size().map(point),
        }
    }

    // -- value and state --

    /// Stored value.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn value(&self) -> ItemResult<Value> {
        self.ctx
            .host()
            .value(self.item.uuid())
            .map_err(|fault| self.translate(fault))
    }

    /// Store a value.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn set_value(&self, value: Value) -> ItemResult<()> {
        self.ctx
            .host()
            .set_value(self.item.uuid(), value)
            .map_err(|fault| self.translate(fault))
    }

    /// Frame state.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn state(&self) -> ItemResult<Map<String, Value>> {
        self.ctx
            .host()
            .item_state(self.item.uuid())
            .map_err(|fault| self.translate(fault))
    }

    /// Structural information.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn info(&self) -> ItemResult<ItemInfo> {
        self.ctx
            .host()
            .item_info(self.item.uuid())
            .map_err(|fault| self.translate(fault))
    }

    /// Auxiliary state produced by the type's `get_state` hook.
    ///
    /// # Errors
    ///
    /// Propagates hook errors.
    pub fn custom_state(&self) -> ItemResult<Option<Map<String, Value>>> {
        match &self.ty.hooks().get_state {
            Some(hook) => hook(self),
            None => Ok(None),
        }
    }

    /// Apply auxiliary state through the type's `set_state` hook.
    ///
    /// # Errors
    ///
    /// Propagates hook errors.
    pub fn apply_custom_state(&self, state: &Map<String, Value>) -> ItemResult<()> {
        match &self.ty.hooks().set_state {
            Some(hook) => hook(self, state),
            None => Ok(()),
        }
    }

    // -- aliases --

    /// Alias bound to the item.
    #[must_use]
    pub fn alias(&self) -> Option<String> {
        self.ctx.aliases().alias_of(self.item)
    }

    /// Bind an alias, replacing any previous one. An empty alias releases it.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn set_alias(&self, alias: &str) -> ItemResult<()> {
        if !self.exists() {
            return Err(self.missing());
        }
        self.ctx.aliases().bind(self.item, alias)
    }

    // -- graph --

    /// Parent interface; `None` for roots.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn parent(&self) -> ItemResult<Option<Interface<'c>>> {
        match self.info()?.parent {
            Some(parent) => self.ctx.interface(parent).map(Some),
            None => Ok(None),
        }
    }

    /// Children stored in one slot.
    ///
    /// # Errors
    ///
    /// - [`ItemError::IndexOutOfRange`] for a slot past the last one.
    /// - [`ItemError::MissingItem`] if the item no longer exists.
    pub fn children(&self, slot: usize) -> ItemResult<Vec<Interface<'c>>> {
        if slot >= SLOT_COUNT {
            return Err(ItemError::IndexOutOfRange {
                index: slot,
                len: SLOT_COUNT,
            });
        }
        let info = self.info()?;
        info.children[slot]
            .iter()
            .map(|child| self.ctx.interface(*child))
            .collect()
    }

    /// Item bound as theme, font or handler registry.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn binding(&self, binding: Binding) -> ItemResult<Option<Interface<'c>>> {
        match binding.of(&self.info()?) {
            Some(target) => self.ctx.interface(target).map(Some),
            None => Ok(None),
        }
    }

    /// Bound theme.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn theme(&self) -> ItemResult<Option<Interface<'c>>> {
        self.binding(Binding::Theme)
    }

    /// Bound font.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn font(&self) -> ItemResult<Option<Interface<'c>>> {
        self.binding(Binding::Font)
    }

    /// Bound handler registry.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn handlers(&self) -> ItemResult<Option<Interface<'c>>> {
        self.binding(Binding::Handlers)
    }

    /// Bind or clear a theme, font or handler registry.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] naming whichever of the two items
    /// does not exist.
    pub fn bind(&self, binding: Binding, target: Option<Item>) -> ItemResult<()> {
        if let Some(target) = target {
            if !self.ctx.host().item_exists(target.uuid()) {
                return Err(ItemError::missing(target, format!("{binding:?}").to_lowercase()));
            }
        }
        self.ctx
            .host()
            .bind(self.item.uuid(), binding, target.map(Item::uuid))
            .map_err(|fault| self.translate(fault))
    }

    // -- lifecycle --

    /// Delete the item and its descendants.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    pub fn delete(&self) -> ItemResult<()> {
        self.ctx
            .host()
            .delete_item(self.item.uuid(), false)
            .map_err(|fault| self.translate(fault))
    }

    /// Delete the item, ignoring every failure.
    pub fn destroy(&self) {
        if let Err(fault) = self.ctx.host().delete_item(self.item.uuid(), false) {
            tracing::trace!(item = self.item.uuid(), %fault, "destroy ignored host fault");
        }
    }

    // -- capabilities --

    /// Whether the item has a mixin. Types that know their kind answer
    /// statically; the generic type asks the host.
    #[must_use]
    pub fn has(&self, mixin: Mixin) -> bool {
        if !self.ty.is_generic() {
            return self.ty.has(mixin);
        }
        if self.ty.has(mixin) {
            return true;
        }
        let Ok(info) = self.info() else {
            return false;
        };
        let kind = info
            .type_name
            .rsplit_once("::")
            .map_or(info.type_name.as_str(), |(_, kind)| kind);
        let shape = match (info.container, info.parent.is_some()) {
            (true, false) => Shape::Root,
            (true, true) => Shape::Container,
            (false, _) => Shape::Basic,
        };
        let mut bases = factory::classify_family(kind, shape);
        bases.extend(shape.mixins());
        linearize(&bases).contains(&mixin)
    }

    /// Whether the item can hold children.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.has(Mixin::Container)
    }

    /// Whether the item is an unparentable top-level item.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.has(Mixin::Root)
    }

    /// Whether the item is a registry.
    #[must_use]
    pub fn is_registry(&self) -> bool {
        self.has(Mixin::Registry)
    }

    /// Whether the item belongs to the plotting family.
    #[must_use]
    pub fn is_plot_item(&self) -> bool {
        self.has(Mixin::Plotting)
    }

    /// Whether the item belongs to the node editor family.
    #[must_use]
    pub fn is_node_item(&self) -> bool {
        self.has(Mixin::Node)
    }

    /// Whether the item belongs to the theme family.
    #[must_use]
    pub fn is_theme_item(&self) -> bool {
        self.has(Mixin::Theme)
    }

    /// Whether the item belongs to the table family.
    #[must_use]
    pub fn is_table_item(&self) -> bool {
        self.has(Mixin::Table)
    }

    /// Whether the item belongs to the drawing family.
    #[must_use]
    pub fn is_drawing_item(&self) -> bool {
        self.has(Mixin::Drawing)
    }

    /// Child slot the item occupies in its parent.
    #[must_use]
    pub fn target_slot(&self) -> usize {
        if self.ty.is_generic() {
            if let Ok(info) = self.info() {
                return info.target_slot;
            }
        }
        self.ty.target_slot()
    }

    /// Container view, if the item can hold children.
    #[must_use]
    pub fn as_container(&self) -> Option<ContainerView<'c>> {
        self.is_container().then(|| ContainerView(self.clone()))
    }

    /// Sized view, if the type has a bounding box.
    #[must_use]
    pub fn as_sized(&self) -> Option<SizedView<'c>> {
        self.has(Mixin::Sized).then(|| SizedView(self.clone()))
    }

    /// Value-array view, if the type stores a sequence.
    #[must_use]
    pub fn as_value_array(&self) -> Option<ValueArrayView<'c>> {
        self.has(Mixin::ValueArray)
            .then(|| ValueArrayView(self.clone()))
    }

    /// Callback view, if the type accepts a callback.
    #[must_use]
    pub fn as_callback(&self) -> Option<CallbackView<'c>> {
        self.has(Mixin::Callback).then(|| CallbackView(self.clone()))
    }
}

fn single(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}
