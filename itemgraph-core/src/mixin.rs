//! Capability mixins.
//!
//! A synthesized type is an ordered list of [`Mixin`]s. Each one is stateless:
//! it contributes accessors (looked up through [`Mixin::accessors`]) and, for
//! the functional capabilities, a trait whose methods round-trip through the
//! host. Views such as [`ContainerView`] are handed out by
//! [`Interface`](crate::Interface) only when the item's type carries the mixin.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handle::Item;
use crate::host::{HostFault, ItemCallback};
use crate::item::Interface;
use crate::{ItemError, ItemResult};

/// Layer a mixin belongs to. Composition order is functional, family, shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Behavioral capabilities (`Sized`, `ValueArray`, `Callback`).
    Functional,
    /// Kind families (`Table`, `Plot`, `Node`, ...).
    Family,
    /// Low-level shape (`Registry`, `Root`, `Container`, `Basic`).
    Shape,
}

/// Low-level classification. Every concrete type has exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// Hidden top-level container.
    Registry,
    /// Unparentable top-level container.
    Root,
    /// Parentable container.
    Container,
    /// Parentable leaf.
    Basic,
}

impl Shape {
    /// Mixins contributed by the shape, in base order.
    #[must_use]
    pub const fn mixins(self) -> &'static [Mixin] {
        match self {
            Self::Registry => &[Mixin::Registry],
            Self::Root => &[Mixin::Root],
            Self::Container => &[Mixin::Container, Mixin::Basic],
            Self::Basic => &[Mixin::Basic],
        }
    }
}

/// Stateless trait composed into a synthesized type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mixin {
    /// Bounding box accessors.
    Sized,
    /// Mutable sequence protocol over the item's value.
    ValueArray,
    /// Directly invocable, forwarding to the bound callback.
    Callback,
    /// Table family.
    Table,
    /// The table itself.
    TableItem,
    /// Item handlers.
    Handler,
    /// Windows.
    Window,
    /// Drawing family.
    Drawing,
    /// Transformable drawing node.
    DrawNode,
    /// Fonts.
    Font,
    /// Plotting family.
    Plotting,
    /// The plot itself.
    Plot,
    /// Plot axes.
    PlotAxis,
    /// Node editor family.
    Node,
    /// The node editor itself.
    NodeEditor,
    /// Themes and theme elements.
    Theme,
    /// Hidden root.
    Registry,
    /// Unparentable container.
    Root,
    /// Can hold children.
    Container,
    /// Can be parented.
    Basic,
}

/// Computed accessor contributed by a mixin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    /// Stored value.
    Value,
    /// Alias, or null.
    Alias,
    /// Parent handle, or null.
    Parent,
    /// Handles of all children, slot by slot.
    Children,
    /// Length of the value array.
    Length,
    /// Position, from state or configuration.
    Pos,
    /// Upper-left corner, derived from `pos` when not reported.
    RectMin,
    /// Lower-right corner, derived from `pos` and size when not reported.
    RectMax,
    /// Size, derived from the corners when not reported.
    RectSize,
}

impl Mixin {
    /// Layer the mixin composes into.
    #[must_use]
    pub const fn layer(self) -> Layer {
        match self {
            Self::Sized | Self::ValueArray | Self::Callback => Layer::Functional,
            Self::Registry | Self::Root | Self::Container | Self::Basic => Layer::Shape,
            _ => Layer::Family,
        }
    }

    /// Mixins this one extends.
    #[must_use]
    pub const fn implied(self) -> &'static [Mixin] {
        match self {
            Self::Registry => &[Mixin::Root],
            Self::Root => &[Mixin::Container],
            Self::DrawNode => &[Mixin::Drawing],
            Self::TableItem => &[Mixin::Table],
            Self::Plot | Self::PlotAxis => &[Mixin::Plotting],
            Self::NodeEditor => &[Mixin::Node],
            _ => &[],
        }
    }

    /// Accessors contributed by the mixin.
    #[must_use]
    pub const fn accessors(self) -> &'static [(&'static str, Accessor)] {
        match self {
            Self::Sized => &[
                ("pos", Accessor::Pos),
                ("rect_min", Accessor::RectMin),
                ("rect_max", Accessor::RectMax),
                ("rect_size", Accessor::RectSize),
            ],
            Self::ValueArray => &[("length", Accessor::Length)],
            Self::Container => &[("children", Accessor::Children)],
            _ => &[],
        }
    }
}

/// Expand bases into their resolution order: each mixin precedes the mixins
/// it extends, and the first occurrence wins.
#[must_use]
pub fn linearize(bases: &[Mixin]) -> Vec<Mixin> {
    fn visit(mixin: Mixin, seen: &mut HashSet<Mixin>, out: &mut Vec<Mixin>) {
        if !seen.insert(mixin) {
            return;
        }
        out.push(mixin);
        for implied in mixin.implied() {
            visit(*implied, seen, out);
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(bases.len() + 2);
    for base in bases {
        visit(*base, &mut seen, &mut out);
    }
    out
}

/// Anything that exposes an interface to capability traits.
pub trait ItemView {
    /// The underlying interface.
    fn interface(&self) -> &Interface<'_>;
}

/// Container capability: container-stack protocol and child access.
pub trait ContainerItem: ItemView {
    /// Push the item on the host container stack.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn push(&self) -> ItemResult<()> {
        let itf = self.interface();
        itf.context()
            .host()
            .push_container(itf.uuid())
            .map_err(|fault| itf.translate(fault))
    }

    /// Pop the host container stack, returning whether the popped item was
    /// this one.
    fn pop(&self) -> bool {
        let itf = self.interface();
        itf.context().host().pop_container() == Some(itf.uuid())
    }

    /// Whether the item is the top of the container stack.
    fn is_top(&self) -> bool {
        let itf = self.interface();
        itf.context().host().top_container() == Some(itf.uuid())
    }

    /// Push the item and pop it again when the guard drops.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn scope(&self) -> ItemResult<ContainerScope<'_>> {
        self.push()?;
        Ok(ContainerScope {
            itf: self.interface(),
        })
    }

    /// Delete every child, keeping the item itself.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn clear(&self) -> ItemResult<()> {
        let itf = self.interface();
        itf.context()
            .host()
            .delete_item(itf.uuid(), true)
            .map_err(|fault| itf.translate(fault))
    }
}

/// Guard returned by [`ContainerItem::scope`].
#[derive(Debug)]
pub struct ContainerScope<'a> {
    itf: &'a Interface<'a>,
}

impl ContainerScope<'_> {
    /// Handle of the scoped container.
    #[must_use]
    pub fn item(&self) -> Item {
        self.itf.item()
    }
}

impl Drop for ContainerScope<'_> {
    fn drop(&mut self) {
        let popped = self.itf.context().host().pop_container();
        if popped != Some(self.itf.uuid()) {
            tracing::warn!(
                item = self.itf.uuid(),
                popped = ?popped,
                "container stack was unbalanced inside scope"
            );
        }
    }
}

fn pair(value: Option<&Value>) -> Option<[f64; 2]> {
    match value? {
        Value::Array(xs) if xs.len() >= 2 => Some([xs[0].as_f64()?, xs[1].as_f64()?]),
        _ => None,
    }
}

/// Sized capability: position and bounding box.
///
/// Some kinds only report `rect_size`; the corners are derived from `pos`
/// and the configured `width`/`height` in that case.
pub trait SizedItem: ItemView {
    /// Position, from state when reported, else from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn pos(&self) -> ItemResult<[f64; 2]> {
        let itf = self.interface();
        if let Some(pos) = pair(itf.state()?.get("pos")) {
            return Ok(pos);
        }
        let config = itf.raw_configuration()?;
        Ok(pair(config.get("pos")).unwrap_or([0.0, 0.0]))
    }

    /// Upper-left corner.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn rect_min(&self) -> ItemResult<[f64; 2]> {
        match pair(self.interface().state()?.get("rect_min")) {
            Some(min) => Ok(min),
            None => self.pos(),
        }
    }

    /// Lower-right corner.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn rect_max(&self) -> ItemResult<[f64; 2]> {
        let itf = self.interface();
        if let Some(max) = pair(itf.state()?.get("rect_max")) {
            return Ok(max);
        }
        let [x, y] = self.pos()?;
        let config = itf.raw_configuration()?;
        let width = config.get("width").and_then(Value::as_f64).unwrap_or(0.0);
        let height = config.get("height").and_then(Value::as_f64).unwrap_or(0.0);
        Ok([x + width, y + height])
    }

    /// Size of the bounding box.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn rect_size(&self) -> ItemResult<[f64; 2]> {
        if let Some(size) = pair(self.interface().state()?.get("rect_size")) {
            return Ok(size);
        }
        let [x0, y0] = self.rect_min()?;
        let [x1, y1] = self.rect_max()?;
        Ok([x1 - x0, y1 - y0])
    }
}

/// Value-array capability: a mutable sequence backed by get/set-value
/// round-trips. Every mutation reads the whole value and writes it back.
pub trait ValueArray: ItemView {
    /// Current value as a vector. A null value is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists, or a
    /// host error if the value is not a sequence.
    fn values(&self) -> ItemResult<Vec<Value>> {
        let itf = self.interface();
        match itf.value()? {
            Value::Array(values) => Ok(values),
            Value::Null => Ok(Vec::new()),
            other => Err(ItemError::host(
                itf.kind(),
                HostFault::new(format!("value {other} is not a sequence")),
            )),
        }
    }

    /// Replace the whole value.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn store(&self, values: Vec<Value>) -> ItemResult<()> {
        self.interface().set_value(Value::Array(values))
    }

    /// Number of elements.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn len(&self) -> ItemResult<usize> {
        Ok(self.values()?.len())
    }

    /// Whether the value is empty.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn is_empty(&self) -> ItemResult<bool> {
        Ok(self.values()?.is_empty())
    }

    /// Element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::IndexOutOfRange`] past the end.
    fn get(&self, index: usize) -> ItemResult<Value> {
        let values = self.values()?;
        let len = values.len();
        values
            .into_iter()
            .nth(index)
            .ok_or(ItemError::IndexOutOfRange { index, len })
    }

    /// Replace the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::IndexOutOfRange`] past the end.
    fn set(&self, index: usize, value: Value) -> ItemResult<()> {
        let mut values = self.values()?;
        let len = values.len();
        let slot = values
            .get_mut(index)
            .ok_or(ItemError::IndexOutOfRange { index, len })?;
        *slot = value;
        self.store(values)
    }

    /// Append an element.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn push(&self, value: Value) -> ItemResult<()> {
        let mut values = self.values()?;
        values.push(value);
        self.store(values)
    }

    /// Append several elements.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn extend(&self, more: impl IntoIterator<Item = Value>) -> ItemResult<()>
    where
        Self: Sized,
    {
        let mut values = self.values()?;
        values.extend(more);
        self.store(values)
    }

    /// Remove and return the last element.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::IndexOutOfRange`] when empty.
    fn pop(&self) -> ItemResult<Value> {
        let mut values = self.values()?;
        let last = values
            .pop()
            .ok_or(ItemError::IndexOutOfRange { index: 0, len: 0 })?;
        self.store(values)?;
        Ok(last)
    }

    /// Insert before `index`; indexes past the end append.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn insert(&self, index: usize, value: Value) -> ItemResult<()> {
        let mut values = self.values()?;
        let index = index.min(values.len());
        values.insert(index, value);
        self.store(values)
    }

    /// Remove and return the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::IndexOutOfRange`] past the end.
    fn remove(&self, index: usize) -> ItemResult<Value> {
        let mut values = self.values()?;
        let len = values.len();
        if index >= len {
            return Err(ItemError::IndexOutOfRange { index, len });
        }
        let removed = values.remove(index);
        self.store(values)?;
        Ok(removed)
    }

    /// Remove the first element equal to `value`, returning whether one was found.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn remove_value(&self, value: &Value) -> ItemResult<bool> {
        let mut values = self.values()?;
        match values.iter().position(|v| v == value) {
            Some(index) => {
                values.remove(index);
                self.store(values)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether any element equals `value`.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn contains(&self, value: &Value) -> ItemResult<bool> {
        Ok(self.values()?.contains(value))
    }

    /// Index of the first element equal to `value`.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn position(&self, value: &Value) -> ItemResult<Option<usize>> {
        Ok(self.values()?.iter().position(|v| v == value))
    }

    /// Number of elements equal to `value`.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn count(&self, value: &Value) -> ItemResult<usize> {
        Ok(self.values()?.iter().filter(|v| *v == value).count())
    }

    /// Reverse in place.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn reverse(&self) -> ItemResult<()> {
        let mut values = self.values()?;
        values.reverse();
        self.store(values)
    }

    /// Remove every element.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn clear(&self) -> ItemResult<()> {
        self.store(Vec::new())
    }

    /// Repeat the current contents `times` times.
    ///
    /// # Errors
    ///
    /// See [`values`](Self::values).
    fn repeat(&self, times: usize) -> ItemResult<()> {
        let values = self.values()?;
        let repeated = std::iter::repeat(values).take(times).flatten().collect();
        self.store(repeated)
    }
}

/// Callback capability: the item forwards invocations to its bound callback.
pub trait CallbackItem: ItemView {
    /// Bound callback.
    fn callback(&self) -> Option<ItemCallback> {
        let itf = self.interface();
        itf.context().host().callback(itf.uuid())
    }

    /// Bind or clear the callback.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn set_callback(&self, callback: Option<ItemCallback>) -> ItemResult<()> {
        let itf = self.interface();
        itf.context()
            .host()
            .set_callback(itf.uuid(), callback)
            .map_err(|fault| itf.translate(fault))
    }

    /// Invoke the bound callback as `(sender, app_data, user_data)`.
    /// Returns whether a callback was bound.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if the item no longer exists.
    fn call(&self, app_data: &Value) -> ItemResult<bool> {
        let itf = self.interface();
        let Some(callback) = self.callback() else {
            return Ok(false);
        };
        let user_data = itf
            .raw_configuration()?
            .get("user_data")
            .cloned()
            .unwrap_or(Value::Null);
        callback(itf.item(), app_data, &user_data);
        Ok(true)
    }
}

macro_rules! view {
    ($(#[$meta:meta])* $name:ident: $($cap:ident),+) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name<'c>(pub(crate) Interface<'c>);

        impl<'c> $name<'c> {
            /// The viewed interface.
            #[must_use]
            pub fn into_inner(self) -> Interface<'c> {
                self.0
            }
        }

        impl ItemView for $name<'_> {
            fn interface(&self) -> &Interface<'_> {
                &self.0
            }
        }

        $(impl $cap for $name<'_> {})+
    };
}

view!(
    /// Container view of an interface.
    ContainerView: ContainerItem
);
view!(
    /// Sized view of an interface.
    SizedView: SizedItem
);
view!(
    /// Value-array view of an interface.
    ValueArrayView: ValueArray
);
view!(
    /// Callback view of an interface.
    CallbackView: CallbackItem
);
