//! Item graph capture, restore and duplication.
//!
//! ```text
//!  capture ──► SaveState (pure read, local handles)
//!  export  ──► SaveState (aliases assigned, `source` and parents as aliases)
//!                 │
//!                 ▼
//!  restore_all ── pass 1: materialize nodes, record unresolved `source` edges
//!              └─ pass 2: resolve edges against the now-complete alias table
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::handle::{Item, Tag};
use crate::host::{Binding, CreateArgs, SLOT_COUNT};
use crate::item::Interface;
use crate::mixin::Mixin;
use crate::{ItemError, ItemResult};

/// Configuration key holding the value-indirection reference.
pub const SOURCE_KEY: &str = "source";

/// Serializable snapshot of an item subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    /// Alias of the item; the memo key during restore.
    #[serde(default)]
    pub alias: Option<String>,
    /// Qualified host type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Parent handle or alias.
    #[serde(default)]
    pub parent: Option<Tag>,
    /// Bound theme subtree.
    #[serde(default)]
    pub theme: Option<Box<SaveState>>,
    /// Bound font subtree.
    #[serde(default)]
    pub font: Option<Box<SaveState>>,
    /// Bound handler registry subtree.
    #[serde(default)]
    pub handlers: Option<Box<SaveState>>,
    /// Children, grouped by slot.
    #[serde(default)]
    pub children: [Vec<SaveState>; SLOT_COUNT],
    /// Readable configuration, plus `pos` when it is set.
    #[serde(default)]
    pub configuration: Map<String, Value>,
    /// Stored value.
    #[serde(default)]
    pub value: Value,
    /// Auxiliary state from the type's `get_state` hook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Map<String, Value>>,
}

impl SaveState {
    /// Bound subtree for a binding.
    #[must_use]
    pub fn binding(&self, binding: Binding) -> Option<&SaveState> {
        match binding {
            Binding::Theme => self.theme.as_deref(),
            Binding::Font => self.font.as_deref(),
            Binding::Handlers => self.handlers.as_deref(),
        }
    }

    fn binding_mut(&mut self, binding: Binding) -> Option<&mut SaveState> {
        match binding {
            Binding::Theme => self.theme.as_deref_mut(),
            Binding::Font => self.font.as_deref_mut(),
            Binding::Handlers => self.handlers.as_deref_mut(),
        }
    }

    /// Number of nodes in the subtree, bound subtrees included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + Binding::ALL
            .iter()
            .filter_map(|b| self.binding(*b))
            .map(SaveState::node_count)
            .sum::<usize>()
            + self
                .children
                .iter()
                .flatten()
                .map(SaveState::node_count)
                .sum::<usize>()
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::Serialization`] if a value cannot be encoded.
    pub fn to_json(&self) -> ItemResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::Serialization`] on malformed input.
    pub fn from_json(json: &str) -> ItemResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn has_position(pos: &Value) -> bool {
    pos.as_array()
        .is_some_and(|xs| xs.iter().any(|v| v.as_f64().is_some_and(|v| v > 0.0)))
}

/// Configuration worth persisting: readable keys plus `pos` when set.
fn persisted_configuration(itf: &Interface<'_>) -> ItemResult<Map<String, Value>> {
    let mut config = itf.configuration()?;
    let accepts_pos = itf
        .ty()
        .definition()
        .map_or(true, |def| def.write_config.contains("pos"));
    if accepts_pos {
        if let Some(pos) = itf.state()?.remove("pos").filter(has_position) {
            config.insert("pos".to_string(), pos);
        }
    }
    Ok(config)
}

#[derive(Debug)]
struct PendingSource {
    item: Item,
    source: Tag,
    value: Value,
}

/// Deferred `source` edges of one top-level restore.
#[derive(Debug, Default)]
struct Linker {
    pending: Vec<PendingSource>,
}

impl Linker {
    fn finish(self, ctx: &Context) -> ItemResult<()> {
        for edge in self.pending {
            let target = ctx
                .aliases()
                .resolve_tag(&edge.source)
                .filter(|t| ctx.host().item_exists(t.uuid()));
            let Some(target) = target else {
                let name = match edge.source {
                    Tag::Alias(alias) => alias,
                    Tag::Uuid(uuid) => uuid.to_string(),
                };
                tracing::warn!(item = edge.item.uuid(), source = %name, "unresolved source reference");
                return Err(ItemError::UnresolvedReference(name));
            };
            let itf = ctx.interface(edge.item)?;
            link_source(&itf, target, edge.value)?;
        }
        Ok(())
    }
}

fn link_source(itf: &Interface<'_>, target: Item, value: Value) -> ItemResult<()> {
    if !value.is_null() {
        itf.set_value(value)?;
    }
    let mut source = Map::new();
    source.insert(SOURCE_KEY.to_string(), Value::from(target.uuid()));
    itf.configure(source)
}

impl Context {
    /// Snapshot an item subtree. Reads only: no alias is assigned.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if any node disappears mid-walk.
    pub fn capture(&self, itf: &Interface<'_>) -> ItemResult<SaveState> {
        let info = itf.info()?;
        let capture_binding = |binding: Binding| -> ItemResult<Option<Box<SaveState>>> {
            match binding.of(&info) {
                Some(target) => Ok(Some(Box::new(self.capture(&self.interface(target)?)?))),
                None => Ok(None),
            }
        };
        let theme = capture_binding(Binding::Theme)?;
        let font = capture_binding(Binding::Font)?;
        let handlers = capture_binding(Binding::Handlers)?;

        let mut children: [Vec<SaveState>; SLOT_COUNT] = Default::default();
        for (slot, handles) in info.children.iter().enumerate() {
            for child in handles {
                children[slot].push(self.capture(&self.interface(*child)?)?);
            }
        }

        Ok(SaveState {
            alias: itf.alias(),
            type_name: info.type_name.clone(),
            parent: info.parent.map(Tag::Uuid),
            theme,
            font,
            handlers,
            children,
            configuration: persisted_configuration(itf)?,
            value: itf.value()?,
            custom: itf.custom_state()?,
        })
    }

    /// Snapshot an item subtree for serialization.
    ///
    /// Every node (and every `source` target) without an alias gets a
    /// process-local one, `source` references and child parents are written
    /// as aliases, and the root's parent is cleared so a restore can place it
    /// through the container stack.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] if any node disappears mid-walk.
    pub fn export(&self, itf: &Interface<'_>) -> ItemResult<SaveState> {
        self.assign_aliases(itf)?;
        let mut state = self.capture(itf)?;
        self.link_exported(&mut state);
        state.parent = None;
        Ok(state)
    }

    fn ensure_alias(&self, itf: &Interface<'_>) -> ItemResult<()> {
        if itf.alias().is_none() {
            let alias = format!(
                "{}{}{}",
                itf.uuid(),
                self.config().alias_separator,
                uuid::Uuid::new_v4()
            );
            itf.set_alias(&alias)?;
        }
        Ok(())
    }

    fn assign_aliases(&self, itf: &Interface<'_>) -> ItemResult<()> {
        self.ensure_alias(itf)?;
        let source = itf
            .raw_configuration()?
            .get(SOURCE_KEY)
            .and_then(Tag::from_value);
        if let Some(Tag::Uuid(target)) = source {
            if self.host().item_exists(target) {
                self.ensure_alias(&self.interface(target)?)?;
            }
        }

        let info = itf.info()?;
        for binding in Binding::ALL {
            if let Some(target) = binding.of(&info) {
                let bound = self.interface(target)?;
                // bound nodes restore under their own parent, not ours
                if let Some(parent) = bound.info()?.parent {
                    if self.host().item_exists(parent) {
                        self.ensure_alias(&self.interface(parent)?)?;
                    }
                }
                self.assign_aliases(&bound)?;
            }
        }
        for child in info.children.iter().flatten() {
            self.assign_aliases(&self.interface(*child)?)?;
        }
        Ok(())
    }

    fn link_exported(&self, state: &mut SaveState) {
        if let Some(Tag::Uuid(target)) = state.configuration.get(SOURCE_KEY).and_then(Tag::from_value)
        {
            if let Some(alias) = self.aliases().alias_of(Item::new(target)) {
                state
                    .configuration
                    .insert(SOURCE_KEY.to_string(), Value::String(alias));
            }
        }
        for binding in Binding::ALL {
            if let Some(bound) = state.binding_mut(binding) {
                self.link_exported(bound);
                if let Some(Tag::Uuid(parent)) = bound.parent {
                    if let Some(alias) = self.aliases().alias_of(Item::new(parent)) {
                        bound.parent = Some(Tag::Alias(alias));
                    }
                }
            }
        }
        let parent = state.alias.clone().map(Tag::Alias);
        for child in state.children.iter_mut().flatten() {
            child.parent.clone_from(&parent);
            self.link_exported(child);
        }
    }

    /// Restore one subtree. See [`restore_all`](Self::restore_all).
    ///
    /// # Errors
    ///
    /// See [`restore_all`](Self::restore_all).
    pub fn restore(&self, state: &SaveState) -> ItemResult<Interface<'_>> {
        let mut roots = self.restore_all(std::slice::from_ref(state), None)?;
        roots
            .pop()
            .ok_or_else(|| ItemError::NotCreatable(state.type_name.clone()))
    }

    /// Restore several subtrees in one pass, under `parent` when given.
    ///
    /// Aliases act as memo keys: a node whose alias already resolves is not
    /// created again, but its children are still reconciled. `source`
    /// references to nodes not yet materialized are resolved once every
    /// subtree exists.
    ///
    /// # Errors
    ///
    /// - [`ItemError::UnresolvedReference`] naming the first `source` alias
    ///   that no restored or pre-existing item satisfies. Nodes created
    ///   before the failure remain.
    /// - [`ItemError::NotCreatable`] for states of unknown kinds.
    /// - Any creation or configuration error of a node.
    pub fn restore_all(
        &self,
        states: &[SaveState],
        parent: Option<Item>,
    ) -> ItemResult<Vec<Interface<'_>>> {
        self.ensure_session()?;
        let mut linker = Linker::default();
        let roots = states
            .iter()
            .map(|state| self.restore_node(state, parent, &mut linker))
            .collect::<ItemResult<Vec<_>>>()?;
        linker.finish(self)?;
        tracing::debug!(roots = roots.len(), "save states restored");
        Ok(roots)
    }

    fn restore_node(
        &self,
        state: &SaveState,
        parent: Option<Item>,
        linker: &mut Linker,
    ) -> ItemResult<Interface<'_>> {
        let existing = state
            .alias
            .as_deref()
            .and_then(|alias| self.aliases().resolve(alias))
            .filter(|item| self.host().item_exists(item.uuid()));
        if let Some(existing) = existing {
            tracing::trace!(item = existing.uuid(), "restore skipped existing node");
            let itf = self.interface(existing)?;
            self.restore_children(&itf, state, linker)?;
            return Ok(itf);
        }

        let ty = self
            .type_for(&state.type_name)?
            .ok_or_else(|| ItemError::NotCreatable(state.type_name.clone()))?;
        let Some(def) = ty.definition().cloned() else {
            return Err(ItemError::NotCreatable(ty.name().to_string()));
        };

        let mut args = CreateArgs::default();
        for key in def.creation_only() {
            if let Some(value) = state.configuration.get(key) {
                if def.has_param(key) {
                    args.params.insert(key.to_string(), value.clone());
                }
            }
        }
        if !ty.has(Mixin::Root) {
            args.parent = parent
                .or_else(|| {
                    state
                        .parent
                        .as_ref()
                        .and_then(|tag| self.aliases().resolve_tag(tag))
                        .filter(|p| self.host().item_exists(p.uuid()))
                })
                .map(Item::uuid);
        }

        let itf = self.create(&ty, state.alias.clone().map(Tag::Alias), args)?;

        let config: Map<String, Value> = state
            .configuration
            .iter()
            .filter(|(key, _)| def.write_config.contains(*key) && *key != SOURCE_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        itf.configure(config)?;

        match state.configuration.get(SOURCE_KEY).and_then(Tag::from_value) {
            None => {
                if !state.value.is_null() {
                    itf.set_value(state.value.clone())?;
                }
            }
            Some(source) => {
                let target = self
                    .aliases()
                    .resolve_tag(&source)
                    .filter(|t| self.host().item_exists(t.uuid()));
                match target {
                    Some(target) => link_source(&itf, target, state.value.clone())?,
                    None => linker.pending.push(PendingSource {
                        item: itf.item(),
                        source,
                        value: state.value.clone(),
                    }),
                }
            }
        }

        if let Some(custom) = &state.custom {
            itf.apply_custom_state(custom)?;
        }

        for binding in Binding::ALL {
            if let Some(bound) = state.binding(binding) {
                let target = self.restore_node(bound, None, linker)?;
                itf.bind(binding, Some(target.item()))?;
            }
        }

        self.restore_children(&itf, state, linker)?;
        Ok(itf)
    }

    fn restore_children(
        &self,
        itf: &Interface<'_>,
        state: &SaveState,
        linker: &mut Linker,
    ) -> ItemResult<()> {
        for child in state.children.iter().flatten() {
            self.restore_node(child, Some(itf.item()), linker)?;
        }
        Ok(())
    }

    /// Copy an item subtree next to the original, merging `overrides` into
    /// the copy's configuration. Theme, font, handler and `source` bindings
    /// are shared with the original; children are copied recursively.
    ///
    /// # Errors
    ///
    /// - [`ItemError::NotCreatable`] for the generic type.
    /// - Any creation or configuration error of a node.
    pub fn duplicate(
        &self,
        itf: &Interface<'_>,
        overrides: Map<String, Value>,
    ) -> ItemResult<Interface<'_>> {
        let parent = itf.info()?.parent.map(Item::new);
        let copy = self.duplicate_into(itf, parent, overrides)?;
        tracing::debug!(original = itf.uuid(), copy = copy.uuid(), "subtree duplicated");
        Ok(copy)
    }

    fn duplicate_into(
        &self,
        itf: &Interface<'_>,
        parent: Option<Item>,
        overrides: Map<String, Value>,
    ) -> ItemResult<Interface<'_>> {
        let ty = itf.ty();
        let Some(def) = ty.definition().cloned() else {
            return Err(ItemError::NotCreatable(ty.name().to_string()));
        };
        let info = itf.info()?;
        let mut config = persisted_configuration(itf)?;
        config.extend(overrides);

        let mut args = CreateArgs::default();
        for key in def.creation_only() {
            if let Some(value) = config.get(key) {
                args.params.insert(key.to_string(), value.clone());
            }
        }
        if !ty.has(Mixin::Root) {
            args.parent = parent.map(Item::uuid);
        }
        let copy = self.create(ty, None, args)?;

        let source = config.get(SOURCE_KEY).and_then(Tag::from_value);
        let writable: Map<String, Value> = config
            .into_iter()
            .filter(|(key, _)| def.write_config.contains(key) && key != SOURCE_KEY)
            .collect();
        copy.configure(writable)?;

        let value = itf.value()?;
        match source.and_then(|tag| self.aliases().resolve_tag(&tag)) {
            Some(target) if self.host().item_exists(target.uuid()) => {
                link_source(&copy, target, Value::Null)?;
            }
            _ => {
                if !value.is_null() {
                    copy.set_value(value)?;
                }
            }
        }

        if let Some(custom) = itf.custom_state()? {
            copy.apply_custom_state(&custom)?;
        }
        for binding in Binding::ALL {
            if let Some(target) = binding.of(&info) {
                copy.bind(binding, Some(Item::new(target)))?;
            }
        }
        if itf.is_container() {
            for child in info.children.iter().flatten() {
                let child = self.interface(*child)?;
                self.duplicate_into(&child, Some(copy.item()), Map::new())?;
            }
        }
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(alias: &str) -> SaveState {
        SaveState {
            alias: Some(alias.to_string()),
            type_name: "mvAppItemType::mvButton".to_string(),
            parent: None,
            theme: None,
            font: None,
            handlers: None,
            children: Default::default(),
            configuration: Map::new(),
            value: Value::Null,
            custom: None,
        }
    }

    #[test]
    fn test_json_shape() {
        let mut state = leaf("root");
        state.children[1].push(leaf("child"));
        state.children[1][0].parent = Some(Tag::Alias("root".to_string()));
        state.configuration.insert("label".to_string(), json!("Go"));

        let value: Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "mvAppItemType::mvButton");
        assert_eq!(value["children"].as_array().map(Vec::len), Some(SLOT_COUNT));
        assert_eq!(value["children"][1][0]["parent"], "root");
        assert!(value.get("custom").is_none());

        let parsed = SaveState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_missing_fields_default() {
        let parsed = SaveState::from_json(r#"{"type": "mvAppItemType::mvText"}"#).unwrap();
        assert!(parsed.alias.is_none());
        assert!(parsed.children.iter().all(Vec::is_empty));
        assert_eq!(parsed.value, Value::Null);
        assert_eq!(parsed.node_count(), 1);
    }

    #[test]
    fn test_node_count_includes_bindings() {
        let mut state = leaf("a");
        state.theme = Some(Box::new(leaf("theme")));
        state.children[0].push(leaf("b"));
        state.children[1].push(leaf("c"));
        assert_eq!(state.node_count(), 4);
    }

    #[test]
    fn test_has_position() {
        assert!(has_position(&json!([0, 12])));
        assert!(!has_position(&json!([0, 0])));
        assert!(!has_position(&json!(null)));
    }
}
