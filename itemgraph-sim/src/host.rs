//! In-memory host engine.
//!
//! [`SimHost`] keeps every item in a flat map behind one lock and enforces
//! the same rules a rendering engine would: sessions, parent compatibility,
//! the container stack, the alias registry and value indirection through
//! `source`. It never renders.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::ThreadId;

use itemgraph_core::diagnose::required_parents;
use itemgraph_core::host::{
    Binding, CommandSpec, CreateArgs, HandleGenerator, HostEngine, HostFault, HostResult,
    ItemCallback, ItemInfo, SLOT_COUNT,
};
use itemgraph_core::types::factory::target_slot;
use serde_json::{Map, Value};

use crate::commands::{CommandTable, KindEntry};

/// Upper bound of the handles the engine reserves for its own items.
pub const RESERVED_HANDLES: u64 = 20;

/// Value-indirection configuration key.
const SOURCE: &str = "source";

#[derive(Debug, Clone)]
struct SimItem {
    entry: KindEntry,
    parent: Option<u64>,
    children: [Vec<u64>; SLOT_COUNT],
    config: Map<String, Value>,
    pos: [f64; 2],
    value: Value,
    theme: Option<u64>,
    font: Option<u64>,
    handlers: Option<u64>,
}

impl SimItem {
    fn binding_mut(&mut self, binding: Binding) -> &mut Option<u64> {
        match binding {
            Binding::Theme => &mut self.theme,
            Binding::Font => &mut self.font,
            Binding::Handlers => &mut self.handlers,
        }
    }
}

#[derive(Default)]
struct SimState {
    session: bool,
    items: HashMap<u64, SimItem>,
    aliases: HashMap<String, u64>,
    stack: Vec<u64>,
    callbacks: HashMap<u64, ItemCallback>,
    generator: Option<HandleGenerator>,
    internal_next: u64,
}

impl std::fmt::Debug for SimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimState")
            .field("session", &self.session)
            .field("items", &self.items.len())
            .field("aliases", &self.aliases.len())
            .field("stack", &self.stack)
            .field("generator", &self.generator.is_some())
            .finish_non_exhaustive()
    }
}

fn fault(message: impl Into<String>) -> HostFault {
    HostFault::new(message)
}

fn as_pair(value: &Value) -> Option<[f64; 2]> {
    match value {
        Value::Array(xs) if xs.len() >= 2 => Some([xs[0].as_f64()?, xs[1].as_f64()?]),
        Value::Array(xs) if xs.is_empty() => Some([0.0, 0.0]),
        _ => None,
    }
}

fn nonzero(value: Option<&Value>) -> Option<u64> {
    value.and_then(Value::as_u64).filter(|v| *v != 0)
}

impl SimState {
    fn item(&self, uuid: u64) -> HostResult<&SimItem> {
        self.items
            .get(&uuid)
            .ok_or_else(|| fault(format!("item {uuid} not found")))
    }

    fn item_mut(&mut self, uuid: u64) -> HostResult<&mut SimItem> {
        self.items
            .get_mut(&uuid)
            .ok_or_else(|| fault(format!("item {uuid} not found")))
    }

    fn generate(&mut self) -> u64 {
        match &self.generator {
            Some(generator) => generator(),
            None => {
                self.internal_next = self.internal_next.max(RESERVED_HANDLES + 1);
                let uuid = self.internal_next;
                self.internal_next += 1;
                uuid
            }
        }
    }

    /// Follow `source` links to the item that actually stores the value.
    fn value_owner(&self, uuid: u64) -> HostResult<u64> {
        let mut current = uuid;
        for _ in 0..=self.items.len() {
            let item = self.item(current)?;
            match nonzero(item.config.get(SOURCE)).filter(|s| self.items.contains_key(s)) {
                Some(source) if source != current => current = source,
                _ => return Ok(current),
            }
        }
        Err(fault(format!("value source cycle through item {uuid}")))
    }

    fn resolve_reference(&self, value: &Value) -> HostResult<u64> {
        match value {
            Value::Null => Ok(0),
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| fault(format!("invalid item reference {n}"))),
            Value::String(alias) if alias.is_empty() => Ok(0),
            Value::String(alias) => self
                .aliases
                .get(alias)
                .copied()
                .ok_or_else(|| fault(format!("alias {alias:?} not registered"))),
            other => Err(fault(format!("invalid item reference {other}"))),
        }
    }

    fn descendants(&self, uuid: u64, out: &mut Vec<u64>) {
        if let Some(item) = self.items.get(&uuid) {
            for child in item.children.iter().flatten() {
                out.push(*child);
                self.descendants(*child, out);
            }
        }
    }

    fn remove_items(&mut self, doomed: &[u64]) {
        let doomed: HashSet<u64> = doomed.iter().copied().collect();
        self.items.retain(|uuid, _| !doomed.contains(uuid));
        self.callbacks.retain(|uuid, _| !doomed.contains(uuid));
        self.aliases.retain(|_, uuid| !doomed.contains(uuid));
        self.stack.retain(|uuid| !doomed.contains(uuid));
        for item in self.items.values_mut() {
            for slot in &mut item.children {
                slot.retain(|child| !doomed.contains(child));
            }
            for binding in Binding::ALL {
                let bound = item.binding_mut(binding);
                if bound.is_some_and(|b| doomed.contains(&b)) {
                    *bound = None;
                }
            }
        }
    }
}

/// Reference host engine that records item state in memory.
///
/// ```
/// use std::sync::Arc;
/// use itemgraph_core::{Context, CreateArgs};
/// use itemgraph_sim::SimHost;
///
/// let host = Arc::new(SimHost::new());
/// let ctx = Context::with_defaults(host).unwrap();
/// let window = ctx.create_kind("mvWindowAppItem", CreateArgs::default()).unwrap();
/// let button = ctx
///     .create_kind("mvButton", CreateArgs::default().parent(&window).param("label", "Go"))
///     .unwrap();
/// assert_eq!(button.parent().unwrap(), Some(window));
/// ```
#[derive(Debug)]
pub struct SimHost {
    table: CommandTable,
    state: RwLock<SimState>,
    type_id_threads: Mutex<Vec<ThreadId>>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// Host with the built-in command table.
    #[must_use]
    pub fn new() -> Self {
        Self::with_table(CommandTable::default())
    }

    /// Host over a custom command table.
    #[must_use]
    pub fn with_table(table: CommandTable) -> Self {
        Self {
            table,
            state: RwLock::new(SimState::default()),
            type_id_threads: Mutex::new(Vec::new()),
        }
    }

    /// The command table.
    #[must_use]
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Threads that queried numeric type ids, in call order.
    #[must_use]
    pub fn type_id_threads(&self) -> Vec<ThreadId> {
        self.type_id_threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of live items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.read().items.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, SimState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SimState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_parent(
        state: &SimState,
        entry: &KindEntry,
        args: &CreateArgs,
    ) -> HostResult<Option<u64>> {
        let explicit = args
            .parent
            .filter(|p| *p != 0)
            .or_else(|| nonzero(args.params.get("parent")));
        if !entry.is_parented() {
            if explicit.is_some() {
                return Err(fault(format!("{} items cannot be parented", entry.kind)));
            }
            return Ok(None);
        }
        let parent = explicit
            .or_else(|| state.stack.last().copied())
            .ok_or_else(|| fault(format!("{} requires a parent", entry.kind)))?;
        let parent_entry = &state.item(parent)?.entry;
        if !parent_entry.is_container() {
            return Err(fault(format!("item {parent} cannot hold children")));
        }
        if required_parents(entry.kind, parent_entry.kind).is_some() {
            return Err(fault(format!(
                "{} cannot be a child of {}",
                entry.kind, parent_entry.kind
            )));
        }
        Ok(Some(parent))
    }
}

impl HostEngine for SimHost {
    fn create_session(&self) -> HostResult<()> {
        let mut state = self.write();
        if !state.session {
            state.session = true;
            tracing::debug!("sim session created");
        }
        Ok(())
    }

    fn teardown_session(&self) {
        let mut state = self.write();
        state.session = false;
        state.items.clear();
        state.aliases.clear();
        state.stack.clear();
        state.callbacks.clear();
        tracing::debug!("sim session torn down");
    }

    fn session_ready(&self) -> bool {
        self.read().session
    }

    fn commands(&self) -> Vec<CommandSpec> {
        self.table.commands()
    }

    fn item_type_ids(&self) -> HostResult<BTreeMap<String, i64>> {
        if !self.read().session {
            return Err(fault("type ids require a live session"));
        }
        self.type_id_threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(std::thread::current().id());
        Ok(self.table.type_ids())
    }

    fn reserved_handles(&self) -> u64 {
        RESERVED_HANDLES
    }

    fn install_handle_generator(&self, generator: HandleGenerator) {
        self.write().generator = Some(generator);
    }

    fn create_item(&self, command: &str, uuid: Option<u64>, args: CreateArgs) -> HostResult<u64> {
        let entry = self
            .table
            .by_command(command)
            .cloned()
            .ok_or_else(|| fault(format!("unknown command {command:?}")))?;
        let mut state = self.write();
        if !state.session {
            return Err(fault("no live session"));
        }
        if let Some(key) = args.params.keys().find(|k| entry.param(k).is_none()) {
            return Err(fault(format!("{command}() got an unexpected keyword argument {key:?}")));
        }

        let uuid = match uuid.filter(|u| *u != 0) {
            Some(uuid) if state.items.contains_key(&uuid) => {
                return Err(fault(format!("item {uuid} already exists")));
            }
            Some(uuid) => uuid,
            None => state.generate(),
        };
        let parent = Self::resolve_parent(&state, &entry, &args)?;
        let before = args.before.or_else(|| nonzero(args.params.get("before")));

        let mut config = entry.default_config();
        let mut value = entry
            .param("default_value")
            .and_then(|p| p.default.clone())
            .unwrap_or(Value::Null);
        let mut pos = [0.0, 0.0];
        for (key, arg) in args.params {
            match key.as_str() {
                "pos" => pos = as_pair(&arg).ok_or_else(|| fault("pos must be [x, y]"))?,
                "default_value" => value = arg,
                "tag" | "parent" | "before" | "delay_search" => {}
                SOURCE => {
                    let source = state.resolve_reference(&arg)?;
                    config.insert(key, Value::from(source));
                }
                _ if entry.is_callback(&key) => {}
                _ => {
                    config.insert(key, arg);
                }
            }
        }

        if let Some(parent) = parent {
            let slot = &mut state.item_mut(parent)?.children[target_slot(entry.kind)];
            match before.and_then(|b| slot.iter().position(|c| *c == b)) {
                Some(index) => slot.insert(index, uuid),
                None => slot.push(uuid),
            }
        }

        tracing::debug!(uuid, command, parent = ?parent, "sim item created");
        state.items.insert(
            uuid,
            SimItem {
                entry,
                parent,
                children: Default::default(),
                config,
                pos,
                value,
                theme: None,
                font: None,
                handlers: None,
            },
        );
        Ok(uuid)
    }

    fn delete_item(&self, uuid: u64, children_only: bool) -> HostResult<()> {
        let mut state = self.write();
        state.item(uuid)?;
        let mut doomed = Vec::new();
        state.descendants(uuid, &mut doomed);
        if !children_only {
            doomed.push(uuid);
        }
        state.remove_items(&doomed);
        tracing::trace!(uuid, removed = doomed.len(), "sim items deleted");
        Ok(())
    }

    fn item_exists(&self, uuid: u64) -> bool {
        self.read().items.contains_key(&uuid)
    }

    fn configure_item(&self, uuid: u64, config: &Map<String, Value>) -> HostResult<()> {
        let mut state = self.write();
        let item = state.item(uuid)?;
        let mut updates = Vec::with_capacity(config.len());
        for (key, value) in config {
            if item.entry.read_only.contains(&key.as_str()) {
                return Err(fault(format!("{key:?} cannot be configured after creation")));
            }
            let value = if key == "pos" && item.entry.param("pos").is_some() {
                let [x, y] = as_pair(value).ok_or_else(|| fault("pos must be [x, y]"))?;
                serde_json::json!([x, y])
            } else if key == SOURCE && item.config.contains_key(SOURCE) {
                Value::from(state.resolve_reference(value)?)
            } else if item.entry.is_callback(key) || item.config.contains_key(key) {
                value.clone()
            } else {
                return Err(fault(format!("unknown configuration key {key:?}")));
            };
            updates.push((key.clone(), value));
        }

        let clears_callback = updates
            .iter()
            .any(|(key, value)| value.is_null() && state.items[&uuid].entry.is_callback(key));
        if clears_callback {
            state.callbacks.remove(&uuid);
        }
        let item = state.item_mut(uuid)?;
        for (key, value) in updates {
            if key == "pos" {
                item.pos = as_pair(&value).unwrap_or(item.pos);
            } else if !item.entry.is_callback(&key) {
                item.config.insert(key, value);
            }
        }
        Ok(())
    }

    fn item_configuration(&self, uuid: u64) -> HostResult<Map<String, Value>> {
        Ok(self.read().item(uuid)?.config.clone())
    }

    fn item_info(&self, uuid: u64) -> HostResult<ItemInfo> {
        let state = self.read();
        let item = state.item(uuid)?;
        Ok(ItemInfo {
            type_name: item.entry.type_name(),
            parent: item.parent,
            children: item.children.clone(),
            container: item.entry.is_container(),
            target_slot: target_slot(item.entry.kind),
            theme: item.theme,
            font: item.font,
            handlers: item.handlers,
        })
    }

    fn item_state(&self, uuid: u64) -> HostResult<Map<String, Value>> {
        let state = self.read();
        let item = state.item(uuid)?;
        let mut out = Map::new();
        out.insert("ok".to_string(), Value::Bool(true));
        let shown = item.config.get("show").and_then(Value::as_bool).unwrap_or(true);
        out.insert("visible".to_string(), Value::Bool(shown));
        for flag in ["hovered", "active", "focused", "clicked"] {
            out.insert(flag.to_string(), Value::Bool(false));
        }
        if item.entry.param("pos").is_some() {
            out.insert("pos".to_string(), serde_json::json!(item.pos));
        }
        let width = item.config.get("width").and_then(Value::as_f64);
        let height = item.config.get("height").and_then(Value::as_f64);
        if let (Some(width), Some(height)) = (width, height) {
            out.insert("rect_size".to_string(), serde_json::json!([width, height]));
        }
        Ok(out)
    }

    fn value(&self, uuid: u64) -> HostResult<Value> {
        let state = self.read();
        let owner = state.value_owner(uuid)?;
        Ok(state.item(owner)?.value.clone())
    }

    fn set_value(&self, uuid: u64, value: Value) -> HostResult<()> {
        let mut state = self.write();
        let owner = state.value_owner(uuid)?;
        state.item_mut(owner)?.value = value;
        Ok(())
    }

    fn bind(&self, uuid: u64, binding: Binding, target: Option<u64>) -> HostResult<()> {
        let mut state = self.write();
        if let Some(target) = target {
            let expected = match binding {
                Binding::Theme => "mvTheme",
                Binding::Font => "mvFont",
                Binding::Handlers => "mvItemHandlerRegistry",
            };
            let kind = state.item(target)?.entry.kind;
            if kind != expected {
                return Err(fault(format!("cannot bind {kind} as {binding:?}")));
            }
        }
        *state.item_mut(uuid)?.binding_mut(binding) = target;
        Ok(())
    }

    fn add_alias(&self, alias: &str, uuid: u64) -> HostResult<()> {
        let mut state = self.write();
        if state.aliases.contains_key(alias) {
            return Err(fault(format!("alias {alias:?} already registered")));
        }
        state.aliases.insert(alias.to_string(), uuid);
        Ok(())
    }

    fn remove_alias(&self, alias: &str) -> HostResult<()> {
        self.write()
            .aliases
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| fault(format!("alias {alias:?} not registered")))
    }

    fn alias_id(&self, alias: &str) -> Option<u64> {
        self.read().aliases.get(alias).copied()
    }

    fn item_alias(&self, uuid: u64) -> Option<String> {
        self.read()
            .aliases
            .iter()
            .find(|(_, bound)| **bound == uuid)
            .map(|(alias, _)| alias.clone())
    }

    fn push_container(&self, uuid: u64) -> HostResult<()> {
        let mut state = self.write();
        if !state.item(uuid)?.entry.is_container() {
            return Err(fault(format!("item {uuid} is not a container")));
        }
        state.stack.push(uuid);
        Ok(())
    }

    fn pop_container(&self) -> Option<u64> {
        self.write().stack.pop()
    }

    fn top_container(&self) -> Option<u64> {
        self.read().stack.last().copied()
    }

    fn set_callback(&self, uuid: u64, callback: Option<ItemCallback>) -> HostResult<()> {
        let mut state = self.write();
        state.item(uuid)?;
        match callback {
            Some(callback) => state.callbacks.insert(uuid, callback),
            None => state.callbacks.remove(&uuid),
        };
        Ok(())
    }

    fn callback(&self, uuid: u64) -> Option<ItemCallback> {
        self.read().callbacks.get(&uuid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn live() -> SimHost {
        let host = SimHost::new();
        host.create_session().unwrap();
        host
    }

    #[test]
    fn test_create_requires_session() {
        let host = SimHost::new();
        assert!(host.create_item("add_window", None, CreateArgs::default()).is_err());
        assert!(host.item_type_ids().is_err());
    }

    #[test]
    fn test_internal_handles_skip_reserved_range() {
        let host = live();
        let uuid = host.create_item("add_window", None, CreateArgs::default()).unwrap();
        assert!(uuid > RESERVED_HANDLES);
    }

    #[test]
    fn test_installed_generator_is_used() {
        let host = live();
        host.install_handle_generator(std::sync::Arc::new(|| 777));
        let uuid = host.create_item("add_theme", None, CreateArgs::default()).unwrap();
        assert_eq!(uuid, 777);
    }

    #[test]
    fn test_parenting_rules() {
        let host = live();
        let window = host.create_item("add_window", Some(1_000), CreateArgs::default()).unwrap();
        let button = host
            .create_item("add_button", None, CreateArgs::default().parent(window))
            .unwrap();

        assert!(host.create_item("add_button", None, CreateArgs::default()).is_err());
        assert!(host
            .create_item("add_button", None, CreateArgs::default().parent(button))
            .is_err());
        assert!(host
            .create_item("draw_line", None, CreateArgs::default().parent(window))
            .is_err());
        assert!(host
            .create_item("add_window", None, CreateArgs::default().parent(window))
            .is_err());

        host.push_container(window).unwrap();
        let text = host.create_item("add_text", None, CreateArgs::default()).unwrap();
        assert_eq!(host.pop_container(), Some(window));
        assert_eq!(host.item_info(window).unwrap().children[1], vec![button, text]);
    }

    #[test]
    fn test_before_inserts_in_slot() {
        let host = live();
        let window = host.create_item("add_window", None, CreateArgs::default()).unwrap();
        let last = host
            .create_item("add_button", None, CreateArgs::default().parent(window))
            .unwrap();
        let mut args = CreateArgs::default().parent(window);
        args.before = Some(last);
        let first = host.create_item("add_button", None, args).unwrap();
        assert_eq!(host.item_info(window).unwrap().children[1], vec![first, last]);
    }

    #[test]
    fn test_unexpected_keyword_rejected() {
        let host = live();
        let args = CreateArgs::default().param("colour", "red");
        assert!(host.create_item("add_window", None, args).is_err());
    }

    #[test]
    fn test_configure_rules() {
        let host = live();
        let plot = host.create_item("add_window", None, CreateArgs::default()).unwrap();
        let plot = host
            .create_item("add_plot", None, CreateArgs::default().parent(plot))
            .unwrap();
        let axis = host
            .create_item("add_plot_axis", None, CreateArgs::default().parent(plot).param("axis", 1))
            .unwrap();

        let mut config = Map::new();
        config.insert("axis".to_string(), json!(0));
        assert!(host.configure_item(axis, &config).is_err());

        let mut config = Map::new();
        config.insert("log_scale".to_string(), json!(true));
        host.configure_item(axis, &config).unwrap();
        assert_eq!(host.item_configuration(axis).unwrap()["log_scale"], json!(true));
        assert_eq!(host.item_configuration(axis).unwrap()["axis"], json!(1));

        let mut config = Map::new();
        config.insert("bogus".to_string(), json!(1));
        assert!(host.configure_item(axis, &config).is_err());
    }

    #[test]
    fn test_source_indirection() {
        let host = live();
        let registry = host.create_item("add_value_registry", None, CreateArgs::default()).unwrap();
        let shared = host
            .create_item(
                "add_float_value",
                None,
                CreateArgs::default().parent(registry).param("default_value", 2.5),
            )
            .unwrap();
        let window = host.create_item("add_window", None, CreateArgs::default()).unwrap();
        let slider = host
            .create_item(
                "add_slider_float",
                None,
                CreateArgs::default().parent(window).param("source", shared),
            )
            .unwrap();

        assert_eq!(host.value(slider).unwrap(), json!(2.5));
        host.set_value(slider, json!(4.0)).unwrap();
        assert_eq!(host.value(shared).unwrap(), json!(4.0));
    }

    #[test]
    fn test_delete_cascades_and_releases_aliases() {
        let host = live();
        let window = host.create_item("add_window", None, CreateArgs::default()).unwrap();
        let group = host
            .create_item("add_group", None, CreateArgs::default().parent(window))
            .unwrap();
        let button = host
            .create_item("add_button", None, CreateArgs::default().parent(group))
            .unwrap();
        host.add_alias("go", button).unwrap();
        host.push_container(group).unwrap();

        host.delete_item(group, false).unwrap();
        assert!(!host.item_exists(group));
        assert!(!host.item_exists(button));
        assert_eq!(host.alias_id("go"), None);
        assert_eq!(host.top_container(), None);
        assert!(host.item_info(window).unwrap().children.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_bind_checks_target_kind() {
        let host = live();
        let window = host.create_item("add_window", None, CreateArgs::default()).unwrap();
        let theme = host.create_item("add_theme", None, CreateArgs::default()).unwrap();
        assert!(host.bind(window, Binding::Font, Some(theme)).is_err());
        host.bind(window, Binding::Theme, Some(theme)).unwrap();
        assert_eq!(host.item_info(window).unwrap().theme, Some(theme));

        host.delete_item(theme, false).unwrap();
        assert_eq!(host.item_info(window).unwrap().theme, None);
    }

    #[test]
    fn test_alias_registry_refuses_overwrite() {
        let host = live();
        host.add_alias("a", 1).unwrap();
        assert!(host.add_alias("a", 2).is_err());
        host.remove_alias("a").unwrap();
        assert!(host.remove_alias("a").is_err());
    }

    #[test]
    fn test_teardown_clears_items() {
        let host = live();
        host.create_item("add_window", None, CreateArgs::default()).unwrap();
        host.teardown_session();
        assert_eq!(host.item_count(), 0);
        assert!(!host.session_ready());
    }
}
