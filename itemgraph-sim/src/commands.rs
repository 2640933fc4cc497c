//! The simulated command table.
//!
//! Each [`KindEntry`] describes one item kind the way a real engine exposes
//! it: a simple `add_*` creation command, an optional scoped twin for
//! containers, and a flat keyword parameter list. The table deliberately
//! covers every naming irregularity the catalog extractor corrects.

use std::collections::BTreeMap;

use itemgraph_core::host::{CommandForm, CommandSpec, ParamKind, ParamSpec, ReturnKind};
use serde_json::{json, Value};

/// Keys that never become stored configuration.
pub const PLACEMENT_KEYS: &[&str] = &["tag", "parent", "before", "default_value", "delay_search"];

/// One item kind known to the simulated host.
#[derive(Debug, Clone, PartialEq)]
pub struct KindEntry {
    /// Kind name, e.g. `mvButton`.
    pub kind: &'static str,
    /// Simple creation command.
    pub command: &'static str,
    /// Scoped twin, for containers.
    pub begin: Option<&'static str>,
    /// Keyword parameters, in signature order.
    pub params: Vec<ParamSpec>,
    /// Keys fixed at creation.
    pub read_only: Vec<&'static str>,
}

impl KindEntry {
    fn new(command: &'static str, kind: &'static str) -> Self {
        Self {
            kind,
            command,
            begin: None,
            params: identity(),
            read_only: Vec::new(),
        }
    }

    fn scoped(mut self, begin: &'static str) -> Self {
        self.begin = Some(begin);
        self
    }

    fn with(mut self, params: Vec<ParamSpec>) -> Self {
        self.params.extend(params);
        self
    }

    fn keyword(mut self, name: &str, default: Value) -> Self {
        self.params.push(ParamSpec::keyword(name, default));
        self
    }

    fn read_only(mut self, key: &'static str) -> Self {
        self.read_only.push(key);
        self
    }

    /// Qualified host type name.
    #[must_use]
    pub fn type_name(&self) -> String {
        format!("mvAppItemType::{}", self.kind)
    }

    /// Whether the kind can hold children.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.begin.is_some()
    }

    /// Whether items of this kind take a parent.
    #[must_use]
    pub fn is_parented(&self) -> bool {
        self.param("parent").is_some()
    }

    /// Look up a keyword parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Whether `key` is a callback parameter.
    #[must_use]
    pub fn is_callback(&self, key: &str) -> bool {
        self.param(key).is_some() && (key.contains("callback") || key == "on_close")
    }

    /// Initial stored configuration: every keyword default except placement,
    /// value and `pos`.
    #[must_use]
    pub fn default_config(&self) -> serde_json::Map<String, Value> {
        self.params
            .iter()
            .filter(|p| p.kind == ParamKind::KeywordOnly)
            .filter(|p| !PLACEMENT_KEYS.contains(&p.name.as_str()) && p.name != "pos")
            .map(|p| (p.name.clone(), p.default.clone().unwrap_or(Value::Null)))
            .collect()
    }

    fn specs(&self) -> Vec<CommandSpec> {
        let mut params = self.params.clone();
        params.push(ParamSpec::var_keyword("kwargs"));
        let create = CommandSpec {
            name: self.command.to_string(),
            form: CommandForm::Simple,
            returns: ReturnKind::Handle,
            params,
        };
        let begin = self.begin.map(|begin| CommandSpec {
            name: begin.to_string(),
            form: CommandForm::Scoped,
            ..create.clone()
        });
        std::iter::once(create).chain(begin).collect()
    }
}

fn identity() -> Vec<ParamSpec> {
    vec![
        ParamSpec::keyword("label", Value::Null),
        ParamSpec::keyword("user_data", Value::Null),
        ParamSpec::keyword("use_internal_label", json!(true)),
        ParamSpec::keyword("tag", json!(0)),
    ]
}

fn placement() -> Vec<ParamSpec> {
    vec![
        ParamSpec::keyword("parent", json!(0)),
        ParamSpec::keyword("before", json!(0)),
    ]
}

fn layout() -> Vec<ParamSpec> {
    vec![
        ParamSpec::keyword("width", json!(0)),
        ParamSpec::keyword("height", json!(0)),
        ParamSpec::keyword("indent", json!(-1)),
        ParamSpec::keyword("pos", json!([])),
        ParamSpec::keyword("show", json!(true)),
    ]
}

fn valued(default: Value) -> Vec<ParamSpec> {
    vec![
        ParamSpec::keyword("source", json!(0)),
        ParamSpec::keyword("default_value", default),
    ]
}

fn callback() -> Vec<ParamSpec> {
    vec![ParamSpec::keyword("callback", Value::Null)]
}

/// The built-in kind table.
#[must_use]
pub fn kind_table() -> Vec<KindEntry> {
    vec![
        // roots and registries
        KindEntry::new("add_window", "mvWindowAppItem")
            .scoped("window")
            .with(layout())
            .keyword("no_title_bar", json!(false))
            .keyword("modal", json!(false))
            .keyword("on_close", Value::Null),
        KindEntry::new("add_viewport_drawlist", "mvViewportDrawlist")
            .scoped("viewport_drawlist")
            .keyword("front", json!(true)),
        KindEntry::new("add_value_registry", "mvValueRegistry").scoped("value_registry"),
        KindEntry::new("add_theme", "mvTheme").scoped("theme"),
        KindEntry::new("add_font_registry", "mvFontRegistry").scoped("font_registry"),
        KindEntry::new("add_item_handler_registry", "mvItemHandlerRegistry")
            .scoped("item_handler_registry"),
        KindEntry::new("add_handler_registry", "mvHandlerRegistry").scoped("handler_registry"),
        // containers
        KindEntry::new("add_group", "mvGroup")
            .scoped("group")
            .with(placement())
            .with(layout())
            .keyword("horizontal", json!(false)),
        KindEntry::new("add_child_window", "mvChildWindow")
            .scoped("child_window")
            .with(placement())
            .with(layout())
            .keyword("border", json!(true)),
        KindEntry::new("add_tab_bar", "mvTabBar")
            .scoped("tab_bar")
            .with(placement())
            .with(layout())
            .with(callback()),
        KindEntry::new("add_tab", "mvTab")
            .scoped("tab")
            .with(placement())
            .keyword("closable", json!(false)),
        KindEntry::new("add_table", "mvTable")
            .scoped("table")
            .with(placement())
            .with(layout())
            .keyword("header_row", json!(true)),
        KindEntry::new("add_table_row", "mvTableRow")
            .scoped("table_row")
            .with(placement())
            .keyword("height", json!(0)),
        KindEntry::new("add_table_cell", "mvTableCell")
            .scoped("table_cell")
            .with(placement()),
        KindEntry::new("add_plot", "mvPlot")
            .scoped("plot")
            .with(placement())
            .with(layout())
            .keyword("equal_aspects", json!(false)),
        KindEntry::new("add_plot_axis", "mvPlotAxis")
            .scoped("plot_axis")
            .with(placement())
            .keyword("axis", json!(0))
            .keyword("log_scale", json!(false))
            .read_only("axis"),
        KindEntry::new("add_drawlist", "mvDrawlist")
            .scoped("drawlist")
            .with(placement())
            .with(layout()),
        KindEntry::new("add_draw_layer", "mvDrawLayer")
            .scoped("draw_layer")
            .with(placement())
            .keyword("depth_clipping", json!(false)),
        KindEntry::new("add_draw_node", "mvDrawNode")
            .scoped("draw_node")
            .with(placement()),
        KindEntry::new("add_node_editor", "mvNodeEditor")
            .scoped("node_editor")
            .with(placement())
            .with(layout())
            .with(callback()),
        KindEntry::new("add_node", "mvNode")
            .scoped("node")
            .with(placement())
            .keyword("pos", json!([]))
            .keyword("draggable", json!(true)),
        KindEntry::new("add_node_attribute", "mvNodeAttribute")
            .scoped("node_attribute")
            .with(placement())
            .keyword("attribute_type", json!(0)),
        KindEntry::new("add_theme_component", "mvThemeComponent")
            .scoped("theme_component")
            .with(placement())
            .keyword("item_type", json!(0))
            .keyword("enabled_state", json!(true)),
        KindEntry::new("add_font", "mvFont")
            .scoped("font")
            .with(placement())
            .keyword("file", json!(""))
            .keyword("size", json!(13.0)),
        // leaves
        KindEntry::new("add_button", "mvButton")
            .with(placement())
            .with(layout())
            .with(callback())
            .keyword("small", json!(false)),
        KindEntry::new("add_text", "mvText")
            .with(placement())
            .with(layout())
            .with(valued(json!("")))
            .keyword("wrap", json!(-1))
            .keyword("bullet", json!(false)),
        KindEntry::new("add_input_text", "mvInputText")
            .with(placement())
            .with(layout())
            .with(callback())
            .with(valued(json!("")))
            .keyword("hint", json!(""))
            .keyword("multiline", json!(false)),
        KindEntry::new("add_input_intx", "mvInputIntMulti")
            .with(placement())
            .with(layout())
            .with(callback())
            .with(valued(json!([0, 0, 0, 0])))
            .keyword("size", json!(4)),
        KindEntry::new("add_slider_float", "mvSliderFloat")
            .with(placement())
            .with(layout())
            .with(callback())
            .with(valued(json!(0.0)))
            .keyword("min_value", json!(0.0))
            .keyword("max_value", json!(100.0))
            .keyword("format", json!("%.3f")),
        KindEntry::new("add_3d_slider", "mvSlider3D")
            .with(placement())
            .with(layout())
            .with(callback())
            .with(valued(json!([0.0, 0.0, 0.0, 0.0]))),
        KindEntry::new("add_checkbox", "mvCheckbox")
            .with(placement())
            .with(layout())
            .with(callback())
            .with(valued(json!(false))),
        KindEntry::new("add_table_column", "mvTableColumn")
            .with(placement())
            .keyword("width_fixed", json!(false)),
        KindEntry::new("add_line_series", "mvLineSeries")
            .with(placement())
            .with(valued(json!([])))
            .keyword("show", json!(true)),
        KindEntry::new("add_plot_legend", "mvPlotLegend")
            .with(placement())
            .keyword("location", json!(5)),
        KindEntry::new("add_plot_annotation", "mvAnnotation")
            .with(placement())
            .with(valued(json!([0.0, 0.0])))
            .keyword("offset", json!([0.0, 0.0])),
        KindEntry::new("draw_line", "mvDrawLine")
            .with(placement())
            .keyword("p1", json!([0.0, 0.0]))
            .keyword("p2", json!([0.0, 0.0]))
            .keyword("color", json!([255, 255, 255, 255]))
            .keyword("thickness", json!(1.0)),
        KindEntry::new("draw_rectangle", "mvDrawRect")
            .with(placement())
            .keyword("pmin", json!([0.0, 0.0]))
            .keyword("pmax", json!([0.0, 0.0]))
            .keyword("color", json!([255, 255, 255, 255])),
        KindEntry::new("add_node_link", "mvNodeLink")
            .with(placement())
            .keyword("attr_1", json!(0))
            .keyword("attr_2", json!(0)),
        KindEntry::new("add_theme_color", "mvThemeColor")
            .with(placement())
            .with(valued(json!([0, 0, 0, 255])))
            .keyword("target", json!(0))
            .keyword("category", json!(0)),
        KindEntry::new("add_theme_style", "mvThemeStyle")
            .with(placement())
            .with(valued(json!([1.0, -1.0])))
            .keyword("target", json!(0))
            .keyword("category", json!(0)),
        KindEntry::new("add_item_clicked_handler", "mvClickedHandler")
            .with(placement())
            .with(callback())
            .keyword("button", json!(-1)),
        KindEntry::new("add_key_press_handler", "mvKeyPressHandler")
            .with(placement())
            .with(callback())
            .keyword("key", json!(-1)),
        KindEntry::new("add_float_value", "mvFloatValue")
            .with(placement())
            .with(valued(json!(0.0))),
        KindEntry::new("add_string_value", "mvStringValue")
            .with(placement())
            .with(valued(json!(""))),
    ]
}

/// Commands that return something other than an item, or are not item
/// constructors despite returning a handle.
fn utility_commands() -> Vec<CommandSpec> {
    let utility = |name: &str, returns: ReturnKind, params: Vec<ParamSpec>| CommandSpec {
        name: name.to_string(),
        form: CommandForm::Simple,
        returns,
        params,
    };
    vec![
        utility("get_value", ReturnKind::Other, vec![ParamSpec::positional("item")]),
        utility(
            "configure_item",
            ReturnKind::Other,
            vec![ParamSpec::positional("item"), ParamSpec::var_keyword("kwargs")],
        ),
        utility("last_item", ReturnKind::Handle, Vec::new()),
        CommandSpec {
            name: "popup".to_string(),
            form: CommandForm::Scoped,
            returns: ReturnKind::Handle,
            params: vec![
                ParamSpec::positional("parent"),
                ParamSpec::keyword("tag", json!(0)),
            ],
        },
    ]
}

/// Indexed view of the kind table.
#[derive(Debug, Clone)]
pub struct CommandTable {
    kinds: Vec<KindEntry>,
    extra: Vec<CommandSpec>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new(kind_table())
    }
}

impl CommandTable {
    /// Build a table from kind entries.
    #[must_use]
    pub fn new(kinds: Vec<KindEntry>) -> Self {
        Self {
            kinds,
            extra: utility_commands(),
        }
    }

    /// Add a raw command with no backing kind.
    pub fn push_command(&mut self, spec: CommandSpec) {
        self.extra.push(spec);
    }

    /// Every command, creation commands first.
    #[must_use]
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.kinds
            .iter()
            .flat_map(KindEntry::specs)
            .chain(self.extra.iter().cloned())
            .collect()
    }

    /// Kind created by a command name, simple or scoped.
    #[must_use]
    pub fn by_command(&self, command: &str) -> Option<&KindEntry> {
        self.kinds
            .iter()
            .find(|k| k.command == command || k.begin == Some(command))
    }

    /// Kind by name.
    #[must_use]
    pub fn by_kind(&self, kind: &str) -> Option<&KindEntry> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    /// Numeric type ids, numbered in table order from 1.
    #[must_use]
    pub fn type_ids(&self) -> BTreeMap<String, i64> {
        self.kinds
            .iter()
            .zip(1_i64..)
            .map(|(k, id)| (k.kind.to_string(), id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scoped_command_has_a_twin() {
        let table = CommandTable::default();
        let commands = table.commands();
        for scoped in commands
            .iter()
            .filter(|c| c.form == CommandForm::Scoped && c.name != "popup")
        {
            let twin = table.by_command(&scoped.name).map(|k| k.command);
            assert!(
                commands.iter().any(|c| Some(c.name.as_str()) == twin),
                "{} has no creation twin",
                scoped.name
            );
        }
    }

    #[test]
    fn test_type_ids_unique() {
        let ids = CommandTable::default().type_ids();
        let mut values: Vec<_> = ids.values().copied().collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), ids.len());
        assert!(values.iter().all(|id| *id > 0));
    }

    #[test]
    fn test_default_config_skips_placement() {
        let table = CommandTable::default();
        let button = table.by_kind("mvButton").unwrap();
        let config = button.default_config();
        assert!(config.contains_key("label"));
        assert!(config.contains_key("width"));
        for key in ["tag", "parent", "before", "pos"] {
            assert!(!config.contains_key(key), "{key} stored as config");
        }
        assert!(button.is_callback("callback"));
        assert!(button.is_parented());
        assert!(!table.by_kind("mvTheme").unwrap().is_parented());
    }
}
