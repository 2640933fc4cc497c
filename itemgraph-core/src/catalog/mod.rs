//! Command catalog extraction.
//!
//! The host is introspected once per process to build an immutable
//! [`ItemDefinition`] per item kind. Numeric type ids are only available from
//! a live session, so the extractor runs the host's minimal bootstrap (create
//! and immediately tear down a throwaway session) on a dedicated worker thread
//! and joins it; the caller's thread is never bound to a rendering context.

pub mod naming;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::host::{CommandForm, CommandSpec, HostEngine, ParamKind, ParamSpec, ReturnKind};

/// Namespace prefix of qualified host type names.
pub const TYPE_NAMESPACE: &str = "mvAppItemType";

/// Parameters that never count as configuration: identity, placement,
/// value and search hints.
const NON_CONFIG_PARAMS: &[&str] = &["tag", "id", "parent", "before", "default_value", "delay_search"];

/// Access of a configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Configurable, but reported through item state.
    WriteOnly,
    /// Reported, but fixed at creation.
    ReadOnly,
}

/// Per-kind configuration access overrides (`None` applies to every kind).
const ACCESS_OVERRIDES: &[(Option<&str>, &str, Access)] = &[
    (None, "pos", Access::WriteOnly),
    (Some("mvPlotAxis"), "axis", Access::ReadOnly),
];

/// Errors raised while extracting the catalog. Always fatal.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A command looks like an item command but its shape is not understood.
    #[error("unrecognized command shape {command:?}: {reason}")]
    UnknownShape {
        /// Offending command.
        command: String,
        /// What was wrong with it.
        reason: String,
    },

    /// No naming rule maps the command to a kind the host reports.
    #[error("command {command:?} maps to unknown item kind {kind:?}")]
    UnknownKind {
        /// Offending command.
        command: String,
        /// Last candidate kind name tried.
        kind: String,
    },

    /// The bootstrap session failed.
    #[error("catalog bootstrap failed: {0}")]
    Bootstrap(String),
}

/// Immutable description of one item kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDefinition {
    /// Kind name, e.g. `mvButton`.
    pub kind_name: String,
    /// Host-internal numeric id of the kind.
    pub numeric_type_id: i64,
    /// Simple command that creates the item.
    pub creation_command: String,
    /// Scoped begin command, for containers.
    pub begin_command: Option<String>,
    /// Whether the kind has a scoped form.
    pub is_container: bool,
    /// Constructor parameters.
    pub init_params: Vec<ParamSpec>,
    /// Keys reported by `configuration`.
    pub read_config: BTreeSet<String>,
    /// Keys accepted by `configure`.
    pub write_config: BTreeSet<String>,
    /// Callback parameters, reached through the callback capability.
    pub callback_params: BTreeSet<String>,
}

impl ItemDefinition {
    /// Build a definition from the creation command's signature.
    #[must_use]
    pub fn from_command(
        kind_name: &str,
        numeric_type_id: i64,
        create: &CommandSpec,
        begin: Option<&CommandSpec>,
    ) -> Self {
        let init_params: Vec<ParamSpec> = create
            .params
            .iter()
            .filter(|p| p.kind != ParamKind::VarKeyword)
            .cloned()
            .collect();

        let mut read_config = BTreeSet::new();
        let mut write_config = BTreeSet::new();
        let mut callback_params = BTreeSet::new();
        for param in init_params.iter().filter(|p| p.kind == ParamKind::KeywordOnly) {
            let name = param.name.as_str();
            if NON_CONFIG_PARAMS.contains(&name) || name.contains("default") {
                continue;
            }
            if name.contains("callback") || name == "on_close" {
                callback_params.insert(name.to_string());
                continue;
            }
            match access_override(kind_name, name) {
                Some(Access::WriteOnly) => {
                    write_config.insert(name.to_string());
                }
                Some(Access::ReadOnly) => {
                    read_config.insert(name.to_string());
                }
                None => {
                    read_config.insert(name.to_string());
                    write_config.insert(name.to_string());
                }
            }
        }

        Self {
            kind_name: kind_name.to_string(),
            numeric_type_id,
            creation_command: create.name.clone(),
            begin_command: begin.map(|b| b.name.clone()),
            is_container: begin.is_some(),
            init_params,
            read_config,
            write_config,
            callback_params,
        }
    }

    /// Qualified host type name, e.g. `mvAppItemType::mvButton`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{TYPE_NAMESPACE}::{}", self.kind_name)
    }

    /// Whether the constructor takes a parameter.
    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.init_params.iter().any(|p| p.name == name)
    }

    /// Whether a key is known as configuration in any direction.
    #[must_use]
    pub fn knows_config(&self, key: &str) -> bool {
        self.read_config.contains(key)
            || self.write_config.contains(key)
            || self.callback_params.contains(key)
    }

    /// Keys fixed at creation: reported but not writable.
    pub fn creation_only(&self) -> impl Iterator<Item = &str> {
        self.read_config
            .iter()
            .filter(|k| !self.write_config.contains(*k))
            .map(String::as_str)
    }
}

fn access_override(kind: &str, param: &str) -> Option<Access> {
    ACCESS_OVERRIDES
        .iter()
        .find(|(k, p, _)| *p == param && k.map_or(true, |k| k == kind))
        .map(|(_, _, access)| *access)
}

/// The process-lifetime table of item definitions, keyed by kind name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    definitions: BTreeMap<String, Arc<ItemDefinition>>,
}

impl Catalog {
    /// Build a catalog from definitions.
    #[must_use]
    pub fn from_definitions(definitions: impl IntoIterator<Item = ItemDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.kind_name.clone(), Arc::new(d)))
                .collect(),
        }
    }

    /// Definition for a kind name (`mvButton`) or qualified name.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&Arc<ItemDefinition>> {
        let short = kind
            .strip_prefix(TYPE_NAMESPACE)
            .and_then(|rest| rest.strip_prefix("::"))
            .unwrap_or(kind);
        self.definitions.get(short)
    }

    /// Definition for a numeric type id.
    #[must_use]
    pub fn by_id(&self, id: i64) -> Option<&Arc<ItemDefinition>> {
        self.definitions.values().find(|d| d.numeric_type_id == id)
    }

    /// All definitions, sorted by kind name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ItemDefinition>> {
        self.definitions.values()
    }

    /// Number of kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Whether a command creates an item: returns a handle and takes a
/// keyword-only `tag`.
#[must_use]
pub fn is_item_command(spec: &CommandSpec) -> bool {
    spec.returns == ReturnKind::Handle
        && spec
            .param("tag")
            .is_some_and(|p| p.kind == ParamKind::KeywordOnly)
}

/// Introspect the host and build its catalog.
///
/// # Errors
///
/// Returns [`CatalogError`] naming the first command whose shape or kind name
/// cannot be resolved, or if the bootstrap session fails.
pub fn extract_catalog(host: &dyn HostEngine) -> Result<Catalog, CatalogError> {
    let type_ids = bootstrap_type_ids(host)?;
    let commands = host.commands();
    let by_name: HashMap<&str, &CommandSpec> =
        commands.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut definitions = Vec::new();

    for spec in &commands {
        if !is_item_command(spec) || spec.name.contains("popup") || seen.contains(spec.name.as_str())
        {
            continue;
        }

        let (create, begin, stripped) = match spec.form {
            CommandForm::Scoped => {
                let create = by_name
                    .get(format!("{}{}", naming::ADD_PREFIX, spec.name).as_str())
                    .or_else(|| by_name.get(format!("{}{}", naming::DRAW_PREFIX, spec.name).as_str()))
                    .copied()
                    .ok_or_else(|| CatalogError::UnknownShape {
                        command: spec.name.clone(),
                        reason: "scoped command has no simple creation twin".to_string(),
                    })?;
                if create.form != CommandForm::Simple || !is_item_command(create) {
                    return Err(CatalogError::UnknownShape {
                        command: create.name.clone(),
                        reason: "creation twin of a scoped command does not return a handle"
                            .to_string(),
                    });
                }
                (create, Some(spec), spec.name.as_str())
            }
            CommandForm::Simple => {
                let stripped = naming::strip_command_prefix(&spec.name);
                let begin = by_name
                    .get(stripped)
                    .copied()
                    .filter(|b| b.form == CommandForm::Scoped && b.name != spec.name);
                (spec, begin, stripped)
            }
        };

        seen.insert(create.name.as_str());
        if let Some(begin) = begin {
            seen.insert(begin.name.as_str());
        }

        let (kind, id) = resolve_kind(&create.name, stripped, &type_ids)?;
        tracing::trace!(kind = %kind, command = %create.name, "item kind resolved");
        definitions.push(ItemDefinition::from_command(&kind, id, create, begin));
    }

    let catalog = Catalog::from_definitions(definitions);
    tracing::info!(kinds = catalog.len(), "command catalog extracted");
    Ok(catalog)
}

fn resolve_kind(
    command: &str,
    stripped: &str,
    type_ids: &BTreeMap<String, i64>,
) -> Result<(String, i64), CatalogError> {
    let unknown = |kind: &str| CatalogError::UnknownKind {
        command: command.to_string(),
        kind: kind.to_string(),
    };

    if let Some(kind) = naming::irregular_kind(command) {
        let id = type_ids.get(kind).ok_or_else(|| unknown(kind))?;
        return Ok((kind.to_string(), *id));
    }

    let kind = naming::conventional_kind(stripped);
    if let Some(id) = type_ids.get(&kind) {
        return Ok((kind, *id));
    }

    let corrected = naming::corrected_kind(command, &kind).ok_or_else(|| unknown(&kind))?;
    let id = type_ids.get(&corrected).ok_or_else(|| unknown(&corrected))?;
    Ok((corrected, *id))
}

/// Fetch numeric type ids, bootstrapping a throwaway session off-thread when
/// none is live.
fn bootstrap_type_ids(host: &dyn HostEngine) -> Result<BTreeMap<String, i64>, CatalogError> {
    if host.session_ready() {
        return host
            .item_type_ids()
            .map_err(|fault| CatalogError::Bootstrap(fault.to_string()));
    }

    let result = std::thread::scope(|s| {
        s.spawn(|| {
            host.create_session()?;
            let ids = host.item_type_ids();
            host.teardown_session();
            ids
        })
        .join()
    });

    match result {
        Ok(ids) => ids.map_err(|fault| CatalogError::Bootstrap(fault.to_string())),
        Err(_) => Err(CatalogError::Bootstrap(
            "bootstrap worker panicked".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command(name: &str, form: CommandForm, params: Vec<ParamSpec>) -> CommandSpec {
        CommandSpec {
            name: name.to_string(),
            form,
            returns: ReturnKind::Handle,
            params,
        }
    }

    fn button_params() -> Vec<ParamSpec> {
        vec![
            ParamSpec::keyword("label", json!(null)),
            ParamSpec::keyword("tag", json!(0)),
            ParamSpec::keyword("parent", json!(0)),
            ParamSpec::keyword("before", json!(0)),
            ParamSpec::keyword("width", json!(0)),
            ParamSpec::keyword("height", json!(0)),
            ParamSpec::keyword("pos", json!([])),
            ParamSpec::keyword("callback", json!(null)),
            ParamSpec::keyword("default_value", json!(false)),
            ParamSpec::keyword("delay_search", json!(false)),
            ParamSpec::var_keyword("kwargs"),
        ]
    }

    #[test]
    fn test_definition_partitions_parameters() {
        let spec = command("add_button", CommandForm::Simple, button_params());
        let def = ItemDefinition::from_command("mvButton", 7, &spec, None);

        assert_eq!(def.init_params.len(), 10);
        assert!(def.read_config.contains("label"));
        assert!(def.read_config.contains("width"));
        assert!(!def.read_config.contains("pos"));
        assert!(def.write_config.contains("pos"));
        for excluded in ["tag", "parent", "before", "default_value", "delay_search"] {
            assert!(!def.knows_config(excluded), "{excluded} leaked into config");
        }
        assert!(def.callback_params.contains("callback"));
        assert!(!def.is_container);
        assert_eq!(def.qualified_name(), "mvAppItemType::mvButton");
    }

    #[test]
    fn test_read_only_override() {
        let spec = command(
            "add_plot_axis",
            CommandForm::Simple,
            vec![
                ParamSpec::keyword("tag", json!(0)),
                ParamSpec::keyword("axis", json!(0)),
                ParamSpec::keyword("label", json!(null)),
            ],
        );
        let def = ItemDefinition::from_command("mvPlotAxis", 3, &spec, None);
        assert!(def.read_config.contains("axis"));
        assert!(!def.write_config.contains("axis"));
        assert_eq!(def.creation_only().collect::<Vec<_>>(), vec!["axis"]);
    }

    #[test]
    fn test_is_item_command_requires_keyword_tag() {
        let ok = command("add_button", CommandForm::Simple, button_params());
        assert!(is_item_command(&ok));

        let positional = command(
            "add_thing",
            CommandForm::Simple,
            vec![ParamSpec::positional("tag")],
        );
        assert!(!is_item_command(&positional));

        let mut other = ok.clone();
        other.returns = ReturnKind::Other;
        assert!(!is_item_command(&other));
    }

    #[test]
    fn test_catalog_lookup_accepts_qualified_names() {
        let spec = command("add_button", CommandForm::Simple, button_params());
        let catalog =
            Catalog::from_definitions([ItemDefinition::from_command("mvButton", 7, &spec, None)]);
        assert!(catalog.get("mvButton").is_some());
        assert!(catalog.get("mvAppItemType::mvButton").is_some());
        assert_eq!(catalog.by_id(7).map(|d| d.kind_name.as_str()), Some("mvButton"));
        assert!(catalog.get("mvText").is_none());
    }
}
