//! # Itemgraph CLI
//!
//! Inspect the command catalog and synthesized item types of the reference
//! host, and export or restore item graphs as JSON save states.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use itemgraph_core::{
    Binding, Context, ContextConfig, CreateArgs, Interface, ItemResult, Mixin, SaveState,
};
use itemgraph_sim::sim_context;
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "itemgraph",
    version,
    about = "Typed item graphs over a flat UI command API"
)]
struct CliArgs {
    /// JSON file with context settings
    #[arg(long, global = true, value_name = "PATH", env = "ITEMGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Separator used in generated aliases (overrides the config file)
    #[arg(long, global = true, env = "ITEMGRAPH_ALIAS_SEPARATOR")]
    alias_separator: Option<String>,

    /// Lowest handle the counter is seeded with (overrides the config file)
    #[arg(long, global = true, env = "ITEMGRAPH_HANDLE_FLOOR")]
    handle_floor: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the extracted command catalog as JSON
    Catalog,
    /// List synthesized item types
    Types {
        /// Only list types composing this mixin (e.g. `Container`, `Sized`)
        #[arg(long, value_name = "MIXIN")]
        with: Option<String>,
    },
    /// Build the demo graph and print its save states
    Snapshot {
        /// Write to a file instead of stdout
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Restore save states into a fresh host and report what was created
    Restore {
        /// Save state file (a single state or an array of roots)
        input: PathBuf,
    },
}

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,itemgraph_core=debug,itemgraph_sim=info).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,itemgraph_core=debug,itemgraph_sim=info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<ContextConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => ContextConfig::default(),
    };
    if let Some(separator) = &args.alias_separator {
        config.alias_separator.clone_from(separator);
    }
    if let Some(floor) = args.handle_floor {
        config.handle_floor = floor;
    }
    Ok(config)
}

fn run_catalog(config: ContextConfig) -> Result<String> {
    let (_, ctx) = sim_context(config)?;
    let catalog = ctx.catalog().context("catalog extraction failed")?;
    tracing::info!(kinds = catalog.len(), "catalog extracted");
    Ok(serde_json::to_string_pretty(&*catalog)?)
}

fn parse_mixin(name: &str) -> Result<Mixin> {
    serde_json::from_value(Value::String(name.to_string()))
        .with_context(|| format!("unknown mixin {name:?}"))
}

fn run_types(config: ContextConfig, with: Option<&str>) -> Result<String> {
    let (_, ctx) = sim_context(config)?;
    let mut types = ctx.synthesize_all().context("type synthesis failed")?;
    if let Some(name) = with {
        let mixin = parse_mixin(name)?;
        types.retain(|ty| ty.has(mixin));
    }
    types.sort_by_key(|ty| ty.identity().id());

    let mut out = String::new();
    for ty in &types {
        let bases: Vec<String> = ty.bases().iter().map(|m| format!("{m:?}")).collect();
        out.push_str(&format!(
            "{:>4}  {:<24} slot {}  {}\n",
            ty.identity().id(),
            ty.name(),
            ty.target_slot(),
            bases.join(", ")
        ));
    }
    Ok(out)
}

/// A value registry and a themed window whose slider reads from it.
fn build_demo(ctx: &Context) -> ItemResult<Vec<Interface<'_>>> {
    let values = ctx.create_kind("mvValueRegistry", CreateArgs::default())?;
    let volume = ctx.create_kind(
        "mvFloatValue",
        CreateArgs::default()
            .parent(&values)
            .param("default_value", 0.75),
    )?;

    let theme = ctx.create_kind("mvTheme", CreateArgs::default())?;
    let component = ctx.create_kind("mvThemeComponent", CreateArgs::default().parent(&theme))?;
    ctx.create_kind(
        "mvThemeColor",
        CreateArgs::default()
            .parent(&component)
            .param("default_value", json!([46, 52, 64, 255])),
    )?;

    let window = ctx.create_kind("mvWindowAppItem", CreateArgs::default().param("label", "Mixer"))?;
    window.bind(Binding::Theme, Some(theme.item()))?;

    let row = ctx.create_kind(
        "mvGroup",
        CreateArgs::default().parent(&window).param("horizontal", true),
    )?;
    ctx.create_kind(
        "mvButton",
        CreateArgs::default()
            .parent(&row)
            .param("label", "Mute")
            .param("width", 80),
    )?;
    ctx.create_kind(
        "mvSliderFloat",
        CreateArgs::default()
            .parent(&row)
            .param("label", "Volume")
            .param("source", volume.uuid())
            .param("max_value", 1.0),
    )?;
    ctx.create_kind(
        "mvText",
        CreateArgs::default()
            .parent(&window)
            .param("default_value", "Drag to adjust"),
    )?;

    Ok(vec![values, window])
}

fn run_snapshot(config: ContextConfig) -> Result<String> {
    let (_, ctx) = sim_context(config)?;
    let roots = build_demo(&ctx).context("failed to build demo graph")?;
    let states = roots
        .iter()
        .map(|root| ctx.export(root))
        .collect::<ItemResult<Vec<SaveState>>>()
        .context("export failed")?;
    tracing::info!(
        roots = states.len(),
        nodes = states.iter().map(SaveState::node_count).sum::<usize>(),
        "demo graph exported"
    );
    Ok(serde_json::to_string_pretty(&states)?)
}

/// Accept either one state or an array of root states.
fn parse_states(json: &str) -> Result<Vec<SaveState>> {
    let value: Value = serde_json::from_str(json).context("save state is not valid JSON")?;
    let states = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(states)
}

#[derive(Debug, Serialize)]
struct RestoredRoot {
    uuid: u64,
    alias: Option<String>,
    kind: String,
}

#[derive(Debug, Serialize)]
struct RestoreSummary {
    items: usize,
    roots: Vec<RestoredRoot>,
}

fn run_restore(config: ContextConfig, input: &Path) -> Result<RestoreSummary> {
    let json = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read save state {}", input.display()))?;
    let states = parse_states(&json)?;

    let (host, ctx) = sim_context(config)?;
    let roots = ctx
        .restore_all(&states, None)
        .with_context(|| format!("failed to restore {}", input.display()))?;
    Ok(RestoreSummary {
        items: host.item_count(),
        roots: roots
            .iter()
            .map(|root| RestoredRoot {
                uuid: root.uuid(),
                alias: root.alias(),
                kind: root.kind().to_string(),
            })
            .collect(),
    })
}

fn main() -> Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    tracing::debug!(?config, "context configuration loaded");

    match &args.command {
        Command::Catalog => println!("{}", run_catalog(config)?),
        Command::Types { with } => print!("{}", run_types(config, with.as_deref())?),
        Command::Snapshot { output } => {
            let json = run_snapshot(config)?;
            match output {
                Some(path) => {
                    std::fs::write(path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!(path = %path.display(), "snapshot written");
                }
                None => println!("{json}"),
            }
        }
        Command::Restore { input } => {
            let summary = run_restore(config, input)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(argv: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_config_file_is_merged_with_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"alias_separator": ":", "handle_floor": 500000}}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let args = parse(&["itemgraph", "--config", path, "types"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.alias_separator, ":");
        assert_eq!(config.handle_floor, 500_000);
        assert!(config.auto_session);

        let args = parse(&["itemgraph", "--config", path, "--handle-floor", "7", "catalog"]);
        assert_eq!(load_config(&args).unwrap().handle_floor, 7);
    }

    #[test]
    fn test_invalid_config_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let args = parse(&["itemgraph", "--config", file.path().to_str().unwrap(), "catalog"]);
        let err = load_config(&args).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }

    #[test]
    fn test_catalog_dump_lists_kinds() {
        let json = run_catalog(ContextConfig::default()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let definitions = value["definitions"].as_object().unwrap();
        assert_eq!(
            definitions["mvButton"]["creation_command"],
            json!("add_button")
        );
        assert_eq!(definitions["mvGroup"]["begin_command"], json!("group"));
    }

    #[test]
    fn test_types_filter_by_mixin() {
        let containers = run_types(ContextConfig::default(), Some("Container")).unwrap();
        assert!(containers.contains("mvGroup"));
        assert!(!containers.contains("mvButton "));

        assert!(run_types(ContextConfig::default(), Some("Wobbly")).is_err());
    }

    #[test]
    fn test_snapshot_then_restore() {
        let json = run_snapshot(ContextConfig::default()).unwrap();
        let states = parse_states(&json).unwrap();
        assert_eq!(states.len(), 2);
        let nodes: usize = states.iter().map(SaveState::node_count).sum();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, &json).unwrap();

        let summary = run_restore(ContextConfig::default(), &path).unwrap();
        assert_eq!(summary.items, nodes);
        assert_eq!(summary.roots.len(), 2);
        assert_eq!(summary.roots[1].kind, "mvWindowAppItem");
        assert_eq!(summary.roots[1].alias, states[1].alias);
    }

    #[test]
    fn test_restore_accepts_single_state() {
        let json = run_snapshot(ContextConfig::default()).unwrap();
        let registry = parse_states(&json).unwrap().remove(0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, registry.to_json().unwrap()).unwrap();

        let summary = run_restore(ContextConfig::default(), &path).unwrap();
        assert_eq!(summary.items, 2);
        assert_eq!(summary.roots[0].kind, "mvValueRegistry");
    }

    #[test]
    fn test_restore_missing_file() {
        let err = run_restore(ContextConfig::default(), Path::new("/nonexistent/state.json"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to read save state"));
    }
}
