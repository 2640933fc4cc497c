//! Type synthesis from kind definitions.
//!
//! Classification uses only the creation command's name and parameters:
//!
//! ```text
//!   no `parent` param ──► registry (`*_registry`, `*theme`) or root
//!   scoped command    ──► container + basic
//!   otherwise         ──► basic
//! ```
//!
//! Family mixins come from kind-name prefixes, functional mixins from the
//! parameter set. Bases are composed functional, family, shape.

use std::sync::Arc;

use super::{ItemType, TypeBuilder, TypeError, TypeIdentity, GENERIC_KIND};
use crate::catalog::ItemDefinition;
use crate::mixin::{Mixin, Shape};
use crate::types::Registration;

/// Kinds stored in slot 0 of their parent.
const SLOT_ZERO_KINDS: &[&str] = &[
    "mvFileExtension",
    "mvFontRangeHint",
    "mvNodeLink",
    "mvAnnotation",
    "mvDragLine",
    "mvDragPoint",
    "mvLegend",
    "mvTableColumn",
];

/// Low-level shape of a kind.
#[must_use]
pub fn classify_shape(def: &ItemDefinition) -> Shape {
    if !def.has_param("parent") {
        let command = def.creation_command.as_str();
        if command.ends_with("_registry") || command.ends_with("theme") {
            Shape::Registry
        } else {
            Shape::Root
        }
    } else if def.is_container {
        Shape::Container
    } else {
        Shape::Basic
    }
}

/// Family mixins of a kind, first match wins except for themes.
#[must_use]
pub fn classify_family(kind: &str, shape: Shape) -> Vec<Mixin> {
    let mut family = Vec::with_capacity(2);
    let primary = if kind == "mvTable" {
        Some(Mixin::TableItem)
    } else if kind.starts_with("mvTable") {
        Some(Mixin::Table)
    } else if kind.contains("Handler") && shape != Shape::Registry {
        Some(Mixin::Handler)
    } else if kind.contains("Window") {
        Some(Mixin::Window)
    } else if kind == "mvDrawNode" {
        Some(Mixin::DrawNode)
    } else if kind.starts_with("mvDraw") || kind.contains("Drawlist") {
        Some(Mixin::Drawing)
    } else if kind == "mvFont" {
        Some(Mixin::Font)
    } else if kind == "mvPlot" {
        Some(Mixin::Plot)
    } else if kind == "mvPlotAxis" {
        Some(Mixin::PlotAxis)
    } else if ["Plot", "Series", "mvAnnotation", "mvLegend"]
        .iter()
        .any(|n| kind.contains(n))
    {
        Some(Mixin::Plotting)
    } else if kind == "mvNodeEditor" {
        Some(Mixin::NodeEditor)
    } else if kind.starts_with("mvNode") {
        Some(Mixin::Node)
    } else {
        None
    };
    family.extend(primary);
    if kind.starts_with("mvTheme") {
        family.push(Mixin::Theme);
    }
    family
}

/// Functional mixins of a kind.
#[must_use]
pub fn classify_functional(def: &ItemDefinition) -> Vec<Mixin> {
    let command = def.creation_command.as_str();
    let mut functional = Vec::with_capacity(3);
    if ["_series", "theme_color", "theme_style"]
        .iter()
        .any(|s| command.contains(s))
    {
        functional.push(Mixin::ValueArray);
    }
    if ["pos", "width", "height"].iter().all(|p| def.has_param(p)) {
        functional.push(Mixin::Sized);
    }
    if def.has_param("callback") {
        functional.push(Mixin::Callback);
    }
    functional
}

/// Build the type for a kind definition.
///
/// # Errors
///
/// Returns [`TypeError`] if the definition's identity is malformed or its
/// mixins cannot be composed.
pub fn synthesize(def: &Arc<ItemDefinition>) -> Result<ItemType, TypeError> {
    let shape = classify_shape(def);
    let identity = TypeIdentity::new(def.numeric_type_id, def.qualified_name())?;
    let mut builder = TypeBuilder::new(def.kind_name.clone())
        .identity(identity)
        .definition(Arc::clone(def))
        .shape(shape);
    for mixin in classify_functional(def)
        .into_iter()
        .chain(classify_family(&def.kind_name, shape))
    {
        builder = builder.mixin(mixin);
    }
    let ty = builder.build()?;
    tracing::debug!(kind = %def.kind_name, bases = ?ty.bases(), "item type synthesized");
    Ok(ty)
}

/// The generic fallback type: every functional capability, no shape, no
/// creation command.
///
/// # Errors
///
/// Never fails in practice; composition errors are propagated for symmetry
/// with [`synthesize`].
pub fn generic() -> Result<ItemType, TypeError> {
    TypeBuilder::new(GENERIC_KIND)
        .identity(TypeIdentity::generic())
        .mixin(Mixin::Sized)
        .mixin(Mixin::ValueArray)
        .mixin(Mixin::Callback)
        .register(Registration::Never)
        .build()
}

/// Child slot a kind is stored in.
#[must_use]
pub fn target_slot(kind: &str) -> usize {
    if SLOT_ZERO_KINDS.contains(&kind) {
        0
    } else if kind == "mvDragPayload" {
        3
    } else if kind.starts_with("mvDraw") {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CommandForm, CommandSpec, ParamSpec, ReturnKind};
    use serde_json::json;

    fn def(kind: &str, command: &str, params: &[&str], scoped: bool) -> Arc<ItemDefinition> {
        let mut specs = vec![ParamSpec::keyword("tag", json!(0))];
        specs.extend(params.iter().map(|p| ParamSpec::keyword(p, json!(null))));
        let create = CommandSpec {
            name: command.to_string(),
            form: CommandForm::Simple,
            returns: ReturnKind::Handle,
            params: specs,
        };
        let begin = scoped.then(|| CommandSpec {
            name: command.trim_start_matches("add_").to_string(),
            form: CommandForm::Scoped,
            ..create.clone()
        });
        Arc::new(ItemDefinition::from_command(kind, 1, &create, begin.as_ref()))
    }

    #[test]
    fn test_shapes() {
        assert_eq!(classify_shape(&def("mvWindowAppItem", "add_window", &["label"], true)), Shape::Root);
        assert_eq!(
            classify_shape(&def("mvValueRegistry", "add_value_registry", &["label"], true)),
            Shape::Registry
        );
        assert_eq!(classify_shape(&def("mvTheme", "add_theme", &["label"], true)), Shape::Registry);
        assert_eq!(classify_shape(&def("mvGroup", "add_group", &["parent"], true)), Shape::Container);
        assert_eq!(classify_shape(&def("mvButton", "add_button", &["parent"], false)), Shape::Basic);
    }

    #[test]
    fn test_families() {
        assert_eq!(classify_family("mvTable", Shape::Container), vec![Mixin::TableItem]);
        assert_eq!(classify_family("mvTableRow", Shape::Container), vec![Mixin::Table]);
        assert_eq!(classify_family("mvItemHandlerRegistry", Shape::Registry), Vec::<Mixin>::new());
        assert_eq!(classify_family("mvClickedHandler", Shape::Basic), vec![Mixin::Handler]);
        assert_eq!(classify_family("mvDrawLine", Shape::Basic), vec![Mixin::Drawing]);
        assert_eq!(classify_family("mvLineSeries", Shape::Basic), vec![Mixin::Plotting]);
        assert_eq!(classify_family("mvNode", Shape::Container), vec![Mixin::Node]);
        assert_eq!(
            classify_family("mvThemeComponent", Shape::Container),
            vec![Mixin::Theme]
        );
        assert_eq!(classify_family("mvButton", Shape::Basic), Vec::<Mixin>::new());
    }

    #[test]
    fn test_synthesized_base_order() {
        let button = def(
            "mvButton",
            "add_button",
            &["parent", "pos", "width", "height", "callback"],
            false,
        );
        let ty = synthesize(&button).unwrap();
        assert_eq!(ty.bases(), &[Mixin::Sized, Mixin::Callback, Mixin::Basic]);
        assert_eq!(ty.identity().name(), "mvAppItemType::mvButton");

        let series = def("mvLineSeries", "add_line_series", &["parent"], false);
        let ty = synthesize(&series).unwrap();
        assert_eq!(ty.bases(), &[Mixin::ValueArray, Mixin::Plotting, Mixin::Basic]);
    }

    #[test]
    fn test_target_slots() {
        assert_eq!(target_slot("mvTableColumn"), 0);
        assert_eq!(target_slot("mvDragPayload"), 3);
        assert_eq!(target_slot("mvDrawLine"), 2);
        assert_eq!(target_slot("mvButton"), 1);
        assert_eq!(target_slot("mvWindowAppItem"), 1);
    }

    #[test]
    fn test_generic_type_is_not_creatable() {
        let ty = generic().unwrap();
        assert!(ty.is_generic());
        assert!(ty.command().is_none());
        assert!(ty.shape().is_none());
        assert!(ty.has(Mixin::Sized));
    }
}
