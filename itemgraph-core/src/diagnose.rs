//! Kind-aware diagnosis of host faults.
//!
//! The host only reports that a call failed. These checks re-derive why, from
//! the kind's parameter tables and the live item graph.

use crate::catalog::TYPE_NAMESPACE;
use crate::host::HostEngine;

/// Kinds that look like universal parents but reject most children.
const CLOSED_PARENTS: &[&str] = &["mvStage", "mvTemplateRegistry"];

const NO_PARENTS: &[&str] = &[];
const DRAWING_PARENTS: &[&str] = &["mvDrawlist", "mvViewportDrawlist", "mvDrawLayer", "mvDrawNode"];
const THEME_PARENTS: &[&str] = &["mvTheme"];
const THEME_COMPONENT_PARENTS: &[&str] = &["mvThemeComponent"];
const HANDLER_PARENTS: &[&str] = &["mvItemHandlerRegistry", "mvHandlerRegistry"];
const SERIES_PARENTS: &[&str] = &["mvPlotAxis"];
const PLOT_PARENTS: &[&str] = &["mvPlot"];
const NODE_ATTRIBUTE_PARENTS: &[&str] = &["mvNode"];
const NODE_PARENTS: &[&str] = &["mvNodeEditor"];
const TABLE_PARENTS: &[&str] = &["mvTable"];
const TABLE_CELL_PARENTS: &[&str] = &["mvTableRow"];

fn short_kind(type_name: &str) -> &str {
    type_name
        .strip_prefix(TYPE_NAMESPACE)
        .and_then(|rest| rest.strip_prefix("::"))
        .unwrap_or(type_name)
}

/// Parent kinds `child` requires when `parent` cannot hold it, or `None`
/// when the pairing is allowed. An empty list means the parent accepts
/// nothing of this kind.
#[must_use]
pub fn required_parents(child: &str, parent: &str) -> Option<&'static [&'static str]> {
    let child = short_kind(child);
    let parent = short_kind(parent);

    if CLOSED_PARENTS.contains(&parent) {
        return Some(NO_PARENTS);
    }
    let required = if child.starts_with("mvDraw") && child != "mvDrawlist" {
        DRAWING_PARENTS
    } else if child.starts_with("mvThemeComponent") {
        THEME_PARENTS
    } else if child == "mvThemeColor" || child == "mvThemeStyle" {
        THEME_COMPONENT_PARENTS
    } else if child.contains("Handler") && !child.ends_with("Registry") {
        HANDLER_PARENTS
    } else if child.ends_with("Series") {
        SERIES_PARENTS
    } else if ["mvAnnotation", "mvPlotLegend", "mvPlotAxis"].contains(&child) {
        PLOT_PARENTS
    } else if child == "mvNodeAttribute" {
        NODE_ATTRIBUTE_PARENTS
    } else if child == "mvNode" {
        NODE_PARENTS
    } else if child == "mvTableRow" || child == "mvTableColumn" {
        TABLE_PARENTS
    } else if child == "mvTableCell" {
        TABLE_CELL_PARENTS
    } else {
        return None;
    };
    (!required.contains(&parent)).then_some(required)
}

/// Explain why `child` (a kind name) cannot be created under `parent`, or
/// under the container stack top when no parent is given.
pub fn invalid_parent(host: &dyn HostEngine, child: &str, parent: Option<u64>) -> Option<String> {
    let parent = match parent.filter(|p| *p != 0) {
        Some(parent) => {
            if !host.item_exists(parent) {
                return Some(format!("parent item {parent} does not exist"));
            }
            parent
        }
        None => match host.top_container() {
            Some(top) => top,
            None => return Some("no parent item available (container stack is empty)".to_string()),
        },
    };

    let Ok(info) = host.item_info(parent) else {
        return Some(format!("parent item {parent} does not exist"));
    };
    if !info.container {
        return Some(format!(
            "parent item {parent} ({}) is not a container and cannot parent items",
            short_kind(&info.type_name)
        ));
    }
    let parent_kind = short_kind(&info.type_name);
    required_parents(child, parent_kind).map(|allowed| {
        if allowed.is_empty() {
            format!("incompatible parent {parent_kind} for {} item", short_kind(child))
        } else {
            format!(
                "incompatible parent {parent_kind} for {} item (expected {})",
                short_kind(child),
                allowed.join(" or ")
            )
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_rules() {
        assert_eq!(required_parents("mvDrawLine", "mvDrawlist"), None);
        assert_eq!(required_parents("mvDrawLine", "mvWindowAppItem"), Some(DRAWING_PARENTS));
        assert_eq!(required_parents("mvDrawlist", "mvWindowAppItem"), None);
        assert_eq!(required_parents("mvThemeColor", "mvTheme"), Some(THEME_COMPONENT_PARENTS));
        assert_eq!(required_parents("mvLineSeries", "mvPlotAxis"), None);
        assert_eq!(required_parents("mvLineSeries", "mvPlot"), Some(SERIES_PARENTS));
        assert_eq!(required_parents("mvClickedHandler", "mvItemHandlerRegistry"), None);
        assert_eq!(required_parents("mvItemHandlerRegistry", "mvWindowAppItem"), None);
        assert_eq!(required_parents("mvButton", "mvStage").map(<[&str]>::len), Some(0));
        assert_eq!(
            required_parents("mvAppItemType::mvNode", "mvAppItemType::mvNodeEditor"),
            None
        );
    }
}
