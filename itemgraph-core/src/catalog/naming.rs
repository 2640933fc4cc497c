//! Naming conventions that map host command names to kind names.

/// Prefix for simple item commands.
pub const ADD_PREFIX: &str = "add_";
/// Prefix for drawing commands.
pub const DRAW_PREFIX: &str = "draw_";
/// Prefix of every kind name.
pub const KIND_PREFIX: &str = "mv";

/// Commands whose kind name does not follow the convention.
const IRREGULAR: &[(&str, &str)] = &[
    ("add_2d_histogram_series", "mv2dHistogramSeries"),
    ("add_3d_slider", "mvSlider3D"),
    ("add_hline_series", "mvHLineSeries"),
    ("add_vline_series", "mvVLineSeries"),
    ("add_plot_annotation", "mvAnnotation"),
    ("add_text_point", "mvLabelSeries"),
    ("draw_image", "mvDrawImage"),
    ("draw_text", "mvDrawText"),
    ("draw_rectangle", "mvDrawRect"),
    ("add_subplots", "mvSubPlots"),
    ("add_window", "mvWindowAppItem"),
];

/// Explicit kind name for an irregular creation command.
#[must_use]
pub fn irregular_kind(command: &str) -> Option<&'static str> {
    IRREGULAR
        .iter()
        .find(|(cmd, _)| *cmd == command)
        .map(|(_, kind)| *kind)
}

/// Strip exactly one of the `draw_` or `add_` prefixes.
#[must_use]
pub fn strip_command_prefix(command: &str) -> &str {
    command
        .strip_prefix(DRAW_PREFIX)
        .or_else(|| command.strip_prefix(ADD_PREFIX))
        .unwrap_or(command)
}

/// Capitalize the first letter of every alphabetic run, lowercase the rest.
#[must_use]
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Conventional kind name for a prefix-stripped command name.
///
/// `input_text` becomes `mvInputText`; a leading `colormap` is split so it
/// capitalizes as `ColorMap`.
#[must_use]
pub fn conventional_kind(stripped: &str) -> String {
    let stripped = match stripped.strip_prefix("colormap") {
        Some(rest) => format!("color_map{rest}"),
        None => stripped.to_string(),
    };
    format!("{KIND_PREFIX}{}", title_case(&stripped).replace('_', ""))
}

/// Correction for a conventional name the host does not know.
///
/// Applies the first matching rule: drawing commands gain the `Draw` prefix
/// their stripped name lost, item-handler commands drop one `Item`, and
/// four-component input commands (`...x`) become `...Multi`.
#[must_use]
pub fn corrected_kind(command: &str, kind: &str) -> Option<String> {
    if command.contains(DRAW_PREFIX) && !kind.starts_with("mvDraw") {
        let rest = kind.strip_prefix(KIND_PREFIX).unwrap_or(kind);
        return Some(format!("{KIND_PREFIX}Draw{rest}"));
    }
    if command.contains("item_") && command.contains("_handler") {
        return Some(kind.replacen("Item", "", 1));
    }
    if command.ends_with('x') {
        let trimmed = kind.strip_suffix('x').unwrap_or(kind);
        return Some(format!("{trimmed}Multi"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case_matches_word_runs() {
        assert_eq!(title_case("input_text"), "Input_Text");
        assert_eq!(title_case("2d_histogram"), "2D_Histogram");
        assert_eq!(title_case("HLINE"), "Hline");
    }

    #[test]
    fn test_conventional_kind() {
        assert_eq!(conventional_kind("button"), "mvButton");
        assert_eq!(conventional_kind("input_text"), "mvInputText");
        assert_eq!(conventional_kind("colormap_registry"), "mvColorMapRegistry");
        assert_eq!(conventional_kind("item_handler_registry"), "mvItemHandlerRegistry");
    }

    #[test]
    fn test_strip_command_prefix_strips_once() {
        assert_eq!(strip_command_prefix("add_button"), "button");
        assert_eq!(strip_command_prefix("draw_line"), "line");
        assert_eq!(strip_command_prefix("add_draw_layer"), "draw_layer");
        assert_eq!(strip_command_prefix("window"), "window");
    }

    #[test]
    fn test_corrections() {
        assert_eq!(
            corrected_kind("draw_line", "mvLine").as_deref(),
            Some("mvDrawLine")
        );
        assert_eq!(
            corrected_kind("add_item_clicked_handler", "mvItemClickedHandler").as_deref(),
            Some("mvClickedHandler")
        );
        assert_eq!(
            corrected_kind("add_input_intx", "mvInputIntx").as_deref(),
            Some("mvInputIntMulti")
        );
        assert_eq!(corrected_kind("add_mystery", "mvMystery"), None);
    }

    #[test]
    fn test_irregular_kind() {
        assert_eq!(irregular_kind("add_window"), Some("mvWindowAppItem"));
        assert_eq!(irregular_kind("draw_rectangle"), Some("mvDrawRect"));
        assert_eq!(irregular_kind("add_button"), None);
    }
}
