//! Variable name utilities.
//!
//! Instance names interleave container names with index selectors:
//! `Outer[2].Inner[{brand_a}].Score`. The generic form replaces every
//! selector with `[..]`: `Outer[..].Inner[..].Score`.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Matches a concrete index selector (`[{yes}]`, `[_1]`, `[3]`).
static INDEX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\[\{?([A-Z0-9_]+)\}?\]")
        .case_insensitive(true)
        .build()
        .expect("Invalid index selector regex")
});

/// Names of simple (non-grid) variables.
pub const SIMPLE_VAR: &str = r"^[A-Z_][A-Z0-9_.]*$";
/// Variables nested one grid level deep, e.g. `my[{_22}].grid`.
pub const GRID: &str = r"^([A-Z_][A-Z0-9_.]*[A-Z0-9_]+\[\{?([A-Z0-9_]+)\}?\]\.)[A-Z_][A-Z0-9_.]*[A-Z0-9_]+$";
/// Variables nested two grid levels deep, e.g. `my[{_22}].value[{_1}].grid`.
pub const VALUE_GRID: &str = r"^([A-Z_][A-Z0-9_.]*[A-Z0-9_]\[\{?([A-Z0-9_]+)\}?\]\.){2}[A-Z_][A-Z0-9_.]*$";

/// Collapse every index selector to `[..]`.
pub fn generic_name(name: &str) -> String {
    INDEX_REGEX.replace_all(name, "[..]").into_owned()
}

/// Compile case-insensitive name filters.
pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern.as_ref())
                .case_insensitive(true)
                .build()
        })
        .collect()
}

/// Split on dots that are not inside a selector.
fn split_top_level(name: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, ch) in name.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&name[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&name[start..]);
    parts
}

/// Container names along a path, selectors removed.
pub fn path_segments(name: &str) -> Vec<String> {
    split_top_level(name)
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(|part| parse_component(part).0.to_string())
        .collect()
}

/// Split a name into level components.
///
/// Every component except the last ends with a selector; dotted class or
/// helper names between two selectors stay together:
/// `Block.Grid[{a}].Sub.Q1` gives `["Block.Grid[{a}]", "Sub.Q1"]`.
pub fn split_components(name: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = String::new();
    for part in split_top_level(name) {
        if !current.is_empty() {
            current.push('.');
        }
        current.push_str(part);
        if part.ends_with(']') {
            components.push(std::mem::take(&mut current));
        }
    }
    components.push(current);
    components
}

/// Index selector of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    None,
    /// `[..]`
    Generic,
    /// `[{name}]`
    Category(String),
    /// `[3]`
    Index(i64),
}

/// Split `Name[selector]` into its name and selector.
pub fn parse_component(component: &str) -> (&str, Selector) {
    let Some(open) = component.find('[') else {
        return (component, Selector::None);
    };
    let name = &component[..open];
    let inner = component[open + 1..].trim_end_matches(']');
    let selector = if inner == ".." {
        Selector::Generic
    } else if let Some(category) = inner.strip_prefix('{') {
        Selector::Category(category.trim_end_matches('}').to_string())
    } else if let Ok(index) = inner.parse::<i64>() {
        Selector::Index(index)
    } else {
        Selector::Category(inner.to_string())
    };
    (name, selector)
}
