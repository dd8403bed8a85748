//! The parsed schema document.

use serde::{Deserialize, Serialize};

use crate::category::{Category, CategoryEntry, CategoryMap, TypeArena};
use crate::error::{ModelError, Result};
use crate::field::{Class, FieldNode, Group, IteratorKind, NumericRange, Variable};
use crate::label::{Contexts, Languages, Locale};
use crate::naming::{generic_name, path_segments};

/// A case-data source declared by the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    /// Store file location (`dblocation`), usually relative to the document.
    pub location: String,
    pub dsc_name: String,
    pub project: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSources {
    pub default: Option<String>,
    pub items: Vec<DataSource>,
}

impl DataSources {
    /// The default source, or the first declared one.
    pub fn current(&self) -> Option<&DataSource> {
        self.default
            .as_deref()
            .and_then(|name| {
                self.items
                    .iter()
                    .find(|source| source.name.eq_ignore_ascii_case(name))
            })
            .or_else(|| self.items.first())
    }
}

/// Borrowed view of a node located by path.
#[derive(Debug, Clone, Copy)]
pub enum FieldRef<'a> {
    Variable(&'a Variable),
    Group(&'a Group),
    Class(&'a Class),
}

impl<'a> FieldRef<'a> {
    pub fn as_variable(self) -> Option<&'a Variable> {
        match self {
            FieldRef::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn as_group(self) -> Option<&'a Group> {
        match self {
            FieldRef::Group(group) => Some(group),
            _ => None,
        }
    }
}

/// Fully resolved schema: locales, category map, shared lists and the field tree.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub languages: Languages,
    pub contexts: Contexts,
    pub category_map: CategoryMap,
    pub types: TypeArena,
    /// Top-level fields in declared order; system classes come first.
    pub fields: Vec<FieldNode>,
    pub datasources: DataSources,
}

impl Schema {
    pub fn base_locale(&self) -> Locale {
        Locale::new(&self.languages.base, &self.contexts.base)
    }

    /// Locate a node by dotted path.
    ///
    /// Index selectors (`[..]`, `[{yes}]`, `[2]`) are ignored, so both the
    /// generic and the concrete form of a name resolve to the same node.
    /// Helper and other-specify variables are reached through their owner
    /// (`Q1.Codes`). Names compare case-insensitively.
    pub fn find(&self, path: &str) -> Option<FieldRef<'_>> {
        let segments = path_segments(path);
        let (first, rest) = segments.split_first()?;
        let mut current = find_child(&self.fields, first)?;
        for segment in rest {
            current = match current {
                FieldRef::Group(group) => find_child(&group.fields, segment)
                    .or_else(|| find_helper(&group.helpers, segment))?,
                FieldRef::Class(class) => find_child(&class.fields, segment)?,
                FieldRef::Variable(variable) => find_helper(&variable.helpers, segment)
                    .or_else(|| find_helper(&variable.others, segment))?,
            };
        }
        Some(current)
    }

    pub fn variable(&self, path: &str) -> Option<&Variable> {
        self.find(path).and_then(FieldRef::as_variable)
    }

    pub fn group(&self, path: &str) -> Option<&Group> {
        self.find(path).and_then(FieldRef::as_group)
    }

    /// Like [`Schema::variable`] but failing with [`ModelError::UnknownVariable`].
    pub fn require_variable(&self, path: &str) -> Result<&Variable> {
        self.variable(path).ok_or_else(|| ModelError::UnknownVariable {
            name: generic_name(path),
        })
    }

    /// Categories of a block, shared lists expanded, in declared order.
    pub fn categories<'a>(&'a self, entries: &'a [CategoryEntry]) -> Vec<&'a Category> {
        self.types.flatten(entries)
    }

    /// Iteration cardinality of a group.
    pub fn group_cardinality(&self, group: &Group) -> usize {
        match group.iterator {
            IteratorKind::Categorical => self.categories(&group.categories).len(),
            IteratorKind::Numeric => group.range.as_ref().map_or(0, NumericRange::len),
        }
    }

    /// Category name for a stored value, preferring the variable's own categories.
    pub fn category_name_for(&self, variable: &Variable, value: i64) -> Option<String> {
        self.categories(&variable.categories)
            .into_iter()
            .find(|category| category.value == value)
            .map(|category| category.name.clone())
            .or_else(|| self.category_map.name_of(value).map(str::to_string))
    }
}

fn find_child<'a>(nodes: &'a [FieldNode], name: &str) -> Option<FieldRef<'a>> {
    nodes.iter().find_map(|node| match node {
        FieldNode::Variable(variable) if variable.name.eq_ignore_ascii_case(name) => {
            Some(FieldRef::Variable(variable))
        }
        FieldNode::Group(group) if group.name.eq_ignore_ascii_case(name) => {
            Some(FieldRef::Group(group))
        }
        FieldNode::Class(class) if class.name.eq_ignore_ascii_case(name) => {
            Some(FieldRef::Class(class))
        }
        _ => None,
    })
}

fn find_helper<'a>(helpers: &'a [Variable], name: &str) -> Option<FieldRef<'a>> {
    helpers
        .iter()
        .find(|helper| helper.name.eq_ignore_ascii_case(name))
        .map(FieldRef::Variable)
}
