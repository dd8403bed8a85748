//! Categories, the document-wide category map and shared category lists.
//!
//! Shared lists ("types") live once in a [`TypeArena`]. Variables and groups
//! that reference a list hold its [`TypeId`]; they never own a copy, so every
//! referrer observes the same sequence.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::label::Labels;
use crate::property::Properties;

/// A single answer category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Internal value from the category map (`-1` when unmapped).
    pub value: i64,
    pub labels: Labels,
    pub properties: Properties,
    /// Cannot be removed or reordered.
    pub fixed: bool,
    /// Counts as a single response even in a multi-response variable.
    pub exclusive: bool,
    pub factor: Option<String>,
    /// Id of the "other, specify" variable attached to this category.
    pub other_variable: Option<String>,
}

impl Category {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            value,
            labels: Labels::new(),
            properties: Properties::default(),
            fixed: false,
            exclusive: false,
            factor: None,
            other_variable: None,
        }
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }
}

/// Document-wide name to value mapping. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    entries: Vec<(String, i64)>,
    by_name: HashMap<String, usize>,
}

impl CategoryMap {
    pub fn insert(&mut self, name: &str, value: i64) {
        let key = name.to_lowercase();
        match self.by_name.get(&key) {
            Some(&index) => self.entries[index].1 = value,
            None => {
                self.by_name.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&index| self.entries[index].1)
    }

    /// Lower-cased name registered for a value.
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, candidate)| *candidate == value)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// Handle to a shared category list inside a [`TypeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(usize);

impl TypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// One entry of an ordered category block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CategoryEntry {
    Category(Category),
    /// Inline sub-list owned by this block.
    List {
        name: String,
        labels: Labels,
        entries: Vec<CategoryEntry>,
    },
    /// Reference to a shared list.
    Shared { name: String, list: TypeId },
}

/// A named category list owned at document scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryList {
    pub id: String,
    pub name: String,
    pub labels: Labels,
    pub properties: Properties,
    pub entries: Vec<CategoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeArena {
    lists: Vec<CategoryList>,
    by_id: HashMap<String, TypeId>,
    by_name: HashMap<String, TypeId>,
}

impl TypeArena {
    pub fn insert(&mut self, list: CategoryList) -> TypeId {
        let id = TypeId(self.lists.len());
        self.by_id.insert(list.id.clone(), id);
        self.by_name.insert(list.name.to_lowercase(), id);
        self.lists.push(list);
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&CategoryList> {
        self.lists.get(id.0)
    }

    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut CategoryList> {
        self.lists.get_mut(id.0)
    }

    pub fn find_by_id(&self, document_id: &str) -> Option<TypeId> {
        self.by_id.get(document_id).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &CategoryList)> {
        self.lists
            .iter()
            .enumerate()
            .map(|(index, list)| (TypeId(index), list))
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Flatten a category block, following shared references, in declaration order.
    ///
    /// A shared list that (directly or indirectly) references itself is
    /// expanded once.
    pub fn flatten<'a>(&'a self, entries: &'a [CategoryEntry]) -> Vec<&'a Category> {
        let mut out = Vec::new();
        let mut visiting = Vec::new();
        self.collect(entries, &mut visiting, &mut out);
        out
    }

    fn collect<'a>(
        &'a self,
        entries: &'a [CategoryEntry],
        visiting: &mut Vec<TypeId>,
        out: &mut Vec<&'a Category>,
    ) {
        for entry in entries {
            match entry {
                CategoryEntry::Category(category) => out.push(category),
                CategoryEntry::List { entries, .. } => self.collect(entries, visiting, out),
                CategoryEntry::Shared { list, .. } => {
                    if visiting.contains(list) {
                        continue;
                    }
                    if let Some(shared) = self.get(*list) {
                        visiting.push(*list);
                        self.collect(&shared.entries, visiting, out);
                        visiting.pop();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(id: &str, name: &str, entries: Vec<CategoryEntry>) -> CategoryList {
        CategoryList {
            id: id.to_string(),
            name: name.to_string(),
            labels: Labels::new(),
            properties: Properties::default(),
            entries,
        }
    }

    #[test]
    fn category_map_is_case_insensitive() {
        let mut map = CategoryMap::default();
        map.insert("Yes", 1);
        map.insert("NO", 2);
        assert_eq!(map.value_of("yes"), Some(1));
        assert_eq!(map.value_of("No"), Some(2));
        assert_eq!(map.name_of(2), Some("no"));
        assert_eq!(map.value_of("maybe"), None);
    }

    #[test]
    fn flatten_follows_shared_and_inline_lists() {
        let mut arena = TypeArena::default();
        let brands = arena.insert(list(
            "t1",
            "Brands",
            vec![
                CategoryEntry::Category(Category::new("a", 1)),
                CategoryEntry::Category(Category::new("b", 2)),
            ],
        ));
        let block = vec![
            CategoryEntry::Category(Category::new("first", 0)),
            CategoryEntry::Shared {
                name: "Brands".to_string(),
                list: brands,
            },
            CategoryEntry::List {
                name: "extra".to_string(),
                labels: Labels::new(),
                entries: vec![CategoryEntry::Category(Category::new("dk", 9))],
            },
        ];
        let names: Vec<&str> = arena
            .flatten(&block)
            .into_iter()
            .map(|category| category.name.as_str())
            .collect();
        assert_eq!(names, ["first", "a", "b", "dk"]);
        assert_eq!(arena.find_by_name("brands"), Some(brands));
        assert_eq!(arena.find_by_id("t1"), Some(brands));
    }

    #[test]
    fn self_referencing_list_expands_once() {
        let mut arena = TypeArena::default();
        let id = arena.insert(list("t1", "Loop", Vec::new()));
        if let Some(shared) = arena.get_mut(id) {
            shared.entries = vec![
                CategoryEntry::Category(Category::new("x", 1)),
                CategoryEntry::Shared {
                    name: "Loop".to_string(),
                    list: id,
                },
            ];
        }
        let block = vec![CategoryEntry::Shared {
            name: "Loop".to_string(),
            list: id,
        }];
        assert_eq!(arena.flatten(&block).len(), 1);
    }
}
