//! Variable instance enumeration.
//!
//! A [`VariableInstance`] is one variable at a concrete combination of
//! enclosing group indices. Enumeration is a depth-first walk of the field
//! tree in declared order; for every variable the Cartesian product of the
//! index sets of its enclosing groups is expanded, outermost group varying
//! slowest.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::field::{DataType, FieldNode, Group, IteratorKind, Variable};
use crate::property::Properties;
use crate::schema::Schema;

/// Properties that keep a variable out of the default export.
const EXPORT_EXCLUDING_PROPERTIES: [&str; 2] =
    ["IIS_StandardShellTranslated", "IIS_CortexQuestionDescription"];
const EXCLUDE_FROM_EXPORT: &str = "IIS_ExcludeFromDataExport";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexValue {
    Category { name: String, value: i64 },
    Number { index: i64 },
}

impl IndexValue {
    /// Selector text as written inside the brackets of an instance name.
    pub fn selector(&self) -> String {
        match self {
            IndexValue::Category { name, .. } => format!("{{{name}}}"),
            IndexValue::Number { index } => index.to_string(),
        }
    }

    /// Key stored in the group's level table.
    pub fn key(&self) -> i64 {
        match self {
            IndexValue::Category { value, .. } => *value,
            IndexValue::Number { index } => *index,
        }
    }
}

/// One enclosing group and the index chosen for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStep {
    /// Generic path of the group, e.g. `Outer[..].Inner`.
    pub group: String,
    pub value: IndexValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    Variable,
    Helper,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInstance {
    /// Concrete name, e.g. `BrandGrid[{brand_a}].Rating`.
    pub name: String,
    /// Index-erased name; also the path of the defining variable.
    pub generic_name: String,
    /// Name relative to the innermost enclosing group (or the root).
    pub local_name: String,
    /// Generic path of the innermost enclosing group.
    pub level: Option<String>,
    pub indices: Vec<IndexStep>,
    pub kind: InstanceKind,
    pub variable_id: String,
    pub data_type: DataType,
    pub max_responses: i64,
    pub has_case_data: bool,
    pub is_system: bool,
    /// Included in a default export.
    pub exportable: bool,
}

impl VariableInstance {
    pub fn is_multi_response(&self) -> bool {
        self.data_type == DataType::Categorical && self.max_responses != 1
    }
}

/// Ordered set of instances with case-insensitive lookup by name.
#[derive(Debug, Clone, Default)]
pub struct VariableInstances {
    items: Vec<VariableInstance>,
    by_name: HashMap<String, usize>,
}

impl VariableInstances {
    fn push(&mut self, instance: VariableInstance) {
        let key = instance.name.to_lowercase();
        if self.by_name.contains_key(&key) {
            return;
        }
        self.by_name.insert(key, self.items.len());
        self.items.push(instance);
    }

    pub fn get(&self, name: &str) -> Option<&VariableInstance> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&index| &self.items[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VariableInstance> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Instances sharing a generic name, in enumeration order.
    pub fn by_generic<'a, 'n>(
        &'a self,
        generic: &'n str,
    ) -> impl Iterator<Item = &'a VariableInstance> + use<'a, 'n> {
        self.items
            .iter()
            .filter(move |instance| instance.generic_name.eq_ignore_ascii_case(generic))
    }

    /// Names of non-system instances.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|instance| !instance.is_system)
            .map(|instance| instance.name.as_str())
    }

    pub fn exportable(&self) -> impl Iterator<Item = &VariableInstance> {
        self.items.iter().filter(|instance| instance.exportable)
    }
}

impl<'a> IntoIterator for &'a VariableInstances {
    type Item = &'a VariableInstance;
    type IntoIter = std::slice::Iter<'a, VariableInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// One segment of a name template.
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    /// A group name followed by the selector of scope entry `usize`.
    Slot(String, usize),
}

/// A group in scope along with its candidate indices.
struct ScopeEntry {
    generic: String,
    values: Vec<IndexValue>,
}

struct Walker<'s> {
    schema: &'s Schema,
    scope: Vec<ScopeEntry>,
    template: Vec<Segment>,
    out: VariableInstances,
}

/// Enumerate every variable instance of a schema.
pub fn enumerate(schema: &Schema) -> VariableInstances {
    let mut walker = Walker {
        schema,
        scope: Vec::new(),
        template: Vec::new(),
        out: VariableInstances::default(),
    };
    walker.walk(&schema.fields, false);
    walker.out
}

impl<'s> Walker<'s> {
    fn walk(&mut self, nodes: &'s [FieldNode], excluded: bool) {
        for node in nodes {
            match node {
                FieldNode::Variable(variable) => self.visit_variable(variable, excluded),
                FieldNode::Class(class) => {
                    let excluded = excluded || excludes_export(&class.properties);
                    self.template.push(Segment::Static(class.name.clone()));
                    self.walk(&class.fields, excluded);
                    self.template.pop();
                }
                FieldNode::Group(group) => {
                    let excluded = excluded || excludes_export(&group.properties);
                    self.visit_group_helpers(group, excluded);
                    self.enter_group(group);
                    self.walk(&group.fields, excluded);
                    self.leave_group();
                }
            }
        }
    }

    /// Helper fields of a group live at the group's enclosing level.
    fn visit_group_helpers(&mut self, group: &Group, excluded: bool) {
        if group.helpers.is_empty() {
            return;
        }
        self.template.push(Segment::Static(group.name.clone()));
        for combination in self.combinations() {
            for helper in &group.helpers {
                self.emit_nested(group.is_system, helper, InstanceKind::Helper, &combination, excluded);
            }
        }
        self.template.pop();
    }

    fn enter_group(&mut self, group: &Group) {
        let values = match group.iterator {
            IteratorKind::Categorical => self
                .schema
                .categories(&group.categories)
                .into_iter()
                .map(|category| IndexValue::Category {
                    name: category.name.clone(),
                    value: category.value,
                })
                .collect(),
            IteratorKind::Numeric => group
                .range
                .into_iter()
                .flat_map(|range| range.indices())
                .map(|index| IndexValue::Number { index })
                .collect(),
        };
        let prefix = render(&self.template, None);
        let generic = if prefix.is_empty() {
            group.name.clone()
        } else {
            format!("{prefix}.{}", group.name)
        };
        let slot = self.scope.len();
        self.template.push(Segment::Slot(group.name.clone(), slot));
        self.scope.push(ScopeEntry { generic, values });
    }

    fn leave_group(&mut self) {
        self.template.pop();
        self.scope.pop();
    }

    fn visit_variable(&mut self, variable: &Variable, excluded: bool) {
        if !variable.data_type.has_instances() {
            return;
        }
        let excluded = excluded || excludes_export(&variable.properties);
        self.template.push(Segment::Static(variable.name.clone()));
        for combination in self.combinations() {
            self.emit(variable, InstanceKind::Variable, &combination, excluded);
            for helper in &variable.helpers {
                self.emit_nested(variable.is_system, helper, InstanceKind::Helper, &combination, excluded);
            }
            for other in &variable.others {
                self.emit_nested(variable.is_system, other, InstanceKind::Other, &combination, excluded);
            }
        }
        self.template.pop();
    }

    fn emit_nested(
        &mut self,
        owner_is_system: bool,
        nested: &Variable,
        kind: InstanceKind,
        combination: &[usize],
        excluded: bool,
    ) {
        if !nested.data_type.has_instances() {
            return;
        }
        self.template.push(Segment::Static(nested.name.clone()));
        let excluded = excluded || excludes_export(&nested.properties);
        let mut instance = self.instance(nested, kind, combination, excluded);
        instance.is_system |= owner_is_system;
        instance.exportable &= !owner_is_system;
        self.out.push(instance);
        self.template.pop();
    }

    fn emit(&mut self, variable: &Variable, kind: InstanceKind, combination: &[usize], excluded: bool) {
        let instance = self.instance(variable, kind, combination, excluded);
        self.out.push(instance);
    }

    fn instance(
        &self,
        variable: &Variable,
        kind: InstanceKind,
        combination: &[usize],
        excluded: bool,
    ) -> VariableInstance {
        let chosen: Vec<&IndexValue> = self
            .scope
            .iter()
            .zip(combination)
            .map(|(entry, &position)| &entry.values[position])
            .collect();
        let name = render(&self.template, Some(&chosen));
        let generic_name = render(&self.template, None);
        let (level, local_name) = match self.scope.last() {
            Some(entry) => {
                let local = generic_name
                    .strip_prefix(entry.generic.as_str())
                    .map(|rest| rest.trim_start_matches("[..].").to_string())
                    .unwrap_or_else(|| variable.name.clone());
                (Some(entry.generic.clone()), local)
            }
            None => (None, generic_name.clone()),
        };
        let indices = self
            .scope
            .iter()
            .zip(&chosen)
            .map(|(entry, value)| IndexStep {
                group: entry.generic.clone(),
                value: (*value).clone(),
            })
            .collect();
        VariableInstance {
            name,
            generic_name,
            local_name,
            level,
            indices,
            kind,
            variable_id: variable.id.clone(),
            data_type: variable.data_type,
            max_responses: variable.max_responses(),
            has_case_data: variable.has_case_data,
            is_system: variable.is_system,
            exportable: !excluded && !variable.is_system && variable.has_case_data,
        }
    }

    /// Cartesian product of the in-scope index positions, first group slowest.
    fn combinations(&self) -> Vec<Vec<usize>> {
        let mut combos: Vec<Vec<usize>> = vec![Vec::new()];
        for entry in &self.scope {
            let mut next = Vec::with_capacity(combos.len() * entry.values.len());
            for prefix in &combos {
                for position in 0..entry.values.len() {
                    let mut combo = prefix.clone();
                    combo.push(position);
                    next.push(combo);
                }
            }
            combos = next;
        }
        combos
    }
}

fn excludes_export(properties: &Properties) -> bool {
    EXPORT_EXCLUDING_PROPERTIES
        .iter()
        .any(|name| properties.contains(name))
        || properties.is_truthy(EXCLUDE_FROM_EXPORT)
}

/// Render a template with concrete indices, or generically when `chosen` is `None`.
fn render(template: &[Segment], chosen: Option<&[&IndexValue]>) -> String {
    let mut parts = Vec::with_capacity(template.len());
    for segment in template {
        match segment {
            Segment::Static(name) => parts.push(name.clone()),
            Segment::Slot(name, slot) => {
                let selector = chosen
                    .and_then(|values| values.get(*slot))
                    .map(|value| value.selector())
                    .unwrap_or_else(|| "..".to_string());
                parts.push(format!("{name}[{selector}]"));
            }
        }
    }
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{Category, CategoryEntry};
    use crate::field::{Class, GroupKind, NumericRange};
    use crate::naming::generic_name;
    use crate::property::Property;

    fn categorical(id: &str, name: &str, categories: &[(&str, i64)]) -> Variable {
        let mut variable = Variable::new(id, name, DataType::Categorical);
        variable.categories = categories
            .iter()
            .map(|(name, value)| CategoryEntry::Category(Category::new(*name, *value)))
            .collect();
        variable.resolve_effective_max(categories.len(), 0);
        variable
    }

    fn schema() -> Schema {
        let mut q1 = categorical("v1", "Q1", &[("yes", 1), ("no", 2)]);
        q1.max = Some(1);
        q1.resolve_effective_max(2, 0);
        q1.helpers.push(Variable::new("h1", "Codes", DataType::Text));

        let mut inner = Group::new("g2", "Inner", GroupKind::Grid, IteratorKind::Categorical);
        inner.categories = vec![
            CategoryEntry::Category(Category::new("red", 5)),
            CategoryEntry::Category(Category::new("blue", 6)),
        ];
        inner
            .fields
            .push(FieldNode::Variable(Variable::new("v3", "Score", DataType::Long)));

        inner.helpers.push(Variable::new("h3", "Comment", DataType::Text));

        let mut outer = Group::new("g1", "Outer", GroupKind::Loop, IteratorKind::Numeric);
        outer.range = Some(NumericRange { lower: 1, upper: 2 });
        outer.fields.push(FieldNode::Group(inner));

        let mut note = Variable::new("v4", "Note", DataType::Info);
        note.helpers.push(Variable::new("h2", "Hidden", DataType::Text));

        let mut serial = Class::new("c1", "Respondent");
        serial.is_system = true;
        let mut serial_var = Variable::new("s1", "Serial", DataType::Long);
        serial_var.is_system = true;
        serial.fields.push(FieldNode::Variable(serial_var));

        let mut internal = Variable::new("v5", "Internal", DataType::Text);
        internal.properties.push(Property {
            name: "IIS_ExcludeFromDataExport".to_string(),
            value: "1".to_string(),
            data_type: None,
            context: None,
        });

        Schema {
            fields: vec![
                FieldNode::Class(serial),
                FieldNode::Variable(q1),
                FieldNode::Variable(note),
                FieldNode::Group(outer),
                FieldNode::Variable(internal),
            ],
            ..Schema::default()
        }
    }

    #[test]
    fn enumerates_in_declared_order() {
        let instances = enumerate(&schema());
        let names: Vec<&str> = instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Respondent.Serial",
                "Q1",
                "Q1.Codes",
                "Outer[1].Inner.Comment",
                "Outer[1].Inner[{red}].Score",
                "Outer[1].Inner[{blue}].Score",
                "Outer[2].Inner.Comment",
                "Outer[2].Inner[{red}].Score",
                "Outer[2].Inner[{blue}].Score",
                "Internal",
            ]
        );
    }

    #[test]
    fn nested_instance_carries_index_chain() {
        let instances = enumerate(&schema());
        let score = instances.get("outer[2].inner[{blue}].score").unwrap();
        assert_eq!(score.generic_name, "Outer[..].Inner[..].Score");
        assert_eq!(score.level.as_deref(), Some("Outer[..].Inner"));
        assert_eq!(score.local_name, "Score");
        assert_eq!(
            score.indices,
            [
                IndexStep {
                    group: "Outer".to_string(),
                    value: IndexValue::Number { index: 2 },
                },
                IndexStep {
                    group: "Outer[..].Inner".to_string(),
                    value: IndexValue::Category {
                        name: "blue".to_string(),
                        value: 6,
                    },
                },
            ]
        );
    }

    #[test]
    fn helper_inherits_owner_name() {
        let instances = enumerate(&schema());
        let codes = instances.get("Q1.Codes").unwrap();
        assert_eq!(codes.kind, InstanceKind::Helper);
        assert_eq!(codes.local_name, "Q1.Codes");
        assert!(codes.level.is_none());
    }

    #[test]
    fn group_helper_belongs_to_enclosing_level() {
        let instances = enumerate(&schema());
        let comment = instances.get("Outer[2].Inner.Comment").unwrap();
        assert_eq!(comment.kind, InstanceKind::Helper);
        assert_eq!(comment.generic_name, "Outer[..].Inner.Comment");
        assert_eq!(comment.level.as_deref(), Some("Outer"));
        assert_eq!(comment.local_name, "Inner.Comment");
        assert_eq!(comment.indices.len(), 1);

        let found = {
            let generic = generic_name("Outer[1].Inner.Comment");
            instances.by_generic(&generic).next()
        };
        assert_eq!(found.map(|instance| instance.name.as_str()), Some("Outer[1].Inner.Comment"));
    }

    #[test]
    fn export_rules_skip_system_and_flagged() {
        let instances = enumerate(&schema());
        let exportable: Vec<&str> = instances.exportable().map(|i| i.name.as_str()).collect();
        assert!(!exportable.contains(&"Respondent.Serial"));
        assert!(!exportable.contains(&"Internal"));
        assert!(exportable.contains(&"Q1"));
        assert!(!instances.names().any(|name| name == "Respondent.Serial"));
    }

    #[test]
    fn empty_group_yields_no_instances() {
        let mut empty = Group::new("g9", "Empty", GroupKind::Loop, IteratorKind::Categorical);
        empty
            .fields
            .push(FieldNode::Variable(Variable::new("v9", "X", DataType::Long)));
        let schema = Schema {
            fields: vec![FieldNode::Group(empty)],
            ..Schema::default()
        };
        assert!(enumerate(&schema).is_empty());
    }
}
