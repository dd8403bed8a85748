//! Join paths from variable names to level tables.
//!
//! A [`JoinPath`] lists, for every group enclosing a variable, the level
//! table that stores it and the iteration key to filter on, and ends in a
//! [`Leaf`] naming the terminal column. Concrete names (`Grid[{a}].Q`)
//! filter every level; generic names (`Grid[..].Q`) filter none, and mixed
//! names filter only the levels that carry a concrete selector.

use serde::{Deserialize, Serialize};
use svy_model::naming::{Selector, parse_component};
use svy_model::{
    DataType, IndexValue, Schema, VariableInstance, VariableInstances, generic_name,
    split_components,
};

use crate::error::{Result, StoreError};
use crate::layout::{ColumnTag, StoreLayout, key_column, quote};

/// Row filter on a level table's own key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelFilter {
    /// Category name for categorical iterators.
    pub category: Option<String>,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinStep {
    pub table: String,
    pub parent: String,
    /// Generic path of the group the table stores.
    pub group: String,
    pub depth: usize,
    pub filter: Option<LevelFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryValue {
    pub value: i64,
    pub name: String,
}

/// Terminal table and column of a join path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub table: String,
    pub column: String,
    pub tag: ColumnTag,
    pub data_type: DataType,
    /// Value to name mapping in declared order; empty unless categorical.
    pub categories: Vec<CategoryValue>,
    pub max_responses: i64,
}

impl Leaf {
    pub fn is_multi_response(&self) -> bool {
        self.data_type == DataType::Categorical && self.max_responses != 1
    }

    pub fn category_name(&self, value: i64) -> Option<&str> {
        self.categories
            .iter()
            .find(|category| category.value == value)
            .map(|category| category.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPath {
    pub name: String,
    pub generic_name: String,
    pub steps: Vec<JoinStep>,
    pub leaf: Leaf,
}

impl JoinPath {
    fn alias(depth: usize) -> String {
        format!("t{depth}")
    }

    /// Query returning `(respondent, value)` rows ordered by respondent.
    pub fn select_sql(&self) -> String {
        let root = Self::alias(0);
        let leaf = Self::alias(self.steps.len());
        let mut sql = format!(
            "SELECT {root}.{} AS respondent, {leaf}.{} AS value FROM {} AS {root}",
            quote(&key_column(0)),
            quote(&self.leaf.column),
            quote(crate::layout::ROOT_TABLE),
        );

        let mut filters = Vec::new();
        for step in &self.steps {
            let alias = Self::alias(step.depth);
            let parent = Self::alias(step.depth - 1);
            let on = (0..step.depth)
                .map(|j| {
                    format!(
                        "{alias}.{} = {parent}.{}",
                        quote(&key_column(j + 1)),
                        quote(&key_column(j))
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(&format!(" JOIN {} AS {alias} ON {on}", quote(&step.table)));
            if let Some(filter) = &step.filter {
                filters.push(format!(
                    "{alias}.{} = {}",
                    quote(&key_column(0)),
                    filter.value
                ));
            }
        }
        if !filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filters.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {root}.{}", quote(&key_column(0))));
        sql
    }
}

/// Resolve a variable name to its join path.
pub fn resolve(
    schema: &Schema,
    instances: &VariableInstances,
    layout: &StoreLayout,
    name: &str,
) -> Result<JoinPath> {
    let unknown = || StoreError::UnknownVariable {
        name: name.to_string(),
    };
    let generic = generic_name(name);

    let (instance, filters) = match instances.get(name) {
        Some(instance) => {
            let filters = instance
                .indices
                .iter()
                .map(|step| Some(filter_for(&step.value)))
                .collect();
            (instance, filters)
        }
        None => match_selectors(instances, name, &generic).ok_or_else(unknown)?,
    };

    let mut steps = Vec::with_capacity(instance.indices.len());
    for (step, filter) in instance.indices.iter().zip(filters) {
        let table = layout
            .table_for_group(&step.group)
            .ok_or_else(|| StoreError::MissingLevel {
                group: step.group.clone(),
            })?;
        steps.push(JoinStep {
            table: table.name.clone(),
            parent: table.parent.clone(),
            group: step.group.clone(),
            depth: table.depth,
            filter,
        });
    }

    let leaf = leaf_for(schema, layout, instance)?;
    Ok(JoinPath {
        name: name.to_string(),
        generic_name: instance.generic_name.clone(),
        steps,
        leaf,
    })
}

fn filter_for(value: &IndexValue) -> LevelFilter {
    match value {
        IndexValue::Category { name, value } => LevelFilter {
            category: Some(name.clone()),
            value: *value,
        },
        IndexValue::Number { index } => LevelFilter {
            category: None,
            value: *index,
        },
    }
}

fn selector_matches(selector: &Selector, value: &IndexValue) -> bool {
    match (selector, value) {
        (Selector::None | Selector::Generic, _) => true,
        (Selector::Category(wanted), IndexValue::Category { name, .. }) => {
            wanted.eq_ignore_ascii_case(name)
        }
        (Selector::Index(wanted), IndexValue::Number { index }) => wanted == index,
        (Selector::Category(wanted), IndexValue::Number { index }) => {
            wanted.parse::<i64>().is_ok_and(|wanted| wanted == *index)
        }
        (Selector::Index(_), IndexValue::Category { .. }) => false,
    }
}

/// Match a generic or partially concrete name against the instances sharing its generic form.
fn match_selectors<'a>(
    instances: &'a VariableInstances,
    name: &str,
    generic: &str,
) -> Option<(&'a VariableInstance, Vec<Option<LevelFilter>>)> {
    let components = split_components(name);
    let selectors: Vec<Selector> = components
        .iter()
        .take(components.len().saturating_sub(1))
        .map(|component| parse_component(component).1)
        .collect();

    let instance = instances.by_generic(generic).find(|instance| {
        instance.indices.len() == selectors.len()
            && instance
                .indices
                .iter()
                .zip(&selectors)
                .all(|(step, selector)| selector_matches(selector, &step.value))
    })?;

    let filters = instance
        .indices
        .iter()
        .zip(&selectors)
        .map(|(step, selector)| match selector {
            Selector::None | Selector::Generic => None,
            _ => Some(filter_for(&step.value)),
        })
        .collect();
    Some((instance, filters))
}

fn leaf_for(schema: &Schema, layout: &StoreLayout, instance: &VariableInstance) -> Result<Leaf> {
    let table = layout
        .table_for_level(instance.level.as_deref())
        .ok_or_else(|| StoreError::MissingLevel {
            group: instance.level.clone().unwrap_or_default(),
        })?;
    let column = table
        .column(&instance.local_name)
        .ok_or_else(|| StoreError::UnsupportedOperation {
            operation: "resolve join path",
            reason: format!("`{}` has no case data", instance.name),
        })?;

    let categories = match schema.variable(&instance.generic_name) {
        Some(variable) if instance.data_type == DataType::Categorical => schema
            .categories(&variable.categories)
            .into_iter()
            .map(|category| CategoryValue {
                value: category.value,
                name: category.name.clone(),
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(Leaf {
        table: table.name.clone(),
        column: column.column_name(),
        tag: column.tag,
        data_type: instance.data_type,
        categories,
        max_responses: instance.max_responses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use svy_model::{
        Category, CategoryEntry, FieldNode, Group, GroupKind, IteratorKind, NumericRange, Variable,
        enumerate,
    };

    fn schema() -> Schema {
        let mut schema = Schema::default();
        let mut rating = Variable::new("v1", "Rating", DataType::Categorical);
        rating.categories = vec![
            CategoryEntry::Category(Category::new("yes", 1)),
            CategoryEntry::Category(Category::new("no", 2)),
        ];
        rating.max = Some(1);
        rating.effective_max = Some(1);

        let mut inner = Group::new("g2", "Inner", GroupKind::Loop, IteratorKind::Categorical);
        inner.categories = vec![
            CategoryEntry::Category(Category::new("red", 3)),
            CategoryEntry::Category(Category::new("green", 4)),
        ];
        inner.fields.push(FieldNode::Variable(rating));
        let mut outer = Group::new("g1", "Outer", GroupKind::Loop, IteratorKind::Numeric);
        outer.range = Some(NumericRange { lower: 1, upper: 2 });
        outer.fields.push(FieldNode::Group(inner));

        schema.fields = vec![
            FieldNode::Variable(Variable::new("v0", "Age", DataType::Long)),
            FieldNode::Group(outer),
        ];
        schema
    }

    fn resolve_name(name: &str) -> Result<JoinPath> {
        let schema = schema();
        let instances = enumerate(&schema);
        let layout = StoreLayout::from_schema(&schema);
        resolve(&schema, &instances, &layout, name)
    }

    #[test]
    fn root_variable_has_no_steps() {
        let path = resolve_name("age").unwrap();
        assert!(path.steps.is_empty());
        assert_eq!(path.leaf.table, "L1");
        assert_eq!(path.leaf.column, "Age:L");
        insta::assert_snapshot!(
            path.select_sql(),
            @r#"SELECT t0.":P0" AS respondent, t0."Age:L" AS value FROM "L1" AS t0 ORDER BY t0.":P0""#
        );
    }

    #[test]
    fn concrete_name_filters_every_level() {
        let path = resolve_name("Outer[2].Inner[{green}].Rating").unwrap();
        assert_eq!(path.generic_name, "Outer[..].Inner[..].Rating");
        assert_eq!(path.steps.len(), 2);
        assert_eq!(path.steps[0].table, "L2");
        assert_eq!(path.steps[1].table, "L3");
        assert_eq!(path.steps[1].parent, "L2");
        assert_eq!(
            path.steps[1].filter,
            Some(LevelFilter {
                category: Some("green".to_string()),
                value: 4
            })
        );
        assert_eq!(path.leaf.column, "Rating:C1");
        assert_eq!(path.leaf.category_name(2), Some("no"));
        assert!(!path.leaf.is_multi_response());
        insta::assert_snapshot!(
            path.select_sql(),
            @r#"SELECT t0.":P0" AS respondent, t2."Rating:C1" AS value FROM "L1" AS t0 JOIN "L2" AS t1 ON t1.":P1" = t0.":P0" JOIN "L3" AS t2 ON t2.":P1" = t1.":P0" AND t2.":P2" = t1.":P1" WHERE t1.":P0" = 2 AND t2.":P0" = 4 ORDER BY t0.":P0""#
        );
    }

    #[test]
    fn generic_and_mixed_names_filter_selectively() {
        let generic = resolve_name("Outer[..].Inner[..].Rating").unwrap();
        assert!(generic.steps.iter().all(|step| step.filter.is_none()));

        let mixed = resolve_name("Outer[1].Inner[..].Rating").unwrap();
        assert_eq!(mixed.steps[0].filter.as_ref().map(|f| f.value), Some(1));
        assert!(mixed.steps[1].filter.is_none());
    }

    #[test]
    fn unknown_names_fail() {
        for name in ["Nope", "Outer[3].Inner[{red}].Rating", "Outer[1].Inner[{blue}].Rating"] {
            assert!(matches!(
                resolve_name(name),
                Err(StoreError::UnknownVariable { .. })
            ));
        }
    }
}
