//! Instance counts follow the product of enclosing group cardinalities.

use proptest::prelude::*;
use svy_model::{
    Category, CategoryEntry, DataType, FieldNode, Group, GroupKind, IteratorKind, NumericRange,
    Schema, Variable, enumerate,
};

/// Nesting description: each level is either a categorical group with `n`
/// categories or a numeric loop over `1..=n`.
#[derive(Debug, Clone)]
enum Level {
    Categorical(usize),
    Numeric(i64),
}

fn level_strategy() -> impl Strategy<Value = Level> {
    prop_oneof![
        (0usize..4).prop_map(Level::Categorical),
        (0i64..4).prop_map(Level::Numeric),
    ]
}

fn nest(levels: &[Level]) -> FieldNode {
    let leaf = FieldNode::Variable(Variable::new("leaf", "Leaf", DataType::Long));
    levels
        .iter()
        .enumerate()
        .rev()
        .fold(leaf, |inner, (depth, level)| {
            let name = format!("G{depth}");
            let mut group = match level {
                Level::Categorical(count) => {
                    let mut group =
                        Group::new(&name, &name, GroupKind::Grid, IteratorKind::Categorical);
                    group.categories = (0..*count)
                        .map(|i| {
                            CategoryEntry::Category(Category::new(format!("c{i}"), i as i64 + 1))
                        })
                        .collect();
                    group
                }
                Level::Numeric(upper) => {
                    let mut group = Group::new(&name, &name, GroupKind::Loop, IteratorKind::Numeric);
                    group.range = Some(NumericRange {
                        lower: 1,
                        upper: *upper,
                    });
                    group
                }
            };
            group.fields.push(inner);
            FieldNode::Group(group)
        })
}

fn cardinality(level: &Level) -> usize {
    match level {
        Level::Categorical(count) => *count,
        Level::Numeric(upper) => (*upper).max(0) as usize,
    }
}

proptest! {
    #[test]
    fn instance_count_is_product_of_group_sizes(levels in prop::collection::vec(level_strategy(), 0..4)) {
        let schema = Schema {
            fields: vec![nest(&levels)],
            ..Schema::default()
        };
        let instances = enumerate(&schema);
        let expected: usize = levels.iter().map(cardinality).product();
        prop_assert_eq!(instances.len(), expected);
        for instance in &instances {
            prop_assert_eq!(instance.indices.len(), levels.len());
        }
    }
}

#[test]
fn ungrouped_variable_has_one_instance() {
    let schema = Schema {
        fields: vec![FieldNode::Variable(Variable::new("v", "Age", DataType::Long))],
        ..Schema::default()
    };
    let instances = enumerate(&schema);
    assert_eq!(instances.len(), 1);
    assert!(instances.get("age").is_some_and(|i| i.indices.is_empty()));
}
