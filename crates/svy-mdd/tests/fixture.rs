//! End-to-end read of the shared survey fixture.

use std::path::PathBuf;

use svy_mdd::{MddError, parse_schema, read_schema};
use svy_model::{DataType, GroupKind, IteratorKind, Locale, ModelError, ReferenceKind, enumerate};

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../mockdata/survey.mdd")
}

fn fixture_text() -> String {
    std::fs::read_to_string(fixture_path()).expect("read fixture")
}

#[test]
fn fixture_enumerates_every_instance() {
    let schema = read_schema(&fixture_path()).expect("parse fixture");
    let instances = enumerate(&schema);
    let names: Vec<&str> = instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "Respondent.Serial",
            "Q1",
            "Q1.Codes",
            "Q2",
            "Age",
            "Name",
            "Visit",
            "BrandGrid[{brand_a}].Rating",
            "BrandGrid[{brand_b}].Rating",
            "Outer[1].Inner[{red}].Score",
            "Outer[1].Inner[{green}].Score",
            "Outer[2].Inner[{red}].Score",
            "Outer[2].Inner[{green}].Score",
            "Internal",
        ]
    );
    let exportable: Vec<&str> = instances.exportable().map(|i| i.name.as_str()).collect();
    assert!(!exportable.contains(&"Internal"));
    assert!(!exportable.contains(&"Respondent.Serial"));
}

#[test]
fn fixture_groups_resolve_shared_lists() {
    let schema = read_schema(&fixture_path()).expect("parse fixture");
    let grid = schema.group("BrandGrid").expect("grid");
    assert_eq!(grid.kind, GroupKind::Grid);
    assert_eq!(grid.iterator, IteratorKind::Categorical);
    let brands: Vec<(&str, i64)> = schema
        .categories(&grid.categories)
        .into_iter()
        .map(|c| (c.name.as_str(), c.value))
        .collect();
    assert_eq!(brands, [("brand_a", 7), ("brand_b", 8)]);

    let outer = schema.group("Outer").expect("outer");
    assert_eq!(outer.iterator, IteratorKind::Numeric);
    assert_eq!(schema.group_cardinality(outer), 2);
}

#[test]
fn fixture_labels_fall_back_to_base() {
    let schema = read_schema(&fixture_path()).expect("parse fixture");
    let q1 = schema.variable("Q1").expect("Q1");
    let base = schema.base_locale();
    let analysis = Locale::new("en-us", "analysis");
    let french = Locale::new("fr-fr", "question");
    assert_eq!(q1.labels.resolve(&analysis, &base, &q1.name), "Car owner");
    assert_eq!(q1.labels.resolve(&french, &base, &q1.name), "Do you own a car?");
    assert!(q1.is_single_response());

    let q2 = schema.variable("Q2").expect("Q2");
    assert_eq!(q2.effective_max, Some(3));
    assert_eq!(schema.variable("Visit").map(|v| v.data_type), Some(DataType::Date));
}

#[test]
fn dangling_helper_reference_is_fatal() {
    let broken = fixture_text().replace(r#"ref="v-codes""#, r#"ref="v-missing""#);
    let err = parse_schema(&broken).unwrap_err();
    assert!(matches!(
        err,
        MddError::Model(ModelError::DanglingReference {
            kind: ReferenceKind::HelperField,
            ..
        })
    ));
}

#[test]
fn dangling_category_list_is_fatal() {
    let broken = fixture_text().replace(
        r#"categoriesref="list-brands""#,
        r#"categoriesref="list-gone""#,
    );
    let err = parse_schema(&broken).unwrap_err();
    assert!(matches!(
        err,
        MddError::Model(ModelError::DanglingReference {
            kind: ReferenceKind::CategoryList,
            ..
        })
    ));
}
