//! Opening, counting and resolving against a populated fixture store.

mod common;

use svy_ddf::{ColumnTag, DataFile, Predicate, StoreError};
use svy_model::Locale;

#[test]
fn counts_respondents_with_and_without_filter() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::survey(dir.path(), 1..=20);

    assert_eq!(data.count(None).unwrap(), 20);
    let owners: Predicate = "Q1 = 1".parse().unwrap();
    assert_eq!(data.count(Some(&owners)).unwrap(), 10);
    let band: Predicate = "Age BETWEEN 20 AND 25".parse().unwrap();
    assert_eq!(data.count(Some(&band)).unwrap(), 6);

    let unknown: Predicate = "Height > 3".parse().unwrap();
    assert!(matches!(
        data.count(Some(&unknown)),
        Err(StoreError::UnknownVariable { .. })
    ));
}

#[test]
fn store_levels_match_the_schema_layout() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::survey(dir.path(), 1..=2);

    let levels = data.levels().unwrap();
    assert_eq!(levels, data.layout().level_rows());
    let tables: Vec<(&str, &str, &str)> = levels
        .iter()
        .map(|row| {
            (
                row.table_name.as_str(),
                row.parent_name.as_str(),
                row.dsc_table_name.as_str(),
            )
        })
        .collect();
    assert_eq!(
        tables,
        [
            ("L1", "L1", ""),
            ("L2", "L1", "BrandGrid"),
            ("L3", "L1", "Outer"),
            ("L4", "L3", "Inner"),
        ]
    );
}

#[test]
fn missing_store_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let schema_path = dir.path().join("survey.mdd");
    std::fs::copy(common::fixture_path(), &schema_path).unwrap();

    let err = DataFile::open(&schema_path, None).unwrap_err();
    assert!(matches!(err, StoreError::MissingStore { .. }));
}

#[test]
fn resolves_nested_join_paths() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::survey(dir.path(), 1..=3);

    let path = data.resolve("Outer[2].Inner[{green}].Score").unwrap();
    assert_eq!(path.steps.len(), 2);
    assert_eq!(path.leaf.table, "L4");
    assert_eq!(path.leaf.tag, ColumnTag::L);
    insta::assert_snapshot!(
        path.select_sql(),
        @r#"SELECT t0.":P0" AS respondent, t2."Score:L" AS value FROM "L1" AS t0 JOIN "L3" AS t1 ON t1.":P1" = t0.":P0" JOIN "L4" AS t2 ON t2.":P1" = t1.":P0" AND t2.":P2" = t1.":P1" WHERE t1.":P0" = 2 AND t2.":P0" = 4 ORDER BY t0.":P0""#
    );

    let conn = rusqlite::Connection::open(data.store_path()).unwrap();
    let scores: Vec<(i64, i64)> = conn
        .prepare(&path.select_sql())
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(scores, [(1, 112), (2, 122), (3, 132)]);

    let generic = data.resolve("Outer[..].Inner[..].Score").unwrap();
    assert!(generic.steps.iter().all(|step| step.filter.is_none()));

    assert!(matches!(
        data.resolve("Outer[3].Inner[{green}].Score"),
        Err(StoreError::UnknownVariable { .. })
    ));
}

#[test]
fn category_lookups_use_labels_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::survey(dir.path(), 1..=1);

    let dict = data.category_dict("Q2", None).unwrap();
    let labels: Vec<(&str, &str)> = dict
        .iter()
        .map(|entry| (entry.name.as_str(), entry.label.as_str()))
        .collect();
    assert_eq!(
        labels,
        [
            ("red", "Red"),
            ("green", "Green"),
            ("blue", "Blue"),
            ("none", "None of these")
        ]
    );

    let french = Locale::new("FR-FR", "Question");
    let fallback = data.category_dict("Q1", Some(&french)).unwrap();
    assert_eq!(fallback[0].label, "Yes");

    let values: Vec<(i64, String)> = data
        .category_values("BrandGrid[{brand_b}].Rating")
        .unwrap()
        .into_iter()
        .map(|entry| (entry.value, entry.name))
        .collect();
    assert_eq!(values, [(1, "yes".to_string()), (2, "no".to_string())]);
}

#[test]
fn variable_names_match_patterns_from_the_start() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::survey(dir.path(), 1..=1);

    let q = data.set_of_variable_names(&["q"], false).unwrap();
    assert_eq!(
        q.into_iter().collect::<Vec<_>>(),
        ["Q1", "Q1.Codes", "Q2"]
    );

    let grids = data.set_of_variable_names(&["BrandGrid", "Outer"], true).unwrap();
    assert_eq!(
        grids.into_iter().collect::<Vec<_>>(),
        ["BrandGrid[..].Rating", "Outer[..].Inner[..].Score"]
    );

    let all = data.set_of_variable_names::<&str>(&[], false).unwrap();
    assert!(!all.contains("Internal"));
    assert!(!all.contains("Respondent.Serial"));
    assert_eq!(all.len(), 12);
}

#[test]
fn join_paths_are_cached_until_rebind() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=1);

    data.resolve("Q1").unwrap();
    data.resolve("Q1").unwrap();
    data.resolve("Age").unwrap();
    assert_eq!(data.cache().cached_join_paths(), 2);

    let schema_path = data.schema_path().to_path_buf();
    data.rebind(&schema_path, None).unwrap();
    assert_eq!(data.cache().cached_join_paths(), 2);

    let other = tempfile::tempdir().unwrap();
    let copy = common::survey(other.path(), 1..=1);
    data.rebind(copy.schema_path(), None).unwrap();
    assert_eq!(data.cache().cached_join_paths(), 0);
}

#[test]
fn compact_keeps_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::survey(dir.path(), 1..=5);

    data.compact().unwrap();
    assert_eq!(data.count(None).unwrap(), 5);
    assert_eq!(common::row_count(data.store_path(), "L4"), 20);
}
