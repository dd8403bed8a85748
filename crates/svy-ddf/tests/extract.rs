//! Deriving text variables.

mod common;

use std::io::Write;

use rusqlite::Connection;
use svy_ddf::{DataFile, ExportOptions, ExtractOptions, ExtractOutcome, RemapTable, StoreError};

fn create() -> ExtractOptions {
    ExtractOptions {
        create: true,
        overwrite: false,
        label: Some("Car owner".to_string()),
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn exported(data: &DataFile, column: &str) -> Vec<Option<String>> {
    let table = data
        .export(&ExportOptions {
            use_category_names: true,
            columns: Some(vec![column.to_string()]),
        })
        .unwrap();
    table.rows.into_iter().map(|mut row| row.values.remove(0)).collect()
}

#[test]
fn categorical_source_writes_mapped_names() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=4);

    let outcome = data
        .extract("Q1", "Owner", &create(), Some(&capitalize))
        .unwrap();
    assert_eq!(outcome, ExtractOutcome::Written { rows: 4 });
    assert!(dir.path().join("survey.orig.mdd").exists());
    assert!(data.instances().contains("Owner"));

    assert_eq!(
        exported(&data, "Owner"),
        [
            Some("Yes".to_string()),
            Some("No".to_string()),
            Some("Yes".to_string()),
            Some("No".to_string())
        ]
    );

    let reopened = DataFile::open(data.schema_path(), None).unwrap();
    assert_eq!(reopened.schema().variable("Owner").unwrap().name, "Owner");
    assert_eq!(exported(&reopened, "Owner")[1].as_deref(), Some("No"));
}

#[test]
fn existing_destination_needs_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=2);
    data.extract("Q1", "Owner", &create(), None).unwrap();

    let again = data.extract("Q1", "Owner", &create(), None);
    assert!(matches!(
        again,
        Err(StoreError::UnsupportedOperation { .. })
    ));

    let overwrite = ExtractOptions {
        overwrite: true,
        ..ExtractOptions::default()
    };
    let outcome = data
        .extract("Q1.Codes", "Owner", &overwrite, None)
        .unwrap();
    assert_eq!(outcome, ExtractOutcome::Written { rows: 2 });
    assert_eq!(exported(&data, "Owner")[0].as_deref(), Some("code 1"));
}

#[test]
fn missing_destination_needs_create() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=2);
    let err = data
        .extract("Q1", "Owner", &ExtractOptions::default(), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownVariable { .. }));
    assert!(!dir.path().join("survey.orig.mdd").exists());

    let err = data
        .extract("Q1", "Grid[{a}].Owner", &create(), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn unsupported_sources() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=2);

    let outcome = data.extract("Q2", "Colours", &create(), None).unwrap();
    assert!(matches!(outcome, ExtractOutcome::Skipped { .. }));
    assert!(data.schema().variable("Colours").is_none());

    assert!(matches!(
        data.extract("Age", "AgeText", &create(), None),
        Err(StoreError::UnsupportedOperation { .. })
    ));
}

#[test]
fn nested_source_through_lookup_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=3);

    let lookup = dir.path().join("lookup.csv");
    let mut file = std::fs::File::create(&lookup).unwrap();
    writeln!(file, "CODE,Meaning").unwrap();
    writeln!(file, "yes,Recommends").unwrap();
    drop(file);
    let table = RemapTable::from_csv(&lookup, "code", "meaning", b',').unwrap();

    let outcome = data
        .extract_with_table("BrandGrid[{brand_a}].Rating", "BrandA", &create(), &table)
        .unwrap();
    assert_eq!(outcome, ExtractOutcome::Written { rows: 3 });
    assert_eq!(exported(&data, "BrandA")[2].as_deref(), Some("Recommends"));

    // Unmapped answers become empty text.
    let overwrite = ExtractOptions {
        overwrite: true,
        ..ExtractOptions::default()
    };
    data.extract_with_table("BrandGrid[{brand_b}].Rating", "BrandA", &overwrite, &table)
        .unwrap();
    assert_eq!(exported(&data, "BrandA")[0].as_deref(), Some(""));
}

fn root_text(data: &DataFile, column: &str) -> Vec<Option<String>> {
    let conn = Connection::open(data.store_path()).unwrap();
    let mut stmt = conn
        .prepare(&format!("SELECT \"{column}\" FROM \"L1\" ORDER BY \":P0\""))
        .unwrap();
    stmt.query_map([], |row| row.get::<_, Option<String>>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn root_columns(data: &DataFile) -> Vec<String> {
    let conn = Connection::open(data.store_path()).unwrap();
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('L1')").unwrap();
    stmt.query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn dotted_destination_is_not_top_level() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=2);
    let overwrite = ExtractOptions {
        overwrite: true,
        ..ExtractOptions::default()
    };

    let err = data.extract("Q1", "Q1.Codes", &overwrite, None).unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert_eq!(
        root_text(&data, "Q1.Codes:X"),
        [Some("code 1".to_string()), Some("code 2".to_string())]
    );
}

#[test]
fn unreadable_source_leaves_store_and_schema_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=3);
    Connection::open(data.store_path())
        .unwrap()
        .execute_batch("ALTER TABLE \"L1\" DROP COLUMN \"Q1.Codes:X\"")
        .unwrap();

    let overwrite = ExtractOptions {
        overwrite: true,
        ..ExtractOptions::default()
    };
    assert!(data.extract("Q1.Codes", "Name", &overwrite, None).is_err());
    assert_eq!(
        root_text(&data, "Name:X"),
        [
            Some("Person 1".to_string()),
            Some("Person 2".to_string()),
            Some("Person 3".to_string())
        ]
    );

    assert!(data.extract("Q1.Codes", "Owner", &create(), None).is_err());
    assert!(!root_columns(&data).contains(&"Owner:X".to_string()));
    assert!(data.schema().variable("Owner").is_none());
    assert!(!dir.path().join("survey.orig.mdd").exists());
}

#[test]
fn failed_write_removes_created_variable() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=2);
    Connection::open(data.store_path())
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER read_only BEFORE UPDATE ON \"L1\" \
             BEGIN SELECT RAISE(ABORT, 'read only'); END;",
        )
        .unwrap();

    assert!(matches!(
        data.extract("Q1", "Owner", &create(), None),
        Err(StoreError::Sql(_))
    ));
    assert!(!root_columns(&data).contains(&"Owner:X".to_string()));
    assert!(data.schema().variable("Owner").is_none());
    let reopened = DataFile::open(data.schema_path(), None).unwrap();
    assert!(reopened.schema().variable("Owner").is_none());
}

#[test]
fn clear_text_field_blanks_every_respondent() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = common::survey(dir.path(), 1..=3);
    data.extract("Q1", "Owner", &create(), None).unwrap();

    assert_eq!(data.clear_text_field("Owner").unwrap(), 3);
    assert_eq!(root_text(&data, "Owner:X"), vec![Some(String::new()); 3]);
    assert!(matches!(
        data.clear_text_field("Missing"),
        Err(StoreError::UnknownVariable { .. })
    ));
}
