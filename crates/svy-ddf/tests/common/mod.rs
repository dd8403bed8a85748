//! Builds populated copies of the shared survey fixture.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::Connection;
use rusqlite::types::Value;
use svy_ddf::codec::{encode_date, encode_multi};
use svy_ddf::{CaseWriter, DataFile, StoreLayout, create_store};
use svy_mdd::read_schema;

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../mockdata/survey.mdd")
}

/// `survey.mdd` and a `survey.ddf` with `respondents` in `dir`.
pub fn survey(dir: &Path, respondents: impl IntoIterator<Item = i64>) -> DataFile {
    named_survey(dir, "survey", respondents)
}

/// Like [`survey`] but with `<name>.mdd`/`<name>.ddf`.
pub fn named_survey(dir: &Path, name: &str, respondents: impl IntoIterator<Item = i64>) -> DataFile {
    let schema_path = dir.join(format!("{name}.mdd"));
    let store_path = dir.join(format!("{name}.ddf"));
    svy_mdd::copy_with_datasource(&fixture_path(), &schema_path, &store_path).unwrap();

    let schema = read_schema(&schema_path).unwrap();
    let layout = StoreLayout::from_schema(&schema);
    create_store(&layout, &store_path).unwrap();

    let mut conn = Connection::open(&store_path).unwrap();
    let mut writer = CaseWriter::new(&mut conn, &layout).unwrap();
    for key in respondents {
        write_respondent(&mut writer, key);
    }
    writer.finish().unwrap();
    drop(conn);

    DataFile::open(&schema_path, None).unwrap()
}

/// Odd keys answer Q1 `yes`, even keys `no`. Multiples of three pick red
/// and blue in Q2, the rest green.
fn write_respondent(writer: &mut CaseWriter<'_>, key: i64) {
    let visit = NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap();
    let q2 = if key % 3 == 0 { vec![3, 5] } else { vec![4] };
    writer
        .respondent(
            key,
            &[
                ("Respondent.Serial", Value::Integer(key)),
                ("Q1", Value::Integer(if key % 2 == 1 { 1 } else { 2 })),
                ("Q1.Codes", Value::Text(format!("code {key}"))),
                ("Q2", Value::Text(encode_multi(&q2))),
                ("Age", Value::Integer(18 + key % 50)),
                ("Name", Value::Text(format!("Person {key}"))),
                ("Visit", Value::Real(encode_date(visit))),
                ("Internal", Value::Text("internal".to_string())),
            ],
        )
        .unwrap();

    writer
        .level("BrandGrid", &[key, 7], &[("Rating", Value::Integer(1))])
        .unwrap();
    writer
        .level("BrandGrid", &[key, 8], &[("Rating", Value::Integer(2))])
        .unwrap();
    for outer in 1..=2 {
        writer.level("Outer", &[key, outer], &[]).unwrap();
        for (inner, offset) in [(3, 0), (4, 100)] {
            writer
                .level(
                    "Outer[..].Inner",
                    &[key, outer, inner],
                    &[("Score", Value::Integer(key * 10 + outer + offset))],
                )
                .unwrap();
        }
    }
}

pub fn respondent_keys(data: &DataFile) -> Vec<i64> {
    let conn = Connection::open(data.store_path()).unwrap();
    let mut stmt = conn
        .prepare("SELECT \":P0\" FROM \"L1\" ORDER BY \":P0\"")
        .unwrap();
    stmt.query_map([], |row| row.get::<_, i64>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

pub fn row_count(store: &Path, table: &str) -> i64 {
    let conn = Connection::open(store).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
        .unwrap()
}
