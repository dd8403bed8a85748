//! Recombining schema-identical stores.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use svy_mdd::copy_with_datasource;
use tracing::{info, info_span, warn};

use crate::copy::{
    PendingOutput, Selection, copy_store, remove_existing, respondent_key_column, table_definitions,
};
use crate::create::table_columns;
use crate::error::{Result, StoreError};
use crate::layout::{MATCHED_METADATA_TABLES, ROOT_TABLE, is_metadata_table, key_column, quote};
use crate::store::DataFile;

const SOURCE: &str = "src";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedSource {
    pub store_path: PathBuf,
    pub respondents: u64,
    /// Amount added to the source's respondent keys.
    pub shift: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub schema_path: PathBuf,
    pub store_path: PathBuf,
    pub respondents: u64,
    pub sources: Vec<MergedSource>,
}

/// Offset for incoming respondent keys so they cannot collide with existing ones.
///
/// Zero when the incoming range starts above the existing maximum, otherwise
/// the larger of the two maxima.
pub fn key_shift(existing: Option<(i64, i64)>, incoming: Option<(i64, i64)>) -> i64 {
    match (existing, incoming) {
        (Some((_, existing_max)), Some((incoming_min, incoming_max)))
            if existing_max >= incoming_min =>
        {
            existing_max.max(incoming_max)
        }
        _ => 0,
    }
}

fn key_range(conn: &Connection, schema: &str) -> Result<Option<(i64, i64)>> {
    let key = quote(&key_column(0));
    let range: (Option<i64>, Option<i64>) = conn.query_row(
        &format!(
            "SELECT MIN({key}), MAX({key}) FROM {schema}.{}",
            quote(ROOT_TABLE)
        ),
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(match range {
        (Some(min), Some(max)) => Some((min, max)),
        _ => None,
    })
}

fn table_rows(conn: &Connection, table: &str) -> Result<Vec<Vec<Value>>> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote(table)))?;
    let width = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|index| row.get::<_, Value>(index))
                .collect::<std::result::Result<Vec<_>, _>>()
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Check that `other` has the structure of `base`.
fn compare(base: &Connection, other: &Connection, other_path: &Path) -> Result<()> {
    let base_tables = table_definitions(base)?;
    let other_tables = table_definitions(other)?;

    for table in &base_tables {
        if !other_tables
            .iter()
            .any(|candidate| candidate.name.eq_ignore_ascii_case(&table.name))
        {
            return Err(StoreError::mismatch(
                &table.name,
                None,
                format!("missing from {}", other_path.display()),
            ));
        }
    }
    for table in &other_tables {
        if !base_tables
            .iter()
            .any(|candidate| candidate.name.eq_ignore_ascii_case(&table.name))
        {
            return Err(StoreError::mismatch(
                &table.name,
                None,
                format!("only present in {}", other_path.display()),
            ));
        }
    }

    for table in base_tables.iter().filter(|table| !table.is_metadata()) {
        let expected = table_columns(base, "main", &table.name)?;
        let actual = table_columns(other, "main", &table.name)?;
        for (position, column) in expected.iter().enumerate() {
            match actual.get(position) {
                Some(found) if found == column => {}
                Some(found) => {
                    return Err(StoreError::mismatch(
                        &table.name,
                        Some(column),
                        format!("position {position} holds `{found}` in {}", other_path.display()),
                    ));
                }
                None => {
                    return Err(StoreError::mismatch(
                        &table.name,
                        Some(column),
                        format!("missing from {}", other_path.display()),
                    ));
                }
            }
        }
        if let Some(extra) = actual.get(expected.len()) {
            return Err(StoreError::mismatch(
                &table.name,
                Some(extra),
                format!("only present in {}", other_path.display()),
            ));
        }
    }

    for table in MATCHED_METADATA_TABLES {
        if table_rows(base, table)? != table_rows(other, table)? {
            return Err(StoreError::mismatch(
                table,
                None,
                format!("content differs in {}", other_path.display()),
            ));
        }
    }
    Ok(())
}

impl DataFile {
    /// Confirm that every store in `others` can be merged into this one.
    ///
    /// Fails with [`StoreError::SchemaMismatch`] naming the first differing
    /// table or column. Nothing is modified.
    pub fn matches(&self, others: &[&DataFile]) -> Result<()> {
        let base = self.connect()?;
        for other in others {
            compare(&base, &other.connect()?, other.store_path())?;
        }
        info!(stores = others.len() + 1, "stores are schema-identical");
        Ok(())
    }

    /// Merge this store and `others` into a new schema/store pair.
    ///
    /// This store is copied first; each further store is appended with its
    /// respondent keys shifted past the keys already present. The output is
    /// removed again if any step fails.
    pub fn merge(&self, others: &[&DataFile], schema_path: &Path, store_path: &Path) -> Result<MergeReport> {
        let span = info_span!("merge", output = %store_path.display(), inputs = others.len() + 1);
        let _guard = span.enter();

        self.matches(others)?;
        remove_existing(store_path)?;
        remove_existing(schema_path)?;

        let mut pending = PendingOutput::new([store_path]);
        pending.add(schema_path);

        let base_count = copy_store(self.store_path(), store_path, &Selection::All)? as u64;
        copy_with_datasource(self.schema_path(), schema_path, store_path)?;
        let mut sources = vec![MergedSource {
            store_path: self.store_path().to_path_buf(),
            respondents: base_count,
            shift: 0,
        }];

        let mut conn = Connection::open(store_path)?;
        for other in others {
            let respondents = other.count(None)?;
            if respondents == 0 {
                warn!(store = %other.store_path().display(), "no respondents; skipping");
                sources.push(MergedSource {
                    store_path: other.store_path().to_path_buf(),
                    respondents,
                    shift: 0,
                });
                continue;
            }
            let shift = append_store(&mut conn, other.store_path())?;
            info!(store = %other.store_path().display(), respondents, shift, "appended store");
            sources.push(MergedSource {
                store_path: other.store_path().to_path_buf(),
                respondents,
                shift,
            });
        }
        conn.execute_batch("VACUUM")?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote(ROOT_TABLE)),
            [],
            |row| row.get(0),
        )?;
        drop(conn);
        pending.commit();

        info!(respondents = total, "merge complete");
        Ok(MergeReport {
            schema_path: schema_path.to_path_buf(),
            store_path: store_path.to_path_buf(),
            respondents: total.max(0) as u64,
            sources,
        })
    }
}

/// Append every case-data table of `source` in one transaction.
fn append_store(conn: &mut Connection, source: &Path) -> Result<i64> {
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {SOURCE}"),
        [source.to_string_lossy()],
    )?;
    let result = append_attached(conn);
    conn.execute_batch(&format!("DETACH DATABASE {SOURCE}"))?;
    result
}

fn append_attached(conn: &mut Connection) -> Result<i64> {
    let shift = key_shift(key_range(conn, "main")?, key_range(conn, SOURCE)?);
    let tables = table_definitions(conn)?;
    let tx = conn.transaction()?;
    for table in tables.iter().filter(|table| !is_metadata_table(&table.name)) {
        let key = respondent_key_column(&tx, "main", &table.name)?;
        let columns = table_columns(&tx, "main", &table.name)?;
        let targets = columns
            .iter()
            .map(|column| quote(column))
            .collect::<Vec<_>>()
            .join(", ");
        let sources = columns
            .iter()
            .map(|column| {
                if *column == key {
                    format!("{} + ?1", quote(column))
                } else {
                    quote(column)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute(
            &format!(
                "INSERT INTO main.{table} ({targets}) SELECT {sources} FROM {SOURCE}.{table}",
                table = quote(&table.name)
            ),
            [shift],
        )?;
    }
    tx.commit()?;
    Ok(shift)
}
