//! Transactional store copies.
//!
//! Split and merge write new schema/store pairs. Every path they create is
//! registered with a [`PendingOutput`] first; unless the operation commits
//! it, the guard deletes those files when it goes out of scope, so a failed
//! operation never leaves a partially written pair behind.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, params_from_iter};
use tracing::{debug, warn};

use crate::create::{ensure_serial_index, table_columns};
use crate::error::{Result, StoreError};
use crate::layout::{ROOT_TABLE, is_metadata_table, key_column, quote};

const DESTINATION: &str = "dest";

/// Files to delete unless the operation that writes them succeeds.
#[derive(Debug)]
pub struct PendingOutput {
    paths: Vec<PathBuf>,
    committed: bool,
}

impl PendingOutput {
    pub fn new<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            paths: paths
                .into_iter()
                .map(|path| path.as_ref().to_path_buf())
                .collect(),
            committed: false,
        }
    }

    pub fn add(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingOutput {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.paths {
            if path.exists() {
                match fs::remove_file(path) {
                    Ok(()) => warn!(path = %path.display(), "removed partial output"),
                    Err(error) => {
                        warn!(path = %path.display(), %error, "failed to remove partial output");
                    }
                }
            }
        }
    }
}

/// Remove `path` if it exists.
pub(crate) fn remove_existing(path: &Path) -> Result<()> {
    if path.exists() {
        debug!(path = %path.display(), "removing existing output");
        fs::remove_file(path).map_err(|e| StoreError::io("remove", path, e))?;
    }
    Ok(())
}

/// Which respondents a copy keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Respondent keys within an inclusive range.
    Range { low: i64, high: i64 },
    /// An explicit set of respondent keys.
    Ids(Vec<i64>),
}

/// A table's `CREATE` statement as stored by SQLite.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub name: String,
    pub sql: String,
}

impl TableDefinition {
    pub fn is_metadata(&self) -> bool {
        is_metadata_table(&self.name)
    }

    fn create_in(&self, schema: &str) -> String {
        let body = self
            .sql
            .trim_start()
            .get("CREATE TABLE".len()..)
            .unwrap_or_default()
            .trim_start();
        format!("CREATE TABLE {schema}.{body}")
    }
}

/// Table definitions of a store in creation order.
pub fn table_definitions(conn: &Connection) -> Result<Vec<TableDefinition>> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM main.sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid",
    )?;
    let tables = stmt
        .query_map([], |row| {
            Ok(TableDefinition {
                name: row.get(0)?,
                sql: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tables)
}

/// Column holding the respondent key: the highest-numbered `:P` column.
pub fn respondent_key_column(conn: &Connection, schema: &str, table: &str) -> Result<String> {
    table_columns(conn, schema, table)?
        .into_iter()
        .filter_map(|column| {
            column
                .strip_prefix(":P")
                .and_then(|index| index.parse::<usize>().ok())
                .map(|index| (index, column))
        })
        .max_by_key(|(index, _)| *index)
        .map(|(_, column)| column)
        .ok_or_else(|| StoreError::mismatch(table, None, "table has no positional key column"))
}

/// Respondent keys of a store in ascending order.
pub fn respondent_ids(conn: &Connection) -> Result<Vec<i64>> {
    let key = quote(&key_column(0));
    let mut stmt = conn.prepare(&format!(
        "SELECT {key} FROM {} ORDER BY {key}",
        quote(ROOT_TABLE)
    ))?;
    let ids = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Copy the tables of `source` into a new store at `destination`, keeping
/// the respondents in `selection`. Metadata tables are copied whole.
///
/// The destination must not exist. It is deleted again if any step fails.
pub fn copy_store(source: &Path, destination: &Path, selection: &Selection) -> Result<usize> {
    let pending = PendingOutput::new([destination]);
    let copied = copy_into(source, destination, selection)?;
    pending.commit();
    Ok(copied)
}

fn copy_into(source: &Path, destination: &Path, selection: &Selection) -> Result<usize> {
    let mut conn = Connection::open(source)?;
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {DESTINATION}"),
        [destination.to_string_lossy()],
    )?;

    if let Selection::Ids(ids) = selection {
        conn.execute_batch("CREATE TEMP TABLE selected_ids (id INTEGER PRIMARY KEY)")?;
        let mut insert = conn.prepare("INSERT OR IGNORE INTO temp.selected_ids (id) VALUES (?1)")?;
        for id in ids {
            insert.execute([id])?;
        }
    }

    let tables = table_definitions(&conn)?;
    let tx = conn.transaction()?;
    let mut respondents = 0;
    for table in &tables {
        tx.execute_batch(&table.create_in(DESTINATION))?;
        let target = format!("{DESTINATION}.{}", quote(&table.name));
        let origin = format!("main.{}", quote(&table.name));
        let (sql, params) = if table.is_metadata() {
            (format!("INSERT INTO {target} SELECT * FROM {origin}"), Vec::new())
        } else {
            let key = quote(&respondent_key_column(&tx, "main", &table.name)?);
            match selection {
                Selection::All => (format!("INSERT INTO {target} SELECT * FROM {origin}"), Vec::new()),
                Selection::Range { low, high } => (
                    format!("INSERT INTO {target} SELECT * FROM {origin} WHERE {key} BETWEEN ?1 AND ?2"),
                    vec![*low, *high],
                ),
                Selection::Ids(_) => (
                    format!(
                        "INSERT INTO {target} SELECT * FROM {origin} \
                         WHERE {key} IN (SELECT id FROM temp.selected_ids)"
                    ),
                    Vec::new(),
                ),
            }
        };
        let rows = tx.execute(&sql, params_from_iter(params))?;
        if table.name.eq_ignore_ascii_case(ROOT_TABLE) {
            respondents = rows;
        }
        debug!(table = %table.name, rows, "copied table");
    }
    tx.commit()?;
    conn.execute_batch(&format!("DETACH DATABASE {DESTINATION}"))?;
    drop(conn);

    let conn = Connection::open(destination)?;
    ensure_serial_index(&conn)?;
    Ok(respondents)
}
