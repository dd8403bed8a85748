//! Creating stores and writing case data.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, params, params_from_iter};
use tracing::{debug, info};

use crate::copy::PendingOutput;
use crate::error::{Result, StoreError};
use crate::layout::{
    LEVELS_TABLE, LevelTable, ROOT_TABLE, SERIAL_COLUMN, SERIAL_INDEX, StoreLayout, key_column,
    quote,
};

const DATA_VERSION: i64 = 1;
const SCHEMA_VERSION: &str = "1";

/// Create an empty store with every level table of `layout`.
///
/// The file must not exist yet; on failure nothing is left behind.
pub fn create_store(layout: &StoreLayout, path: &Path) -> Result<()> {
    if path.exists() {
        return Err(StoreError::InvalidArgument(format!(
            "store already exists: {}",
            path.display()
        )));
    }
    let pending = PendingOutput::new([path]);
    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;
    write_metadata(&tx, layout)?;
    for table in &layout.tables {
        tx.execute_batch(&table.create_sql())?;
        debug!(table = %table.name, columns = table.columns.len(), "created level table");
    }
    tx.commit()?;
    ensure_serial_index(&conn)?;
    drop(conn);
    pending.commit();
    info!(path = %path.display(), tables = layout.tables.len(), "created case-data store");
    Ok(())
}

fn write_metadata(tx: &Transaction<'_>, layout: &StoreLayout) -> Result<()> {
    tx.execute_batch(&format!(
        "CREATE TABLE {} (\"TableName\" TEXT NOT NULL, \"ParentName\" TEXT NOT NULL, \"DSCTableName\" TEXT NOT NULL);
         CREATE TABLE \"DataVersion\" (\"Version\" INTEGER NOT NULL);
         CREATE TABLE \"SchemaVersion\" (\"Version\" TEXT NOT NULL);",
        quote(LEVELS_TABLE)
    ))?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} (\"TableName\", \"ParentName\", \"DSCTableName\") VALUES (?1, ?2, ?3)",
            quote(LEVELS_TABLE)
        ))?;
        for row in layout.level_rows() {
            insert.execute(params![row.table_name, row.parent_name, row.dsc_table_name])?;
        }
    }
    tx.execute("INSERT INTO \"DataVersion\" (\"Version\") VALUES (?1)", [DATA_VERSION])?;
    tx.execute("INSERT INTO \"SchemaVersion\" (\"Version\") VALUES (?1)", [SCHEMA_VERSION])?;
    Ok(())
}

/// Build the respondent serial index on `L1` when the serial column exists.
///
/// Returns whether the index is present afterwards.
pub fn ensure_serial_index(conn: &Connection) -> Result<bool> {
    if !table_columns(conn, "main", ROOT_TABLE)?
        .iter()
        .any(|column| column == SERIAL_COLUMN)
    {
        debug!("no respondent serial column; skipping index");
        return Ok(false);
    }
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {}({})",
        quote(SERIAL_INDEX),
        quote(ROOT_TABLE),
        quote(SERIAL_COLUMN)
    ))?;
    Ok(true)
}

/// Column names of `schema.table` in declared order.
pub fn table_columns(conn: &Connection, schema: &str, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA {schema}.table_info({})", quote(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Writes respondent and level rows inside one transaction.
pub struct CaseWriter<'a> {
    tx: Transaction<'a>,
    layout: &'a StoreLayout,
    rows: usize,
}

impl<'a> CaseWriter<'a> {
    pub fn new(conn: &'a mut Connection, layout: &'a StoreLayout) -> Result<Self> {
        Ok(Self {
            tx: conn.transaction()?,
            layout,
            rows: 0,
        })
    }

    /// Insert a respondent row. Cells are keyed by local name (`Q1`, `Q1.Codes`).
    pub fn respondent(&mut self, key: i64, cells: &[(&str, Value)]) -> Result<()> {
        let root = self.layout.root();
        self.insert(root, &[key], cells)
    }

    /// Insert a row of a group table.
    ///
    /// `keys` runs from the respondent key down to the row's own key, one
    /// entry per level: `[respondent, outer, inner]`.
    pub fn level(&mut self, group: &str, keys: &[i64], cells: &[(&str, Value)]) -> Result<()> {
        let table = self
            .layout
            .table_for_group(group)
            .ok_or_else(|| StoreError::MissingLevel {
                group: group.to_string(),
            })?;
        if keys.len() != table.depth + 1 {
            return Err(StoreError::InvalidArgument(format!(
                "`{group}` rows need {} keys, got {}",
                table.depth + 1,
                keys.len()
            )));
        }
        self.insert(table, keys, cells)
    }

    fn insert(&mut self, table: &LevelTable, keys: &[i64], cells: &[(&str, Value)]) -> Result<()> {
        let mut columns = Vec::with_capacity(keys.len() + cells.len() + 1);
        let mut values: Vec<Value> = Vec::with_capacity(columns.capacity());
        for (index, key) in keys.iter().rev().enumerate() {
            columns.push(quote(&key_column(index)));
            values.push(Value::Integer(*key));
        }
        if let (Some(level_id), Some(own)) = (table.level_id_column(), keys.last()) {
            columns.push(quote(level_id));
            values.push(Value::Integer(*own));
        }
        for (name, value) in cells {
            let column = table
                .column(name)
                .ok_or_else(|| StoreError::UnknownVariable {
                    name: (*name).to_string(),
                })?;
            columns.push(quote(&column.column_name()));
            values.push(value.clone());
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote(&table.name),
            columns.join(", ")
        );
        self.tx
            .prepare_cached(&sql)?
            .execute(params_from_iter(values))?;
        self.rows += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<usize> {
        self.tx.commit()?;
        Ok(self.rows)
    }
}
