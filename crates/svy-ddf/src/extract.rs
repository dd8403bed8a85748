//! Deriving root-level text variables from existing answers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use svy_mdd::{NewTextVariable, TEXT_VARIABLE_MAX, add_text_variable, backup_original, write_atomic};
use tracing::{debug, error, info, info_span, warn};

use crate::codec::NO_ANSWER;
use crate::create::table_columns;
use crate::error::{Result, StoreError};
use crate::join::JoinPath;
use crate::layout::{ColumnSpec, ColumnTag, ROOT_TABLE, key_column, quote};
use crate::store::DataFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractOutcome {
    /// Number of respondents whose destination value was written.
    Written { rows: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Add the destination variable when it does not exist.
    pub create: bool,
    /// Clear and rewrite an existing destination variable.
    pub overwrite: bool,
    /// Label of a created variable; defaults to its name.
    pub label: Option<String>,
}

/// Lookup table loaded from a delimited file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapTable {
    entries: HashMap<String, String>,
}

impl RemapTable {
    /// Read `key_column` and `value_column` from a file with a header row.
    /// Header names compare case-insensitively.
    pub fn from_csv(path: &Path, key_column: &str, value_column: &str, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let position = |wanted: &str| {
            headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(wanted))
                .ok_or_else(|| {
                    StoreError::InvalidArgument(format!(
                        "column `{wanted}` not found in {}",
                        path.display()
                    ))
                })
        };
        let key_index = position(key_column)?;
        let value_index = position(value_column)?;

        let mut entries = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let Some(key) = record.get(key_index) else {
                continue;
            };
            let value = record.get(value_index).unwrap_or_default();
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        debug!(path = %path.display(), entries = entries.len(), "loaded remap table");
        Ok(Self { entries })
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Mapped value; keys without an entry map to an empty string.
    pub fn get(&self, key: &str) -> String {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_simple_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['[', ']', ':', '.'])
}

impl DataFile {
    /// Write a text value per respondent into the root variable `target`,
    /// derived from `source`.
    ///
    /// Categorical sources contribute their category name, text sources
    /// their text; `remap` transforms the value before it is stored.
    /// Multi-response sources are skipped.
    pub fn extract(
        &mut self,
        source: &str,
        target: &str,
        options: &ExtractOptions,
        remap: Option<&dyn Fn(&str) -> String>,
    ) -> Result<ExtractOutcome> {
        let span = info_span!("extract", source, target);
        let _guard = span.enter();

        let path = self.resolve(source)?;
        match path.leaf.tag {
            ColumnTag::S => {
                let reason = format!("`{source}` is multi-response");
                error!(%reason, "cannot extract; no data written");
                return Ok(ExtractOutcome::Skipped { reason });
            }
            ColumnTag::C1 | ColumnTag::X => {}
            other => {
                return Err(StoreError::UnsupportedOperation {
                    operation: "extract",
                    reason: format!(
                        "`{source}` is stored as {}; only categorical and text variables are supported",
                        other.as_str()
                    ),
                });
            }
        }
        if !is_simple_name(target) {
            return Err(StoreError::InvalidArgument(format!(
                "destination `{target}` must be a top-level variable name"
            )));
        }

        let created = self.check_destination(target, options)?;
        let values = self.extracted_values(&path, remap)?;

        let previous_schema = if created {
            let schema_path = self.schema_path();
            let text = fs::read(schema_path).map_err(|e| StoreError::io("read", schema_path, e))?;
            let label = options.label.clone().unwrap_or_else(|| target.to_string());
            self.add_text_field(target, &label)?;
            Some(text)
        } else {
            None
        };

        match self.write_destination(target, &values) {
            Ok(rows) => {
                info!(rows, "extracted values");
                Ok(ExtractOutcome::Written { rows })
            }
            Err(err) => {
                if let Some(text) = previous_schema {
                    warn!(variable = target, "write failed; removing created variable");
                    self.remove_text_field(target, &text)?;
                }
                Err(err)
            }
        }
    }

    /// [`DataFile::extract`] with values translated through a lookup table.
    pub fn extract_with_table(
        &mut self,
        source: &str,
        target: &str,
        options: &ExtractOptions,
        table: &RemapTable,
    ) -> Result<ExtractOutcome> {
        let remap = |value: &str| table.get(value);
        self.extract(source, target, options, Some(&remap))
    }

    /// Add an empty root-level text variable to both the store and the schema.
    ///
    /// The schema document is backed up as `<stem>.orig.mdd` before it is
    /// rewritten.
    pub fn add_text_field(&mut self, name: &str, label: &str) -> Result<()> {
        if !is_simple_name(name) {
            return Err(StoreError::InvalidArgument(format!(
                "`{name}` must be a top-level variable name"
            )));
        }
        if self.schema().variable(name).is_some() {
            return Err(StoreError::InvalidArgument(format!("`{name}` already exists")));
        }
        let column = ColumnSpec {
            local_name: name.to_string(),
            tag: ColumnTag::X,
        }
        .column_name();

        let conn = self.connect()?;
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT",
            quote(ROOT_TABLE),
            quote(&column)
        ))?;

        if let Err(err) = self.add_schema_variable(name, label) {
            warn!(column = %column, "schema update failed; dropping added column");
            conn.execute_batch(&format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote(ROOT_TABLE),
                quote(&column)
            ))?;
            return Err(err);
        }
        drop(conn);

        self.reload_schema()?;
        info!(variable = name, "added text variable");
        Ok(())
    }

    /// Empty every value of a root-level text variable.
    pub fn clear_text_field(&self, name: &str) -> Result<usize> {
        let column = self.text_column(name)?;
        let rows = self.connect()?.execute(
            &format!("UPDATE {} SET {} = ''", quote(ROOT_TABLE), quote(&column)),
            [],
        )?;
        debug!(variable = name, rows, "cleared text variable");
        Ok(rows)
    }

    fn add_schema_variable(&self, name: &str, label: &str) -> Result<()> {
        let schema_path = self.schema_path();
        let text = fs::read_to_string(schema_path)
            .map_err(|e| StoreError::io("read", schema_path, e))?;
        let backup = backup_original(schema_path)?;
        debug!(backup = %backup.display(), "backed up schema");
        let updated = add_text_variable(
            &text,
            &NewTextVariable {
                name,
                label,
                language: &self.schema().languages.base,
                context: &self.schema().contexts.base,
            },
        )?;
        write_atomic(schema_path, updated.as_bytes())?;
        Ok(())
    }

    /// Existing text column of a root variable.
    fn text_column(&self, name: &str) -> Result<String> {
        let conn = self.connect()?;
        let wanted = format!("{name}:{}", ColumnTag::X.as_str());
        let columns = table_columns(&conn, "main", ROOT_TABLE)?;
        if let Some(column) = columns
            .into_iter()
            .find(|column| column.eq_ignore_ascii_case(&wanted))
        {
            return Ok(column);
        }
        match self.schema().variable(name) {
            Some(_) => Err(StoreError::UnsupportedOperation {
                operation: "write",
                reason: format!("`{name}` is not a top-level text variable"),
            }),
            None => Err(StoreError::UnknownVariable {
                name: name.to_string(),
            }),
        }
    }

    /// Whether `target` has to be created; nothing is modified.
    fn check_destination(&self, target: &str, options: &ExtractOptions) -> Result<bool> {
        let exists = self.schema().variable(target).is_some();
        match (exists, options.overwrite, options.create) {
            (true, true, _) => {
                self.text_column(target)?;
                Ok(false)
            }
            (true, false, _) => Err(StoreError::UnsupportedOperation {
                operation: "extract",
                reason: format!("`{target}` already exists and overwriting was not requested"),
            }),
            (false, _, true) => Ok(true),
            (false, _, false) => Err(StoreError::UnknownVariable {
                name: target.to_string(),
            }),
        }
    }

    /// Clear `target` and store `values` in one transaction.
    fn write_destination(&self, target: &str, values: &[(i64, String)]) -> Result<usize> {
        let column = self.text_column(target)?;
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("UPDATE {} SET {} = ''", quote(ROOT_TABLE), quote(&column)),
            [],
        )?;
        let mut rows = 0;
        {
            let mut update = tx.prepare(&format!(
                "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                quote(ROOT_TABLE),
                quote(&column),
                quote(&key_column(0))
            ))?;
            for (respondent, value) in values {
                rows += update.execute(rusqlite::params![value, respondent])?;
            }
        }
        tx.commit()?;
        Ok(rows)
    }

    /// Undo [`DataFile::add_text_field`]: drop the column and put back the
    /// schema document text it replaced.
    fn remove_text_field(&mut self, name: &str, previous_schema: &[u8]) -> Result<()> {
        let column = self.text_column(name)?;
        self.connect()?.execute_batch(&format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote(ROOT_TABLE),
            quote(&column)
        ))?;
        write_atomic(self.schema_path(), previous_schema)?;
        self.reload_schema()
    }

    /// First answered value per respondent, translated and remapped.
    fn extracted_values(
        &self,
        path: &JoinPath,
        remap: Option<&dyn Fn(&str) -> String>,
    ) -> Result<Vec<(i64, String)>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&path.select_sql())?;
        let mut rows = stmt.query([])?;
        let mut values: Vec<(i64, String)> = Vec::new();
        let mut truncated = 0usize;
        while let Some(row) = rows.next()? {
            let respondent: i64 = row.get(0)?;
            if values.last().is_some_and(|(last, _)| *last == respondent) {
                continue;
            }
            let raw = match row.get_ref(1)? {
                ValueRef::Integer(NO_ANSWER) | ValueRef::Null => continue,
                ValueRef::Integer(value) => path
                    .leaf
                    .category_name(value)
                    .or_else(|| self.schema().category_map.name_of(value))
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
                ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
                ValueRef::Real(value) => value.to_string(),
                ValueRef::Blob(_) => continue,
            };
            let mut value = match remap {
                Some(remap) => remap(&raw),
                None => raw,
            };
            if value.chars().count() > TEXT_VARIABLE_MAX as usize {
                value = value.chars().take(TEXT_VARIABLE_MAX as usize).collect();
                truncated += 1;
            }
            values.push((respondent, value));
        }
        if truncated > 0 {
            warn!(truncated, max = TEXT_VARIABLE_MAX, "truncated long values");
        }
        Ok(values)
    }
}
