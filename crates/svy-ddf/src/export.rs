//! Denormalized export: one row per respondent, one column per variable.

use std::collections::HashMap;
use std::path::Path;

use polars::prelude::{Column, DataFrame, IntoColumn, NamedFrom, Series};
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use svy_model::naming::generic_name;
use tracing::{debug, info, info_span, warn};

use crate::codec::{NO_ANSWER, decode_multi, escape_text, format_date};
use crate::copy::respondent_ids;
use crate::error::{Result, StoreError};
use crate::join::JoinPath;
use crate::layout::ColumnTag;
use crate::store::DataFile;

/// Name of the respondent key column in exports.
pub const RESPONDENT_COLUMN: &str = "Respondent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Translate category values to category names.
    pub use_category_names: bool,
    /// Variables to export, concrete or generic; every exportable one when `None`.
    pub columns: Option<Vec<String>>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            use_category_names: true,
            columns: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub respondent: i64,
    pub values: Vec<Option<String>>,
}

/// Exported case data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTable {
    pub columns: Vec<String>,
    pub rows: Vec<ExportRow>,
}

impl ExportTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    /// Value of `column` for `respondent`.
    pub fn value(&self, respondent: i64, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows
            .iter()
            .find(|row| row.respondent == respondent)
            .and_then(|row| row.values[index].as_deref())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().from_path(path)?;
        let mut header = vec![RESPONDENT_COLUMN.to_string()];
        header.extend(self.columns.iter().cloned());
        writer.write_record(&header)?;
        for row in &self.rows {
            let mut record = vec![row.respondent.to_string()];
            record.extend(row.values.iter().map(|value| value.clone().unwrap_or_default()));
            writer.write_record(&record)?;
        }
        writer
            .flush()
            .map_err(|e| StoreError::io("write", path, e))?;
        info!(path = %path.display(), rows = self.rows.len(), "wrote CSV export");
        Ok(())
    }

    pub fn to_data_frame(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.columns.len() + 1);
        columns.push(
            Series::new(
                RESPONDENT_COLUMN.into(),
                self.rows.iter().map(|row| row.respondent).collect::<Vec<_>>(),
            )
            .into_column(),
        );
        for (index, name) in self.columns.iter().enumerate() {
            let values: Vec<Option<String>> =
                self.rows.iter().map(|row| row.values[index].clone()).collect();
            columns.push(Series::new(name.as_str().into(), values).into_column());
        }
        Ok(DataFrame::new(columns)?)
    }
}

impl DataFile {
    /// Export case data for the requested variables.
    ///
    /// Generic names expand to every instance; unknown names are skipped
    /// with a warning.
    pub fn export(&self, options: &ExportOptions) -> Result<ExportTable> {
        let span = info_span!("export", store = %self.store_path().display());
        let _guard = span.enter();

        let mut paths = Vec::new();
        for name in self.export_names(options) {
            match self.resolve(&name) {
                Ok(path) => paths.push(path),
                Err(err @ (StoreError::UnknownVariable { .. } | StoreError::UnsupportedOperation { .. })) => {
                    warn!(variable = %name, error = %err, "skipping export column");
                }
                Err(err) => return Err(err),
            }
        }

        let conn = self.connect()?;
        let ids = respondent_ids(&conn)?;
        let positions: HashMap<i64, usize> =
            ids.iter().enumerate().map(|(index, id)| (*id, index)).collect();
        let mut rows: Vec<ExportRow> = ids
            .iter()
            .map(|&respondent| ExportRow {
                respondent,
                values: vec![None; paths.len()],
            })
            .collect();

        for (column, path) in paths.iter().enumerate() {
            let mut stmt = conn.prepare_cached(&path.select_sql())?;
            let mut result = stmt.query([])?;
            while let Some(row) = result.next()? {
                let respondent: i64 = row.get(0)?;
                let Some(&position) = positions.get(&respondent) else {
                    continue;
                };
                rows[position].values[column] = self.render(path, row.get_ref(1)?, options.use_category_names);
            }
            debug!(column = %path.name, "exported column");
        }

        info!(columns = paths.len(), respondents = rows.len(), "export complete");
        Ok(ExportTable {
            columns: paths.into_iter().map(|path| path.name).collect(),
            rows,
        })
    }

    fn export_names(&self, options: &ExportOptions) -> Vec<String> {
        let instances = self.instances();
        match &options.columns {
            None => instances
                .exportable()
                .map(|instance| instance.name.clone())
                .collect(),
            Some(requested) => {
                let mut names = Vec::new();
                for name in requested {
                    if instances.contains(name) {
                        names.push(name.clone());
                        continue;
                    }
                    let expanded: Vec<String> = instances
                        .by_generic(&generic_name(name))
                        .map(|instance| instance.name.clone())
                        .collect();
                    if expanded.is_empty() {
                        names.push(name.clone());
                    } else {
                        names.extend(expanded);
                    }
                }
                names
            }
        }
    }

    fn render(&self, path: &JoinPath, value: ValueRef<'_>, use_names: bool) -> Option<String> {
        let leaf = &path.leaf;
        let category = |value: i64| {
            leaf.category_name(value)
                .map(str::to_string)
                .or_else(|| self.schema().category_map.name_of(value).map(str::to_string))
                .unwrap_or_else(|| value.to_string())
        };
        match (leaf.tag, value) {
            (_, ValueRef::Null) => None,
            (ColumnTag::C1, ValueRef::Integer(NO_ANSWER)) if use_names => None,
            (ColumnTag::C1, ValueRef::Integer(raw)) if use_names => Some(category(raw)),
            (ColumnTag::S, ValueRef::Text(raw)) => {
                let raw = String::from_utf8_lossy(raw);
                let values = decode_multi(&raw);
                if values.is_empty() {
                    None
                } else if use_names {
                    Some(values.into_iter().map(category).collect::<Vec<_>>().join(";"))
                } else {
                    Some(raw.into_owned())
                }
            }
            (ColumnTag::T, ValueRef::Real(days)) => format_date(days),
            (ColumnTag::T, ValueRef::Integer(days)) => format_date(days as f64),
            (_, ValueRef::Text(text)) => Some(escape_text(&String::from_utf8_lossy(text))),
            (_, ValueRef::Integer(raw)) => Some(raw.to_string()),
            (_, ValueRef::Real(raw)) => Some(raw.to_string()),
            (_, ValueRef::Blob(_)) => None,
        }
    }
}
