//! A bound schema/store pair.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde::{Deserialize, Serialize};
use svy_mdd::read_schema;
use svy_model::naming::compile_patterns;
use svy_model::{Locale, Schema, VariableInstances, generic_name};
use tracing::{debug, info, warn};

use crate::cache::{FileIdentity, SessionCache};
use crate::connection::ConnectionBuilder;
use crate::error::{Result, StoreError};
use crate::join::{CategoryValue, JoinPath, resolve};
use crate::layout::{LEVELS_TABLE, LevelRow, ROOT_TABLE, StoreLayout, key_column, quote};
use crate::predicate::Predicate;

/// A category name with its resolved label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub name: String,
    pub label: String,
}

/// A schema document and the case-data store it describes.
#[derive(Debug)]
pub struct DataFile {
    schema_path: PathBuf,
    store_path: PathBuf,
    schema: Schema,
    cache: SessionCache,
}

impl DataFile {
    /// Open a pair. Without `store_path` the store location comes from the
    /// schema's data source, relative to the schema's directory.
    pub fn open(schema_path: impl AsRef<Path>, store_path: Option<&Path>) -> Result<Self> {
        let schema_path = schema_path.as_ref().to_path_buf();
        let schema = read_schema(&schema_path)?;
        let store_path = match store_path {
            Some(path) => path.to_path_buf(),
            None => declared_store_path(&schema_path, &schema)?,
        };
        let mut data = Self {
            schema_path,
            store_path,
            schema,
            cache: SessionCache::default(),
        };
        data.bind()?;
        Ok(data)
    }

    /// Point at another pair, dropping cached state if the files changed.
    pub fn rebind(&mut self, schema_path: impl AsRef<Path>, store_path: Option<&Path>) -> Result<()> {
        let schema_path = schema_path.as_ref().to_path_buf();
        let schema = read_schema(&schema_path)?;
        self.store_path = match store_path {
            Some(path) => path.to_path_buf(),
            None => declared_store_path(&schema_path, &schema)?,
        };
        self.schema_path = schema_path;
        self.schema = schema;
        self.bind()
    }

    /// Re-read the schema document after it was edited on disk.
    pub(crate) fn reload_schema(&mut self) -> Result<()> {
        self.schema = read_schema(&self.schema_path)?;
        self.bind()
    }

    fn bind(&mut self) -> Result<()> {
        if !self.store_path.exists() {
            return Err(StoreError::MissingStore {
                path: self.store_path.clone(),
            });
        }
        let identity = FileIdentity::of(&self.schema_path, &self.store_path)?;
        if self.cache.bind(identity) {
            info!(
                schema = %self.schema_path.display(),
                store = %self.store_path.display(),
                "opened schema and store"
            );
            self.verify_levels()?;
        }
        Ok(())
    }

    fn verify_levels(&self) -> Result<()> {
        let stored = self.levels()?;
        let expected = self.layout().level_rows();
        if stored != expected {
            warn!(
                store = %self.store_path.display(),
                stored = stored.len(),
                expected = expected.len(),
                "store levels differ from the schema layout"
            );
        }
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn instances(&self) -> &VariableInstances {
        self.cache.instances(&self.schema)
    }

    pub fn layout(&self) -> &StoreLayout {
        self.cache.layout(&self.schema)
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.store_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    /// Connection descriptor for this pair with default settings.
    pub fn connection(&self) -> ConnectionBuilder {
        ConnectionBuilder::new(&self.store_path, &self.schema_path)
    }

    /// Number of respondents, optionally filtered on a root-level variable.
    pub fn count(&self, filter: Option<&Predicate>) -> Result<u64> {
        let conn = self.connect()?;
        let mut sql = format!(
            "SELECT COUNT({}) FROM {}",
            quote(&key_column(0)),
            quote(ROOT_TABLE)
        );
        let mut params = Vec::new();
        if let Some(filter) = filter {
            let (condition, values) = filter.to_sql(self.layout())?;
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
            params = values;
        }
        let count: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        debug!(count, filter = ?filter.map(ToString::to_string), "counted respondents");
        Ok(count.max(0) as u64)
    }

    /// Rows of the store's `Levels` table.
    pub fn levels(&self) -> Result<Vec<LevelRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT \"TableName\", \"ParentName\", \"DSCTableName\" FROM {} ORDER BY rowid",
            quote(LEVELS_TABLE)
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LevelRow {
                    table_name: row.get(0)?,
                    parent_name: row.get(1)?,
                    dsc_table_name: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Join path of a variable, cached for the lifetime of the binding.
    pub fn resolve(&self, name: &str) -> Result<JoinPath> {
        self.cache.join_path(name, || {
            resolve(&self.schema, self.instances(), self.layout(), name)
        })
    }

    /// Category names and labels of a categorical variable, in declared order.
    pub fn category_dict(&self, name: &str, locale: Option<&Locale>) -> Result<Vec<CategoryLabel>> {
        let variable = self
            .schema
            .variable(name)
            .ok_or_else(|| StoreError::UnknownVariable {
                name: name.to_string(),
            })?;
        let base = self.schema.base_locale();
        let requested = locale.unwrap_or(&base);
        Ok(self
            .schema
            .categories(&variable.categories)
            .into_iter()
            .map(|category| CategoryLabel {
                name: category.name.clone(),
                label: category
                    .labels
                    .resolve(requested, &base, &category.name)
                    .to_string(),
            })
            .collect())
    }

    /// Category values of a categorical variable and their names.
    pub fn category_values(&self, name: &str) -> Result<Vec<CategoryValue>> {
        Ok(self.resolve(name)?.leaf.categories)
    }

    /// Exportable variable names matching any pattern (all when none are given),
    /// case-insensitively and anchored at the start of the name. With
    /// `collapse`, names are reduced to their generic form.
    pub fn set_of_variable_names<S: AsRef<str>>(
        &self,
        patterns: &[S],
        collapse: bool,
    ) -> Result<BTreeSet<String>> {
        let compiled = compile_patterns(patterns)
            .map_err(|e| StoreError::InvalidArgument(format!("invalid name pattern: {e}")))?;
        let names = self
            .instances()
            .exportable()
            .map(|instance| instance.name.as_str())
            .filter(|name| {
                compiled.is_empty()
                    || compiled
                        .iter()
                        .any(|pattern| pattern.find(name).is_some_and(|m| m.start() == 0))
            })
            .map(|name| {
                if collapse {
                    generic_name(name)
                } else {
                    name.to_string()
                }
            })
            .collect();
        Ok(names)
    }

    /// Repack the store file.
    pub fn compact(&self) -> Result<()> {
        info!(store = %self.store_path.display(), "compacting store");
        self.connect()?.execute_batch("VACUUM")?;
        Ok(())
    }
}

fn declared_store_path(schema_path: &Path, schema: &Schema) -> Result<PathBuf> {
    let location = schema
        .datasources
        .current()
        .map(|source| source.location.trim())
        .filter(|location| !location.is_empty())
        .ok_or_else(|| StoreError::MissingLocation {
            path: schema_path.to_path_buf(),
        })?;
    let location = Path::new(location);
    if location.is_absolute() {
        return Ok(location.to_path_buf());
    }
    let directory = schema_path.parent().unwrap_or_else(|| Path::new(""));
    Ok(directory.join(location))
}
