//! Partitioning a store into shards.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use svy_mdd::copy_with_datasource;
use tracing::{error, info, info_span, warn};

use crate::codec::{NO_ANSWER, decode_multi};
use crate::copy::{PendingOutput, Selection, copy_store, remove_existing, respondent_ids};
use crate::error::{Result, StoreError};
use crate::join::JoinPath;
use crate::layout::ColumnTag;
use crate::store::DataFile;

/// Where split-by-count shards are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOptions {
    /// Write shard `i` into its own `part-<i>` folder.
    pub into_folders: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self { into_folders: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Shard number (`1..=n`) or category name.
    pub part: String,
    pub schema_path: PathBuf,
    pub store_path: PathBuf,
    pub respondents: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitReport {
    pub shards: Vec<Shard>,
}

impl SplitReport {
    pub fn total_respondents(&self) -> usize {
        self.shards.iter().map(|shard| shard.respondents).sum()
    }
}

/// Contiguous slices of `total` ids for `n` shards.
///
/// Every shard but the last takes `round(total / n)` ids (ties to even); the
/// last shard takes whatever remains, which may be more, fewer or none.
pub fn shard_bounds(total: usize, n: usize) -> Vec<(usize, usize)> {
    if n == 0 {
        return Vec::new();
    }
    let group_size = (total as f64 / n as f64).round_ties_even() as usize;
    (0..n)
        .map(|i| {
            let start = (i * group_size).min(total);
            let end = if i + 1 == n {
                total
            } else {
                ((i + 1) * group_size).min(total)
            };
            (start, end)
        })
        .collect()
}

/// Make a category label usable in a file name.
fn file_part(text: &str) -> String {
    text.chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| StoreError::io("create directory", path, e))
}

impl DataFile {
    /// Split into `n` shards of consecutive respondents.
    pub fn split_by_count(&self, n: usize, output_dir: &Path, options: SplitOptions) -> Result<SplitReport> {
        if n == 0 {
            return Err(StoreError::InvalidArgument(
                "the number of shards must be at least 1".to_string(),
            ));
        }
        let span = info_span!("split_by_count", store = %self.store_path().display(), n);
        let _guard = span.enter();

        let ids = respondent_ids(&self.connect()?)?;
        info!(total = ids.len(), "splitting store");
        create_dir(output_dir)?;
        let base = stem(self.store_path());

        let mut report = SplitReport::default();
        for (index, (start, end)) in shard_bounds(ids.len(), n).into_iter().enumerate() {
            let part = index + 1;
            let folder = if options.into_folders {
                output_dir.join(format!("part-{part}"))
            } else {
                output_dir.to_path_buf()
            };
            create_dir(&folder)?;
            let name = format!("{base}_part-{part}");
            let slice = &ids[start..end];
            let selection = match (slice.first(), slice.last()) {
                (Some(&low), Some(&high)) => Selection::Range { low, high },
                _ => Selection::Ids(Vec::new()),
            };
            report
                .shards
                .push(self.write_shard(&folder, &name, part.to_string(), &selection)?);
        }
        info!(shards = report.shards.len(), "split complete");
        Ok(report)
    }

    /// Split into one shard per answer value of a categorical variable.
    ///
    /// Unknown or non-categorical variables are logged and produce no shards.
    /// Respondents of a multi-response variable land in one shard per answer.
    pub fn split_by_variable(&self, name: &str, output_dir: &Path) -> Result<SplitReport> {
        let span = info_span!("split_by_variable", store = %self.store_path().display(), variable = name);
        let _guard = span.enter();

        let path = match self.resolve(name) {
            Ok(path) => path,
            Err(err @ (StoreError::UnknownVariable { .. } | StoreError::UnsupportedOperation { .. })) => {
                error!(error = %err, "cannot split on variable; no data written");
                return Ok(SplitReport::default());
            }
            Err(err) => return Err(err),
        };
        if !matches!(path.leaf.tag, ColumnTag::C1 | ColumnTag::S) {
            error!(column = %path.leaf.column, "split variable is not categorical; no data written");
            return Ok(SplitReport::default());
        }
        if path.leaf.is_multi_response() {
            warn!("multi-response split variable; respondents may appear in more than one shard");
        }

        let groups = self.respondents_by_value(&path)?;
        info!(values = groups.len(), "collected split values");
        create_dir(output_dir)?;
        let base = stem(self.store_path());
        let labels = self.category_dict(&path.generic_name, None).unwrap_or_default();

        let mut report = SplitReport::default();
        for (value, ids) in groups {
            let category = path
                .leaf
                .category_name(value)
                .map(str::to_string)
                .or_else(|| self.schema().category_map.name_of(value).map(str::to_string))
                .unwrap_or_else(|| value.to_string());
            let label = labels
                .iter()
                .find(|entry| entry.name.eq_ignore_ascii_case(&category))
                .map(|entry| entry.label.as_str())
                .unwrap_or(category.as_str());
            let file_name = format!("{base}_{}__{}", file_part(&category), file_part(label));
            report.shards.push(self.write_shard(
                output_dir,
                &file_name,
                category.clone(),
                &Selection::Ids(ids),
            )?);
        }
        info!(shards = report.shards.len(), "split complete");
        Ok(report)
    }

    /// Respondent keys per answer value, no-answer excluded.
    pub(crate) fn respondents_by_value(&self, path: &JoinPath) -> Result<BTreeMap<i64, Vec<i64>>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&path.select_sql())?;
        let mut rows = stmt.query([])?;
        let mut groups: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let respondent: i64 = row.get(0)?;
            let values = match row.get_ref(1)? {
                ValueRef::Integer(value) => vec![value],
                ValueRef::Text(text) => decode_multi(&String::from_utf8_lossy(text)),
                ValueRef::Real(value) => vec![value as i64],
                ValueRef::Null | ValueRef::Blob(_) => Vec::new(),
            };
            for value in values.into_iter().filter(|&value| value != NO_ANSWER) {
                let ids = groups.entry(value).or_default();
                if ids.last() != Some(&respondent) {
                    ids.push(respondent);
                }
            }
        }
        Ok(groups)
    }

    fn write_shard(&self, folder: &Path, name: &str, part: String, selection: &Selection) -> Result<Shard> {
        let store_path = folder.join(format!("{name}.ddf"));
        let schema_path = folder.join(format!("{name}.mdd"));
        remove_existing(&store_path)?;
        remove_existing(&schema_path)?;

        let mut pending = PendingOutput::new([&store_path]);
        pending.add(&schema_path);
        let respondents = copy_store(self.store_path(), &store_path, selection)?;
        copy_with_datasource(self.schema_path(), &schema_path, &store_path)?;
        pending.commit();

        info!(shard = %store_path.display(), respondents, "wrote shard");
        Ok(Shard {
            part,
            schema_path,
            store_path,
            respondents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(total: usize, n: usize) -> Vec<usize> {
        shard_bounds(total, n).iter().map(|(s, e)| e - s).collect()
    }

    #[test]
    fn last_shard_absorbs_the_remainder() {
        assert_eq!(sizes(100, 4), [25, 25, 25, 25]);
        assert_eq!(sizes(101, 4), [25, 25, 25, 26]);
        assert_eq!(sizes(10, 4), [2, 2, 2, 4]);
        assert_eq!(sizes(9, 6), [2, 2, 2, 2, 1, 0]);
        assert_eq!(sizes(0, 3), [0, 0, 0]);
        assert!(sizes(5, 0).is_empty());
    }

    #[test]
    fn file_part_replaces_separators() {
        assert_eq!(file_part("Brand A/B"), "Brand_A_B");
    }
}
