//! Command implementations. Each returns a serializable result; printing is
//! left to the binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use svy_ddf::{
    CategoryLabel, ConnectionDescriptor, DataFile, ExportOptions, ExtractOptions, ExtractOutcome,
    JoinPath, MergeReport, Predicate, RemapTable, SplitOptions, SplitReport,
};
use svy_model::{Locale, VariableInstance};
use tracing::{info, info_span};

use crate::cli::{
    CategoriesArgs, ConnectionArgs, CountArgs, DataFileArgs, ExportArgs, ExtractArgs,
    JoinPathArgs, MergeArgs, SplitArgs, SplitVarArgs, VariablesArgs,
};

#[derive(Debug, Serialize)]
pub struct CountReport {
    pub schema: PathBuf,
    pub store: PathBuf,
    pub filter: Option<String>,
    pub respondents: u64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum VariableListing {
    Names(Vec<String>),
    Instances(Vec<VariableInstance>),
}

#[derive(Debug, Serialize)]
pub struct CategoryRow {
    pub name: String,
    pub label: String,
    pub value: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct JoinPathReport {
    pub path: JoinPath,
    pub sql: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MergeOutcome {
    Compatible { stores: usize },
    Merged(MergeReport),
}

#[derive(Debug, Serialize)]
pub struct ExportSummary {
    pub output: PathBuf,
    pub columns: usize,
    pub rows: usize,
}

fn open(args: &DataFileArgs) -> Result<DataFile> {
    DataFile::open(&args.schema, args.store.as_deref())
        .with_context(|| format!("open {}", args.schema.display()))
}

pub fn run_count(args: &CountArgs) -> Result<CountReport> {
    let data = open(&args.data)?;
    let filter = args
        .filter
        .as_deref()
        .map(str::parse::<Predicate>)
        .transpose()
        .context("parse filter")?;
    let respondents = data.count(filter.as_ref()).context("count respondents")?;
    Ok(CountReport {
        schema: data.schema_path().to_path_buf(),
        store: data.store_path().to_path_buf(),
        filter: filter.map(|filter| filter.to_string()),
        respondents,
    })
}

pub fn run_variables(args: &VariablesArgs) -> Result<VariableListing> {
    let data = open(&args.data)?;
    if args.all {
        return Ok(VariableListing::Instances(
            data.instances().iter().cloned().collect(),
        ));
    }
    let names = data
        .set_of_variable_names(&args.patterns, args.collapse)
        .context("list variables")?;
    Ok(VariableListing::Names(names.into_iter().collect()))
}

pub fn run_categories(args: &CategoriesArgs) -> Result<Vec<CategoryRow>> {
    let data = open(&args.data)?;
    let base = data.schema().base_locale();
    let locale = Locale::new(
        args.language.as_deref().unwrap_or(&base.language),
        args.context.as_deref().unwrap_or(&base.context),
    );
    let labels = data
        .category_dict(&args.variable, Some(&locale))
        .with_context(|| format!("categories of {}", args.variable))?;
    let values = data.category_values(&args.variable).unwrap_or_default();
    Ok(labels
        .into_iter()
        .map(|CategoryLabel { name, label }| {
            let value = values
                .iter()
                .find(|entry| entry.name.eq_ignore_ascii_case(&name))
                .map(|entry| entry.value)
                .or_else(|| data.schema().category_map.value_of(&name));
            CategoryRow { name, label, value }
        })
        .collect())
}

pub fn run_join_path(args: &JoinPathArgs) -> Result<JoinPathReport> {
    let data = open(&args.data)?;
    let path = data
        .resolve(&args.variable)
        .with_context(|| format!("resolve {}", args.variable))?;
    let sql = path.select_sql();
    Ok(JoinPathReport { path, sql })
}

pub fn run_split(args: &SplitArgs) -> Result<SplitReport> {
    let data = open(&args.data)?;
    let options = SplitOptions {
        into_folders: !args.flat,
    };
    data.split_by_count(args.parts, &args.output_dir, options)
        .with_context(|| format!("split into {} parts", args.parts))
}

pub fn run_split_var(args: &SplitVarArgs) -> Result<SplitReport> {
    let data = open(&args.data)?;
    data.split_by_variable(&args.variable, &args.output_dir)
        .with_context(|| format!("split on {}", args.variable))
}

pub fn run_merge(args: &MergeArgs) -> Result<MergeOutcome> {
    let span = info_span!("merge", inputs = args.schemas.len());
    let _guard = span.enter();

    let stores = args
        .schemas
        .iter()
        .map(|schema| {
            DataFile::open(schema, None).with_context(|| format!("open {}", schema.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let (first, rest) = stores
        .split_first()
        .ok_or_else(|| anyhow!("at least two schemas are required"))?;
    let others: Vec<&DataFile> = rest.iter().collect();

    if args.check {
        first.matches(&others).context("compare stores")?;
        info!(stores = stores.len(), "stores can be merged");
        return Ok(MergeOutcome::Compatible {
            stores: stores.len(),
        });
    }

    let store_path = args
        .output_store
        .clone()
        .unwrap_or_else(|| args.output.with_extension("ddf"));
    if args.schemas.iter().any(|schema| same_file(schema, &args.output))
        || stores.iter().any(|data| same_file(data.store_path(), &store_path))
    {
        bail!("the merge output must not overwrite one of its inputs");
    }
    let report = first
        .merge(&others, &args.output, &store_path)
        .context("merge stores")?;
    Ok(MergeOutcome::Merged(report))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub fn run_export(args: &ExportArgs) -> Result<ExportSummary> {
    let data = open(&args.data)?;
    let options = ExportOptions {
        use_category_names: !args.values,
        columns: (!args.columns.is_empty()).then(|| args.columns.clone()),
    };
    let table = data.export(&options).context("export case data")?;
    table
        .write_csv(&args.output)
        .with_context(|| format!("write {}", args.output.display()))?;
    Ok(ExportSummary {
        output: args.output.clone(),
        columns: table.columns.len(),
        rows: table.rows.len(),
    })
}

pub fn run_extract(args: &ExtractArgs) -> Result<ExtractOutcome> {
    let mut data = open(&args.data)?;
    let options = ExtractOptions {
        create: args.create,
        overwrite: args.overwrite,
        label: args.label.clone(),
    };
    let outcome = match &args.remap {
        Some(path) => {
            let delimiter = u8::try_from(args.delimiter)
                .map_err(|_| anyhow!("delimiter must be a single-byte character"))?;
            let (Some(key), Some(value)) = (&args.key_column, &args.value_column) else {
                bail!("--remap needs --key-column and --value-column");
            };
            let table = RemapTable::from_csv(path, key, value, delimiter)
                .with_context(|| format!("read lookup {}", path.display()))?;
            data.extract_with_table(&args.source, &args.target, &options, &table)
        }
        None => data.extract(&args.source, &args.target, &options, None),
    };
    outcome.with_context(|| format!("extract {} into {}", args.source, args.target))
}

pub fn run_connection(args: &ConnectionArgs) -> Result<ConnectionDescriptor> {
    let data = open(&args.data)?;
    let (names, values) = if args.category_values { (0, 1) } else { (1, 0) };
    data.connection()
        .mode(args.mode)
        .mdsc_access(args.mdsc_access)
        .mdm_access(args.mdm_access)
        .use_category_names(names)
        .use_category_values(values)
        .overwrite(args.overwrite)
        .build()
        .context("build connection")
}
