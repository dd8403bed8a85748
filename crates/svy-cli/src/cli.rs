//! CLI argument definitions for the survey toolkit.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "svy",
    version,
    about = "Survey toolkit - inspect, split, merge and export survey case data",
    long_about = "Work with survey schema documents (.mdd) and their case-data stores (.ddf).\n\n\
                  Counts respondents, lists variable instances and categories, resolves\n\
                  join paths, splits and merges stores, exports flat tables and derives\n\
                  text variables."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Print results as JSON instead of tables.
    #[arg(long = "json", global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Count respondents, optionally filtered on a top-level variable.
    Count(CountArgs),

    /// List variable instances.
    Variables(VariablesArgs),

    /// List the categories of a categorical variable.
    Categories(CategoriesArgs),

    /// Show the level tables and SQL behind a variable.
    JoinPath(JoinPathArgs),

    /// Split a store into shards of consecutive respondents.
    Split(SplitArgs),

    /// Split a store into one shard per answer of a categorical variable.
    SplitVar(SplitVarArgs),

    /// Merge schema-identical stores into a new pair.
    Merge(MergeArgs),

    /// Export case data to CSV.
    Export(ExportArgs),

    /// Derive a top-level text variable from another variable.
    Extract(ExtractArgs),

    /// Print the provider connection string for a pair.
    Connection(ConnectionArgs),
}

/// Schema document and optional store override shared by every command.
#[derive(Args, Clone)]
pub struct DataFileArgs {
    /// Schema document (.mdd).
    #[arg(value_name = "SCHEMA")]
    pub schema: PathBuf,

    /// Case-data store; defaults to the location named in the schema.
    #[arg(long = "store", value_name = "DDF")]
    pub store: Option<PathBuf>,
}

#[derive(Args)]
pub struct CountArgs {
    #[command(flatten)]
    pub data: DataFileArgs,

    /// Filter such as `Age >= 30`, `Q1 = 1` or `Age BETWEEN 18 AND 25`.
    #[arg(long = "filter", value_name = "EXPR")]
    pub filter: Option<String>,
}

#[derive(Args)]
pub struct VariablesArgs {
    #[command(flatten)]
    pub data: DataFileArgs,

    /// Case-insensitive regular expression matched from the start of the name.
    #[arg(long = "pattern", value_name = "REGEX")]
    pub patterns: Vec<String>,

    /// Collapse indices to the generic `[..]` form.
    #[arg(long = "collapse")]
    pub collapse: bool,

    /// Include system and non-exported instances with their details.
    #[arg(long = "all", conflicts_with_all = ["patterns", "collapse"])]
    pub all: bool,
}

#[derive(Args)]
pub struct CategoriesArgs {
    #[command(flatten)]
    pub data: DataFileArgs,

    /// Variable name, concrete or generic.
    #[arg(value_name = "VARIABLE")]
    pub variable: String,

    /// Label language (defaults to the schema's base language).
    #[arg(long = "language", value_name = "LANG")]
    pub language: Option<String>,

    /// Label context (defaults to the schema's base context).
    #[arg(long = "context", value_name = "CONTEXT")]
    pub context: Option<String>,
}

#[derive(Args)]
pub struct JoinPathArgs {
    #[command(flatten)]
    pub data: DataFileArgs,

    #[arg(value_name = "VARIABLE")]
    pub variable: String,
}

#[derive(Args)]
pub struct SplitArgs {
    #[command(flatten)]
    pub data: DataFileArgs,

    /// Number of shards.
    #[arg(long = "parts", short = 'n', value_name = "N")]
    pub parts: usize,

    /// Directory receiving the shards.
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Write every shard directly into the output directory.
    #[arg(long = "flat")]
    pub flat: bool,
}

#[derive(Args)]
pub struct SplitVarArgs {
    #[command(flatten)]
    pub data: DataFileArgs,

    /// Categorical variable to split on.
    #[arg(value_name = "VARIABLE")]
    pub variable: String,

    /// Directory receiving the shards.
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: PathBuf,
}

#[derive(Args)]
pub struct MergeArgs {
    /// Schema documents to merge; the first one's keys are kept as they are.
    #[arg(value_name = "SCHEMA", num_args = 2.., required = true)]
    pub schemas: Vec<PathBuf>,

    /// Output schema document.
    #[arg(long = "output", short = 'o', value_name = "MDD")]
    pub output: PathBuf,

    /// Output store (default: the output schema with a .ddf extension).
    #[arg(long = "output-store", value_name = "DDF")]
    pub output_store: Option<PathBuf>,

    /// Only check that the stores can be merged.
    #[arg(long = "check")]
    pub check: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub data: DataFileArgs,

    /// Output CSV file.
    #[arg(long = "output", short = 'o', value_name = "CSV")]
    pub output: PathBuf,

    /// Variables to export (comma-separated); every exportable one by default.
    #[arg(long = "columns", value_name = "NAMES", value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Write category values instead of category names.
    #[arg(long = "values")]
    pub values: bool,
}

#[derive(Args)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub data: DataFileArgs,

    /// Categorical or text variable to read.
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Top-level text variable to write.
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Add the target variable when it does not exist.
    #[arg(long = "create")]
    pub create: bool,

    /// Replace the values of an existing target variable.
    #[arg(long = "overwrite")]
    pub overwrite: bool,

    /// Label of a created target variable.
    #[arg(long = "label", value_name = "TEXT")]
    pub label: Option<String>,

    /// Lookup file translating source values.
    #[arg(long = "remap", value_name = "CSV", requires_all = ["key_column", "value_column"])]
    pub remap: Option<PathBuf>,

    /// Lookup column holding source values.
    #[arg(long = "key-column", value_name = "NAME")]
    pub key_column: Option<String>,

    /// Lookup column holding target values.
    #[arg(long = "value-column", value_name = "NAME")]
    pub value_column: Option<String>,

    /// Lookup file delimiter.
    #[arg(long = "delimiter", value_name = "CHAR", default_value_t = ',')]
    pub delimiter: char,
}

#[derive(Args)]
pub struct ConnectionArgs {
    #[command(flatten)]
    pub data: DataFileArgs,

    /// Open mode: 1 read, 2 write, 3 read/write.
    #[arg(long = "mode", default_value_t = 3)]
    pub mode: i64,

    /// Schema access through the data source: 0 read, 1 read/write, 2 read/write unsaved.
    #[arg(long = "mdsc-access", default_value_t = 2)]
    pub mdsc_access: i64,

    /// Schema access through the document: 0 read, 1 read/write, 2 read/write unsaved.
    #[arg(long = "mdm-access", default_value_t = 0)]
    pub mdm_access: i64,

    /// Represent categories by value instead of by name.
    #[arg(long = "category-values")]
    pub category_values: bool,

    /// Overwrite behaviour: 0 append, 1 replace everything, 2 replace data.
    #[arg(long = "overwrite", default_value_t = 0)]
    pub overwrite: i64,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
