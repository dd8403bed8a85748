//! `svy`: survey schema and case-data toolkit.

use std::io::{self, IsTerminal};

use anyhow::Result;
use clap::{ColorChoice, Parser};
use serde::Serialize;
use svy_cli::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use svy_cli::commands::{
    run_categories, run_connection, run_count, run_export, run_extract, run_join_path, run_merge,
    run_split, run_split_var, run_variables,
};
use svy_cli::logging::{LogConfig, LogFormat, init_logging};
use svy_ddf::ExtractOutcome;
use tracing::level_filters::LevelFilter;

mod summary;

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<i32> {
    let json = cli.json;
    match &cli.command {
        Command::Count(args) => emit(json, &run_count(args)?, summary::print_count),
        Command::Variables(args) => emit(json, &run_variables(args)?, summary::print_variables),
        Command::Categories(args) => {
            let rows = run_categories(args)?;
            emit(json, &rows, |rows: &Vec<_>| summary::print_categories(rows))
        }
        Command::JoinPath(args) => emit(json, &run_join_path(args)?, summary::print_join_path),
        Command::Split(args) => emit(json, &run_split(args)?, summary::print_split),
        Command::SplitVar(args) => {
            let report = run_split_var(args)?;
            emit(json, &report, summary::print_split)?;
            Ok(if report.shards.is_empty() { 1 } else { 0 })
        }
        Command::Merge(args) => emit(json, &run_merge(args)?, summary::print_merge),
        Command::Export(args) => emit(json, &run_export(args)?, summary::print_export),
        Command::Extract(args) => {
            let outcome = run_extract(args)?;
            emit(json, &outcome, summary::print_extract)?;
            Ok(match outcome {
                ExtractOutcome::Written { .. } => 0,
                ExtractOutcome::Skipped { .. } => 1,
            })
        }
        Command::Connection(args) => {
            emit(json, &run_connection(args)?, summary::print_connection)
        }
    }
}

/// Print a result as JSON or through its table printer.
fn emit<T: Serialize>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<i32> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(0)
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
