//! CLI library components for the survey toolkit.

pub mod cli;
pub mod commands;
pub mod logging;
