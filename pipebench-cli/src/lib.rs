//! Command-line driver for pipebench
//!
//! Loads the settings file, resolves [`config::Config`], runs the load
//! harness against every target in turn and writes the report.

pub mod bench;
pub mod config;
pub mod report;
pub mod settings;
