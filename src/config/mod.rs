//! Analyzer Configuration Module
//!
//! Provides the run configuration loaded from TOML files: reference-table
//! discovery, HTTP request options for remote sources, model-family labels,
//! and report naming. Outlier thresholds are fixed constants in [`defaults`].
//!
//! ## Loading Order
//!
//! 1. `UPH_ANALYZER_CONFIG` environment variable (path to TOML file)
//! 2. `uph_analyzer.toml` in the current working directory
//! 3. Built-in defaults
//!
//! There is no process-wide config instance. Callers load an
//! [`AnalyzerConfig`] once and hand it to each run through
//! [`crate::pipeline::RunContext`].

mod analyzer_config;
pub mod defaults;
pub mod validation;

pub use analyzer_config::*;
