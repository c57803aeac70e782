//! UPH Analyzer: back-end assembly throughput cleaning and efficiency reporting
//!
//! Takes raw units-per-hour measurements from wire-bonding and die-attach
//! equipment, removes outliers per (product, equipment model) group, joins a
//! wire/reference table to normalize throughput into efficiency, and writes a
//! multi-sheet spreadsheet report.
//!
//! ## Architecture
//!
//! - **Acquisition**: CSV, spreadsheet, local JSON and remote JSON sources
//! - **Schema**: header aliasing and typed record extraction
//! - **Outlier**: iterative Z-score / IQR elimination per group
//! - **Reference**: per-product divisor lookup
//! - **Aggregation**: per-group results plus model and overall rollups
//! - **Export**: xlsx report writer
//! - **Pipeline**: the run entry points that tie the stages together

pub mod acquisition;
pub mod aggregation;
pub mod config;
pub mod error;
pub mod export;
pub mod outlier;
pub mod pipeline;
pub mod reference;
pub mod schema;
pub mod types;

pub use acquisition::Source;
pub use config::AnalyzerConfig;
pub use error::{PipelineError, Result, Stage};
pub use pipeline::{
    filter_by_date, preview_date_range, run_pipeline, run_pipeline_with_summary, DateWindow,
    ProgressObserver, RunContext, TracingProgress,
};
pub use reference::{ReferenceLocator, ReferenceTable};

pub use types::{
    DateRangePreview, EfficiencyReport, EfficiencyResult, MeasurementRecord, ModelSummary,
    OutlierMethod, OverallSummary, RunSummary, SourceSummary,
};
