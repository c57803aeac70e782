//! Shared data structures for the UPH efficiency pipeline
//!
//! This module defines the core types flowing through a run:
//! - Load: RawTable / CellValue (heterogeneous source rows before schema checks)
//! - Normalize: MeasurementRecord / MeasurementTable (validated canonical rows)
//! - Reference: ReferenceEntry (per-product wire/bump counts)
//! - Report: EfficiencyResult plus the model, overall and source rollups

mod raw;
mod record;
mod report;

pub use raw::*;
pub use record::*;
pub use report::*;
