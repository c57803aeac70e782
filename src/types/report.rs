//! Report rows: per-group efficiency results and their rollups.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// How outlier elimination ended for a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierMethod {
    /// Fewer than the minimum group size; kept in full
    Exempt,
    /// Converged after the Z-score pass of round `rounds`
    ZScore { rounds: usize },
    /// Converged after the IQR pass of round `rounds`
    Iqr { rounds: usize },
    /// Hit the round limit; last filtered set kept
    IterationLimit { rounds: usize },
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exempt => write!(f, "Not filtered (small group)"),
            Self::ZScore { rounds } => write!(f, "Z-Score Loop x{rounds}"),
            Self::Iqr { rounds } => write!(f, "IQR Loop x{rounds}"),
            Self::IterationLimit { rounds } => write!(f, "IQR-Z-Score Loop x{rounds}+"),
        }
    }
}

/// One output row per (product, equipment model) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyResult {
    pub product_id: String,
    pub equipment_model: String,
    pub operation_code: Option<String>,
    pub option_code: Option<String>,
    /// Mean UPH of the retained records (2 dp)
    pub mean_throughput: f64,
    /// Wires per unit (2 dp)
    pub per_unit_divisor: f64,
    /// mean / divisor (3 dp)
    pub efficiency: f64,
    pub data_point_count: usize,
    pub original_count: usize,
    pub outliers_removed_count: usize,
    pub outlier_method: OutlierMethod,
    /// Whether the divisor came from a reference entry
    pub reference_found: bool,
}

/// Efficiency rollup for one equipment model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub equipment_model: String,
    pub efficiency_mean: f64,
    /// Sample standard deviation; undefined for a single group
    pub efficiency_std: Option<f64>,
    pub group_count: usize,
    pub efficiency_min: f64,
    pub efficiency_max: f64,
    pub mean_throughput: f64,
    pub mean_divisor: f64,
}

/// Whole-report rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    pub average_efficiency: f64,
    pub average_throughput: f64,
    pub total_groups: usize,
    pub total_data_points: usize,
    pub total_original_points: usize,
    pub total_outliers_removed: usize,
    /// `(1 - removed / original) * 100`
    pub data_quality_percent: f64,
}

/// Rows contributed by one input source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: String,
    pub rows_loaded: usize,
}

/// Everything the exporter writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyReport {
    pub results: Vec<EfficiencyResult>,
    pub model_summaries: Vec<ModelSummary>,
    pub overall: OverallSummary,
    pub sources: Vec<SourceSummary>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub report_path: PathBuf,
    pub total_groups: usize,
    pub total_data_points: usize,
    pub total_outliers_removed: usize,
    pub average_efficiency: f64,
    pub data_quality_percent: f64,
    pub sources: Vec<SourceSummary>,
}

/// Date coverage of a source, for choosing filter bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangePreview {
    pub date_column: String,
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    /// Inclusive day span
    pub total_days: i64,
    pub valid_records: usize,
    pub invalid_records: usize,
    /// Record counts keyed by `YYYY-MM`
    pub monthly_distribution: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlier_method_labels() {
        assert_eq!(OutlierMethod::Exempt.to_string(), "Not filtered (small group)");
        assert_eq!(OutlierMethod::ZScore { rounds: 1 }.to_string(), "Z-Score Loop x1");
        assert_eq!(OutlierMethod::Iqr { rounds: 3 }.to_string(), "IQR Loop x3");
        assert_eq!(
            OutlierMethod::IterationLimit { rounds: 20 }.to_string(),
            "IQR-Z-Score Loop x20+"
        );
    }
}
