//! Aggregator
//!
//! Partitions measurements by (product, equipment model), runs outlier
//! elimination per group, joins the reference divisor and builds the report
//! rows plus the per-model, overall and per-source rollups.
//!
//! Groups are held in a `BTreeMap`, so output order is the sorted group key
//! and identical input always yields identical output.

use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::defaults::{DIVISOR_DECIMALS, EFFICIENCY_DECIMALS, THROUGHPUT_DECIMALS};
use crate::error::{PipelineError, Result, Stage};
use crate::outlier::{eliminate_outliers, OutlierOutcome};
use crate::reference::ReferenceTable;
use crate::types::{
    EfficiencyReport, EfficiencyResult, MeasurementRecord, ModelSummary, OverallSummary,
    SourceSummary,
};

/// (product id, equipment model)
pub type GroupKey = (String, String);

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ============================================================================
// Grouping & Cleaning
// ============================================================================

/// Partition records by group key, keeping input order within each group.
pub fn group_records(records: &[MeasurementRecord]) -> BTreeMap<GroupKey, Vec<&MeasurementRecord>> {
    let mut groups: BTreeMap<GroupKey, Vec<&MeasurementRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.product_id.clone(), record.equipment_model.clone()))
            .or_default()
            .push(record);
    }
    groups
}

/// One group after outlier elimination.
#[derive(Debug, Clone)]
pub struct CleanedGroup<'a> {
    pub key: GroupKey,
    /// Records that survived elimination, in input order
    pub records: Vec<&'a MeasurementRecord>,
    pub outcome: OutlierOutcome,
}

/// Group the records and run outlier elimination on each group.
pub fn clean_groups(records: &[MeasurementRecord]) -> Vec<CleanedGroup<'_>> {
    group_records(records)
        .into_iter()
        .map(|(key, members)| {
            let values: Vec<f64> = members.iter().map(|r| r.uph).collect();
            let outcome = eliminate_outliers(&values);
            debug!(
                product = %key.0,
                model = %key.1,
                original = outcome.original_count,
                removed = outcome.removed_count,
                method = %outcome.method,
                "Group cleaned"
            );
            let kept = outcome.retained.iter().map(|&i| members[i]).collect();
            CleanedGroup {
                key,
                records: kept,
                outcome,
            }
        })
        .collect()
}

// ============================================================================
// Per-Group Result
// ============================================================================

/// Build the efficiency row for a cleaned group. `None` if nothing survived.
pub fn build_result(group: &CleanedGroup<'_>, reference: &ReferenceTable) -> Option<EfficiencyResult> {
    let first = group.records.first()?;
    let mean = group.records.iter().map(|r| r.uph).mean();

    let (product_id, equipment_model) = &group.key;
    let found = reference.divisor_for(product_id);
    if found.is_none() && !reference.is_empty() {
        warn!(product = %product_id, "No reference entry, using default divisor");
    }
    let divisor = reference.divisor_or_default(product_id);

    Some(EfficiencyResult {
        product_id: product_id.clone(),
        equipment_model: equipment_model.clone(),
        operation_code: first.operation.clone(),
        option_code: first.option_code.clone(),
        mean_throughput: round_to(mean, THROUGHPUT_DECIMALS),
        per_unit_divisor: round_to(divisor, DIVISOR_DECIMALS),
        efficiency: round_to(mean / divisor, EFFICIENCY_DECIMALS),
        data_point_count: group.outcome.final_count(),
        original_count: group.outcome.original_count,
        outliers_removed_count: group.outcome.removed_count,
        outlier_method: group.outcome.method,
        reference_found: found.is_some(),
    })
}

// ============================================================================
// Rollups
// ============================================================================

/// Per-model rollup of efficiency, rounded to 3 places.
pub fn summarize_models(results: &[EfficiencyResult]) -> Vec<ModelSummary> {
    let mut by_model: BTreeMap<&str, Vec<&EfficiencyResult>> = BTreeMap::new();
    for r in results {
        by_model.entry(r.equipment_model.as_str()).or_default().push(r);
    }

    by_model
        .into_iter()
        .map(|(model, rows)| {
            let eff: Vec<f64> = rows.iter().map(|r| r.efficiency).collect();
            let std = (eff.len() > 1).then(|| round_to(eff.iter().std_dev(), 3));
            ModelSummary {
                equipment_model: model.to_string(),
                efficiency_mean: round_to(eff.iter().mean(), 3),
                efficiency_std: std,
                group_count: rows.len(),
                efficiency_min: round_to(eff.iter().copied().fold(f64::INFINITY, f64::min), 3),
                efficiency_max: round_to(eff.iter().copied().fold(f64::NEG_INFINITY, f64::max), 3),
                mean_throughput: round_to(rows.iter().map(|r| r.mean_throughput).mean(), 3),
                mean_divisor: round_to(rows.iter().map(|r| r.per_unit_divisor).mean(), 3),
            }
        })
        .collect()
}

/// Whole-report rollup. Averages are zero for an empty result set.
pub fn summarize_overall(results: &[EfficiencyResult]) -> OverallSummary {
    let total_original_points: usize = results.iter().map(|r| r.original_count).sum();
    let total_outliers_removed: usize = results.iter().map(|r| r.outliers_removed_count).sum();
    let data_quality_percent = if total_original_points > 0 {
        round_to(
            (1.0 - total_outliers_removed as f64 / total_original_points as f64) * 100.0,
            2,
        )
    } else {
        0.0
    };
    let (average_efficiency, average_throughput) = if results.is_empty() {
        (0.0, 0.0)
    } else {
        (
            round_to(results.iter().map(|r| r.efficiency).mean(), 3),
            round_to(results.iter().map(|r| r.mean_throughput).mean(), 2),
        )
    };

    OverallSummary {
        average_efficiency,
        average_throughput,
        total_groups: results.len(),
        total_data_points: results.iter().map(|r| r.data_point_count).sum(),
        total_original_points,
        total_outliers_removed,
        data_quality_percent,
    }
}

// ============================================================================
// Report (entry point)
// ============================================================================

/// Clean, join and aggregate validated records into a report.
pub fn build_report(
    records: &[MeasurementRecord],
    reference: &ReferenceTable,
    sources: Vec<SourceSummary>,
) -> Result<EfficiencyReport> {
    let groups = clean_groups(records);
    if groups.iter().all(|g| g.records.is_empty()) {
        return Err(PipelineError::EmptyResult {
            stage: Stage::OutlierElimination,
        });
    }

    let results: Vec<EfficiencyResult> = groups
        .iter()
        .filter_map(|g| build_result(g, reference))
        .collect();
    if results.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: Stage::Aggregation,
        });
    }

    let model_summaries = summarize_models(&results);
    let overall = summarize_overall(&results);
    info!(
        groups = overall.total_groups,
        data_points = overall.total_data_points,
        outliers_removed = overall.total_outliers_removed,
        average_efficiency = overall.average_efficiency,
        "Aggregation complete"
    );

    Ok(EfficiencyReport {
        results,
        model_summaries,
        overall,
        sources,
    })
}
