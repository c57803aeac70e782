//! Outlier Elimination Engine
//!
//! Bounded fixed-point loop over one group's UPH values:
//!
//! 1. Z-score pass: keep values within ±3σ (population σ).
//! 2. Stop if the kept set has no value beyond ±3σ.
//! 3. IQR pass on the Z-filtered set: keep values inside the Tukey fences.
//! 4. Stop if the IQR-filtered set has no fence outliers and no value beyond ±3σ.
//! 5. Otherwise repeat from 1, at most [`MAX_OUTLIER_ROUNDS`] times.
//!
//! Groups under [`MIN_GROUP_SIZE_FOR_FILTERING`] values are returned as-is.
//! The engine works on indices so callers can keep the matching records.

use statrs::statistics::Statistics;

use crate::config::defaults::{
    IQR_FENCE_MULTIPLIER, MAX_OUTLIER_ROUNDS, MIN_GROUP_SIZE_FOR_FILTERING,
    MIN_VALUES_FOR_Z_SCORE, Z_SCORE_THRESHOLD,
};
use crate::types::OutlierMethod;

/// Result of eliminating outliers from one group.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierOutcome {
    /// Indices into the input slice, in input order
    pub retained: Vec<usize>,
    pub original_count: usize,
    pub removed_count: usize,
    pub method: OutlierMethod,
}

impl OutlierOutcome {
    fn new(retained: Vec<usize>, original_count: usize, method: OutlierMethod) -> Self {
        Self {
            removed_count: original_count - retained.len(),
            retained,
            original_count,
            method,
        }
    }

    pub fn final_count(&self) -> usize {
        self.retained.len()
    }
}

/// Run the full elimination loop over `values`.
pub fn eliminate_outliers(values: &[f64]) -> OutlierOutcome {
    let original_count = values.len();
    let mut current: Vec<usize> = (0..original_count).collect();

    if original_count < MIN_GROUP_SIZE_FOR_FILTERING {
        return OutlierOutcome::new(current, original_count, OutlierMethod::Exempt);
    }

    for round in 1..=MAX_OUTLIER_ROUNDS {
        let z_kept = zscore_pass(values, &current);
        if !has_zscore_outliers(values, &z_kept) {
            return OutlierOutcome::new(z_kept, original_count, OutlierMethod::ZScore { rounds: round });
        }

        let iqr_kept = iqr_pass(values, &z_kept);
        if !has_iqr_outliers(values, &iqr_kept) && !has_zscore_outliers(values, &iqr_kept) {
            return OutlierOutcome::new(iqr_kept, original_count, OutlierMethod::Iqr { rounds: round });
        }

        current = iqr_kept;
    }

    OutlierOutcome::new(
        current,
        original_count,
        OutlierMethod::IterationLimit {
            rounds: MAX_OUTLIER_ROUNDS,
        },
    )
}

// ============================================================================
// Z-Score
// ============================================================================

/// Mean and population σ of the selected values, or `None` when a Z-score
/// is meaningless (too few values, or all identical).
fn z_params(values: &[f64], idx: &[usize]) -> Option<(f64, f64)> {
    if idx.len() < MIN_VALUES_FOR_Z_SCORE {
        return None;
    }
    let selected: Vec<f64> = idx.iter().map(|&i| values[i]).collect();
    let mean = selected.iter().mean();
    let std = selected.iter().population_std_dev();
    (std > 0.0 && std.is_finite()).then_some((mean, std))
}

/// Keep the indices whose value lies within ±3σ of the selection's mean.
pub fn zscore_pass(values: &[f64], idx: &[usize]) -> Vec<usize> {
    match z_params(values, idx) {
        Some((mean, std)) => idx
            .iter()
            .copied()
            .filter(|&i| ((values[i] - mean) / std).abs() <= Z_SCORE_THRESHOLD)
            .collect(),
        None => idx.to_vec(),
    }
}

fn has_zscore_outliers(values: &[f64], idx: &[usize]) -> bool {
    z_params(values, idx).is_some_and(|(mean, std)| {
        idx.iter()
            .any(|&i| ((values[i] - mean) / std).abs() > Z_SCORE_THRESHOLD)
    })
}

// ============================================================================
// IQR
// ============================================================================

/// Quantile with linear interpolation between order statistics.
///
/// `sorted` must be ascending and non-empty.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn iqr_fences(values: &[f64], idx: &[usize]) -> Option<(f64, f64)> {
    if idx.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = idx.iter().map(|&i| values[i]).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    Some((q1 - IQR_FENCE_MULTIPLIER * iqr, q3 + IQR_FENCE_MULTIPLIER * iqr))
}

/// Keep the indices whose value lies inside `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]`.
pub fn iqr_pass(values: &[f64], idx: &[usize]) -> Vec<usize> {
    match iqr_fences(values, idx) {
        Some((lower, upper)) => idx
            .iter()
            .copied()
            .filter(|&i| values[i] >= lower && values[i] <= upper)
            .collect(),
        None => Vec::new(),
    }
}

fn has_iqr_outliers(values: &[f64], idx: &[usize]) -> bool {
    iqr_fences(values, idx).is_some_and(|(lower, upper)| {
        idx.iter().any(|&i| values[i] < lower || values[i] > upper)
    })
}
