//! Canonical measurement and reference rows.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One validated throughput measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// BOM number, trimmed and upper-cased
    pub product_id: String,
    /// Machine model, collapsed to its family label when one matches
    pub equipment_model: String,
    /// Units per hour
    pub uph: f64,
    /// Start timestamp, when the source carries one
    pub timestamp: Option<NaiveDateTime>,
    pub operation: Option<String>,
    pub option_code: Option<String>,
}

impl MeasurementRecord {
    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|t| t.date())
    }
}

/// The canonical table produced by the schema normalizer.
///
/// Downstream stages only ever see this type; column existence has already
/// been checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementTable {
    pub records: Vec<MeasurementRecord>,
    /// Source column that supplied `timestamp`, if any
    pub date_column: Option<String>,
    /// Rows dropped because `uph` was missing or non-numeric
    pub dropped_invalid_uph: usize,
    /// Rows dropped because `bom_no` or `machine_model` was blank
    pub dropped_missing_key: usize,
    /// Rows whose date cell could not be parsed
    pub unparsed_dates: usize,
}

impl MeasurementTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_dates(&self) -> bool {
        self.date_column.is_some()
    }
}

/// One row of the wire/reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub product_id: String,
    pub required_count: f64,
    pub bump_count: f64,
}

impl ReferenceEntry {
    /// Wires per unit: `bump_count / 2 + required_count`, never below a usable
    /// divisor. A non-positive result falls back to `1.0`.
    pub fn per_unit_divisor(&self) -> f64 {
        let divisor = self.bump_count / 2.0 + self.required_count;
        if divisor > 0.0 && divisor.is_finite() {
            divisor
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisor_from_bump_and_required() {
        let entry = ReferenceEntry {
            product_id: "A1".into(),
            required_count: 5.0,
            bump_count: 10.0,
        };
        assert_eq!(entry.per_unit_divisor(), 10.0);
    }

    #[test]
    fn test_non_positive_divisor_falls_back() {
        let entry = ReferenceEntry {
            product_id: "A1".into(),
            required_count: 0.0,
            bump_count: 0.0,
        };
        assert_eq!(entry.per_unit_divisor(), 1.0);

        let negative = ReferenceEntry {
            product_id: "A2".into(),
            required_count: -4.0,
            bump_count: 2.0,
        };
        assert_eq!(negative.per_unit_divisor(), 1.0);
    }
}
