//! Schema Normalizer
//!
//! Maps the inconsistent headers of CSV exports, MES spreadsheets and JSON
//! APIs onto one canonical column set, then extracts typed
//! [`MeasurementRecord`]s. This is the only place column existence is
//! checked; everything downstream works on [`MeasurementTable`].
//!
//! Header matching is two-step: the header is trimmed, lower-cased, and has
//! spaces/hyphens replaced with `_`; the result with underscores removed is
//! looked up in a static alias table. So `"Machine Model"`, `"MACHINE_MODEL"`
//! and `"model "` all land on `machine_model`.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::defaults::MIN_EPOCH_SECONDS;
use crate::config::SchemaConfig;
use crate::error::{PipelineError, Result};
use crate::types::{CellValue, MeasurementRecord, MeasurementTable, RawTable};

// ============================================================================
// Canonical Fields
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Uph,
    MachineModel,
    BomNo,
    NumberRequired,
    NoBump,
    Operation,
    OptnCode,
    DateTimeStart,
}

impl CanonicalField {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uph => "uph",
            Self::MachineModel => "machine_model",
            Self::BomNo => "bom_no",
            Self::NumberRequired => "number_required",
            Self::NoBump => "no_bump",
            Self::Operation => "operation",
            Self::OptnCode => "optn_code",
            Self::DateTimeStart => "date_time_start",
        }
    }
}

/// Columns a measurement source must provide.
pub const REQUIRED_FIELDS: &[CanonicalField] = &[
    CanonicalField::Uph,
    CanonicalField::MachineModel,
    CanonicalField::BomNo,
];

/// Alias key (normalized header without underscores) to canonical field.
static ALIASES: &[(&str, CanonicalField)] = &[
    ("uph", CanonicalField::Uph),
    ("machinemodel", CanonicalField::MachineModel),
    ("model", CanonicalField::MachineModel),
    ("bomno", CanonicalField::BomNo),
    ("bom", CanonicalField::BomNo),
    ("numberrequired", CanonicalField::NumberRequired),
    ("nobump", CanonicalField::NoBump),
    ("operation", CanonicalField::Operation),
    ("optncode", CanonicalField::OptnCode),
    ("datetimestart", CanonicalField::DateTimeStart),
    ("datetime", CanonicalField::DateTimeStart),
    ("date", CanonicalField::DateTimeStart),
    ("timestamp", CanonicalField::DateTimeStart),
];

/// `" Machine-Model "` -> `"machine_model"`.
pub fn normalize_column_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Resolve a raw header to its canonical field, if it is a known alias.
pub fn resolve_alias(name: &str) -> Option<CanonicalField> {
    let key: String = normalize_column_name(name)
        .chars()
        .filter(|&c| c != '_')
        .collect();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|&(_, field)| field)
}

// ============================================================================
// Column Mapping
// ============================================================================

/// Result of matching a header row against the alias table.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    /// Output column names, positionally matching the input header
    pub columns: Vec<String>,
    index: HashMap<CanonicalField, usize>,
}

impl ColumnMapping {
    /// Match every header once. On a collision the first matching column
    /// keeps the canonical name and later ones pass through normalized.
    pub fn from_headers(headers: &[String]) -> Self {
        let mut mapping = Self::default();
        for (i, header) in headers.iter().enumerate() {
            let normalized = normalize_column_name(header);
            match resolve_alias(header) {
                Some(field) if !mapping.index.contains_key(&field) => {
                    mapping.index.insert(field, i);
                    mapping.columns.push(field.name().to_string());
                }
                Some(field) => {
                    warn!(
                        column = %header,
                        canonical = field.name(),
                        "Duplicate column for canonical field, keeping the first"
                    );
                    mapping.columns.push(normalized);
                }
                None => mapping.columns.push(normalized),
            }
        }
        mapping
    }

    pub fn get(&self, field: CanonicalField) -> Option<usize> {
        self.index.get(&field).copied()
    }

    /// Required fields with no matching column.
    pub fn missing(&self, required: &[CanonicalField]) -> Vec<String> {
        required
            .iter()
            .filter(|f| !self.index.contains_key(f))
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Columns that may hold the record date, best first: the
    /// `date_time_start` alias, then every other column whose normalized
    /// name mentions a date or time.
    pub fn date_candidates(&self) -> Vec<usize> {
        let by_alias = self.get(CanonicalField::DateTimeStart);
        by_alias
            .into_iter()
            .chain(
                self.columns
                    .iter()
                    .enumerate()
                    .filter(|&(i, c)| Some(i) != by_alias && (c.contains("date") || c.contains("time")))
                    .map(|(i, _)| i),
            )
            .collect()
    }

    /// The first date candidate with at least one cell that parses as a
    /// timestamp. A `cycle_time` column of plain numbers never qualifies.
    pub fn date_column(&self, rows: &[Vec<CellValue>]) -> Option<usize> {
        self.date_candidates().into_iter().find(|&i| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .any(|cell| parse_datetime_cell(cell).is_some())
        })
    }
}

/// Rename a table's headers to their canonical names.
///
/// Tables loaded from different files must go through this before they are
/// concatenated, so that `UPH` in one file and `uph` in another share a column.
pub fn canonicalize_headers(mut table: RawTable) -> RawTable {
    table.columns = ColumnMapping::from_headers(&table.columns).columns;
    table
}

// ============================================================================
// Value Canonicalization
// ============================================================================

/// Trimmed, upper-cased product identifier.
pub fn canonical_product_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Upper-cased model, collapsed to the first family label it contains.
pub fn canonical_model(raw: &str, families: &[String]) -> String {
    let model = raw.trim().to_uppercase();
    families
        .iter()
        .map(|f| f.trim().to_uppercase())
        .find(|family| model.contains(family.as_str()))
        .unwrap_or(model)
}

/// Parse a cell into a timestamp.
///
/// Numbers are Unix epochs (seconds, or milliseconds above 1e10); anything
/// before [`MIN_EPOCH_SECONDS`] is a duration or a count, not a timestamp.
/// Text goes through [`parse_datetime_text`].
pub fn parse_datetime_cell(cell: &CellValue) -> Option<NaiveDateTime> {
    match cell {
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Number(n) if n.is_finite() && *n >= MIN_EPOCH_SECONDS => {
            let secs = if *n > 10_000_000_000.0 { *n / 1000.0 } else { *n };
            chrono::DateTime::from_timestamp(secs as i64, 0).map(|dt| dt.naive_utc())
        }
        CellValue::Text(s) => parse_datetime_text(s),
        _ => None,
    }
}

/// Parse the date/time text formats seen in MES exports.
pub fn parse_datetime_text(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim().trim_matches('"');
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("nat") {
        return None;
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.naive_utc());
    }

    for fmt in &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    for fmt in &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}

// ============================================================================
// Normalization (entry point)
// ============================================================================

/// Validate the raw table against the canonical schema and extract records.
///
/// Rows with a non-numeric `uph` or a blank `bom_no`/`machine_model` are
/// dropped and counted. Fails with [`PipelineError::Schema`] when a required
/// column is absent.
pub fn normalize(raw: RawTable, config: &SchemaConfig) -> Result<MeasurementTable> {
    let mapping = ColumnMapping::from_headers(&raw.columns);

    let missing = mapping.missing(REQUIRED_FIELDS);
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            missing,
            available: mapping.columns.clone(),
        });
    }

    // Required fields were checked above; fall back to an impossible index
    // rather than panicking.
    let uph_idx = mapping.get(CanonicalField::Uph).unwrap_or(usize::MAX);
    let model_idx = mapping.get(CanonicalField::MachineModel).unwrap_or(usize::MAX);
    let bom_idx = mapping.get(CanonicalField::BomNo).unwrap_or(usize::MAX);
    let op_idx = mapping.get(CanonicalField::Operation);
    let optn_idx = mapping.get(CanonicalField::OptnCode);
    let date_idx = mapping.date_column(&raw.rows);

    let mut table = MeasurementTable {
        date_column: date_idx.map(|i| mapping.columns[i].clone()),
        ..Default::default()
    };

    let text_at = |row: &[CellValue], idx: Option<usize>| -> Option<String> {
        idx.and_then(|i| row.get(i)).and_then(CellValue::as_text)
    };

    for row in &raw.rows {
        let Some(uph) = row.get(uph_idx).and_then(CellValue::as_f64) else {
            table.dropped_invalid_uph += 1;
            continue;
        };

        let product = text_at(row, Some(bom_idx)).map(|s| canonical_product_id(&s));
        let model = text_at(row, Some(model_idx))
            .map(|s| canonical_model(&s, &config.model_families));
        let (Some(product_id), Some(equipment_model)) = (product, model) else {
            table.dropped_missing_key += 1;
            continue;
        };

        let timestamp = match date_idx.and_then(|i| row.get(i)) {
            Some(cell) if !cell.is_empty() => {
                let parsed = parse_datetime_cell(cell);
                if parsed.is_none() {
                    table.unparsed_dates += 1;
                }
                parsed
            }
            _ => None,
        };

        table.records.push(MeasurementRecord {
            product_id,
            equipment_model,
            uph,
            timestamp,
            operation: text_at(row, op_idx),
            option_code: text_at(row, optn_idx),
        });
    }

    if table.dropped_invalid_uph > 0 {
        warn!(rows = table.dropped_invalid_uph, "Dropped rows with missing or non-numeric uph");
    }
    if table.dropped_missing_key > 0 {
        warn!(rows = table.dropped_missing_key, "Dropped rows with blank bom_no or machine_model");
    }
    if table.unparsed_dates > 0 {
        debug!(rows = table.unparsed_dates, "Rows with unparseable dates");
    }
    info!(
        rows = table.len(),
        date_column = table.date_column.as_deref().unwrap_or("-"),
        "Schema normalized"
    );

    Ok(table)
}
