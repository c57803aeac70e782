//! Raw tabular data as read from a source, before schema normalization.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// `1,250` or `-12,345.5`: commas only as thousands separators.
fn thousands_grouped() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").ok())
        .as_ref()
}

/// A single cell from a CSV, spreadsheet, or JSON source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Convert a JSON scalar into a cell. Nested values are kept as JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Empty,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map_or_else(|| Self::Text(n.to_string()), Self::Number),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the cell. Text may use `,` thousands grouping; any
    /// other comma, or anything that is not a finite number, yields `None`.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Self::Number(n) => *n,
            Self::Text(s) => {
                let s = s.trim();
                if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("null") {
                    return None;
                }
                if s.contains(',') {
                    // "120,5" is a decimal comma, not 1205
                    if !thousands_grouped().is_some_and(|re| re.is_match(s)) {
                        return None;
                    }
                    s.replace(',', "").parse::<f64>().ok()?
                } else {
                    s.parse::<f64>().ok()?
                }
            }
            Self::Bool(_) | Self::Empty | Self::DateTime(_) => return None,
        };
        v.is_finite().then_some(v)
    }

    /// Text view of the cell. Whole numbers render without a trailing `.0`
    /// so that numeric BOM codes match their textual form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
            Self::Bool(b) => Some(b.to_string()),
            Self::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

/// Flat table of rows keyed by column position.
///
/// Every row has exactly `columns.len()` cells; missing fields are
/// `CellValue::Empty`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    /// Build a table from JSON objects. Columns appear in first-seen order.
    pub fn from_json_records(records: &[serde_json::Map<String, serde_json::Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in records {
            for key in record.keys() {
                if !index.contains_key(key) {
                    index.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let mut table = Self::new(columns);
        for record in records {
            let mut row = vec![CellValue::Empty; table.columns.len()];
            for (key, value) in record {
                if let Some(&i) = index.get(key) {
                    row[i] = CellValue::from_json(value);
                }
            }
            table.rows.push(row);
        }
        table
    }

    /// Concatenate tables with a union of their schemas.
    ///
    /// Columns keep first-seen order; cells absent from a source table are
    /// empty. A name repeated within one table maps its n-th occurrence onto
    /// the n-th column of that name in the union.
    pub fn concat(tables: Vec<Self>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for t in &tables {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for c in &t.columns {
                let nth = seen.entry(c.as_str()).or_default();
                *nth += 1;
                if columns.iter().filter(|u| *u == c).count() < *nth {
                    columns.push(c.clone());
                }
            }
        }

        let mut out = Self::new(columns);
        for t in tables {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            let mapping: Vec<Option<usize>> = t
                .columns
                .iter()
                .map(|c| {
                    let nth = seen.entry(c.as_str()).or_default();
                    *nth += 1;
                    out.columns
                        .iter()
                        .enumerate()
                        .filter(|(_, u)| *u == c)
                        .nth(*nth - 1)
                        .map(|(i, _)| i)
                })
                .collect();
            for row in t.rows {
                let mut merged = vec![CellValue::Empty; out.columns.len()];
                for (cell, target) in row.into_iter().zip(mapping.iter()) {
                    if let Some(i) = target {
                        merged[*i] = cell;
                    }
                }
                out.rows.push(merged);
            }
        }
        out
    }
}
