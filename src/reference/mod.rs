//! Reference Join
//!
//! Loads the per-product wire/reference table and derives the per-unit
//! divisor used to turn mean UPH into efficiency. The table is read once per
//! run and never written.
//!
//! Discovery is a single strategy chosen from config: an explicit path, or a
//! scan of a directory for a spreadsheet/CSV whose name contains a hint
//! (`wire`, `book`, `reference`). A missing entry for a product is not an
//! error; the divisor falls back to [`DEFAULT_DIVISOR`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::acquisition::load_file;
use crate::config::defaults::DEFAULT_DIVISOR;
use crate::config::ReferenceConfig;
use crate::error::{PipelineError, Result};
use crate::schema::{canonical_product_id, CanonicalField, ColumnMapping};
use crate::types::{CellValue, RawTable, ReferenceEntry};

/// Extensions accepted when scanning for a reference table.
const REFERENCE_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];

// ============================================================================
// Reference Table
// ============================================================================

/// Reference entries keyed by canonical product id.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: HashMap<String, ReferenceEntry>,
    source: Option<PathBuf>,
}

impl ReferenceTable {
    /// A table with no entries; every divisor is the default.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from entries. The first entry for a product wins.
    pub fn from_entries(entries: impl IntoIterator<Item = ReferenceEntry>) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            map.entry(canonical_product_id(&entry.product_id))
                .or_insert(entry);
        }
        Self {
            entries: map,
            source: None,
        }
    }

    /// Build from a raw table with `bom_no` and optional `number_required` /
    /// `no_bump` columns. Missing counts read as zero.
    pub fn from_raw(raw: &RawTable, source_name: &str) -> Result<Self> {
        let mapping = ColumnMapping::from_headers(&raw.columns);
        let Some(bom_idx) = mapping.get(CanonicalField::BomNo) else {
            return Err(PipelineError::format(
                source_name,
                format!("reference table has no bom_no column (columns: {:?})", mapping.columns),
            ));
        };
        let required_idx = mapping.get(CanonicalField::NumberRequired);
        let bump_idx = mapping.get(CanonicalField::NoBump);

        let number_at = |row: &[CellValue], idx: Option<usize>| -> f64 {
            idx.and_then(|i| row.get(i))
                .and_then(CellValue::as_f64)
                .unwrap_or(0.0)
        };

        let entries = raw.rows.iter().filter_map(|row| {
            let product_id = row.get(bom_idx).and_then(CellValue::as_text)?;
            Some(ReferenceEntry {
                product_id: canonical_product_id(&product_id),
                required_count: number_at(row, required_idx),
                bump_count: number_at(row, bump_idx),
            })
        });
        Ok(Self::from_entries(entries))
    }

    /// Load a reference table file. Any failure is `ReferenceUnavailable`.
    pub fn load(path: &Path) -> Result<Self> {
        let unavailable = |reason: String| PipelineError::ReferenceUnavailable {
            location: format!("{}: {reason}", path.display()),
        };
        let raw = load_file(path).map_err(|e| unavailable(e.to_string()))?;
        let mut table =
            Self::from_raw(&raw, &path.display().to_string()).map_err(|e| unavailable(e.to_string()))?;
        table.source = Some(path.to_path_buf());
        info!(path = %path.display(), products = table.len(), "Reference table loaded");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, product_id: &str) -> Option<&ReferenceEntry> {
        self.entries.get(&canonical_product_id(product_id))
    }

    /// Divisor from the reference entry, if the product has one.
    pub fn divisor_for(&self, product_id: &str) -> Option<f64> {
        self.get(product_id).map(ReferenceEntry::per_unit_divisor)
    }

    /// Divisor, falling back to [`DEFAULT_DIVISOR`] for unknown products.
    pub fn divisor_or_default(&self, product_id: &str) -> f64 {
        self.divisor_for(product_id).unwrap_or(DEFAULT_DIVISOR)
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// How the reference table is found for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceLocator {
    /// No reference join; all divisors are the default
    Disabled,
    /// A specific file that must exist
    Explicit(PathBuf),
    /// First (sorted) matching file in `dir`, if any
    Scan { dir: PathBuf, hints: Vec<String> },
}

impl ReferenceLocator {
    pub fn from_config(config: &ReferenceConfig) -> Self {
        if !config.enabled {
            Self::Disabled
        } else if let Some(path) = &config.path {
            Self::Explicit(path.clone())
        } else {
            Self::Scan {
                dir: config.search_dir.clone(),
                hints: config.name_hints.clone(),
            }
        }
    }

    /// Resolve the file this locator points at, without reading it.
    pub fn discover(&self) -> Option<PathBuf> {
        match self {
            Self::Disabled => None,
            Self::Explicit(path) => Some(path.clone()),
            Self::Scan { dir, hints } => scan_for_reference(dir, hints),
        }
    }

    /// Load the reference table for a run.
    ///
    /// An explicit path that cannot be read fails the run. A scan that finds
    /// nothing degrades to an empty table.
    pub fn load(&self) -> Result<ReferenceTable> {
        match self {
            Self::Disabled => {
                debug!("Reference join disabled");
                Ok(ReferenceTable::empty())
            }
            Self::Explicit(path) => ReferenceTable::load(path),
            Self::Scan { dir, .. } => match self.discover() {
                Some(path) => ReferenceTable::load(&path),
                None => {
                    warn!(
                        dir = %dir.display(),
                        "No reference table found, all divisors default to {}",
                        DEFAULT_DIVISOR
                    );
                    Ok(ReferenceTable::empty())
                }
            },
        }
    }
}

fn scan_for_reference(dir: &Path, hints: &[String]) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Reference directory not readable");
            return None;
        }
    };

    let hints: Vec<String> = hints.iter().map(|h| h.to_lowercase()).collect();
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let ext = p
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            // ~$ prefix: Office lock file
            !name.starts_with("~$")
                && REFERENCE_EXTENSIONS.contains(&ext.as_str())
                && hints.iter().any(|h| name.contains(h.as_str()))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}
