//! System-wide default constants.
//!
//! Centralises the fixed thresholds of the cleaning pipeline. These are not
//! exposed through the TOML config.

// ============================================================================
// Outlier Elimination
// ============================================================================

/// Groups smaller than this are never outlier-filtered.
pub const MIN_GROUP_SIZE_FOR_FILTERING: usize = 15;

/// Maximum Z-score/IQR rounds before the last filtered set is accepted.
pub const MAX_OUTLIER_ROUNDS: usize = 20;

/// Z-score cut-off (standard deviations).
pub const Z_SCORE_THRESHOLD: f64 = 3.0;

/// Tukey fence multiplier applied to the interquartile range.
pub const IQR_FENCE_MULTIPLIER: f64 = 1.5;

/// Below this many values the Z-score test never flags anything.
pub const MIN_VALUES_FOR_Z_SCORE: usize = 3;

// ============================================================================
// Reference Join
// ============================================================================

/// Divisor used when a product has no usable reference entry.
pub const DEFAULT_DIVISOR: f64 = 1.0;

// ============================================================================
// Report Rounding
// ============================================================================

pub const THROUGHPUT_DECIMALS: i32 = 2;
pub const DIVISOR_DECIMALS: i32 = 2;
pub const EFFICIENCY_DECIMALS: i32 = 3;

// ============================================================================
// Source Loading
// ============================================================================

/// HTTP timeout for remote JSON sources (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum characters of a response body quoted in a transport error.
pub const RESPONSE_EXCERPT_CHARS: usize = 300;

/// Keys searched, in order, for the record list inside a JSON object.
pub const JSON_RECORD_KEYS: &[&str] = &["data", "results", "items", "records", "rows", "content"];

// ============================================================================
// Schema
// ============================================================================

/// Model families collapsed to a single label when the model contains them.
pub const DEFAULT_MODEL_FAMILIES: &[&str] = &["WB3100", "WB3200", "WB3300"];

/// Smallest number read as a Unix-epoch timestamp (2000-01-01T00:00:00Z).
pub const MIN_EPOCH_SECONDS: f64 = 946_684_800.0;

// ============================================================================
// Reference Discovery
// ============================================================================

/// Directory scanned for the reference table when no explicit path is set.
pub const REFERENCE_SEARCH_DIR: &str = "data_MAP";

/// Case-insensitive file-name fragments that identify a reference table.
pub const REFERENCE_NAME_HINTS: &[&str] = &["wire", "book", "reference"];

// ============================================================================
// Export
// ============================================================================

/// Default report file stem; a timestamp and `.xlsx` are appended.
pub const REPORT_FILE_STEM: &str = "uph_efficiency";

/// Minimum free space required in the output directory (bytes). 10 MB.
pub const MIN_FREE_DISK_BYTES: u64 = 10 * 1_048_576;

/// How many `_<n>` suffixes to try when the report name is already taken.
pub const MAX_REPORT_NAME_ATTEMPTS: usize = 1000;
