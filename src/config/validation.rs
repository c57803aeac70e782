//! Config validation: unknown-key detection with Levenshtein suggestions
//! and value range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for AnalyzerConfig.
///
/// Maintained by hand to match the struct hierarchy in analyzer_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [reference]
        "reference",
        "reference.enabled",
        "reference.path",
        "reference.search_dir",
        "reference.name_hints",
        // [http]
        "http",
        "http.timeout_secs",
        "http.headers",
        "http.query",
        "http.basic_auth_user",
        "http.basic_auth_password",
        // [schema]
        "schema",
        "schema.model_families",
        // [output]
        "output",
        "output.file_stem",
    ];
    keys.iter().copied().collect()
}

/// Tables whose keys are free-form (header names, query parameters).
const OPEN_TABLES: &[&str] = &["http.headers", "http.query"];

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`. Tables listed in `OPEN_TABLES` are not descended.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() && !OPEN_TABLES.contains(&path.as_str()) {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, d)| d <= 3)
        // Tie-break on the key so the suggestion is stable across HashSet orderings
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Values that cannot produce a working run. Each entry is one error line.
pub fn validate_ranges(config: &super::AnalyzerConfig) -> Vec<String> {
    let mut errors = Vec::new();

    let http = &config.http;
    if http.timeout_secs == 0 || http.timeout_secs > 3600 {
        errors.push(format!(
            "http.timeout_secs = {} is outside usable range (1-3600 s)",
            http.timeout_secs
        ));
    }
    if http.basic_auth_password.is_some() && http.basic_auth_user.is_none() {
        errors.push("http.basic_auth_password is set without http.basic_auth_user".to_string());
    }

    let reference = &config.reference;
    if reference.enabled && reference.path.is_none() && reference.name_hints.is_empty() {
        errors.push(
            "reference.name_hints is empty and no reference.path is set; nothing could ever match"
                .to_string(),
        );
    }

    if reference.name_hints.iter().any(|h| h.trim().is_empty()) {
        errors.push("reference.name_hints contains a blank entry".to_string());
    }

    if config.schema.model_families.iter().any(|f| f.trim().is_empty()) {
        errors.push("schema.model_families contains a blank entry".to_string());
    }

    let stem = config.output.file_stem.trim();
    if stem.is_empty() {
        errors.push("output.file_stem must not be empty".to_string());
    } else if stem.contains('/') || stem.contains('\\') {
        errors.push(format!(
            "output.file_stem = '{stem}' must be a file name, not a path"
        ));
    }

    errors
}

// ============================================================================
// Tests
// ============================================================================
