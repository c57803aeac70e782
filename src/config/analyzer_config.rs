//! Analyzer Configuration - operator-tunable TOML values
//!
//! Each section implements `Default` with the built-in behaviour, so a run
//! without any config file behaves exactly like the stock pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "UPH_ANALYZER_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "uph_analyzer.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for the analyzer.
///
/// Load with `AnalyzerConfig::load()` which searches:
/// 1. `$UPH_ANALYZER_CONFIG`
/// 2. `./uph_analyzer.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Reference (wire data) table discovery
    #[serde(default)]
    pub reference: ReferenceConfig,

    /// Request options for URL sources
    #[serde(default)]
    pub http: HttpConfig,

    /// Column/value normalization
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Report naming
    #[serde(default)]
    pub output: OutputConfig,
}

impl AnalyzerConfig {
    /// Load configuration using the standard search order.
    ///
    /// A broken file is logged and skipped rather than aborting; the next
    /// location in the search order is tried.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded analyzer config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded analyzer config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys only produce warnings; range violations are errors.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate values that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let errors = super::validation::validate_ranges(self);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Reference Discovery
// ============================================================================

/// Where the reference table comes from.
///
/// An explicit `path` wins. Otherwise `search_dir` is scanned for a
/// spreadsheet or CSV whose name contains one of `name_hints`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Disable to run without any reference join (all divisors 1.0)
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_search_dir")]
    pub search_dir: PathBuf,

    #[serde(default = "default_name_hints")]
    pub name_hints: Vec<String>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            search_dir: default_search_dir(),
            name_hints: default_name_hints(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_search_dir() -> PathBuf {
    PathBuf::from(defaults::REFERENCE_SEARCH_DIR)
}
fn default_name_hints() -> Vec<String> {
    defaults::REFERENCE_NAME_HINTS.iter().map(|s| (*s).to_string()).collect()
}

// ============================================================================
// HTTP
// ============================================================================

/// Request options applied to every URL source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Extra query parameters
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    #[serde(default)]
    pub basic_auth_user: Option<String>,

    #[serde(default)]
    pub basic_auth_password: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            basic_auth_user: None,
            basic_auth_password: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    defaults::HTTP_TIMEOUT_SECS
}

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Machine-model substrings that collapse to one label
    #[serde(default = "default_model_families")]
    pub model_families: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            model_families: default_model_families(),
        }
    }
}

fn default_model_families() -> Vec<String> {
    defaults::DEFAULT_MODEL_FAMILIES.iter().map(|s| (*s).to_string()).collect()
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_file_stem")]
    pub file_stem: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file_stem: default_file_stem(),
        }
    }
}

fn default_file_stem() -> String {
    defaults::REPORT_FILE_STEM.to_string()
}
