//! Pipeline error taxonomy.
//!
//! Every variant is terminal for the run. The two graceful-degradation paths
//! (missing reference entry, non-convergent outlier loop) are not errors and
//! never surface here.

use std::fmt;
use std::path::PathBuf;

/// Pipeline stage at which the working set became empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Validation,
    DateFilter,
    OutlierElimination,
    Aggregation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Validation => "validation",
            Self::DateFilter => "date filtering",
            Self::OutlierElimination => "outlier elimination",
            Self::Aggregation => "aggregation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Missing required columns {missing:?}; available columns: {available:?}")]
    Schema {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("Fetch from {url} failed: {message}{}", excerpt_suffix(.excerpt))]
    Transport {
        url: String,
        message: String,
        excerpt: Option<String>,
    },

    #[error("Unreadable input {source_name}: {message}")]
    Format {
        source_name: String,
        message: String,
    },

    #[error("No data remaining after {stage}")]
    EmptyResult { stage: Stage },

    #[error("Export to {} failed: {message} (check disk space and write permissions)", .path.display())]
    Export { path: PathBuf, message: String },

    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Reference table unavailable: {location}")]
    ReferenceUnavailable { location: String },
}

fn excerpt_suffix(excerpt: &Option<String>) -> String {
    excerpt
        .as_ref()
        .map(|e| format!(" (response excerpt: {e})"))
        .unwrap_or_default()
}

impl PipelineError {
    pub fn format(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Format {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn export(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Export {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for write-side failures that happened after a successful compute.
    pub fn is_export(&self) -> bool {
        matches!(self, Self::Export { .. })
    }

    /// True for failures caused by the input itself rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Schema { .. } | Self::Format { .. } | Self::EmptyResult { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
