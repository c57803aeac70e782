//! Source Loader
//!
//! Reads measurement data from local CSV, spreadsheet or JSON files, from a
//! list of such files, or from a remote JSON endpoint, and flattens each into
//! a [`RawTable`]. Column names are left untouched here; the schema module
//! canonicalizes them.

mod delimited;
mod http;
mod json;
mod spreadsheet;

pub use delimited::read_csv_from;
pub use self::http::fetch_json;
pub use self::json::{parse_json_bytes, unwrap_records};

use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::HttpConfig;
use crate::error::{PipelineError, Result};
use crate::schema::canonicalize_headers;
use crate::types::{RawTable, SourceSummary};

// ============================================================================
// Source
// ============================================================================

/// Where a run's measurements come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    /// Loaded independently and concatenated with a schema union
    Paths(Vec<PathBuf>),
    Url(String),
}

impl Source {
    /// Build a source from CLI-style inputs: one URL, one path, or several paths.
    pub fn from_inputs<S: AsRef<str>>(inputs: &[S]) -> Result<Self> {
        match inputs {
            [] => Err(PipelineError::format("<none>", "no source given")),
            [single] if is_url(single.as_ref()) => Ok(Self::Url(single.as_ref().to_string())),
            [single] => Ok(Self::Path(PathBuf::from(single.as_ref()))),
            many => {
                if let Some(url) = many.iter().find(|s| is_url(s.as_ref())) {
                    return Err(PipelineError::format(
                        url.as_ref(),
                        "a URL cannot be combined with other sources",
                    ));
                }
                Ok(Self::Paths(many.iter().map(|s| PathBuf::from(s.as_ref())).collect()))
            }
        }
    }

    /// Human-readable location for logs and summaries.
    pub fn describe(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Paths(ps) => format!("{} files", ps.len()),
            Self::Url(u) => u.clone(),
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if is_url(s) {
            Self::Url(s.to_string())
        } else {
            Self::Path(PathBuf::from(s))
        }
    }
}

impl From<PathBuf> for Source {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<Vec<PathBuf>> for Source {
    fn from(ps: Vec<PathBuf>) -> Self {
        Self::Paths(ps)
    }
}

fn is_url(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

// ============================================================================
// Format Detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
    Json,
}

impl SourceFormat {
    /// Infer the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Self::Spreadsheet),
            "json" => Ok(Self::Json),
            other => Err(PipelineError::format(
                path.display().to_string(),
                format!("unsupported file extension '.{other}'"),
            )),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Raw rows plus per-source row counts.
#[derive(Debug, Clone, Default)]
pub struct LoadedSource {
    pub table: RawTable,
    pub sources: Vec<SourceSummary>,
}

/// Read one local file in whatever format its extension declares.
pub fn load_file(path: &Path) -> Result<RawTable> {
    let format = SourceFormat::from_path(path)?;
    if !path.is_file() {
        return Err(PipelineError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        });
    }

    match format {
        SourceFormat::Csv => delimited::read_csv(path),
        SourceFormat::Spreadsheet => spreadsheet::read_spreadsheet(path),
        SourceFormat::Json => {
            let bytes = std::fs::read(path).map_err(|source| PipelineError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_json_bytes(&bytes, &path.display().to_string())
        }
    }
}

/// Load a source into one flat table.
pub async fn load_source(source: &Source, http: &HttpConfig) -> Result<LoadedSource> {
    let loaded = match source {
        Source::Path(path) => {
            let table = load_file(path)?;
            LoadedSource {
                sources: vec![summary_for_path(path, table.len())],
                table,
            }
        }
        Source::Paths(paths) => {
            let mut tables = Vec::with_capacity(paths.len());
            let mut sources = Vec::with_capacity(paths.len());
            for path in paths {
                // Each file resolves its own header spellings before the union
                let table = canonicalize_headers(load_file(path)?);
                info!(path = %path.display(), rows = table.len(), "Loaded source file");
                sources.push(summary_for_path(path, table.len()));
                tables.push(table);
            }
            LoadedSource {
                table: RawTable::concat(tables),
                sources,
            }
        }
        Source::Url(url) => {
            let payload = fetch_json(url, http).await?;
            let records = unwrap_records(payload, url)?;
            let table = RawTable::from_json_records(&records);
            LoadedSource {
                sources: vec![SourceSummary {
                    source: url.clone(),
                    rows_loaded: table.len(),
                }],
                table,
            }
        }
    };

    info!(
        source = %source.describe(),
        rows = loaded.table.len(),
        columns = loaded.table.columns.len(),
        "Source loaded"
    );
    Ok(loaded)
}

fn summary_for_path(path: &Path, rows: usize) -> SourceSummary {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    SourceSummary {
        source: name,
        rows_loaded: rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellValue;
    use std::io::Write;

    #[test]
    fn test_source_from_inputs() {
        assert_eq!(
            Source::from_inputs(&["https://mes/api/uph"]).unwrap(),
            Source::Url("https://mes/api/uph".into())
        );
        assert_eq!(
            Source::from_inputs(&["a.csv"]).unwrap(),
            Source::Path(PathBuf::from("a.csv"))
        );
        assert!(matches!(
            Source::from_inputs(&["a.csv", "b.xlsx"]).unwrap(),
            Source::Paths(ref ps) if ps.len() == 2
        ));
        assert!(Source::from_inputs(&["a.csv", "http://x/y"]).is_err());
        assert!(Source::from_inputs::<&str>(&[]).is_err());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SourceFormat::from_path(Path::new("x.CSV")).unwrap(), SourceFormat::Csv);
        assert_eq!(
            SourceFormat::from_path(Path::new("dir/x.xlsx")).unwrap(),
            SourceFormat::Spreadsheet
        );
        assert_eq!(SourceFormat::from_path(Path::new("x.json")).unwrap(), SourceFormat::Json);
        let err = SourceFormat::from_path(Path::new("x.parquet")).unwrap_err();
        assert!(matches!(err, PipelineError::Format { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_file(Path::new("/no/such/dir/uph.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[tokio::test]
    async fn test_paths_are_concatenated_with_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.json");
        std::fs::File::create(&a)
            .unwrap()
            .write_all(b"uph,bom_no\n100,A1\n110,A1\n")
            .unwrap();
        std::fs::write(&b, r#"[{"uph": 90, "machine_model": "WB3100"}]"#).unwrap();

        let loaded = load_source(&Source::Paths(vec![a, b]), &HttpConfig::default())
            .await
            .unwrap();
        assert_eq!(loaded.table.len(), 3);
        assert_eq!(loaded.table.columns, vec!["uph", "bom_no", "machine_model"]);
        assert_eq!(loaded.sources.len(), 2);
        assert_eq!(loaded.sources[0].source, "a.csv");
        assert_eq!(loaded.sources[0].rows_loaded, 2);
        assert_eq!(loaded.sources[1].rows_loaded, 1);
    }

    #[tokio::test]
    async fn test_paths_with_different_header_spellings_share_columns() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        std::fs::write(&a, "uph,bom_no,machine_model\n100,A1,WB3100\n102,A1,WB3100\n").unwrap();
        std::fs::write(
            &b,
            "Machine Model,BOM No,UPH\nWB3100,A1,104\nWB3100,A1,106\nWB3200,C3,50\n",
        )
        .unwrap();

        let loaded = load_source(&Source::Paths(vec![a, b]), &HttpConfig::default())
            .await
            .unwrap();
        assert_eq!(loaded.table.columns, vec!["uph", "bom_no", "machine_model"]);
        assert_eq!(loaded.table.len(), 5);
        assert_eq!(loaded.table.rows[4][0], CellValue::Text("50".into()));
        assert_eq!(loaded.table.rows[4][1], CellValue::Text("C3".into()));
        assert_eq!(loaded.table.rows[4][2], CellValue::Text("WB3200".into()));

        let table = crate::schema::normalize(loaded.table, &crate::config::SchemaConfig::default()).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(table.dropped_invalid_uph, 0);
    }
}
