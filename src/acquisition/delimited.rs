//! CSV reader.

use std::io::Read;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::types::{CellValue, RawTable};

pub(super) fn read_csv(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv_from(file, &path.display().to_string())
}

/// Parse CSV with a header row from any reader.
///
/// A UTF-8 byte-order mark on the first header is stripped (Excel writes
/// one). Short rows are padded with empty cells.
pub fn read_csv_from<R: Read>(reader: R, source_name: &str) -> Result<RawTable> {
    let mut reader = ::csv::ReaderBuilder::new()
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::format(source_name, e.to_string()))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.to_string()
        })
        .collect();

    let mut table = RawTable::new(columns);
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            PipelineError::format(source_name, format!("row {}: {e}", line + 2))
        })?;
        table.push_row(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bom_and_padding() {
        let data = "\u{feff}UPH,BOM No,Model\n100,A1,WB3100\n95,A2\n";
        let table = read_csv_from(data.as_bytes(), "mem").unwrap();
        assert_eq!(table.columns, vec!["UPH", "BOM No", "Model"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1][2], CellValue::Empty);
        assert_eq!(table.rows[0][0], CellValue::Text("100".into()));
    }

    #[test]
    fn test_invalid_utf8_is_format_error() {
        let data: &[u8] = b"uph,bom_no\n\xff\xfe,A1\n";
        let err = read_csv_from(data, "bad.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Format { .. }));
    }
}
