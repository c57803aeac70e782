//! Spreadsheet reader (xlsx, xlsm, xlsb, xls, ods) via calamine.
//!
//! Only the first worksheet is read; its first row is the header.

use calamine::{open_workbook_auto, Data, DataType, Reader};
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::types::{CellValue, RawTable};

pub(super) fn read_spreadsheet(path: &Path) -> Result<RawTable> {
    let name = path.display().to_string();
    let mut workbook =
        open_workbook_auto(path).map_err(|e| PipelineError::format(&name, e.to_string()))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| PipelineError::format(&name, "workbook has no worksheets"))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| PipelineError::format(&name, format!("sheet '{sheet}': {e}")))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(RawTable::default());
    };

    let columns = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Data::Empty => format!("column_{}", i + 1),
            other => other.to_string().trim().to_string(),
        })
        .collect();

    let mut table = RawTable::new(columns);
    for row in rows {
        let cells: Vec<CellValue> = row.iter().map(cell_from_data).collect();
        if cells.iter().all(CellValue::is_empty) {
            continue;
        }
        table.push_row(cells);
    }
    Ok(table)
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(_) | Data::DateTimeIso(_) => data
            .as_datetime()
            .map_or(CellValue::Empty, CellValue::DateTime),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    #[test]
    fn test_reads_first_sheet_with_typed_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uph.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "UPH").unwrap();
        sheet.write_string(0, 1, "BOM No").unwrap();
        sheet.write_string(0, 2, "Date").unwrap();
        sheet.write_number(1, 0, 101.5).unwrap();
        sheet.write_string(1, 1, "A1").unwrap();
        let date = ExcelDateTime::from_ymd(2024, 2, 3).unwrap();
        let fmt = Format::new().set_num_format("yyyy-mm-dd");
        sheet.write_datetime_with_format(1, 2, &date, &fmt).unwrap();
        workbook.save(&path).unwrap();

        let table = read_spreadsheet(&path).unwrap();
        assert_eq!(table.columns, vec!["UPH", "BOM No", "Date"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0][0], CellValue::Number(101.5));
        match &table.rows[0][2] {
            CellValue::DateTime(dt) => {
                assert_eq!(dt.date(), chrono::NaiveDate::from_ymd_opt(2024, 2, 3).unwrap())
            }
            other => panic!("expected datetime, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_workbook_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        let err = read_spreadsheet(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Format { .. }));
    }
}
