//! Exporter
//!
//! Writes the report as a multi-sheet xlsx workbook:
//!
//! | Sheet | Content |
//! |---|---|
//! | `UPH_Results` | one row per (product, model) group |
//! | `Model_Summary` | efficiency rollup per equipment model |
//! | `Overall_Summary` | metric / value pairs for the whole run |
//! | `Source_Summary` | rows loaded per input source |
//!
//! The workbook is saved under a temporary name and renamed into place, so a
//! failed write never leaves a half-written report behind.

use chrono::NaiveDateTime;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::defaults::{MAX_REPORT_NAME_ATTEMPTS, MIN_FREE_DISK_BYTES};
use crate::error::{PipelineError, Result, Stage};
use crate::types::{EfficiencyReport, EfficiencyResult, ModelSummary, OverallSummary, SourceSummary};

const NOT_AVAILABLE: &str = "N/A";

/// `<stem>_<YYYYmmdd_HHMMSS_mmm>.xlsx`
pub fn report_file_name(stem: &str, at: NaiveDateTime) -> String {
    format!("{stem}_{}.xlsx", at.format("%Y%m%d_%H%M%S_%3f"))
}

// ============================================================================
// Preflight
// ============================================================================

/// Make sure the output directory exists, is writable and has room.
pub fn preflight(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| PipelineError::export(dir, format!("cannot create output directory: {e}")))?;

    let pid = std::process::id();
    let (check, file) = create_unique(dir, |n| format!(".write_check_{pid}_{n}"))
        .map_err(|e| PipelineError::export(dir, format!("output directory is not writable: {e}")))?;
    drop(file);
    let _ = std::fs::remove_file(&check);

    #[cfg(unix)]
    match check_disk_free(dir) {
        Ok(free) if free < MIN_FREE_DISK_BYTES => {
            return Err(PipelineError::export(
                dir,
                format!(
                    "only {} MB free, need at least {} MB",
                    free / 1_048_576,
                    MIN_FREE_DISK_BYTES / 1_048_576
                ),
            ));
        }
        Ok(free) => debug!(free_mb = free / 1_048_576, "Output disk space ok"),
        Err(e) => debug!(error = %e, "Disk space check unavailable"),
    }

    Ok(())
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn check_disk_free(path: &Path) -> std::result::Result<u64, String> {
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).map_err(|e| e.to_string())?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };

    if result == 0 {
        let stat = unsafe { stat.assume_init() };
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    } else {
        Err(format!("statvfs failed for {}", path.display()))
    }
}

// ============================================================================
// Workbook
// ============================================================================

/// Write the report into `dir` and return the file path.
///
/// The final name is reserved with an exclusive create before anything is
/// written. When `file_name` is already taken (another run in the same
/// millisecond, or a leftover file) `_1`, `_2`, ... is appended to the stem,
/// so concurrent runs never share a report or a partial file.
pub fn write_report(report: &EfficiencyReport, dir: &Path, file_name: &str) -> Result<PathBuf> {
    if report.results.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: Stage::Aggregation,
        });
    }

    preflight(dir)?;
    let mut workbook =
        build_workbook(report).map_err(|e| PipelineError::export(dir.join(file_name), e.to_string()))?;

    let (path, placeholder) = create_unique(dir, |n| numbered_name(file_name, n))
        .map_err(|e| PipelineError::export(dir.join(file_name), format!("cannot reserve report name: {e}")))?;
    drop(placeholder);

    let reserved = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let partial = dir.join(format!(".{reserved}.partial"));

    if let Err(message) = save_partial(&mut workbook, &partial).and_then(|()| {
        std::fs::rename(&partial, &path).map_err(|e| e.to_string())
    }) {
        let _ = std::fs::remove_file(&partial);
        let _ = std::fs::remove_file(&path);
        return Err(PipelineError::export(&path, message));
    }

    info!(path = %path.display(), rows = report.results.len(), "Report written");
    Ok(path)
}

fn save_partial(workbook: &mut Workbook, partial: &Path) -> std::result::Result<(), String> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(partial)
        .map_err(|e| format!("cannot create {}: {e}", partial.display()))?;
    workbook.save_to_writer(&mut file).map_err(|e| e.to_string())?;
    file.sync_all().map_err(|e| e.to_string())
}

/// `report.xlsx` for 0, `report_<n>.xlsx` otherwise.
fn numbered_name(file_name: &str, n: usize) -> String {
    if n == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{n}.{ext}"),
        _ => format!("{file_name}_{n}"),
    }
}

/// Exclusively create the first free name produced by `name_for(0)`, `name_for(1)`, ...
fn create_unique(
    dir: &Path,
    name_for: impl Fn(usize) -> String,
) -> std::io::Result<(PathBuf, std::fs::File)> {
    for n in 0..MAX_REPORT_NAME_ATTEMPTS {
        let candidate = dir.join(name_for(n));
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => {
                if n > 0 {
                    debug!(path = %candidate.display(), "Report name taken, using numbered name");
                }
                return Ok((candidate, file));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name after {MAX_REPORT_NAME_ATTEMPTS} attempts"),
    ))
}

fn build_workbook(report: &EfficiencyReport) -> std::result::Result<Workbook, XlsxError> {
    let header = Format::new().set_bold();
    let mut workbook = Workbook::new();

    write_results(workbook.add_worksheet(), &report.results, &header)?;
    write_model_summary(workbook.add_worksheet(), &report.model_summaries, &header)?;
    write_overall(workbook.add_worksheet(), &report.overall, &header)?;
    write_sources(workbook.add_worksheet(), &report.sources, &header)?;

    Ok(workbook)
}

fn write_header(sheet: &mut Worksheet, names: &[&str], format: &Format) -> std::result::Result<(), XlsxError> {
    for (col, name) in names.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, format)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_results(
    sheet: &mut Worksheet,
    results: &[EfficiencyResult],
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name("UPH_Results")?;
    write_header(
        sheet,
        &[
            "BOM",
            "Model",
            "Operation",
            "Optn_Code",
            "Mean_UPH",
            "Wire_Per_Unit",
            "Efficiency",
            "Data_Points",
            "Original_Count",
            "Outliers_Removed",
            "Outlier_Method",
            "Reference_Found",
        ],
        header,
    )?;

    for (i, r) in results.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, &r.product_id)?;
        sheet.write_string(row, 1, &r.equipment_model)?;
        sheet.write_string(row, 2, r.operation_code.as_deref().unwrap_or(NOT_AVAILABLE))?;
        sheet.write_string(row, 3, r.option_code.as_deref().unwrap_or(NOT_AVAILABLE))?;
        sheet.write_number(row, 4, r.mean_throughput)?;
        sheet.write_number(row, 5, r.per_unit_divisor)?;
        sheet.write_number(row, 6, r.efficiency)?;
        sheet.write_number(row, 7, r.data_point_count as f64)?;
        sheet.write_number(row, 8, r.original_count as f64)?;
        sheet.write_number(row, 9, r.outliers_removed_count as f64)?;
        sheet.write_string(row, 10, r.outlier_method.to_string())?;
        sheet.write_boolean(row, 11, r.reference_found)?;
    }
    sheet.autofit();
    Ok(())
}

fn write_model_summary(
    sheet: &mut Worksheet,
    summaries: &[ModelSummary],
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name("Model_Summary")?;
    write_header(
        sheet,
        &[
            "Model",
            "Efficiency_Mean",
            "Efficiency_Std",
            "Groups",
            "Efficiency_Min",
            "Efficiency_Max",
            "Mean_UPH",
            "Mean_Wire_Per_Unit",
        ],
        header,
    )?;

    for (i, m) in summaries.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, &m.equipment_model)?;
        sheet.write_number(row, 1, m.efficiency_mean)?;
        if let Some(std) = m.efficiency_std {
            sheet.write_number(row, 2, std)?;
        }
        sheet.write_number(row, 3, m.group_count as f64)?;
        sheet.write_number(row, 4, m.efficiency_min)?;
        sheet.write_number(row, 5, m.efficiency_max)?;
        sheet.write_number(row, 6, m.mean_throughput)?;
        sheet.write_number(row, 7, m.mean_divisor)?;
    }
    sheet.autofit();
    Ok(())
}

fn write_overall(
    sheet: &mut Worksheet,
    overall: &OverallSummary,
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name("Overall_Summary")?;
    write_header(sheet, &["Metric", "Value"], header)?;

    let rows: [(&str, f64); 7] = [
        ("Average_Efficiency", overall.average_efficiency),
        ("Average_UPH", overall.average_throughput),
        ("Total_Groups", overall.total_groups as f64),
        ("Total_Data_Points", overall.total_data_points as f64),
        ("Total_Original_Points", overall.total_original_points as f64),
        ("Total_Outliers_Removed", overall.total_outliers_removed as f64),
        ("Data_Quality_Percent", overall.data_quality_percent),
    ];
    for (i, (name, value)) in rows.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, *name)?;
        sheet.write_number(row, 1, *value)?;
    }
    sheet.autofit();
    Ok(())
}

fn write_sources(
    sheet: &mut Worksheet,
    sources: &[SourceSummary],
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name("Source_Summary")?;
    write_header(sheet, &["Source", "Rows_Loaded"], header)?;
    for (i, s) in sources.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, &s.source)?;
        sheet.write_number(row, 1, s.rows_loaded as f64)?;
    }
    sheet.autofit();
    Ok(())
}
