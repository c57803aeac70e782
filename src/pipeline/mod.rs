//! Pipeline Module
//!
//! ## Run Stages
//!
//! ```text
//! STAGE 1: Load        source -> RawTable                 (progress 5 -> 30)
//! STAGE 2: Normalize   RawTable -> MeasurementTable
//! STAGE 3: Date filter optional inclusive window
//! STAGE 4: Aggregate   outlier elimination + reference join (progress 70)
//! STAGE 5: Export      multi-sheet xlsx                   (progress 100)
//! ```
//!
//! A run owns everything it touches. Configuration, the reference locator
//! and the progress observer travel in a [`RunContext`]; nothing is shared
//! between concurrent runs except read access to the reference file.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::acquisition::{load_source, Source};
use crate::aggregation::build_report;
use crate::config::AnalyzerConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::export::{report_file_name, write_report};
use crate::reference::ReferenceLocator;
use crate::schema::{self, ColumnMapping};
use crate::types::{DateRangePreview, MeasurementTable, RunSummary};

// ============================================================================
// Progress
// ============================================================================

/// One-way progress notifications (percent, status).
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, percent: u8, status: &str);
}

impl<F> ProgressObserver for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn on_progress(&self, percent: u8, status: &str) {
        self(percent, status)
    }
}

/// Discards all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _percent: u8, _status: &str) {}
}

/// Logs each milestone at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_progress(&self, percent: u8, status: &str) {
        info!(percent, "{}", status);
    }
}

// ============================================================================
// Run Context
// ============================================================================

/// Everything one run needs besides its inputs.
#[derive(Clone)]
pub struct RunContext {
    pub config: AnalyzerConfig,
    pub reference: ReferenceLocator,
    progress: Arc<dyn ProgressObserver>,
}

impl RunContext {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            reference: ReferenceLocator::from_config(&config.reference),
            config,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_reference(mut self, reference: ReferenceLocator) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_progress(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.progress = Arc::new(observer);
        self
    }

    fn notify(&self, percent: u8, status: &str) {
        self.progress.on_progress(percent, status);
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("config", &self.config)
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Date Window
// ============================================================================

/// Optional inclusive calendar-date bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Parse `YYYY-MM-DD` bounds. Timestamps are accepted and truncated to
    /// their date.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Ok(Self {
            start: start.map(parse_bound).transpose()?,
            end: end.map(parse_bound).transpose()?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

fn parse_bound(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| schema::parse_datetime_text(s).map(|dt| dt.date()))
        .ok_or_else(|| PipelineError::format("date bound", format!("'{s}' is not a YYYY-MM-DD date")))
}

/// Keep records whose date falls inside the window.
///
/// Records without a usable date are dropped once any bound is set. A table
/// with no date column is returned unchanged.
pub fn filter_by_date(mut table: MeasurementTable, window: &DateWindow) -> MeasurementTable {
    if window.is_unbounded() {
        return table;
    }
    if !table.has_dates() {
        warn!("Date bounds given but the source has no date column; skipping date filter");
        return table;
    }

    let before = table.len();
    table
        .records
        .retain(|r| r.date().is_some_and(|d| window.contains(d)));
    info!(
        start = ?window.start,
        end = ?window.end,
        before,
        after = table.len(),
        "Date filter applied"
    );
    table
}

// ============================================================================
// Run (entry points)
// ============================================================================

/// Run the whole pipeline and return the report path.
pub async fn run_pipeline(
    ctx: &RunContext,
    source: &Source,
    output_dir: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<PathBuf> {
    run_pipeline_with_summary(ctx, source, output_dir, &DateWindow::new(start, end))
        .await
        .map(|summary| summary.report_path)
}

/// Run the whole pipeline and return headline numbers with the report path.
pub async fn run_pipeline_with_summary(
    ctx: &RunContext,
    source: &Source,
    output_dir: &Path,
    window: &DateWindow,
) -> Result<RunSummary> {
    info!(source = %source.describe(), output_dir = %output_dir.display(), "Pipeline run started");
    ctx.notify(5, "Loading source data");

    let loaded = load_source(source, &ctx.config.http).await?;
    if loaded.table.is_empty() {
        return Err(PipelineError::EmptyResult { stage: Stage::Load });
    }

    let table = schema::normalize(loaded.table, &ctx.config.schema)?;
    if table.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: Stage::Validation,
        });
    }
    ctx.notify(30, "Source data loaded");

    let reference = ctx.reference.load()?;

    let table = filter_by_date(table, window);
    if table.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: Stage::DateFilter,
        });
    }

    let report = build_report(&table.records, &reference, loaded.sources)?;
    ctx.notify(70, "Outlier filtering and aggregation complete");

    let file_name = report_file_name(
        &ctx.config.output.file_stem,
        chrono::Local::now().naive_local(),
    );
    let report_path = write_report(&report, output_dir, &file_name)?;
    ctx.notify(100, "Report exported");

    Ok(RunSummary {
        report_path,
        total_groups: report.overall.total_groups,
        total_data_points: report.overall.total_data_points,
        total_outliers_removed: report.overall.total_outliers_removed,
        average_efficiency: report.overall.average_efficiency,
        data_quality_percent: report.overall.data_quality_percent,
        sources: report.sources,
    })
}

/// Summarize the date coverage of a source without running the pipeline.
pub async fn preview_date_range(ctx: &RunContext, source: &Source) -> Result<DateRangePreview> {
    let loaded = load_source(source, &ctx.config.http).await?;
    let raw = loaded.table;

    let mapping = ColumnMapping::from_headers(&raw.columns);
    if mapping.date_candidates().is_empty() {
        return Err(PipelineError::Schema {
            missing: vec![schema::CanonicalField::DateTimeStart.name().to_string()],
            available: mapping.columns,
        });
    }
    // Candidates exist but none holds a parseable date
    let Some(date_idx) = mapping.date_column(&raw.rows) else {
        return Err(PipelineError::EmptyResult {
            stage: Stage::DateFilter,
        });
    };

    let dates: Vec<NaiveDate> = raw
        .rows
        .iter()
        .filter_map(|row| row.get(date_idx))
        .filter_map(schema::parse_datetime_cell)
        .map(|dt| dt.date())
        .collect();

    let (Some(&min_date), Some(&max_date)) = (dates.iter().min(), dates.iter().max()) else {
        return Err(PipelineError::EmptyResult {
            stage: Stage::DateFilter,
        });
    };

    let mut monthly_distribution: BTreeMap<String, usize> = BTreeMap::new();
    for d in &dates {
        *monthly_distribution
            .entry(format!("{:04}-{:02}", d.year(), d.month()))
            .or_default() += 1;
    }

    Ok(DateRangePreview {
        date_column: mapping.columns[date_idx].clone(),
        min_date,
        max_date,
        total_days: (max_date - min_date).num_days() + 1,
        valid_records: dates.len(),
        invalid_records: raw.len() - dates.len(),
        monthly_distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeasurementRecord;
    use std::sync::Mutex;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dated_table() -> MeasurementTable {
        let mut records = Vec::new();
        let mut date = day(2024, 1, 1);
        while date <= day(2024, 3, 1) {
            records.push(MeasurementRecord {
                product_id: "A1".into(),
                equipment_model: "WB3100".into(),
                uph: 100.0,
                timestamp: date.and_hms_opt(13, 30, 0),
                operation: None,
                option_code: None,
            });
            date = date.succ_opt().unwrap();
        }
        MeasurementTable {
            records,
            date_column: Some("date_time_start".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_date_window_is_inclusive() {
        let window = DateWindow::new(Some(day(2024, 2, 1)), Some(day(2024, 2, 15)));
        let filtered = filter_by_date(dated_table(), &window);
        assert_eq!(filtered.len(), 15);
        assert!(filtered
            .records
            .iter()
            .all(|r| window.contains(r.date().unwrap())));
        assert_eq!(filtered.records[0].date(), Some(day(2024, 2, 1)));
        assert_eq!(filtered.records[14].date(), Some(day(2024, 2, 15)));
    }

    #[test]
    fn test_single_sided_bounds() {
        let from = DateWindow::new(Some(day(2024, 2, 28)), None);
        assert_eq!(filter_by_date(dated_table(), &from).len(), 3); // Feb 28, 29, Mar 1
        let until = DateWindow::new(None, Some(day(2024, 1, 3)));
        assert_eq!(filter_by_date(dated_table(), &until).len(), 3);
    }

    #[test]
    fn test_undated_records_dropped_when_bounded() {
        let mut table = dated_table();
        table.records[40].timestamp = None;
        let all = table.len();
        let window = DateWindow::new(Some(day(2024, 1, 1)), None);
        assert_eq!(filter_by_date(table, &window).len(), all - 1);
    }

    #[test]
    fn test_no_date_column_skips_filter() {
        let mut table = dated_table();
        table.date_column = None;
        let n = table.len();
        let window = DateWindow::new(Some(day(2030, 1, 1)), None);
        assert_eq!(filter_by_date(table, &window).len(), n);
    }

    #[test]
    fn test_date_window_parse() {
        let w = DateWindow::parse(Some("2024-02-01"), Some("2024-02-15 23:59:59")).unwrap();
        assert_eq!(w.start, Some(day(2024, 2, 1)));
        assert_eq!(w.end, Some(day(2024, 2, 15)));
        assert!(DateWindow::parse(Some("yesterday"), None).is_err());
        assert!(DateWindow::parse(None, None).unwrap().is_unbounded());
    }

    #[tokio::test]
    async fn test_progress_milestones_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("uph.csv");
        let mut csv = String::from("BOM No,Machine Model,UPH\n");
        for i in 0..16 {
            csv.push_str(&format!("A1,WB3100,{}\n", 100 + i % 2));
        }
        std::fs::write(&input, csv).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ctx = RunContext::default()
            .with_reference(ReferenceLocator::Disabled)
            .with_progress(move |pct: u8, _status: &str| sink.lock().unwrap().push(pct));

        let summary = run_pipeline_with_summary(
            &ctx,
            &Source::Path(input),
            &dir.path().join("out"),
            &DateWindow::default(),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![5, 30, 70, 100]);
        assert!(summary.report_path.exists());
        assert_eq!(summary.total_groups, 1);
        assert_eq!(summary.total_data_points, 16);
    }

    #[tokio::test]
    async fn test_preview_counts_and_months() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("uph.csv");
        std::fs::write(
            &input,
            "uph,bom_no,machine_model,Date Time Start\n\
             1,A,M,2024-01-30 08:00:00\n\
             1,A,M,2024-02-02 08:00:00\n\
             1,A,M,2024-02-10\n\
             1,A,M,\n\
             1,A,M,bogus\n",
        )
        .unwrap();

        let preview = preview_date_range(&RunContext::default(), &Source::Path(input))
            .await
            .unwrap();
        assert_eq!(preview.date_column, "date_time_start");
        assert_eq!(preview.min_date, day(2024, 1, 30));
        assert_eq!(preview.max_date, day(2024, 2, 10));
        assert_eq!(preview.total_days, 12);
        assert_eq!(preview.valid_records, 3);
        assert_eq!(preview.invalid_records, 2);
        assert_eq!(preview.monthly_distribution.get("2024-01"), Some(&1));
        assert_eq!(preview.monthly_distribution.get("2024-02"), Some(&2));
    }
}
