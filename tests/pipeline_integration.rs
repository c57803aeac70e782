//! Pipeline Integration Tests
//!
//! Runs the public entry points end to end over files written to a scratch
//! directory and reads the exported workbook back with calamine.

use calamine::{open_workbook_auto, Data, Range, Reader};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use uph_analyzer::{
    run_pipeline, run_pipeline_with_summary, AnalyzerConfig, DateWindow, PipelineError,
    ReferenceLocator, RunContext, Source, Stage,
};

// ============================================================================
// Fixtures
// ============================================================================

/// 15 steady readings around 100 plus one spike at 500 for A1, and a
/// three-reading B2 group that is too small to filter. Two junk rows are
/// dropped during normalization.
fn write_measurements(dir: &Path) -> PathBuf {
    let mut csv = String::from("BOM No,Machine Model,UPH,Operation,Optn Code,Date Time Start\n");
    for i in 0..15 {
        let uph = [99, 100, 101][i % 3];
        writeln!(csv, "a1 ,WB3100-XYZ,{uph},WB,X1,2024-02-{:02} 08:00:00", i + 1).unwrap();
    }
    csv.push_str("A1,WB3100-XYZ,500,WB,X1,2024-02-16 08:00:00\n");
    csv.push_str("B2,wb3200,200,DA,,2024-02-03 09:30:00\n");
    csv.push_str("B2,wb3200,210,DA,,2024-02-04 09:30:00\n");
    csv.push_str("B2,wb3200,220,DA,,2024-02-05 09:30:00\n");
    csv.push_str("B2,wb3200,n/a,DA,,2024-02-06 09:30:00\n");
    csv.push_str(",WB3200,180,DA,,2024-02-07 09:30:00\n");

    let path = dir.join("uph_export.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn write_reference(dir: &Path) -> PathBuf {
    let path = dir.join("wire_reference.csv");
    std::fs::write(&path, "BOM No,Number Required,No Bump\nA1,5,10\n").unwrap();
    path
}

fn context(reference: ReferenceLocator) -> RunContext {
    RunContext::new(AnalyzerConfig::default()).with_reference(reference)
}

fn sheet(path: &Path, name: &str) -> Range<Data> {
    let mut workbook = open_workbook_auto(path).unwrap();
    workbook.worksheet_range(name).unwrap()
}

fn text(range: &Range<Data>, row: u32, col: u32) -> String {
    match range.get_value((row, col)) {
        Some(Data::String(s)) => s.clone(),
        other => panic!("expected text at ({row},{col}), got {other:?}"),
    }
}

fn number(range: &Range<Data>, row: u32, col: u32) -> f64 {
    match range.get_value((row, col)) {
        Some(Data::Float(f)) => *f,
        Some(Data::Int(i)) => *i as f64,
        other => panic!("expected number at ({row},{col}), got {other:?}"),
    }
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn csv_run_produces_expected_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_measurements(dir.path());
    let reference = write_reference(dir.path());
    let out = dir.path().join("reports");

    let ctx = context(ReferenceLocator::Explicit(reference));
    let summary = run_pipeline_with_summary(&ctx, &Source::Path(input), &out, &DateWindow::default())
        .await
        .unwrap();

    let name = summary.report_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("uph_efficiency_") && name.ends_with(".xlsx"), "{name}");
    assert_eq!(summary.report_path.parent(), Some(out.as_path()));
    assert_eq!(summary.total_groups, 2);
    assert_eq!(summary.total_data_points, 18);
    assert_eq!(summary.total_outliers_removed, 1);
    assert_eq!(summary.data_quality_percent, 94.74);

    let results = sheet(&summary.report_path, "UPH_Results");
    assert_eq!(results.height(), 3);

    // A1 sorts first; spike removed, family collapsed, divisor 10/2 + 5
    assert_eq!(text(&results, 1, 0), "A1");
    assert_eq!(text(&results, 1, 1), "WB3100");
    assert_eq!(text(&results, 1, 2), "WB");
    assert_eq!(text(&results, 1, 3), "X1");
    assert_eq!(number(&results, 1, 4), 100.0);
    assert_eq!(number(&results, 1, 5), 10.0);
    assert_eq!(number(&results, 1, 6), 10.0);
    assert_eq!(number(&results, 1, 7), 15.0);
    assert_eq!(number(&results, 1, 8), 16.0);
    assert_eq!(number(&results, 1, 9), 1.0);
    assert_eq!(text(&results, 1, 10), "Z-Score Loop x1");
    assert_eq!(results.get_value((1, 11)), Some(&Data::Bool(true)));

    // B2 has no reference entry and is below the filtering threshold
    assert_eq!(text(&results, 2, 0), "B2");
    assert_eq!(text(&results, 2, 1), "WB3200");
    assert_eq!(text(&results, 2, 3), "N/A");
    assert_eq!(number(&results, 2, 4), 210.0);
    assert_eq!(number(&results, 2, 5), 1.0);
    assert_eq!(number(&results, 2, 6), 210.0);
    assert_eq!(text(&results, 2, 10), "Not filtered (small group)");
    assert_eq!(results.get_value((2, 11)), Some(&Data::Bool(false)));

    let overall = sheet(&summary.report_path, "Overall_Summary");
    assert_eq!(text(&overall, 1, 0), "Average_Efficiency");
    assert_eq!(number(&overall, 1, 1), 110.0);
    assert_eq!(text(&overall, 7, 0), "Data_Quality_Percent");
    assert_eq!(number(&overall, 7, 1), 94.74);

    let models = sheet(&summary.report_path, "Model_Summary");
    assert_eq!(models.height(), 3);
    // one group per model: no sample std
    assert_eq!(models.get_value((1, 2)), Some(&Data::Empty));
}

#[tokio::test]
async fn date_window_narrows_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_measurements(dir.path());
    let ctx = context(ReferenceLocator::Disabled);

    let window = DateWindow::parse(Some("2024-02-03"), Some("2024-02-05")).unwrap();
    let summary = run_pipeline_with_summary(&ctx, &Source::Path(input), dir.path(), &window)
        .await
        .unwrap();

    // A1 on Feb 3-5 and all three B2 rows
    assert_eq!(summary.total_groups, 2);
    assert_eq!(summary.total_data_points, 6);
    assert_eq!(summary.total_outliers_removed, 0);
}

#[tokio::test]
async fn window_outside_data_is_empty_result() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_measurements(dir.path());
    let out = dir.path().join("reports");
    let start = chrono::NaiveDate::from_ymd_opt(2025, 1, 1);

    let err = run_pipeline(&context(ReferenceLocator::Disabled), &Source::Path(input), &out, start, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyResult { stage: Stage::DateFilter }), "{err}");
    assert!(!out.exists(), "no report directory should be created");
}

#[tokio::test]
async fn json_file_with_wrapped_records() {
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<serde_json::Value> = (0..20)
        .map(|i| {
            serde_json::json!({
                "bom": "P9",
                "model": "WB3300 rev2",
                "UPH": 240 + (i % 5),
                "timestamp": format!("2024-03-{:02}T10:00:00", i + 1),
            })
        })
        .collect();
    let path = dir.path().join("api_dump.json");
    std::fs::write(&path, serde_json::json!({ "results": records }).to_string()).unwrap();

    let summary = run_pipeline_with_summary(
        &context(ReferenceLocator::Disabled),
        &Source::Path(path),
        &dir.path().join("out"),
        &DateWindow::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.total_groups, 1);
    assert_eq!(summary.total_data_points, 20);
    let results = sheet(&summary.report_path, "UPH_Results");
    assert_eq!(text(&results, 1, 1), "WB3300");
    assert_eq!(number(&results, 1, 4), 242.0);
    assert_eq!(text(&results, 1, 2), "N/A");
}

#[tokio::test]
async fn multiple_files_are_concatenated_with_source_summary() {
    let dir = tempfile::tempdir().unwrap();
    let jan = dir.path().join("jan.csv");
    let feb = dir.path().join("feb.csv");
    std::fs::write(&jan, "uph,bom_no,machine_model\n100,A1,WB3100\n102,A1,WB3100\n").unwrap();
    // different column order and an extra column
    std::fs::write(
        &feb,
        "Machine Model,BOM No,UPH,Shift\nWB3100,A1,104,night\nWB3100,A1,106,day\nWB3100,C3,50,day\n",
    )
    .unwrap();

    let summary = run_pipeline_with_summary(
        &context(ReferenceLocator::Disabled),
        &Source::Paths(vec![jan, feb]),
        dir.path(),
        &DateWindow::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.total_groups, 2);
    assert_eq!(summary.sources.len(), 2);
    assert_eq!(summary.sources[0].source, "jan.csv");
    assert_eq!(summary.sources[0].rows_loaded, 2);
    assert_eq!(summary.sources[1].rows_loaded, 3);

    let results = sheet(&summary.report_path, "UPH_Results");
    assert_eq!(number(&results, 1, 4), 103.0);

    let sources = sheet(&summary.report_path, "Source_Summary");
    assert_eq!(text(&sources, 2, 0), "feb.csv");
    assert_eq!(number(&sources, 2, 1), 3.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_into_one_directory_keep_every_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_measurements(dir.path());
    let out = dir.path().join("reports");
    let ctx = context(ReferenceLocator::Disabled);
    let source = Source::Path(input);
    let window = DateWindow::default();

    let run = || run_pipeline_with_summary(&ctx, &source, &out, &window);
    let (a, b, c, d) = tokio::join!(run(), run(), run(), run());
    let paths: Vec<PathBuf> = [a, b, c, d].into_iter().map(|r| r.unwrap().report_path).collect();

    let unique: std::collections::HashSet<_> = paths.iter().collect();
    assert_eq!(unique.len(), 4, "{paths:?}");
    for path in &paths {
        let results = sheet(path, "UPH_Results");
        assert_eq!(results.height(), 3);
    }
    let leftovers: Vec<_> = std::fs::read_dir(&out)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert!(leftovers.is_empty());
}

// ============================================================================
// Failure classes
// ============================================================================

#[tokio::test]
async fn missing_required_column_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    std::fs::write(&path, "bom_no,uph\nA1,100\n").unwrap();
    let out = dir.path().join("out");

    let err = run_pipeline(&context(ReferenceLocator::Disabled), &Source::Path(path), &out, None, None)
        .await
        .unwrap_err();
    match err {
        PipelineError::Schema { missing, available } => {
            assert_eq!(missing, vec!["machine_model".to_string()]);
            assert!(available.contains(&"bom_no".to_string()));
        }
        other => panic!("expected schema error, got {other}"),
    }
    assert!(!out.exists());
}

#[tokio::test]
async fn header_only_file_is_empty_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "uph,bom_no,machine_model\n").unwrap();

    let err = run_pipeline(&context(ReferenceLocator::Disabled), &Source::Path(path), dir.path(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyResult { stage: Stage::Load }), "{err}");
}

#[tokio::test]
async fn all_rows_invalid_is_empty_at_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.csv");
    std::fs::write(&path, "uph,bom_no,machine_model\nabc,A1,WB3100\n,A1,WB3100\n").unwrap();

    let err = run_pipeline(&context(ReferenceLocator::Disabled), &Source::Path(path), dir.path(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyResult { stage: Stage::Validation }), "{err}");
}

#[tokio::test]
async fn missing_input_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_pipeline(
        &context(ReferenceLocator::Disabled),
        &Source::Path(dir.path().join("nope.csv")),
        dir.path(),
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }), "{err}");
    assert!(err.is_input_error());
}

#[tokio::test]
async fn unsupported_extension_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.parquet");
    std::fs::write(&path, b"PAR1").unwrap();
    let err = run_pipeline(&context(ReferenceLocator::Disabled), &Source::Path(path), dir.path(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Format { .. }), "{err}");
}

#[tokio::test]
async fn explicit_reference_that_is_missing_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_measurements(dir.path());
    let ctx = context(ReferenceLocator::Explicit(dir.path().join("Book6_Wire Data.xlsx")));

    let err = run_pipeline(&ctx, &Source::Path(input), dir.path(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ReferenceUnavailable { .. }), "{err}");
}

#[tokio::test]
async fn scanned_reference_is_found_by_name_hint() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_measurements(dir.path());
    let map_dir = dir.path().join("data_MAP");
    std::fs::create_dir(&map_dir).unwrap();
    write_reference(&map_dir);

    let ctx = context(ReferenceLocator::Scan {
        dir: map_dir,
        hints: vec!["wire".into()],
    });
    let summary = run_pipeline_with_summary(&ctx, &Source::Path(input), dir.path(), &DateWindow::default())
        .await
        .unwrap();
    let results = sheet(&summary.report_path, "UPH_Results");
    assert_eq!(number(&results, 1, 6), 10.0);
}

#[cfg(unix)]
#[tokio::test]
async fn unwritable_output_is_export_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_measurements(dir.path());
    // a regular file where the output directory should be
    let blocker = dir.path().join("reports");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let err = run_pipeline(&context(ReferenceLocator::Disabled), &Source::Path(input), &blocker, None, None)
        .await
        .unwrap_err();
    assert!(err.is_export(), "{err}");
}
