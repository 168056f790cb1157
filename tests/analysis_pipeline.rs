use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use phd_utils::config::{AlignmentMode, PipetteRest};
use phd_utils::core::loaders::load_table_csv;
use phd_utils::processors::analysis::{analyse_experiment, AnalysisError, AnalysisRequest};
use phd_utils::processors::discovery::DiscoveryError;
use phd_utils::AnalysisConfig;
use tempfile::TempDir;

/// Tracker export row: frame in column H, X in E, Y in F.
fn write_tracker(path: &Path, rows: &[(i64, f64, f64)]) {
    let mut file = File::create(path).unwrap();
    for (frame, x, y) in rows {
        writeln!(file, "1,{},0.5,,{},{},0,{}", frame, x, y, frame).unwrap();
    }
}

fn write_experiment(dir: &Path, tag: &str) {
    let frames: Vec<i64> = (0..=10).collect();
    let reference: Vec<_> = frames.iter().map(|&f| (f, 100.0, 50.0)).collect();
    let substrate: Vec<_> = frames
        .iter()
        .map(|&f| (f, 100.0 + 0.5 * f as f64, 50.0 + 0.1 * f as f64))
        .collect();
    let pipette: Vec<_> = frames.iter().map(|&f| (f, 10.0, 40.0 - 0.2 * f as f64)).collect();

    write_tracker(&dir.join(format!("Reference_{}.csv", tag)), &reference);
    write_tracker(&dir.join(format!("Substrate_{}.csv", tag)), &substrate);
    write_tracker(&dir.join(format!("Pipette_{}.csv", tag)), &pipette);
}

fn experiment_config() -> AnalysisConfig {
    let yaml = r#"
alignment:
  experiment_duration_s: 10.0
  resample_width_s: 2.0
physics:
  initial_x_displacement: 1.0
  substrate_tip_position: 0.0
  substrate_length: 200.0
  substrate_stiffness: 0.5
  pipette_stiffness: 0.25
"#;
    serde_yaml::from_str(yaml).unwrap()
}

#[test]
fn test_full_pipeline_writes_processed_csv() {
    let dir = TempDir::new().unwrap();
    write_experiment(dir.path(), "42");

    let mut request = AnalysisRequest::new(dir.path(), experiment_config());
    request.contains = Some("42".to_string());
    request.json = true;

    let outcome = analyse_experiment(&request).unwrap();

    assert_eq!(outcome.csv_path, dir.path().join("processed_42.csv"));
    assert_eq!(outcome.rows, 6);
    assert!(outcome.report.is_clean());

    let table = load_table_csv(&outcome.csv_path).unwrap();
    assert_eq!(table.index_name(), "Instant");
    assert_eq!(table.index(), &[0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);

    let x_delta = table.column("X_Delta").unwrap();
    assert_eq!(x_delta[0], 0.0);
    assert!(x_delta.windows(2).all(|w| w[1] > w[0]));

    let y_delta = table.column("Y_Delta").unwrap();
    assert_eq!(y_delta[0], 0.0);

    let normal = table.column("Normal_Force").unwrap();
    assert!((normal[0] - 0.5).abs() < 1e-12);

    let coefficient = table.column("Friction_Coefficient").unwrap();
    assert_eq!(coefficient[0], 0.0);
    assert!(coefficient.iter().all(|c| c.is_finite()));

    let json = fs::read_to_string(dir.path().join("processed_42.json")).unwrap();
    let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 6);
}

#[test]
fn test_frame_inner_alignment() {
    let dir = TempDir::new().unwrap();
    write_experiment(dir.path(), "1");

    let mut config = experiment_config();
    config.alignment.mode = AlignmentMode::FrameInner;
    config.physics.pipette_rest = PipetteRest::Fixed { value: 40.0 };

    let outcome = analyse_experiment(&AnalysisRequest::new(dir.path(), config)).unwrap();
    assert_eq!(outcome.rows, 11);
    assert_eq!(outcome.report.pipette_rest, 40.0);
}

#[test]
fn test_existing_output_is_refused() {
    let dir = TempDir::new().unwrap();
    write_experiment(dir.path(), "7");

    let request = AnalysisRequest::new(dir.path(), experiment_config());
    analyse_experiment(&request).unwrap();
    let first = fs::read_to_string(dir.path().join("processed.csv")).unwrap();

    let result = analyse_experiment(&request);
    assert!(matches!(result, Err(AnalysisError::Write(_))));

    let mut overwrite = request.clone();
    overwrite.overwrite = true;
    analyse_experiment(&overwrite).unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("processed.csv")).unwrap(), first);
}

#[test]
fn test_two_experiments_need_disambiguation() {
    let dir = TempDir::new().unwrap();
    write_experiment(dir.path(), "1");
    write_experiment(dir.path(), "2");

    let request = AnalysisRequest::new(dir.path(), experiment_config());
    let result = analyse_experiment(&request);
    assert!(matches!(
        result,
        Err(AnalysisError::Discovery(DiscoveryError::AmbiguousInput { .. }))
    ));
    assert!(!dir.path().join("processed.csv").exists());

    let mut request = request;
    request.contains = Some("2".to_string());
    assert!(analyse_experiment(&request).is_ok());
}

#[test]
fn test_late_reference_keeps_every_bucket() {
    let dir = TempDir::new().unwrap();
    let reference: Vec<_> = (5..=10).map(|f| (f, 100.0, 50.0)).collect();
    let substrate: Vec<_> = (1..=10).map(|f| (f, 100.0 + f as f64, 50.0)).collect();
    let pipette: Vec<_> = (1..=10).map(|f| (f, 10.0, 40.0)).collect();
    write_tracker(&dir.path().join("reference.csv"), &reference);
    write_tracker(&dir.path().join("substrate.csv"), &substrate);
    write_tracker(&dir.path().join("pipette.csv"), &pipette);

    let mut config = experiment_config();
    config.alignment.resample_width_s = 1.0;

    let outcome = analyse_experiment(&AnalysisRequest::new(dir.path(), config)).unwrap();
    assert_eq!(outcome.rows, 10);

    let table = load_table_csv(&outcome.csv_path).unwrap();
    let expected: Vec<f64> = (1..=10).map(f64::from).collect();
    assert_eq!(table.index(), expected.as_slice());

    let x_delta = table.column("X_Delta").unwrap();
    assert!(x_delta[..4].iter().all(|v| v.is_nan()));
    assert_eq!(&x_delta[4..], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

    // pipette is tracked before the reference appears
    assert_eq!(table.column("Pipette_Y_Position").unwrap()[0], 40.0);
    assert!(table.column("Friction_Coefficient").unwrap()[0].is_nan());
}
