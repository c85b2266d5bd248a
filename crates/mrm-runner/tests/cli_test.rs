//! Command-line integration tests for the `mrm` tool.
//!
//! Each test writes a scenario into a temporary directory, runs the built
//! binary against it and checks the JSON or text it produces.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

use serde::Deserialize;

// ============================================================================
// JSON Deserialization Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Reception {
    probability: f64,
}

#[derive(Debug, Deserialize)]
struct Signal {
    mean_dbm: Option<f64>,
    variance: f64,
}

#[derive(Debug, Deserialize)]
struct QueryReport {
    distance_m: f64,
    paths: usize,
    signal: Signal,
    reception: Reception,
}

#[derive(Debug, Deserialize)]
struct CoverageMap {
    metric: String,
    columns: usize,
    rows: usize,
    values: Vec<Option<f64>>,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SavedScenario {
    #[serde(default)]
    parameters: Vec<String>,
    #[serde(default)]
    obstacles: Vec<String>,
    #[serde(default)]
    radios: serde_yaml::Mapping,
}

// ============================================================================
// Test Helper Functions
// ============================================================================

const WALL_SCENARIO: &str = r#"
seed: 3
parameters:
  - snr_threshold=8
  - tx_antenna_gain=3
  - snr_threshold_typo=1
obstacles:
  - 0;0;50;5
radios:
  gateway:
    position: { x: -10.0, y: 2.5 }
  sensor:
    position: { x: 60.0, y: 2.5 }
"#;

fn write_scenario(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("scenario.yaml");
    fs::write(&path, content).expect("Failed to write scenario");
    path
}

fn run_mrm(args: &[&str], scenario: &Path) -> Output {
    // CARGO_BIN_EXE_mrm is set by cargo when running tests for this crate
    let binary = env!("CARGO_BIN_EXE_mrm");
    let mut cmd = Command::new(binary);
    cmd.arg(args[0]);
    cmd.arg(scenario);
    cmd.args(&args[1..]);
    cmd.output().expect("Failed to execute mrm")
}

fn stdout_of(output: &Output) -> String {
    if !output.status.success() {
        panic!(
            "mrm failed:\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn free_space_gain(distance_m: f64) -> f64 {
    (-32.44 - 20.0 * 2400f64.log10() - 20.0 * (distance_m / 1000.0).log10()).min(0.0)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_query_through_wall() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let scenario = write_scenario(&dir, WALL_SCENARIO);

    let output = run_mrm(&["query", "--from", "gateway", "--to", "sensor"], &scenario);
    let report: QueryReport = serde_json::from_str(&stdout_of(&output)).expect("Invalid JSON");

    assert_eq!(report.paths, 1);
    assert_eq!(report.distance_m, 70.0);
    let expected = 1.5 - 3.0 - 150.0 + free_space_gain(70.0);
    assert!((report.signal.mean_dbm.expect("signal") - expected).abs() < 1e-6);
    assert_eq!(report.signal.variance, 4.0);
    assert_eq!(report.reception.probability, 0.0);
}

#[test]
fn test_query_literal_positions_in_free_space() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let scenario = write_scenario(&dir, "seed: 1\n");

    let output = run_mrm(
        &["query", "--from", "-50,0", "--to", "50,0", "--interference", "-120"],
        &scenario,
    );
    let report: QueryReport = serde_json::from_str(&stdout_of(&output)).expect("Invalid JSON");

    assert_eq!(report.paths, 1);
    let expected = 1.5 + free_space_gain(100.0);
    assert!((report.signal.mean_dbm.expect("signal") - expected).abs() < 1e-6);
    assert!(report.reception.probability > 0.99);
}

#[test]
fn test_query_without_paths_reports_no_signal() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let scenario = write_scenario(&dir, "parameters:\n  - rt_disallow_direct_path=true\n");

    let output = run_mrm(&["query", "--from", "0,0", "--to", "100,0"], &scenario);
    let report: QueryReport = serde_json::from_str(&stdout_of(&output)).expect("Invalid JSON");

    assert_eq!(report.paths, 0);
    assert_eq!(report.signal.mean_dbm, None);
    assert_eq!(report.reception.probability, 0.0);
}

#[test]
fn test_query_unknown_radio_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let scenario = write_scenario(&dir, WALL_SCENARIO);

    let output = run_mrm(&["query", "--from", "gateway", "--to", "nobody"], &scenario);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nobody"));
}

#[test]
fn test_trace_log_and_segments() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let scenario = write_scenario(&dir, WALL_SCENARIO);

    let log = stdout_of(&run_mrm(&["trace", "--from", "gateway", "--to", "sensor"], &scenario));
    assert!(log.starts_with("Signal components:"));
    assert!(log.contains("Refraction"));
    assert!(log.contains("Reception probability:"));

    let json = stdout_of(&run_mrm(
        &["trace", "--from", "gateway", "--to", "sensor", "--json"],
        &scenario,
    ));
    let segments: Vec<serde_json::Value> = serde_json::from_str(&json).expect("Invalid JSON");
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0]["p1"]["x"], -10.0);
}

#[test]
fn test_coverage_to_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let scenario = write_scenario(&dir, WALL_SCENARIO);
    let output_path = dir.path().join("coverage.json");

    let output = run_mrm(
        &[
            "coverage",
            "--from",
            "gateway",
            "--area",
            "-20,-20,100,45",
            "--columns",
            "4",
            "--rows",
            "3",
            "--metric",
            "reception_probability",
            "--output",
            output_path.to_str().expect("UTF-8 temp path"),
        ],
        &scenario,
    );
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Coverage: column 4/4"));

    let map: CoverageMap =
        serde_json::from_str(&fs::read_to_string(&output_path).expect("No coverage output"))
            .expect("Invalid JSON");
    assert_eq!(map.metric, "reception_probability");
    assert_eq!((map.columns, map.rows), (4, 3));
    assert_eq!(map.values.len(), 12);
    let (min, max) = (map.min.expect("min"), map.max.expect("max"));
    assert!((0.0..=1.0).contains(&min));
    assert!(min <= max && max <= 1.0);
}

#[test]
fn test_coverage_timeout_writes_nothing() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let scenario = write_scenario(&dir, WALL_SCENARIO);
    let output_path = dir.path().join("coverage.json");

    let output = run_mrm(
        &[
            "coverage",
            "--from",
            "gateway",
            "--area",
            "-100,-100,200,200",
            "--columns",
            "400",
            "--rows",
            "400",
            "--timeout-s",
            "0",
            "--output",
            output_path.to_str().expect("UTF-8 temp path"),
        ],
        &scenario,
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Cancelled"));
    assert!(!output_path.exists());
}

#[test]
fn test_save_drops_defaults_and_unknown_names() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let scenario = write_scenario(&dir, WALL_SCENARIO);
    let output_path = dir.path().join("saved.yaml");

    let output = run_mrm(
        &["save", "--output", output_path.to_str().expect("UTF-8 temp path")],
        &scenario,
    );
    assert!(output.status.success());

    let saved: SavedScenario =
        serde_yaml::from_str(&fs::read_to_string(&output_path).expect("No saved scenario"))
            .expect("Invalid YAML");
    assert_eq!(saved.parameters, vec!["snr_threshold=8".to_string()]);
    assert_eq!(saved.obstacles, vec!["0;0;50;5".to_string()]);
    assert_eq!(saved.radios.len(), 2);
}

#[test]
fn test_parameters_listing() {
    let binary = env!("CARGO_BIN_EXE_mrm");
    let output = Command::new(binary)
        .arg("parameters")
        .output()
        .expect("Failed to execute mrm");
    let text = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for name in ["apply_random", "frequency", "rt_max_rays", "obstacle_attenuation"] {
        assert!(text.contains(name), "missing parameter {}", name);
    }
    assert!(text.contains("Default: 2400 MHz"));
}
