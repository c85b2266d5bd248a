//! # mrm-runner
//!
//! CLI for the MRM ray tracing radio propagation engine.
//!
//! Loads a scenario file and answers propagation queries against it.

use mrm_common::Rect;
use mrm_model::ALL_PARAMETERS;
use mrm_raytrace::coverage::{self, CancelToken, CoverageMetric, CoverageRequest};
use mrm_runner::{query, RunnerError, Scenario};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Argument Parsing
// ============================================================================

/// Parse an area given as `x,y,width,height`.
fn parse_area(s: &str) -> Result<Rect, String> {
    let rect: Rect = s
        .replace(',', ";")
        .parse()
        .map_err(|e| format!("Invalid area '{}': {}", s, e))?;
    if rect.is_empty() {
        return Err(format!("Area '{}' has no extent", s));
    }
    Ok(rect)
}

// ============================================================================
// CLI Configuration
// ============================================================================

/// MRM - multi-path ray tracing radio propagation
#[derive(Parser, Debug)]
#[command(name = "mrm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all channel parameters with descriptions and defaults
    Parameters,
    /// Evaluate one transmission and print the result as JSON
    Query(QueryConfig),
    /// Print the traced rays of one transmission
    Trace(TraceConfig),
    /// Compute a coverage map for one transmitter
    Coverage(CoverageConfig),
    /// Re-save a scenario, keeping only non-default parameters
    Save(SaveConfig),
}

/// Source and destination of a transmission.
#[derive(Args, Debug)]
pub struct LinkConfig {
    /// Scenario YAML file
    pub scenario: PathBuf,

    /// Transmitter: radio name or x,y position
    #[arg(long, allow_hyphen_values = true)]
    pub from: String,

    /// Receiver: radio name or x,y position
    #[arg(long, allow_hyphen_values = true)]
    pub to: String,
}

#[derive(Args, Debug)]
pub struct QueryConfig {
    #[command(flatten)]
    pub link: LinkConfig,

    /// Interference at the receiver in dBm (default: none)
    #[arg(long, allow_negative_numbers = true)]
    pub interference: Option<f64>,
}

#[derive(Args, Debug)]
pub struct TraceConfig {
    #[command(flatten)]
    pub link: LinkConfig,

    /// Print the ray segments as JSON instead of the log
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CoverageConfig {
    /// Scenario YAML file
    pub scenario: PathBuf,

    /// Transmitter: radio name or x,y position
    #[arg(long, allow_hyphen_values = true)]
    pub from: String,

    /// Area as x,y,width,height
    #[arg(long, allow_hyphen_values = true, value_parser = parse_area)]
    pub area: Rect,

    #[arg(long, default_value = "50")]
    pub columns: usize,

    #[arg(long, default_value = "50")]
    pub rows: usize,

    #[arg(long, default_value = "signal_strength")]
    pub metric: CoverageMetric,

    /// Output JSON file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cancel the computation after this many seconds
    #[arg(long)]
    pub timeout_s: Option<f64>,
}

#[derive(Args, Debug)]
pub struct SaveConfig {
    /// Scenario YAML file
    pub scenario: PathBuf,

    /// Output scenario file
    #[arg(short, long)]
    pub output: PathBuf,
}

// ============================================================================
// Commands
// ============================================================================

fn query_command(config: QueryConfig) -> Result<(), RunnerError> {
    let scenario = Scenario::load(&config.link.scenario)?;
    let mut model = scenario.build_model();
    let tx = scenario.transmission(&model, &config.link.from, &config.link.to)?;

    let report = query(&mut model, &tx, config.interference.unwrap_or(f64::MIN));
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn trace_command(config: TraceConfig) -> Result<(), RunnerError> {
    let scenario = Scenario::load(&config.link.scenario)?;
    let mut model = scenario.build_model();
    let tx = scenario.transmission(&model, &config.link.from, &config.link.to)?;

    let traced = model.traced_rays(&tx);
    if config.json {
        println!("{}", serde_json::to_string_pretty(&traced.segments)?);
    } else {
        print!("{}", traced.log);
    }
    Ok(())
}

fn coverage_command(config: CoverageConfig) -> Result<(), RunnerError> {
    let scenario = Scenario::load(&config.scenario)?;
    let model = scenario.build_model();
    let source = scenario.endpoint(&config.from)?;

    let request = CoverageRequest {
        source: source.position,
        tx_power_dbm: source
            .tx_power_dbm
            .unwrap_or_else(|| model.get(&mrm_model::parameters::TX_POWER)),
        tx_antenna: source.antenna,
        area: config.area,
        columns: config.columns,
        rows: config.rows,
        metric: config.metric,
    };

    let cancel = CancelToken::new();
    let handle = coverage::spawn(model.into_shared(), request, cancel.clone(), |progress| {
        eprintln!("Coverage: column {}/{}", progress.done, progress.total);
    });

    let started = Instant::now();
    let timeout = config.timeout_s.map(Duration::from_secs_f64);
    while !handle.is_finished() {
        if timeout.is_some_and(|limit| started.elapsed() >= limit) {
            warn!("Coverage timed out after {:?}, cancelling", started.elapsed());
            cancel.cancel();
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    let map = handle
        .join()
        .map_err(|_| RunnerError::Scenario("Coverage worker panicked".to_string()))??;

    let json = serde_json::to_string_pretty(&map)?;
    match config.output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{}", json),
    }
    Ok(())
}

fn save_command(config: SaveConfig) -> Result<(), RunnerError> {
    let scenario = Scenario::load(&config.scenario)?;
    let model = scenario.build_model();
    let saved = Scenario {
        channel: model.to_config(),
        ..scenario
    };
    saved.save(&config.output)
}

fn main() -> Result<(), RunnerError> {
    // Initialize tracing subscriber with RUST_LOG env filter
    // Default to "warn" level if RUST_LOG is not set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parameters => print_parameters_info(),
        Commands::Query(config) => query_command(config)?,
        Commands::Trace(config) => trace_command(config)?,
        Commands::Coverage(config) => coverage_command(config)?,
        Commands::Save(config) => save_command(config)?,
    }

    Ok(())
}

/// Print every channel parameter with its description and default
fn print_parameters_info() {
    println!("MRM Channel Parameters");
    println!("======================\n");
    println!("Parameters are set in the `parameters` list of a scenario file as");
    println!("name=value entries. Only values that differ from the default are saved.\n");

    for def in ALL_PARAMETERS {
        println!("  {}", def.name);
        println!("    {}", def.description);
        print!("    Default: {}", def.default_value());
        if let Some(unit) = def.unit {
            print!(" {}", unit);
        }
        println!();
        println!();
    }

    println!("## YAML Example\n");
    println!("```yaml");
    println!("parameters:");
    println!("  - snr_threshold=8");
    println!("  - rt_max_reflections=2");
    println!("obstacles:");
    println!("  - 0;0;50;5");
    println!("radios:");
    println!("  gateway:");
    println!("    position: {{ x: -10.0, y: 2.5 }}");
    println!("```\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_area() {
        assert_eq!(parse_area("-10,0,30,20"), Ok(Rect::new(-10.0, 0.0, 30.0, 20.0)));
        assert!(parse_area("0,0,0,5").is_err());
        assert!(parse_area("0,0,5").is_err());
    }

    #[test]
    fn test_coverage_config_parse() {
        let cli = Cli::try_parse_from([
            "mrm", "coverage", "scene.yaml", "--from", "-10,2.5", "--area", "-20,-20,40,40",
            "--metric", "snr",
        ])
        .unwrap();

        match cli.command {
            Commands::Coverage(config) => {
                assert_eq!(config.from, "-10,2.5");
                assert_eq!(config.area, Rect::new(-20.0, -20.0, 40.0, 40.0));
                assert_eq!(config.metric, CoverageMetric::Snr);
                assert_eq!(config.columns, 50);
                assert!(config.timeout_s.is_none());
            }
            _ => panic!("Expected coverage command"),
        }
    }

    #[test]
    fn test_query_config_negative_interference() {
        let cli = Cli::try_parse_from([
            "mrm", "query", "scene.yaml", "--from", "gateway", "--to", "0,0", "--interference",
            "-90",
        ])
        .unwrap();

        match cli.command {
            Commands::Query(config) => assert_eq!(config.interference, Some(-90.0)),
            _ => panic!("Expected query command"),
        }
    }
}
