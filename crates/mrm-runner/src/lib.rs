//! # mrm-runner
//!
//! Scenario loading and query reports for the `mrm` command-line tool.
//!
//! A scenario is a channel configuration plus named radios:
//!
//! ```yaml
//! seed: 7
//! parameters: ["snr_threshold=8"]
//! obstacles: ["0;0;50;5"]
//! radios:
//!   gateway:
//!     position: { x: -10.0, y: 2.5 }
//!     tx_power_dbm: 3.0
//!   sensor:
//!     position: { x: 60.0, y: 2.5 }
//! ```
//!
//! Query endpoints name a radio or give a literal `x,y` position.

use mrm_common::{Antenna, GeometryError, Point, Transmission, TxPair};
use mrm_model::parameters::TX_POWER;
use mrm_model::{ChannelConfig, ConfigError};
use mrm_raytrace::{
    ChannelError, ChannelModel, DelaySpread, Reception, SignalStrength, Sinr,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Channel model error.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Channel configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed coordinates.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Scenario content that cannot be used.
    #[error("Scenario error: {0}")]
    Scenario(String),
}

// ============================================================================
// Scenario
// ============================================================================

/// A named radio in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    pub position: Point,
    /// Falls back to the `tx_power` parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_power_dbm: Option<f64>,
    #[serde(default)]
    pub antenna: Antenna,
}

/// Channel configuration, radios and an optional RNG seed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(flatten)]
    pub channel: ChannelConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub radios: BTreeMap<String, RadioConfig>,
}

/// One end of a transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    pub position: Point,
    pub tx_power_dbm: Option<f64>,
    pub antenna: Antenna,
}

impl Scenario {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RunnerError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunnerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let scenario = Self::from_yaml_str(&content)?;
        debug!(
            "Loaded scenario {} with {} radios",
            path.display(),
            scenario.radios.len()
        );
        Ok(scenario)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RunnerError> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// A channel model holding this scenario's obstacles and parameters.
    pub fn build_model(&self) -> ChannelModel {
        let mut model = match self.seed {
            Some(seed) => ChannelModel::with_seed(seed),
            None => ChannelModel::new(),
        };
        model.load_config(&self.channel);
        model
    }

    /// Resolve a radio name or an `x,y` position.
    pub fn endpoint(&self, spec: &str) -> Result<Endpoint, RunnerError> {
        if let Some(radio) = self.radios.get(spec) {
            return Ok(Endpoint {
                position: radio.position,
                tx_power_dbm: radio.tx_power_dbm,
                antenna: radio.antenna,
            });
        }
        if !spec.contains(',') {
            return Err(RunnerError::Scenario(format!("Unknown radio '{}'", spec)));
        }
        Ok(Endpoint {
            position: spec.parse()?,
            tx_power_dbm: None,
            antenna: Antenna::Omni,
        })
    }

    /// Transmission from `from` to `to`, using the model's default power
    /// when the source has none of its own.
    pub fn transmission(
        &self,
        model: &ChannelModel,
        from: &str,
        to: &str,
    ) -> Result<Transmission, RunnerError> {
        let source = self.endpoint(from)?;
        let destination = self.endpoint(to)?;
        if source.position == destination.position {
            return Err(RunnerError::Scenario(format!(
                "Source and destination are both at {}",
                source.position
            )));
        }
        let power = source.tx_power_dbm.unwrap_or_else(|| model.get(&TX_POWER));
        Ok(Transmission::new(source.position, destination.position, power)
            .with_tx_antenna(source.antenna)
            .with_rx_antenna(destination.antenna))
    }
}

// ============================================================================
// Query Report
// ============================================================================

/// Everything `mrm query` prints for one transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReport {
    pub source: Point,
    pub destination: Point,
    pub tx_power_dbm: f64,
    pub distance_m: f64,
    pub paths: usize,
    pub signal: SignalStrength,
    pub sinr: Sinr,
    pub reception: Reception,
    pub delay_spread: DelaySpread,
}

/// Evaluate `tx` against `model`.
pub fn query(model: &mut ChannelModel, tx: &Transmission, interference_dbm: f64) -> QueryReport {
    QueryReport {
        source: tx.source,
        destination: tx.destination,
        tx_power_dbm: tx.tx_power_dbm,
        distance_m: tx.distance(),
        paths: model.connecting_paths(tx).len(),
        signal: model.received_signal_strength(tx),
        sinr: model.sinr(tx, interference_dbm),
        reception: model.probability_of_reception(tx, interference_dbm),
        delay_spread: model.delay_spread(tx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrm_model::parameters::SNR_THRESHOLD;
    use mrm_raytrace::RayKind;

    const WALL_SCENARIO: &str = r#"
seed: 7
parameters:
  - snr_threshold=8
  - tx_antenna_gain=3
obstacles:
  - 0;0;50;5
radios:
  gateway:
    position: { x: -10.0, y: 2.5 }
    tx_power_dbm: 3.0
  sensor:
    position: { x: 60.0, y: 2.5 }
"#;

    #[test]
    fn test_scenario_parse() {
        let scenario = Scenario::from_yaml_str(WALL_SCENARIO).unwrap();
        assert_eq!(scenario.seed, Some(7));
        assert_eq!(scenario.channel.obstacles, vec!["0;0;50;5".to_string()]);
        assert_eq!(scenario.radios.len(), 2);
        assert_eq!(scenario.radios["sensor"].tx_power_dbm, None);
        assert_eq!(scenario.radios["sensor"].antenna, Antenna::Omni);
    }

    #[test]
    fn test_build_model() {
        let scenario = Scenario::from_yaml_str(WALL_SCENARIO).unwrap();
        let model = scenario.build_model();
        assert_eq!(model.obstacle_count(), 1);
        assert_eq!(model.get(&SNR_THRESHOLD), 8.0);
    }

    #[test]
    fn test_endpoints() {
        let scenario = Scenario::from_yaml_str(WALL_SCENARIO).unwrap();

        let gateway = scenario.endpoint("gateway").unwrap();
        assert_eq!(gateway.position, Point::new(-10.0, 2.5));
        assert_eq!(gateway.tx_power_dbm, Some(3.0));

        let literal = scenario.endpoint("-5,7.5").unwrap();
        assert_eq!(literal.position, Point::new(-5.0, 7.5));
        assert_eq!(literal.tx_power_dbm, None);

        assert!(matches!(scenario.endpoint("nobody"), Err(RunnerError::Scenario(_))));
        assert!(matches!(scenario.endpoint("1,x"), Err(RunnerError::Geometry(_))));
    }

    #[test]
    fn test_transmission_power() {
        let scenario = Scenario::from_yaml_str(WALL_SCENARIO).unwrap();
        let model = scenario.build_model();

        let from_gateway = scenario.transmission(&model, "gateway", "sensor").unwrap();
        assert_eq!(from_gateway.tx_power_dbm, 3.0);

        let from_sensor = scenario.transmission(&model, "sensor", "gateway").unwrap();
        assert_eq!(from_sensor.tx_power_dbm, 1.5);

        assert!(scenario.transmission(&model, "sensor", "60,2.5").is_err());
    }

    #[test]
    fn test_query_report() {
        let scenario = Scenario::from_yaml_str(WALL_SCENARIO).unwrap();
        let mut model = scenario.build_model();
        let tx = scenario.transmission(&model, "gateway", "sensor").unwrap();

        let report = query(&mut model, &tx, f64::MIN);
        assert_eq!(report.paths, 1);
        assert_eq!(report.distance_m, 70.0);
        assert_eq!(report.signal.variance, 4.0);
        assert_eq!(report.sinr.variance, 5.0);
        assert_eq!(report.reception.probability, 0.0);
        assert_eq!(report.delay_spread.worst_case_us, 0.0);

        let paths = model.connecting_paths(&tx);
        assert_eq!(paths[0].kinds()[1], RayKind::Refraction);
    }

    #[test]
    fn test_query_report_without_paths_round_trips() {
        let scenario = Scenario::from_yaml_str(
            "seed: 2\nparameters: [rt_disallow_direct_path=true]\n",
        )
        .unwrap();
        let mut model = scenario.build_model();
        let tx = scenario.transmission(&model, "0,0", "100,0").unwrap();

        let report = query(&mut model, &tx, f64::MIN);
        assert_eq!(report.paths, 0);
        assert_eq!(report.signal.mean_dbm, f64::NEG_INFINITY);
        assert_eq!(report.reception.probability, 0.0);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""mean_dbm":null"#));
        let reparsed: QueryReport = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, report);
    }

    #[test]
    fn test_save_keeps_radios() {
        let scenario = Scenario::from_yaml_str(WALL_SCENARIO).unwrap();
        let model = scenario.build_model();
        let saved = Scenario {
            channel: model.to_config(),
            ..scenario.clone()
        };

        let reloaded = Scenario::from_yaml_str(&serde_yaml::to_string(&saved).unwrap()).unwrap();
        assert_eq!(reloaded.radios, scenario.radios);
        assert_eq!(reloaded.channel.parameters, vec!["snr_threshold=8".to_string()]);
    }
}
