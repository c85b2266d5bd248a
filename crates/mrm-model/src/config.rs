//! Persisted channel configuration.
//!
//! The document carries only what differs from a fresh engine: non-default
//! parameters as `name=value` entries and obstacles as
//! `minX;minY;width;height` entries.
//!
//! ```yaml
//! parameters:
//!   - obstacle_attenuation=-5
//!   - rt_max_rays=3
//! obstacles:
//!   - 0;0;50;5
//! ```
//!
//! Loading is tolerant. Unknown names, malformed entries and unparsable
//! values are logged and skipped, and a few legacy names are converted.

use crate::parameters::{ChannelParameters, ParameterError, FREQUENCY};
use mrm_common::{Rect, SPEED_OF_LIGHT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Legacy key holding the wavelength in metres instead of a frequency.
pub const LEGACY_WAVELENGTH: &str = "wavelength";

/// Legacy keys without a current parameter. Antenna gains are now supplied
/// per transmission; scattering and the capture effect are not modelled.
pub const LEGACY_REMOVED: &[&str] = &[
    "tx_antenna_gain",
    "rx_antenna_gain",
    "rt_use_scattering",
    "rt_scatt_coefficient",
    "captureEffect",
    "captureEffectPreambleDuration",
    "captureEffectSignalTreshold",
];

/// Errors that can occur while reading or writing a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing or serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened to one persisted parameter entry on load.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// Stored under its own name.
    Applied,
    /// Stored after conversion from a legacy name.
    Converted(&'static str),
    /// Legacy name without a current equivalent.
    Removed,
    /// Rejected and skipped.
    Skipped(ParameterError),
}

/// Persisted parameters and obstacles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// `name=value` entries for non-default parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    /// `minX;minY;width;height` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obstacles: Vec<String>,
}

impl ChannelConfig {
    /// Capture the non-default parameters and all obstacles.
    pub fn capture(params: &ChannelParameters, obstacles: &[Rect]) -> Self {
        ChannelConfig {
            parameters: params
                .non_default_entries()
                .into_iter()
                .map(|(def, value)| format!("{}={}", def.name, value))
                .collect(),
            obstacles: obstacles.iter().map(Rect::to_config_string).collect(),
        }
    }

    /// Parse from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize to a YAML string.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Write to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    /// Apply every parameter entry to `params`, tolerating bad entries.
    ///
    /// Returns whether any stored value changed.
    pub fn apply_parameters(&self, params: &mut ChannelParameters) -> bool {
        let mut changed = false;
        for entry in &self.parameters {
            let Some((name, value)) = entry.split_once('=') else {
                warn!("Skipping malformed parameter entry '{}'", entry);
                continue;
            };
            let (outcome, entry_changed) = apply_entry(params, name.trim(), value.trim());
            changed |= entry_changed;
            match outcome {
                EntryOutcome::Applied => {}
                EntryOutcome::Converted(to) => {
                    warn!("Converted legacy parameter '{}' to '{}'", name.trim(), to)
                }
                EntryOutcome::Removed => {
                    warn!("Ignoring removed parameter '{}'", name.trim())
                }
                EntryOutcome::Skipped(err) => warn!("Skipping parameter entry: {}", err),
            }
        }
        changed
    }

    /// Parse the obstacle entries, skipping malformed ones.
    pub fn parse_obstacles(&self) -> Vec<Rect> {
        self.obstacles
            .iter()
            .filter_map(|entry| match entry.parse::<Rect>() {
                Ok(rect) => Some(rect),
                Err(err) => {
                    warn!("Skipping obstacle entry '{}': {}", entry, err);
                    None
                }
            })
            .collect()
    }
}

/// Apply one persisted `name=value` entry.
///
/// Returns the outcome and whether the stored value changed.
pub fn apply_entry(params: &mut ChannelParameters, name: &str, value: &str) -> (EntryOutcome, bool) {
    if LEGACY_REMOVED.contains(&name) {
        return (EntryOutcome::Removed, false);
    }

    if name == LEGACY_WAVELENGTH {
        let wavelength = match value.parse::<f64>() {
            Ok(w) if w.is_finite() && w > 0.0 => w,
            _ => {
                let err = ParameterError::InvalidValue {
                    parameter: name.to_string(),
                    value: value.to_string(),
                    expected: "positive float".to_string(),
                };
                return (EntryOutcome::Skipped(err), false);
            }
        };
        let frequency_mhz = SPEED_OF_LIGHT / wavelength / 1e6;
        debug!("Wavelength {} m is {} MHz", wavelength, frequency_mhz);
        let changed = params.set(&FREQUENCY, frequency_mhz);
        return (EntryOutcome::Converted(FREQUENCY.name()), changed);
    }

    match params.set_from_str(name, value) {
        Ok(changed) => (EntryOutcome::Applied, changed),
        Err(err) => (EntryOutcome::Skipped(err), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{
        APPLY_RANDOM, OBSTACLE_ATTENUATION, RT_MAX_RAYS, RT_MAX_REFLECTIONS, SNR_THRESHOLD,
    };
    use tempfile::TempDir;

    #[test]
    fn test_capture_only_non_defaults() {
        let mut params = ChannelParameters::new();
        params.set(&OBSTACLE_ATTENUATION, -5.5);
        params.set(&RT_MAX_RAYS, 3);
        let config = ChannelConfig::capture(&params, &[Rect::new(0.0, 0.0, 50.0, 5.0)]);
        assert_eq!(
            config.parameters,
            vec!["rt_max_rays=3".to_string(), "obstacle_attenuation=-5.5".to_string()]
        );
        assert_eq!(config.obstacles, vec!["0;0;50;5".to_string()]);
    }

    #[test]
    fn test_round_trip_preserves_explicit_values() {
        let mut params = ChannelParameters::new();
        params.set(&SNR_THRESHOLD, 7.25);
        params.set(&APPLY_RANDOM, true);
        params.set(&RT_MAX_REFLECTIONS, 4);
        // Explicitly set back to the default: not persisted, still default after reload
        params.set(&OBSTACLE_ATTENUATION, -3.0);

        let yaml = ChannelConfig::capture(&params, &[]).to_yaml_string().unwrap();
        let config = ChannelConfig::from_yaml_str(&yaml).unwrap();

        let mut reloaded = ChannelParameters::new();
        assert!(config.apply_parameters(&mut reloaded));
        assert_eq!(reloaded, params);
        assert_eq!(reloaded.get(&OBSTACLE_ATTENUATION), -3.0);
    }

    #[test]
    fn test_unknown_and_malformed_entries_are_skipped() {
        let config = ChannelConfig {
            parameters: vec![
                "no_such_parameter=1".to_string(),
                "snr_threshold".to_string(),
                "rt_max_rays=lots".to_string(),
                "rt_max_rays=2".to_string(),
            ],
            obstacles: vec!["1;2;3".to_string(), "0;0;10;10".to_string()],
        };
        let mut params = ChannelParameters::new();
        assert!(config.apply_parameters(&mut params));
        assert_eq!(params.get(&RT_MAX_RAYS), 2);
        assert_eq!(params.get(&SNR_THRESHOLD), 6.0);
        assert_eq!(config.parse_obstacles(), vec![Rect::new(0.0, 0.0, 10.0, 10.0)]);
    }

    #[test]
    fn test_legacy_wavelength_converts_to_frequency() {
        let mut params = ChannelParameters::new();
        let (outcome, changed) = apply_entry(&mut params, "wavelength", "0.346");
        assert_eq!(outcome, EntryOutcome::Converted("frequency"));
        assert!(changed);
        let expected = SPEED_OF_LIGHT / 0.346 / 1e6;
        assert!((params.get(&FREQUENCY) - expected).abs() < 1e-9);

        let (outcome, _) = apply_entry(&mut params, "wavelength", "-1");
        assert!(matches!(outcome, EntryOutcome::Skipped(_)));
    }

    #[test]
    fn test_legacy_antenna_gain_is_removed() {
        let mut params = ChannelParameters::new();
        let (outcome, changed) = apply_entry(&mut params, "tx_antenna_gain", "3.0");
        assert_eq!(outcome, EntryOutcome::Removed);
        assert!(!changed);
        assert_eq!(params, ChannelParameters::new());
    }

    #[test]
    fn test_legacy_scattering_and_capture_keys_are_removed() {
        let mut params = ChannelParameters::new();
        for (name, value) in [
            ("rt_use_scattering", "true"),
            ("rt_scatt_coefficient", "-20"),
            ("captureEffect", "true"),
            ("captureEffectPreambleDuration", "0.000192"),
            ("captureEffectSignalTreshold", "3"),
        ] {
            let (outcome, changed) = apply_entry(&mut params, name, value);
            assert_eq!(outcome, EntryOutcome::Removed, "{}", name);
            assert!(!changed);
        }
        assert_eq!(params, ChannelParameters::new());
    }

    #[test]
    fn test_save_and_load_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("channel.yaml");

        let config = ChannelConfig {
            parameters: vec!["frequency=868".to_string()],
            obstacles: vec!["0;0;10;10".to_string(), "20;0;5;5".to_string()],
        };
        config.save(&path).unwrap();
        assert_eq!(ChannelConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_empty_document() {
        let config = ChannelConfig::from_yaml_str("{}").unwrap();
        assert!(config.parameters.is_empty());
        assert!(config.obstacles.is_empty());
    }
}
