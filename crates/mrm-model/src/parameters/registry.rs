//! Parameter registry, lookup functions, and the channel parameter set.
//!
//! This module provides:
//! - [`ALL_PARAMETERS`] - Array of all registered parameter definitions
//! - Lookup functions for finding parameters by name
//! - [`ChannelParameters`] - A complete set of parameter values with defaults

use super::definitions::*;
use super::types::{Parameter, ParameterDef};
use super::value::{FromParameterValue, ParameterValue, ToParameterValue};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// All Parameters Array (for runtime lookup)
// ============================================================================

/// All registered parameter definitions, in presentation order.
pub const ALL_PARAMETERS: &[&ParameterDef] = &[
    // Randomness
    &APPLY_RANDOM.def,
    // Noise and Reception
    &SNR_THRESHOLD.def,
    &BG_NOISE_MEAN.def,
    &BG_NOISE_VAR.def,
    &SYSTEM_GAIN_MEAN.def,
    &SYSTEM_GAIN_VAR.def,
    &RX_SENSITIVITY.def,
    // Transmitter
    &FREQUENCY.def,
    &TX_POWER.def,
    &TX_WITH_GAIN.def,
    &RX_WITH_GAIN.def,
    // Ray Tracing
    &RT_DISALLOW_DIRECT_PATH.def,
    &RT_IGNORE_NON_DIRECT.def,
    &RT_FSPL_ON_TOTAL_LENGTH.def,
    &RT_MAX_RAYS.def,
    &RT_MAX_REFRACTIONS.def,
    &RT_MAX_REFLECTIONS.def,
    &RT_MAX_DIFFRACTIONS.def,
    &RT_REFRAC_COEFFICIENT.def,
    &RT_REFLEC_COEFFICIENT.def,
    &RT_DIFFR_COEFFICIENT.def,
    // Obstacles
    &OBSTACLE_ATTENUATION.def,
];

// ============================================================================
// Lookup Functions
// ============================================================================

/// Check if a parameter name is registered.
pub fn is_known_parameter(name: &str) -> bool {
    get_parameter_def(name).is_some()
}

/// Get a parameter definition by name.
pub fn get_parameter_def(name: &str) -> Option<&'static ParameterDef> {
    ALL_PARAMETERS.iter().find(|p| p.name == name).copied()
}

/// Get the default value for a parameter by name.
pub fn default_value(name: &str) -> Option<ParameterValue> {
    get_parameter_def(name).map(|p| p.default_value())
}

// ============================================================================
// Parameter Errors
// ============================================================================

/// Errors that can occur when manipulating a parameter set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    /// No parameter with this name exists.
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Value of the wrong type for the parameter.
    #[error("Type mismatch for parameter '{parameter}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// Parameter name.
        parameter: String,
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// Text that does not parse as the parameter's type.
    #[error("Invalid value '{value}' for parameter '{parameter}': expected {expected}")]
    InvalidValue {
        /// Parameter name.
        parameter: String,
        /// Offending text.
        value: String,
        /// Expected type.
        expected: String,
    },
}

// ============================================================================
// Channel Parameter Set
// ============================================================================

/// The full set of channel parameters, every entry holding a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelParameters {
    values: HashMap<&'static ParameterDef, ParameterValue>,
}

impl ChannelParameters {
    /// Create a parameter set with all defaults.
    pub fn new() -> Self {
        let values = ALL_PARAMETERS
            .iter()
            .map(|p| (*p, p.default_value()))
            .collect();
        Self { values }
    }

    /// Get a parameter value with compile-time type safety.
    ///
    /// ```ignore
    /// use mrm_model::parameters::{ChannelParameters, SNR_THRESHOLD};
    ///
    /// let params = ChannelParameters::new();
    /// let threshold: f64 = params.get(&SNR_THRESHOLD);
    /// ```
    pub fn get<T: FromParameterValue + Default>(&self, param: &Parameter<T>) -> T {
        self.values
            .get(&param.def)
            .and_then(T::from_parameter_value)
            .or_else(|| T::from_parameter_value(&param.def.default_value()))
            .unwrap_or_default()
    }

    /// Set a parameter value. Returns whether the stored value changed.
    pub fn set<T: ToParameterValue>(&mut self, param: &'static Parameter<T>, value: T) -> bool {
        self.store(&param.def, value.to_parameter_value())
    }

    /// Get the raw value of a parameter by name.
    pub fn get_by_name(&self, name: &str) -> Result<ParameterValue, ParameterError> {
        let def = get_parameter_def(name)
            .ok_or_else(|| ParameterError::UnknownParameter(name.to_string()))?;
        Ok(self.raw(def))
    }

    /// Set a parameter by name, checking the value type.
    ///
    /// Integers are accepted for float parameters. Returns whether the
    /// stored value changed.
    pub fn set_by_name(&mut self, name: &str, value: ParameterValue) -> Result<bool, ParameterError> {
        let def = get_parameter_def(name)
            .ok_or_else(|| ParameterError::UnknownParameter(name.to_string()))?;
        if !def.value_type.matches(&value) {
            return Err(ParameterError::TypeMismatch {
                parameter: def.name.to_string(),
                expected: def.value_type.to_string(),
                actual: value.type_name().to_string(),
            });
        }
        let value = match (def.default_value(), value) {
            (ParameterValue::Float(_), ParameterValue::Integer(i)) => ParameterValue::Float(i as f64),
            (_, v) => v,
        };
        Ok(self.store(def, value))
    }

    /// Parse `text` as the named parameter's type and set it.
    pub fn set_from_str(&mut self, name: &str, text: &str) -> Result<bool, ParameterError> {
        let def = get_parameter_def(name)
            .ok_or_else(|| ParameterError::UnknownParameter(name.to_string()))?;
        let value =
            ParameterValue::parse(text, def.value_type).ok_or_else(|| ParameterError::InvalidValue {
                parameter: def.name.to_string(),
                value: text.to_string(),
                expected: def.value_type.to_string(),
            })?;
        Ok(self.store(def, value))
    }

    /// Current value of a parameter definition.
    pub fn raw(&self, def: &ParameterDef) -> ParameterValue {
        self.values
            .get(def)
            .copied()
            .unwrap_or_else(|| def.default_value())
    }

    /// Whether a parameter currently holds its default.
    pub fn is_default(&self, def: &ParameterDef) -> bool {
        self.raw(def) == def.default_value()
    }

    /// Parameters that differ from their defaults, in registry order.
    pub fn non_default_entries(&self) -> Vec<(&'static ParameterDef, ParameterValue)> {
        ALL_PARAMETERS
            .iter()
            .filter(|def| !self.is_default(def))
            .map(|def| (*def, self.raw(def)))
            .collect()
    }

    /// All parameters with their current values, in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static ParameterDef, ParameterValue)> + '_ {
        ALL_PARAMETERS.iter().map(move |def| (*def, self.raw(def)))
    }

    /// Restore every default. Returns whether anything changed.
    pub fn reset(&mut self) -> bool {
        let changed = !self.non_default_entries().is_empty();
        *self = Self::new();
        changed
    }

    fn store(&mut self, def: &'static ParameterDef, value: ParameterValue) -> bool {
        self.values.insert(def, value) != Some(value)
    }
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self::new()
    }
}
