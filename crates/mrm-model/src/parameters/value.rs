//! Parameter values and conversion traits.

use super::types::ParameterType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamically typed parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Boolean switch.
    Bool(bool),
    /// Integer count.
    Integer(i64),
    /// Floating point quantity.
    Float(f64),
}

impl ParameterValue {
    /// Human-readable type name, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Integer(_) => "integer",
            ParameterValue::Float(_) => "float",
        }
    }

    /// Parse the textual form used in persisted configuration.
    ///
    /// Returns `None` if `text` is not a valid value of type `ty`.
    pub fn parse(text: &str, ty: ParameterType) -> Option<ParameterValue> {
        let text = text.trim();
        match ty {
            ParameterType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" => Some(ParameterValue::Bool(true)),
                "false" => Some(ParameterValue::Bool(false)),
                _ => None,
            },
            ParameterType::Integer => text.parse().ok().map(ParameterValue::Integer),
            ParameterType::Float => text
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ParameterValue::Float),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{}", b),
            ParameterValue::Integer(i) => write!(f, "{}", i),
            ParameterValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Conversion from a stored value into a concrete Rust type.
pub trait FromParameterValue: Sized {
    /// Convert, or `None` if the value has an incompatible type.
    fn from_parameter_value(value: &ParameterValue) -> Option<Self>;
}

/// Conversion from a concrete Rust type into a stored value.
pub trait ToParameterValue {
    fn to_parameter_value(&self) -> ParameterValue;
}

impl FromParameterValue for bool {
    fn from_parameter_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromParameterValue for i32 {
    fn from_parameter_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Integer(i) => i32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromParameterValue for f64 {
    fn from_parameter_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl ToParameterValue for bool {
    fn to_parameter_value(&self) -> ParameterValue {
        ParameterValue::Bool(*self)
    }
}

impl ToParameterValue for i32 {
    fn to_parameter_value(&self) -> ParameterValue {
        ParameterValue::Integer(i64::from(*self))
    }
}

impl ToParameterValue for f64 {
    fn to_parameter_value(&self) -> ParameterValue {
        ParameterValue::Float(*self)
    }
}
