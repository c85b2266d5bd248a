//! Parameter type definitions and metadata.

use super::value::ParameterValue;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// The value type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Bool,
    Integer,
    Float,
}

impl ParameterType {
    /// Whether `value` can be stored under this type.
    pub fn matches(&self, value: &ParameterValue) -> bool {
        matches!(
            (self, value),
            (ParameterType::Bool, ParameterValue::Bool(_))
                | (ParameterType::Integer, ParameterValue::Integer(_))
                | (ParameterType::Float, ParameterValue::Float(_))
                | (ParameterType::Float, ParameterValue::Integer(_))
        )
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterType::Bool => write!(f, "bool"),
            ParameterType::Integer => write!(f, "integer"),
            ParameterType::Float => write!(f, "float"),
        }
    }
}

/// Compile-time default for a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterDefault {
    Bool(bool),
    Integer(i64),
    Float(f64),
}

impl ParameterDefault {
    const fn value_type(&self) -> ParameterType {
        match self {
            ParameterDefault::Bool(_) => ParameterType::Bool,
            ParameterDefault::Integer(_) => ParameterType::Integer,
            ParameterDefault::Float(_) => ParameterType::Float,
        }
    }
}

/// Untyped parameter metadata, used for lookup by name and serialization.
#[derive(Debug)]
pub struct ParameterDef {
    /// Persisted name, e.g. `snr_threshold`.
    pub name: &'static str,
    /// User-facing description shown by `mrm parameters`.
    pub description: &'static str,
    /// Built-in default.
    pub default: ParameterDefault,
    /// Accepted value type, derived from the default.
    pub value_type: ParameterType,
    /// Unit, if the value is a physical quantity.
    pub unit: Option<&'static str>,
}

impl ParameterDef {
    /// The default as a runtime value.
    pub fn default_value(&self) -> ParameterValue {
        match self.default {
            ParameterDefault::Bool(b) => ParameterValue::Bool(b),
            ParameterDefault::Integer(i) => ParameterValue::Integer(i),
            ParameterDefault::Float(v) => ParameterValue::Float(v),
        }
    }
}

// Definitions are unique by name
impl PartialEq for ParameterDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ParameterDef {}

impl Hash for ParameterDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A parameter with a compile-time value type `T`.
#[derive(Debug)]
pub struct Parameter<T> {
    pub def: ParameterDef,
    _type: PhantomData<fn() -> T>,
}

impl<T> Parameter<T> {
    /// Define a parameter. The value type follows the default's variant.
    pub const fn new(
        name: &'static str,
        description: &'static str,
        default: ParameterDefault,
    ) -> Self {
        Parameter {
            def: ParameterDef {
                name,
                description,
                value_type: default.value_type(),
                default,
                unit: None,
            },
            _type: PhantomData,
        }
    }

    /// Attach a unit.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.def.unit = Some(unit);
        self
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }
}
