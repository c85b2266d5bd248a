//! # mrm-model
//!
//! Channel parameter registry and persisted configuration for the MRM ray tracer.
//!
//! This crate provides:
//! - The closed, typed set of channel parameters ([`parameters`])
//! - The persisted configuration document with legacy-name handling ([`config`])

pub mod config;
pub mod parameters;

pub use config::{apply_entry, ChannelConfig, ConfigError, EntryOutcome};
pub use parameters::{
    get_parameter_def, ChannelParameters, FromParameterValue, Parameter, ParameterDef,
    ParameterError, ParameterType, ParameterValue, ToParameterValue, ALL_PARAMETERS,
};
