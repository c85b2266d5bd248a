//! # Channel Parameters
//!
//! A type-safe parameter registry for the propagation engine. The set of
//! parameters is closed: every knob is a constant in [`definitions`], and
//! unknown names are rejected with [`ParameterError::UnknownParameter`].
//!
//! ## Module Organization
//!
//! - [`value`] - Parameter value types and conversion traits
//! - [`types`] - Parameter type definitions and metadata
//! - [`definitions`] - All parameter constant definitions (easy to review in one place)
//! - [`registry`] - Parameter lookup and the [`ChannelParameters`] set
//!
//! ## Type-Safe Parameter Access
//!
//! ```ignore
//! use mrm_model::parameters::{ChannelParameters, RT_MAX_RAYS, SNR_THRESHOLD};
//!
//! let mut params = ChannelParameters::new();
//!
//! // Returns i32 directly - no unwrapping needed
//! let rays: i32 = params.get(&RT_MAX_RAYS);
//!
//! // Only accepts f64 since SNR_THRESHOLD is Parameter<f64>
//! params.set(&SNR_THRESHOLD, 8.0);
//! ```
//!
//! ## Persisted Form
//!
//! Parameters are persisted as `name=value` text entries, and only when
//! they differ from their defaults (see [`crate::config`]).

pub mod definitions;
pub mod registry;
pub mod types;
pub mod value;

pub use value::{FromParameterValue, ParameterValue, ToParameterValue};

pub use types::{Parameter, ParameterDef, ParameterDefault, ParameterType};

pub use definitions::{
    // Randomness
    APPLY_RANDOM,
    // Noise and Reception
    BG_NOISE_MEAN,
    BG_NOISE_VAR,
    RX_SENSITIVITY,
    SNR_THRESHOLD,
    SYSTEM_GAIN_MEAN,
    SYSTEM_GAIN_VAR,
    // Transmitter
    FREQUENCY,
    RX_WITH_GAIN,
    TX_POWER,
    TX_WITH_GAIN,
    // Ray Tracing
    RT_DIFFR_COEFFICIENT,
    RT_DISALLOW_DIRECT_PATH,
    RT_FSPL_ON_TOTAL_LENGTH,
    RT_IGNORE_NON_DIRECT,
    RT_MAX_DIFFRACTIONS,
    RT_MAX_RAYS,
    RT_MAX_REFLECTIONS,
    RT_MAX_REFRACTIONS,
    RT_REFLEC_COEFFICIENT,
    RT_REFRAC_COEFFICIENT,
    // Obstacles
    OBSTACLE_ATTENUATION,
};

pub use registry::{
    default_value, get_parameter_def, is_known_parameter, ChannelParameters, ParameterError,
    ALL_PARAMETERS,
};
