//! Parameter constant definitions.
//!
//! Every channel parameter is a compile-time constant with type-safe access.
//! The name is the persisted key and must never change once released; the
//! description is user-facing and printed by `mrm parameters`, so it should
//! explain the parameter on its own.
//!
//! ## Parameter Categories
//!
//! - **Randomness** - Whether variances are sampled or reported
//! - **Noise and Reception** - Background noise, SNR threshold, receiver sensitivity
//! - **Transmitter** - Carrier frequency, default power, antenna gain handling
//! - **Ray Tracing** - Search budgets and per-event loss coefficients
//! - **Obstacles** - Material attenuation inside obstacles

use super::types::{Parameter, ParameterDefault};

// ============================================================================
// Randomness
// ============================================================================

/// Sample Gaussian variations instead of reporting them as variance.
pub const APPLY_RANDOM: Parameter<bool> = Parameter::new(
    "apply_random",
    "Apply random values: draw system gain and background noise from their Gaussian distributions instead of reporting their variances",
    ParameterDefault::Bool(false),
);

// ============================================================================
// Noise and Reception
// ============================================================================

pub const SNR_THRESHOLD: Parameter<f64> = Parameter::new(
    "snr_threshold",
    "SNR reception threshold: minimum signal-to-noise ratio for a packet to be received",
    ParameterDefault::Float(6.0),
)
.with_unit("dB");

pub const BG_NOISE_MEAN: Parameter<f64> = Parameter::new(
    "bg_noise_mean",
    "Background noise mean. Interference stronger than this replaces it",
    ParameterDefault::Float(-100.0),
)
.with_unit("dBm");

pub const BG_NOISE_VAR: Parameter<f64> = Parameter::new(
    "bg_noise_var",
    "Background noise variance",
    ParameterDefault::Float(1.0),
)
.with_unit("dB");

pub const SYSTEM_GAIN_MEAN: Parameter<f64> = Parameter::new(
    "system_gain_mean",
    "Extra system gain mean, added to every received signal",
    ParameterDefault::Float(0.0),
)
.with_unit("dB");

pub const SYSTEM_GAIN_VAR: Parameter<f64> = Parameter::new(
    "system_gain_var",
    "Extra system gain variance",
    ParameterDefault::Float(4.0),
)
.with_unit("dB");

/// Receivers never decode below this absolute level, whatever the SNR.
pub const RX_SENSITIVITY: Parameter<f64> = Parameter::new(
    "rx_sensitivity",
    "Receiver sensitivity: signals weaker than this are not received even when the SNR threshold is met",
    ParameterDefault::Float(-100.0),
)
.with_unit("dBm");

// ============================================================================
// Transmitter
// ============================================================================

/// Carrier frequency. Persisted configurations may instead carry the legacy
/// `wavelength` key, which is converted on load.
pub const FREQUENCY: Parameter<f64> = Parameter::new(
    "frequency",
    "Carrier frequency, used for free-space path loss and multipath phase",
    ParameterDefault::Float(2400.0),
)
.with_unit("MHz");

pub const TX_POWER: Parameter<f64> = Parameter::new(
    "tx_power",
    "Default transmitter output power, used for radios that do not set their own",
    ParameterDefault::Float(1.5),
)
.with_unit("dBm");

pub const TX_WITH_GAIN: Parameter<bool> = Parameter::new(
    "tx_with_gain",
    "Directional antennas: include the transmitter antenna gain towards the receiver",
    ParameterDefault::Bool(true),
);

pub const RX_WITH_GAIN: Parameter<bool> = Parameter::new(
    "rx_with_gain",
    "Directional antennas: include the receiver antenna gain towards the transmitter",
    ParameterDefault::Bool(false),
);

// ============================================================================
// Ray Tracing
// ============================================================================

pub const RT_DISALLOW_DIRECT_PATH: Parameter<bool> = Parameter::new(
    "rt_disallow_direct_path",
    "Disallow the direct path: only refracted, reflected or diffracted rays connect",
    ParameterDefault::Bool(false),
);

pub const RT_IGNORE_NON_DIRECT: Parameter<bool> = Parameter::new(
    "rt_ignore_non_direct",
    "If a direct path exists, use only that path and ignore all others",
    ParameterDefault::Bool(false),
);

/// When false, free-space loss restarts after every reflection and diffraction.
pub const RT_FSPL_ON_TOTAL_LENGTH: Parameter<bool> = Parameter::new(
    "rt_fspl_on_total_length",
    "Apply free-space path loss once over the total path length instead of per straight run between reflections and diffractions",
    ParameterDefault::Bool(true),
);

/// Overall depth budget of the ray tree.
pub const RT_MAX_RAYS: Parameter<i32> = Parameter::new(
    "rt_max_rays",
    "Max path rays: maximum number of ray events (refraction, reflection, diffraction) on one path",
    ParameterDefault::Integer(1),
);

pub const RT_MAX_REFRACTIONS: Parameter<i32> = Parameter::new(
    "rt_max_refractions",
    "Max refractions on one path",
    ParameterDefault::Integer(1),
);

pub const RT_MAX_REFLECTIONS: Parameter<i32> = Parameter::new(
    "rt_max_reflections",
    "Max reflections on one path",
    ParameterDefault::Integer(1),
);

pub const RT_MAX_DIFFRACTIONS: Parameter<i32> = Parameter::new(
    "rt_max_diffractions",
    "Max diffractions on one path",
    ParameterDefault::Integer(0),
);

pub const RT_REFRAC_COEFFICIENT: Parameter<f64> = Parameter::new(
    "rt_refrac_coefficient",
    "Refraction coefficient: loss added each time a ray enters or leaves an obstacle",
    ParameterDefault::Float(-3.0),
)
.with_unit("dB");

pub const RT_REFLEC_COEFFICIENT: Parameter<f64> = Parameter::new(
    "rt_reflec_coefficient",
    "Reflection coefficient: loss added at every reflection",
    ParameterDefault::Float(-5.0),
)
.with_unit("dB");

pub const RT_DIFFR_COEFFICIENT: Parameter<f64> = Parameter::new(
    "rt_diffr_coefficient",
    "Diffraction coefficient: loss added at every diffraction around a corner",
    ParameterDefault::Float(-10.0),
)
.with_unit("dB");

// ============================================================================
// Obstacles
// ============================================================================

pub const OBSTACLE_ATTENUATION: Parameter<f64> = Parameter::new(
    "obstacle_attenuation",
    "Obstacle attenuation per metre travelled inside an obstacle",
    ParameterDefault::Float(-3.0),
)
.with_unit("dB/m");
