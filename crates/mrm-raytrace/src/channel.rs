//! Signal arithmetic: path loss, multipath combination, SINR and
//! reception probability.
//!
//! All functions here are pure. The engine in [`crate::model`] feeds them
//! parameters, paths and random samples.

use crate::obstacles::ObstacleWorld;
use crate::paths::RayPath;
use crate::tree::RayKind;
use mrm_common::SPEED_OF_LIGHT;
use mrm_model::parameters::{
    ChannelParameters, OBSTACLE_ATTENUATION, RT_DIFFR_COEFFICIENT,
    RT_FSPL_ON_TOTAL_LENGTH, RT_REFLEC_COEFFICIENT, RT_REFRAC_COEFFICIENT,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Paths weaker than the strongest by at least this much (dB) are ignored.
pub const SIGNIFICANCE_MARGIN_DB: f64 = 30.0;

/// Propagation speed used for delay spreads, in metres per microsecond.
pub const DELAY_SPEED_M_PER_US: f64 = 300.0;

// ============================================================================
// Free-space path loss
// ============================================================================

/// Frequency-dependent part of the free-space path loss, in dB.
pub fn fspl_constant(frequency_mhz: f64) -> f64 {
    -32.44 - 20.0 * frequency_mhz.log10()
}

/// Free-space path gain (never positive) over `distance_m` metres.
pub fn fspl(constant: f64, distance_m: f64) -> f64 {
    (constant - 20.0 * (distance_m / 1000.0).log10()).min(0.0)
}

// ============================================================================
// Path loss
// ============================================================================

/// Per-event losses applied along a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossModel {
    pub refraction_db: f64,
    pub reflection_db: f64,
    pub diffraction_db: f64,
    /// Attenuation inside obstacles, dB per metre.
    pub obstacle_attenuation: f64,
    /// Apply free-space loss once over the whole path instead of per
    /// straight run between reflections and diffractions.
    pub fspl_on_total_length: bool,
    /// Result of [`fspl_constant`] for the current frequency.
    pub fspl_constant: f64,
}

impl LossModel {
    /// Loss model from the current parameters and a precomputed FSPL constant.
    pub fn new(params: &ChannelParameters, fspl_constant: f64) -> Self {
        LossModel {
            refraction_db: params.get(&RT_REFRAC_COEFFICIENT),
            reflection_db: params.get(&RT_REFLEC_COEFFICIENT),
            diffraction_db: params.get(&RT_DIFFR_COEFFICIENT),
            obstacle_attenuation: params.get(&OBSTACLE_ATTENUATION),
            fspl_on_total_length: params.get(&RT_FSPL_ON_TOTAL_LENGTH),
            fspl_constant,
        }
    }

    fn fspl(&self, distance_m: f64) -> f64 {
        fspl(self.fspl_constant, distance_m)
    }
}

/// Length and gain of one path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathLoss {
    pub length_m: f64,
    pub gain_db: f64,
}

/// Walk the segments of `path` and total up its losses.
///
/// A segment starting at a refraction is inside an obstacle: it is charged
/// the obstacle attenuation over the length it spends inside the first
/// obstacle near its start.
pub fn path_loss(path: &RayPath, model: &LossModel, world: &mut ObstacleWorld) -> PathLoss {
    let mut length_m = 0.0;
    let mut gain_db = 0.0;
    let mut straight_run = 0.0;

    for (segment, kind) in path.subpaths() {
        let segment_length = segment.length();
        match kind {
            RayKind::Refraction => gain_db += model.refraction_db,
            RayKind::Reflection | RayKind::Diffraction => {
                gain_db += if kind == RayKind::Reflection {
                    model.reflection_db
                } else {
                    model.diffraction_db
                };
                if !model.fspl_on_total_length && straight_run > 0.0 {
                    gain_db += model.fspl(straight_run);
                }
                straight_run = 0.0;
            }
            RayKind::Origin | RayKind::Destination => {}
        }
        straight_run += segment_length;

        if kind == RayKind::Refraction {
            let inside = world
                .obstacles_near(&segment.p1)
                .iter()
                .find_map(|obstacle| obstacle.clip(&segment));
            if let Some(inside) = inside {
                gain_db += model.obstacle_attenuation * inside.length();
            }
        }

        length_m += segment_length;
    }

    if model.fspl_on_total_length {
        gain_db += model.fspl(length_m);
    } else if straight_run > 0.0 {
        gain_db += model.fspl(straight_run);
    }

    PathLoss { length_m, gain_db }
}

// ============================================================================
// Multipath combination
// ============================================================================

/// One path's contribution to the combined signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalComponent {
    pub gain_db: f64,
    /// Phase relative to the strongest path, in units of π.
    pub phase_pi: f64,
    /// Within [`SIGNIFICANCE_MARGIN_DB`] of the strongest path.
    pub significant: bool,
}

/// Result of superposing all paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combined {
    /// Total path gain in dB. `-inf` without paths.
    #[serde(with = "mrm_common::db")]
    pub gain_db: f64,
    /// Largest path delay relative to the strongest path, in µs.
    pub delay_spread_us: f64,
    /// RMS of the path delays weighted by squared gain, in µs.
    pub rms_delay_spread_us: f64,
    pub components: Vec<SignalComponent>,
}

/// Superpose paths with a phase term from their length difference to the
/// strongest path.
pub fn combine(losses: &[PathLoss], frequency_mhz: f64) -> Combined {
    // First of equally strong paths is the phase reference
    let Some(best) = losses
        .iter()
        .copied()
        .reduce(|best, loss| if loss.gain_db > best.gain_db { loss } else { best })
    else {
        return Combined {
            gain_db: f64::NEG_INFINITY,
            delay_spread_us: 0.0,
            rms_delay_spread_us: 0.0,
            components: Vec::new(),
        };
    };

    let wavelength = SPEED_OF_LIGHT / (frequency_mhz * 1e6);
    let mut total = 0.0;
    let mut delay_spread_m: f64 = 0.0;
    let mut rms_sum = 0.0;
    let mut weight = 0.0;
    let mut components = Vec::with_capacity(losses.len());

    for loss in losses {
        let diff = (loss.length_m - best.length_m).abs();
        let modded = diff % wavelength;
        let significant = loss.gain_db > best.gain_db - SIGNIFICANCE_MARGIN_DB;

        if significant {
            delay_spread_m = delay_spread_m.max(diff);
            let g2 = loss.gain_db * loss.gain_db;
            weight += g2;
            rms_sum += (diff / DELAY_SPEED_M_PER_US).powi(2) * g2;
            total += 10f64.powf(loss.gain_db / 10.0) * (2.0 * PI * modded / wavelength).cos();
        }

        components.push(SignalComponent {
            gain_db: loss.gain_db,
            phase_pi: 2.0 * modded / wavelength,
            significant,
        });
    }

    let rms_delay_spread_us = if weight > 0.0 { (rms_sum / weight).sqrt() } else { 0.0 };

    Combined {
        gain_db: 10.0 * total.abs().log10(),
        delay_spread_us: delay_spread_m / DELAY_SPEED_M_PER_US,
        rms_delay_spread_us,
        components,
    }
}

// ============================================================================
// Link quality
// ============================================================================

/// Received signal strength as a Gaussian in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalStrength {
    #[serde(with = "mrm_common::db")]
    pub mean_dbm: f64,
    pub variance: f64,
}

/// Signal-to-noise-and-interference ratio as a Gaussian, plus the signal it
/// came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sinr {
    #[serde(with = "mrm_common::db")]
    pub mean_db: f64,
    pub variance: f64,
    #[serde(with = "mrm_common::db")]
    pub signal_dbm: f64,
}

/// Probability that a packet is received.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reception {
    pub probability: f64,
    #[serde(with = "mrm_common::db")]
    pub signal_dbm: f64,
    /// SNR threshold actually applied, after any sensitivity adjustment.
    pub threshold_db: f64,
}

/// Worst-case and RMS delay spread, in µs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelaySpread {
    pub worst_case_us: f64,
    pub rms_us: f64,
}

/// Background noise at the receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Noise {
    pub mean_dbm: f64,
    pub variance: f64,
}

/// Subtract the noise floor (or stronger interference) from the signal.
///
/// `noise_sample` is a standard-normal draw; when given, the noise mean is
/// perturbed by it and the noise variance is not added.
pub fn sinr(
    signal: &SignalStrength,
    rx_gain_db: f64,
    noise: &Noise,
    interference_dbm: f64,
    noise_sample: Option<f64>,
) -> Sinr {
    let mut noise_mean = noise.mean_dbm.max(interference_dbm);
    let mut noise_variance = noise.variance;
    if let Some(z) = noise_sample {
        noise_mean += noise.variance.sqrt() * z;
        noise_variance = 0.0;
    }

    Sinr {
        mean_db: signal.mean_dbm + rx_gain_db - noise_mean,
        variance: signal.variance + noise_variance,
        signal_dbm: signal.mean_dbm,
    }
}

/// Probability that the SINR exceeds `snr_threshold`.
///
/// When the signal is too weak for the receiver sensitivity, the threshold
/// is raised so that the absolute signal must reach `rx_sensitivity`.
pub fn reception_probability(sinr: &Sinr, snr_threshold: f64, rx_sensitivity: f64) -> Reception {
    let mut threshold = snr_threshold;
    let required = rx_sensitivity + sinr.mean_db - sinr.signal_dbm;
    if rx_sensitivity > sinr.signal_dbm - sinr.mean_db && threshold < required {
        threshold = required;
    }

    let probability = if sinr.variance == 0.0 {
        if threshold - sinr.mean_db > 0.0 {
            0.0
        } else {
            1.0
        }
    } else {
        1.0 - gaussian_cdf(threshold, sinr.mean_db, sinr.variance.sqrt())
    };

    Reception {
        probability,
        signal_dbm: sinr.signal_dbm,
        threshold_db: threshold,
    }
}

/// Normal CDF from the Abramowitz & Stegun 7.1.26 error function
/// approximation (absolute error below 1.5e-7).
pub fn gaussian_cdf(x: f64, mean: f64, std_dev: f64) -> f64 {
    if x.is_nan() || mean.is_nan() || std_dev.is_nan() {
        return f64::NAN;
    }
    let z = (x - mean) / std_dev;
    if z.is_nan() {
        // Equal infinities
        return 0.5;
    }
    if z == f64::INFINITY {
        return 1.0;
    }
    if z == f64::NEG_INFINITY {
        return 0.0;
    }
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const P: f64 = 0.327_591_1;
    const A: [f64; 5] = [
        0.254_829_592,
        -0.284_496_736,
        1.421_413_741,
        -1.453_152_027,
        1.061_405_429,
    ];
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = A.iter().rev().fold(0.0, |acc, a| acc * t + a) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrm_common::{Point, Rect};

    fn model() -> LossModel {
        LossModel::new(&ChannelParameters::new(), fspl_constant(2400.0))
    }

    #[test]
    fn test_fspl() {
        let constant = fspl_constant(2400.0);
        assert!((constant - (-32.44 - 20.0 * 2400f64.log10())).abs() < 1e-12);
        // 1 km at 2.4 GHz
        assert!((fspl(constant, 1000.0) - constant).abs() < 1e-12);
        assert!(fspl(constant, 100.0) > fspl(constant, 200.0));
        // Clamped at zero very close to the source
        assert_eq!(fspl(constant, 0.0), 0.0);
        assert_eq!(fspl(constant, 1e-6), 0.0);
    }

    #[test]
    fn test_refraction_loss_includes_wall() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(0.0, 0.0, 50.0, 5.0), false);
        let path = RayPath::new(
            vec![Point::new(-10.0, 2.5), Point::new(0.0, 2.5), Point::new(60.0, 2.5)],
            vec![RayKind::Origin, RayKind::Refraction, RayKind::Destination],
        )
        .unwrap();

        let model = model();
        let loss = path_loss(&path, &model, &mut world);
        assert!((loss.length_m - 70.0).abs() < 1e-12);
        let expected = -3.0 + 50.0 * -3.0 + fspl(model.fspl_constant, 70.0);
        assert!((loss.gain_db - expected).abs() < 1e-9);
    }

    #[test]
    fn test_fspl_per_straight_run() {
        let mut world = ObstacleWorld::new();
        let path = RayPath::new(
            vec![Point::new(0.0, 0.0), Point::new(30.0, 0.0), Point::new(30.0, 40.0)],
            vec![RayKind::Origin, RayKind::Reflection, RayKind::Destination],
        )
        .unwrap();

        let total = model();
        let per_run = LossModel {
            fspl_on_total_length: false,
            ..total
        };
        let c = total.fspl_constant;

        let loss = path_loss(&path, &total, &mut world);
        assert!((loss.gain_db - (-5.0 + fspl(c, 70.0))).abs() < 1e-9);

        let loss = path_loss(&path, &per_run, &mut world);
        assert!((loss.gain_db - (-5.0 + fspl(c, 30.0) + fspl(c, 40.0))).abs() < 1e-9);
    }

    #[test]
    fn test_combine_single_path() {
        let combined = combine(&[PathLoss { length_m: 100.0, gain_db: -80.0 }], 2400.0);
        assert!((combined.gain_db + 80.0).abs() < 1e-9);
        assert_eq!(combined.delay_spread_us, 0.0);
        assert_eq!(combined.rms_delay_spread_us, 0.0);
        assert_eq!(combined.components.len(), 1);
    }

    #[test]
    fn test_combine_without_paths() {
        let combined = combine(&[], 2400.0);
        assert_eq!(combined.gain_db, f64::NEG_INFINITY);
        assert_eq!(combined.delay_spread_us, 0.0);
        assert!(!combined.rms_delay_spread_us.is_nan());
    }

    #[test]
    fn test_combine_ignores_weak_paths() {
        let losses = [
            PathLoss { length_m: 100.0, gain_db: -80.0 },
            PathLoss { length_m: 400.0, gain_db: -120.0 },
        ];
        let combined = combine(&losses, 2400.0);
        assert!((combined.gain_db + 80.0).abs() < 1e-9);
        assert_eq!(combined.delay_spread_us, 0.0);
        assert!(combined.components[0].significant);
        assert!(!combined.components[1].significant);
    }

    #[test]
    fn test_combine_delay_spread() {
        let wavelength = SPEED_OF_LIGHT / 2400e6;
        // Second path a whole number of wavelengths longer: in phase
        let extra = (300.0 / wavelength).round() * wavelength;
        let losses = [
            PathLoss { length_m: 100.0, gain_db: -80.0 },
            PathLoss { length_m: 100.0 + extra, gain_db: -80.0 },
        ];
        let combined = combine(&losses, 2400.0);
        assert!((combined.gain_db - (-80.0 + 10.0 * 2f64.log10())).abs() < 1e-3);
        assert!((combined.delay_spread_us - extra / 300.0).abs() < 1e-9);
        // Equal weights: sqrt((0 + d²) / 2)
        let expected_rms = ((extra / 300.0).powi(2) / 2.0).sqrt();
        assert!((combined.rms_delay_spread_us - expected_rms).abs() < 1e-9);
    }

    #[test]
    fn test_combine_equal_gains_reference_first_path() {
        let losses = [
            PathLoss { length_m: 100.0, gain_db: -80.0 },
            PathLoss { length_m: 160.0, gain_db: -80.0 },
            PathLoss { length_m: 130.0, gain_db: -80.0 },
        ];
        let combined = combine(&losses, 2400.0);
        assert_eq!(combined.components[0].phase_pi, 0.0);
        assert!((combined.delay_spread_us - 60.0 / DELAY_SPEED_M_PER_US).abs() < 1e-12);
    }

    #[test]
    fn test_sinr_uses_stronger_of_noise_and_interference() {
        let signal = SignalStrength { mean_dbm: -60.0, variance: 4.0 };
        let noise = Noise { mean_dbm: -100.0, variance: 1.0 };

        let quiet = sinr(&signal, 0.0, &noise, -120.0, None);
        assert_eq!(quiet.mean_db, 40.0);
        assert_eq!(quiet.variance, 5.0);
        assert_eq!(quiet.signal_dbm, -60.0);

        let loud = sinr(&signal, 2.0, &noise, -70.0, None);
        assert_eq!(loud.mean_db, 12.0);

        let sampled = sinr(&signal, 0.0, &noise, -120.0, Some(1.0));
        assert_eq!(sampled.mean_db, 39.0);
        assert_eq!(sampled.variance, 4.0);
    }

    #[test]
    fn test_zero_variance_probability_is_binary() {
        let above = Sinr { mean_db: 10.0, variance: 0.0, signal_dbm: -50.0 };
        assert_eq!(reception_probability(&above, 6.0, -100.0).probability, 1.0);
        let below = Sinr { mean_db: 3.0, variance: 0.0, signal_dbm: -50.0 };
        assert_eq!(reception_probability(&below, 6.0, -100.0).probability, 0.0);
    }

    #[test]
    fn test_weak_signal_raises_threshold() {
        // Plenty of SNR but the absolute signal is below sensitivity
        let weak = Sinr { mean_db: 20.0, variance: 0.0, signal_dbm: -110.0 };
        let reception = reception_probability(&weak, 6.0, -100.0);
        assert_eq!(reception.probability, 0.0);
        assert_eq!(reception.threshold_db, 30.0);
        let strong = Sinr { mean_db: 20.0, variance: 0.0, signal_dbm: -90.0 };
        assert_eq!(reception_probability(&strong, 6.0, -100.0).probability, 1.0);
    }

    #[test]
    fn test_probability_monotonic() {
        let noise = Noise { mean_dbm: -100.0, variance: 1.0 };
        let mut last = 0.0;
        for mean in (-110..=-80).map(f64::from) {
            let s = sinr(&SignalStrength { mean_dbm: mean, variance: 4.0 }, 0.0, &noise, f64::MIN, None);
            let p = reception_probability(&s, 6.0, -100.0).probability;
            assert!(p >= last, "probability fell at {} dBm", mean);
            last = p;
        }

        let signal = SignalStrength { mean_dbm: -90.0, variance: 4.0 };
        let mut last = 1.0;
        for noise_mean in (-110..=-80).map(f64::from) {
            let noise = Noise { mean_dbm: noise_mean, variance: 1.0 };
            let s = sinr(&signal, 0.0, &noise, f64::MIN, None);
            let p = reception_probability(&s, 6.0, -100.0).probability;
            assert!(p <= last, "probability rose at noise {} dBm", noise_mean);
            last = p;
        }
    }

    #[test]
    fn test_gaussian_cdf() {
        assert!((gaussian_cdf(0.0, 0.0, 1.0) - 0.5).abs() < 1e-7);
        assert!((gaussian_cdf(1.0, 0.0, 1.0) - 0.841_344_746).abs() < 1e-6);
        assert!((gaussian_cdf(-1.96, 0.0, 1.0) - 0.024_997_895).abs() < 1e-6);
        assert_eq!(gaussian_cdf(f64::INFINITY, 0.0, 1.0), 1.0);
        assert_eq!(gaussian_cdf(0.0, f64::INFINITY, 1.0), 0.0);
    }
}
