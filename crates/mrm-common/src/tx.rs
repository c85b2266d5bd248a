//! Transmission query input.
//!
//! A query asks how a signal sent from one point arrives at another. The
//! [`TxPair`] trait is what the engine reads; [`Transmission`] is the plain
//! value implementation used by callers that have no radio objects of their own.

use crate::{normalize_angle, Point};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// A transmitter/receiver pair for one propagation query.
pub trait TxPair {
    /// Transmitter position.
    fn source(&self) -> Point;

    /// Receiver position.
    fn destination(&self) -> Point;

    /// Transmit power in dBm.
    fn tx_power(&self) -> f64;

    /// Transmitter antenna gain towards the receiver, in dB.
    fn tx_gain(&self) -> f64 {
        0.0
    }

    /// Receiver antenna gain towards the transmitter, in dB.
    fn rx_gain(&self) -> f64 {
        0.0
    }

    /// Straight-line distance in metres.
    fn distance(&self) -> f64 {
        self.source().distance(&self.destination())
    }

    /// Bearing from transmitter to receiver in radians.
    fn bearing(&self) -> f64 {
        self.source().bearing_to(&self.destination())
    }
}

/// Antenna radiation pattern.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Antenna {
    /// Same gain in every direction (0 dB).
    #[default]
    Omni,
    /// Main lobe of `gain_db` within `beamwidth_deg` around `heading_deg`,
    /// `back_lobe_db` everywhere else.
    Sector {
        /// Main lobe direction, degrees counter-clockwise from +x.
        heading_deg: f64,
        /// Full width of the main lobe in degrees.
        beamwidth_deg: f64,
        /// Gain inside the main lobe.
        gain_db: f64,
        /// Gain outside the main lobe.
        back_lobe_db: f64,
    },
}

impl Antenna {
    /// Gain in dB for a signal leaving or arriving along `bearing` (radians).
    pub fn gain_towards(&self, bearing: f64) -> f64 {
        match *self {
            Antenna::Omni => 0.0,
            Antenna::Sector {
                heading_deg,
                beamwidth_deg,
                gain_db,
                back_lobe_db,
            } => {
                let d = normalize_angle(bearing - heading_deg.to_radians());
                let off_axis = d.min(TAU - d);
                if off_axis <= beamwidth_deg.to_radians() / 2.0 {
                    gain_db
                } else {
                    back_lobe_db
                }
            }
        }
    }
}

/// A transmission described by plain values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    pub source: Point,
    pub destination: Point,
    pub tx_power_dbm: f64,
    #[serde(default)]
    pub tx_antenna: Antenna,
    #[serde(default)]
    pub rx_antenna: Antenna,
}

impl Transmission {
    /// Transmission between omnidirectional antennas.
    pub fn new(source: Point, destination: Point, tx_power_dbm: f64) -> Self {
        Transmission {
            source,
            destination,
            tx_power_dbm,
            tx_antenna: Antenna::Omni,
            rx_antenna: Antenna::Omni,
        }
    }

    pub fn with_tx_antenna(mut self, antenna: Antenna) -> Self {
        self.tx_antenna = antenna;
        self
    }

    pub fn with_rx_antenna(mut self, antenna: Antenna) -> Self {
        self.rx_antenna = antenna;
        self
    }
}

impl TxPair for Transmission {
    fn source(&self) -> Point {
        self.source
    }

    fn destination(&self) -> Point {
        self.destination
    }

    fn tx_power(&self) -> f64 {
        self.tx_power_dbm
    }

    fn tx_gain(&self) -> f64 {
        self.tx_antenna.gain_towards(self.bearing())
    }

    fn rx_gain(&self) -> f64 {
        // The receiver sees the transmitter in the opposite direction
        self.rx_antenna.gain_towards(self.bearing() + PI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transmission_geometry() {
        let tx = Transmission::new(Point::new(0.0, 0.0), Point::new(3.0, 4.0), 10.0);
        assert!((tx.distance() - 5.0).abs() < 1e-12);
        assert!((tx.bearing() - (4.0f64).atan2(3.0)).abs() < 1e-12);
        assert_eq!(tx.tx_gain(), 0.0);
        assert_eq!(tx.rx_gain(), 0.0);
    }

    #[test]
    fn test_sector_antenna_gain() {
        let sector = Antenna::Sector {
            heading_deg: 0.0,
            beamwidth_deg: 60.0,
            gain_db: 6.0,
            back_lobe_db: -10.0,
        };
        assert_eq!(sector.gain_towards(0.0), 6.0);
        assert_eq!(sector.gain_towards(25f64.to_radians()), 6.0);
        assert_eq!(sector.gain_towards(-25f64.to_radians()), 6.0);
        assert_eq!(sector.gain_towards(PI), -10.0);

        // Receiver pointing west hears a transmitter located to its west
        let tx = Transmission::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0), 0.0)
            .with_tx_antenna(sector)
            .with_rx_antenna(Antenna::Sector {
                heading_deg: 180.0,
                beamwidth_deg: 60.0,
                gain_db: 3.0,
                back_lobe_db: -20.0,
            });
        assert_eq!(tx.tx_gain(), 6.0);
        assert_eq!(tx.rx_gain(), 3.0);
    }
}
