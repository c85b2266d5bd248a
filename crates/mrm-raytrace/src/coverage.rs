//! Coverage maps: one metric evaluated over a grid of receiver positions.
//!
//! [`compute`] runs on the caller's thread with exclusive access to the
//! model. [`spawn`] runs on a worker thread over a [`SharedChannelModel`],
//! taking the lock once per column.

use crate::model::{ChannelModel, SharedChannelModel};
use crate::ChannelError;
use mrm_common::{Antenna, Point, Rect, Transmission};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::debug;

/// Quantity plotted in a coverage map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMetric {
    /// Mean received signal strength, dBm.
    SignalStrength,
    SignalVariance,
    /// Mean SNR against background noise only, dB.
    Snr,
    SnrVariance,
    ReceptionProbability,
    /// RMS delay spread, µs.
    RmsDelaySpread,
}

impl CoverageMetric {
    pub const ALL: [CoverageMetric; 6] = [
        CoverageMetric::SignalStrength,
        CoverageMetric::SignalVariance,
        CoverageMetric::Snr,
        CoverageMetric::SnrVariance,
        CoverageMetric::ReceptionProbability,
        CoverageMetric::RmsDelaySpread,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CoverageMetric::SignalStrength => "signal_strength",
            CoverageMetric::SignalVariance => "signal_variance",
            CoverageMetric::Snr => "snr",
            CoverageMetric::SnrVariance => "snr_variance",
            CoverageMetric::ReceptionProbability => "reception_probability",
            CoverageMetric::RmsDelaySpread => "rms_delay_spread",
        }
    }

    fn evaluate(&self, model: &mut ChannelModel, tx: &Transmission) -> f64 {
        match self {
            CoverageMetric::SignalStrength => model.received_signal_strength(tx).mean_dbm,
            CoverageMetric::SignalVariance => model.received_signal_strength(tx).variance,
            CoverageMetric::Snr => model.sinr(tx, f64::MIN).mean_db,
            CoverageMetric::SnrVariance => model.sinr(tx, f64::MIN).variance,
            CoverageMetric::ReceptionProbability => {
                model.probability_of_reception(tx, f64::MIN).probability
            }
            CoverageMetric::RmsDelaySpread => model.rms_delay_spread(tx),
        }
    }
}

impl fmt::Display for CoverageMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A metric name that [`CoverageMetric`] does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown metric '{name}', expected one of: {expected}")]
pub struct ParseMetricError {
    pub name: String,
    pub expected: String,
}

impl FromStr for CoverageMetric {
    type Err = ParseMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CoverageMetric::ALL
            .iter()
            .copied()
            .find(|metric| metric.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = CoverageMetric::ALL.iter().map(|m| m.name()).collect();
                ParseMetricError {
                    name: s.to_string(),
                    expected: known.join(", "),
                }
            })
    }
}

/// One transmitter and the grid of receivers to evaluate it at.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRequest {
    pub source: Point,
    pub tx_power_dbm: f64,
    pub tx_antenna: Antenna,
    /// Area covered by the grid. Receivers sit at cell centres.
    pub area: Rect,
    pub columns: usize,
    pub rows: usize,
    pub metric: CoverageMetric,
}

impl CoverageRequest {
    /// Receiver position of cell (`column`, `row`).
    pub fn cell_center(&self, column: usize, row: usize) -> Point {
        let cell_width = self.area.width / self.columns as f64;
        let cell_height = self.area.height / self.rows as f64;
        Point::new(
            self.area.x + (column as f64 + 0.5) * cell_width,
            self.area.y + (row as f64 + 0.5) * cell_height,
        )
    }

    fn validate(&self) -> Result<(), ChannelError> {
        if self.columns == 0 || self.rows == 0 {
            return Err(ChannelError::InvalidRequest(format!(
                "coverage grid must not be empty ({}x{})",
                self.columns, self.rows
            )));
        }
        if self.area.is_empty() {
            return Err(ChannelError::InvalidRequest(format!(
                "coverage area {} is empty",
                self.area
            )));
        }
        Ok(())
    }
}

/// Evaluated coverage grid, stored column by column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageMap {
    pub metric: CoverageMetric,
    pub area: Rect,
    pub columns: usize,
    pub rows: usize,
    /// Unreachable points are `-inf`, written as `null`.
    #[serde(with = "mrm_common::db::seq")]
    pub values: Vec<f64>,
    /// Smallest finite value, `None` if there is none.
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl CoverageMap {
    fn new(request: &CoverageRequest, values: Vec<f64>) -> Self {
        let finite = values.iter().copied().filter(|v| v.is_finite());
        let min = finite.clone().reduce(f64::min);
        let max = finite.reduce(f64::max);
        CoverageMap {
            metric: request.metric,
            area: request.area,
            columns: request.columns,
            rows: request.rows,
            values,
            min,
            max,
        }
    }

    pub fn value(&self, column: usize, row: usize) -> Option<f64> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        self.values.get(column * self.rows + row).copied()
    }
}

/// Columns finished so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageProgress {
    pub done: usize,
    pub total: usize,
}

/// Cooperative cancellation flag, checked before every receiver position.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Evaluate `request` on the calling thread.
///
/// Queries never mutate obstacles or parameters, so a cancelled run leaves
/// the model as it found it.
pub fn compute<F>(
    model: &mut ChannelModel,
    request: &CoverageRequest,
    cancel: &CancelToken,
    progress: F,
) -> Result<CoverageMap, ChannelError>
where
    F: FnMut(CoverageProgress),
{
    run(request, cancel, progress, |column| {
        evaluate_column(model, request, column, cancel)
    })
}

/// Evaluate `request` on a worker thread.
pub fn spawn<F>(
    model: SharedChannelModel,
    request: CoverageRequest,
    cancel: CancelToken,
    progress: F,
) -> JoinHandle<Result<CoverageMap, ChannelError>>
where
    F: FnMut(CoverageProgress) + Send + 'static,
{
    thread::spawn(move || {
        run(&request, &cancel, progress, |column| {
            evaluate_column(&mut model.lock(), &request, column, &cancel)
        })
    })
}

fn run<F, E>(
    request: &CoverageRequest,
    cancel: &CancelToken,
    mut progress: F,
    mut evaluate: E,
) -> Result<CoverageMap, ChannelError>
where
    F: FnMut(CoverageProgress),
    E: FnMut(usize) -> Result<Vec<f64>, ChannelError>,
{
    request.validate()?;
    debug!(
        "Computing {} coverage from {} over {} ({}x{})",
        request.metric, request.source, request.area, request.columns, request.rows
    );

    let mut values = Vec::with_capacity(request.columns * request.rows);
    for column in 0..request.columns {
        values.extend(evaluate(column)?);
        progress(CoverageProgress {
            done: column + 1,
            total: request.columns,
        });
    }

    if cancel.is_cancelled() {
        return Err(ChannelError::Cancelled);
    }
    Ok(CoverageMap::new(request, values))
}

fn evaluate_column(
    model: &mut ChannelModel,
    request: &CoverageRequest,
    column: usize,
    cancel: &CancelToken,
) -> Result<Vec<f64>, ChannelError> {
    let mut values = Vec::with_capacity(request.rows);
    for row in 0..request.rows {
        if cancel.is_cancelled() {
            debug!("Coverage cancelled at column {} row {}", column, row);
            return Err(ChannelError::Cancelled);
        }
        let tx = Transmission::new(request.source, request.cell_center(column, row), request.tx_power_dbm)
            .with_tx_antenna(request.tx_antenna);
        values.push(request.metric.evaluate(model, &tx));
    }
    Ok(values)
}
