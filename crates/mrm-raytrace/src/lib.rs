//! # mrm-raytrace
//!
//! Multi-path ray tracing radio propagation over rectangular obstacles.
//!
//! This crate provides:
//! - The obstacle world with its spatial grid index ([`ObstacleWorld`])
//! - Visible-side queries with a bounded MRU cache ([`visibility`])
//! - The ray event tree and path extraction ([`RayTree`], [`RayPath`])
//! - Path loss, multipath combination and reception probability ([`channel`])
//! - The [`ChannelModel`] engine with change notification
//! - Batch coverage maps with progress and cancellation ([`coverage`])
//!
//! ## Query pipeline
//!
//! A query builds a ray tree from the transmitter, keeps the paths whose
//! last hop reaches the receiver, charges each path its free-space and
//! per-event losses and superposes the survivors with a phase term.
//! System gain, antenna gains and background noise then turn the total
//! path gain into a signal strength, SINR and reception probability.
//!
//! ## Metrics
//!
//! Counters are recorded through the `metrics` facade and are no-ops
//! unless the host installs a recorder.

pub mod channel;
pub mod coverage;
pub mod model;
pub mod obstacles;
pub mod paths;
pub mod tree;
pub mod visibility;

pub use channel::{
    Combined, DelaySpread, PathLoss, Reception, SignalComponent, SignalStrength, Sinr,
};
pub use coverage::{
    CancelToken, CoverageMap, CoverageMetric, CoverageProgress, CoverageRequest, ParseMetricError,
};
pub use model::{ChannelChange, ChannelModel, ListenerId, SharedChannelModel, TracedRays};
pub use obstacles::ObstacleWorld;
pub use paths::{PathOptions, RayPath};
pub use tree::{RayBudget, RayKind, RayNode, RayTree};
pub use visibility::VisibilityCache;

use mrm_model::{ConfigError, ParameterError};
use thiserror::Error;

// ============================================================================
// Metric Names
// ============================================================================

/// Visibility queries answered from the cache.
pub const METRIC_VISIBILITY_CACHE_HIT: &str = "mrm.visibility.cache_hit";

/// Visibility queries that ran the sweep.
pub const METRIC_VISIBILITY_CACHE_MISS: &str = "mrm.visibility.cache_miss";

/// Paths returned by path extraction.
pub const METRIC_PATHS_FOUND: &str = "mrm.paths.found";

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the channel model.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Unknown parameter name or badly typed value.
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    /// Configuration could not be read or written.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A batch computation was cancelled through its token.
    #[error("Computation cancelled")]
    Cancelled,

    /// Request that cannot be evaluated.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
