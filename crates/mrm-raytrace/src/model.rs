//! The channel model engine.
//!
//! [`ChannelModel`] owns the parameters, the obstacle world and the
//! per-instance caches, and answers propagation queries for a [`TxPair`].
//!
//! ## Change notification
//!
//! Listeners registered with [`ChannelModel::subscribe`] are called after a
//! mutation commits. Mutations between [`ChannelModel::begin_update`] and
//! the matching [`ChannelModel::end_update`] (or inside
//! [`ChannelModel::batch`]) are reported together, once.

use crate::channel::{
    self, combine, path_loss, reception_probability, Combined, DelaySpread, LossModel, Noise,
    PathLoss, Reception, SignalStrength, Sinr,
};
use crate::obstacles::ObstacleWorld;
use crate::paths::{connecting_paths, PathOptions, RayPath};
use crate::tree::{RayBudget, RayTree};
use crate::visibility::VisibilityCache;
use crate::ChannelError;
use mrm_common::{Line, Point, Rect, TxPair};
use mrm_model::parameters::{
    ChannelParameters, FromParameterValue, Parameter, ParameterValue, ToParameterValue,
    APPLY_RANDOM, BG_NOISE_MEAN, BG_NOISE_VAR, FREQUENCY, RT_DISALLOW_DIRECT_PATH,
    RT_IGNORE_NON_DIRECT, RX_SENSITIVITY, RX_WITH_GAIN, SNR_THRESHOLD, SYSTEM_GAIN_MEAN,
    SYSTEM_GAIN_VAR, TX_WITH_GAIN,
};
use mrm_model::ChannelConfig;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// A channel model shared between threads.
pub type SharedChannelModel = Arc<Mutex<ChannelModel>>;

type Listener = Box<dyn FnMut(&ChannelChange) + Send>;

/// Which parts of the model a notification covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelChange {
    pub parameters: bool,
    pub obstacles: bool,
}

impl ChannelChange {
    pub const PARAMETERS: ChannelChange = ChannelChange {
        parameters: true,
        obstacles: false,
    };

    pub const OBSTACLES: ChannelChange = ChannelChange {
        parameters: false,
        obstacles: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.parameters && !self.obstacles
    }

    fn merge(&mut self, other: ChannelChange) {
        self.parameters |= other.parameters;
        self.obstacles |= other.obstacles;
    }
}

/// Handle returned by [`ChannelModel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ray segments and the human-readable log of one traced transmission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TracedRays {
    pub segments: Vec<Line>,
    pub log: String,
}

impl TracedRays {
    fn line(&mut self, text: impl AsRef<str>) {
        self.log.push_str(text.as_ref());
        self.log.push('\n');
    }
}

/// Ray tracing radio channel model.
pub struct ChannelModel {
    params: ChannelParameters,
    world: ObstacleWorld,
    cache: VisibilityCache,
    /// Frequency-dependent FSPL term, recomputed after any mutation.
    fspl_constant: Option<f64>,
    rng: ChaCha8Rng,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    update_depth: usize,
    pending: ChannelChange,
}

impl fmt::Debug for ChannelModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelModel")
            .field("params", &self.params)
            .field("obstacles", &self.world.len())
            .field("listeners", &self.listeners.len())
            .field("update_depth", &self.update_depth)
            .finish_non_exhaustive()
    }
}

impl Default for ChannelModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelModel {
    /// Empty model with default parameters and an entropy-seeded RNG.
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    /// Empty model whose random draws are reproducible from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        ChannelModel {
            params: ChannelParameters::new(),
            world: ObstacleWorld::new(),
            cache: VisibilityCache::new(),
            fspl_constant: None,
            rng,
            listeners: Vec::new(),
            next_listener: 0,
            update_depth: 0,
            pending: ChannelChange::default(),
        }
    }

    /// Wrap the model for use from several threads.
    pub fn into_shared(self) -> SharedChannelModel {
        Arc::new(Mutex::new(self))
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    pub fn parameters(&self) -> &ChannelParameters {
        &self.params
    }

    pub fn get<T: FromParameterValue + Default>(&self, param: &Parameter<T>) -> T {
        self.params.get(param)
    }

    /// Set a parameter. Returns whether the value changed; listeners are
    /// only notified if it did.
    pub fn set_parameter<T: ToParameterValue>(
        &mut self,
        param: &'static Parameter<T>,
        value: T,
    ) -> bool {
        let changed = self.params.set(param, value);
        if changed {
            self.changed(ChannelChange::PARAMETERS);
        }
        changed
    }

    pub fn get_parameter_by_name(&self, name: &str) -> Result<ParameterValue, ChannelError> {
        Ok(self.params.get_by_name(name)?)
    }

    pub fn set_parameter_by_name(
        &mut self,
        name: &str,
        value: ParameterValue,
    ) -> Result<bool, ChannelError> {
        let changed = self.params.set_by_name(name, value)?;
        if changed {
            self.changed(ChannelChange::PARAMETERS);
        }
        Ok(changed)
    }

    /// Parse `text` as the parameter's type and store it.
    pub fn set_parameter_from_str(&mut self, name: &str, text: &str) -> Result<bool, ChannelError> {
        let changed = self.params.set_from_str(name, text)?;
        if changed {
            self.changed(ChannelChange::PARAMETERS);
        }
        Ok(changed)
    }

    /// Restore every parameter to its default.
    pub fn reset_parameters(&mut self) -> bool {
        let changed = self.params.reset();
        if changed {
            self.changed(ChannelChange::PARAMETERS);
        }
        changed
    }

    // ========================================================================
    // Obstacles
    // ========================================================================

    /// Add a `w` × `h` obstacle with its minimum corner at (`x`, `y`),
    /// merging it with adjacent obstacles.
    pub fn add_obstacle(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.add_obstacle_rect(Rect::new(x, y, w, h), true);
    }

    pub fn add_obstacle_rect(&mut self, rect: Rect, merge: bool) {
        self.world.add_obstacle(rect, merge);
        self.changed(ChannelChange::OBSTACLES);
    }

    pub fn remove_obstacle(&mut self, index: usize) -> Option<Rect> {
        let removed = self.world.remove_obstacle(index)?;
        self.changed(ChannelChange::OBSTACLES);
        Some(removed)
    }

    pub fn remove_all_obstacles(&mut self) {
        if self.world.is_empty() {
            return;
        }
        self.world.remove_all();
        self.changed(ChannelChange::OBSTACLES);
    }

    pub fn obstacle_count(&self) -> usize {
        self.world.len()
    }

    pub fn obstacle_at(&self, index: usize) -> Option<Rect> {
        self.world.obstacle(index)
    }

    pub fn obstacles(&self) -> &[Rect] {
        self.world.obstacles()
    }

    pub fn world(&self) -> &ObstacleWorld {
        &self.world
    }

    /// Number of memoized visibility queries.
    pub fn cached_visibility_entries(&self) -> usize {
        self.cache.len()
    }

    // ========================================================================
    // Change notification
    // ========================================================================

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ChannelChange) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Defer notifications until the matching [`end_update`](Self::end_update).
    pub fn begin_update(&mut self) {
        self.update_depth += 1;
    }

    pub fn end_update(&mut self) {
        if self.update_depth == 0 {
            warn!("end_update called without a matching begin_update");
            return;
        }
        self.update_depth -= 1;
        if self.update_depth == 0 {
            self.flush();
        }
    }

    /// Run `f` as one update: listeners hear about it at most once.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.begin_update();
        let result = f(self);
        self.end_update();
        result
    }

    fn changed(&mut self, change: ChannelChange) {
        self.cache.clear();
        self.fspl_constant = None;
        self.pending.merge(change);
        if self.update_depth == 0 {
            self.flush();
        }
    }

    fn flush(&mut self) {
        let change = std::mem::take(&mut self.pending);
        if change.is_empty() {
            return;
        }
        debug!("Notifying {} listeners of {:?}", self.listeners.len(), change);
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Non-default parameters and all obstacles.
    pub fn to_config(&self) -> ChannelConfig {
        ChannelConfig::capture(&self.params, self.world.obstacles())
    }

    /// Replace the obstacles with the configured ones (unmerged) and apply
    /// the configured parameters. Listeners are notified once.
    pub fn load_config(&mut self, config: &ChannelConfig) {
        self.batch(|model| {
            model.world.remove_all();
            for rect in config.parse_obstacles() {
                model.world.add_obstacle(rect, false);
            }
            model.changed(ChannelChange::OBSTACLES);

            if config.apply_parameters(&mut model.params) {
                model.changed(ChannelChange::PARAMETERS);
            }
        });
        debug!(
            "Loaded configuration with {} obstacles and {} parameter entries",
            self.world.len(),
            config.parameters.len()
        );
    }

    /// Read a YAML configuration file and load it.
    pub fn load_config_file(&mut self, path: impl AsRef<Path>) -> Result<(), ChannelError> {
        let config = ChannelConfig::load(path)?;
        self.load_config(&config);
        Ok(())
    }

    pub fn save_config_file(&self, path: impl AsRef<Path>) -> Result<(), ChannelError> {
        self.to_config().save(path)?;
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Received signal strength in dBm as a Gaussian.
    pub fn received_signal_strength(&mut self, tx: &dyn TxPair) -> SignalStrength {
        self.transmission(tx, None).0
    }

    /// SINR in dB. Interference below the background noise is ignored.
    pub fn sinr(&mut self, tx: &dyn TxPair, interference_dbm: f64) -> Sinr {
        self.sinr_traced(tx, interference_dbm, None)
    }

    pub fn probability_of_reception(&mut self, tx: &dyn TxPair, interference_dbm: f64) -> Reception {
        self.probability_traced(tx, interference_dbm, None)
    }

    pub fn delay_spread(&mut self, tx: &dyn TxPair) -> DelaySpread {
        let (_, combined) = self.transmission(tx, None);
        DelaySpread {
            worst_case_us: combined.delay_spread_us,
            rms_us: combined.rms_delay_spread_us,
        }
    }

    /// RMS delay spread in µs.
    pub fn rms_delay_spread(&mut self, tx: &dyn TxPair) -> f64 {
        self.delay_spread(tx).rms_us
    }

    /// Every path the current budgets find from source to destination.
    pub fn connecting_paths(&mut self, tx: &dyn TxPair) -> Vec<RayPath> {
        self.paths_between(tx.source(), tx.destination())
    }

    /// Ray segments and a log of how the reception probability came about.
    pub fn traced_rays(&mut self, tx: &dyn TxPair) -> TracedRays {
        let mut trace = TracedRays::default();
        self.probability_traced(tx, f64::MIN, Some(&mut trace));
        trace
    }

    fn paths_between(&mut self, source: Point, dest: Point) -> Vec<RayPath> {
        let budget = RayBudget::from_parameters(&self.params);
        let tree = RayTree::build(&mut self.world, &mut self.cache, source, budget);
        let options = PathOptions {
            disallow_direct: self.params.get(&RT_DISALLOW_DIRECT_PATH),
            ignore_non_direct: self.params.get(&RT_IGNORE_NON_DIRECT),
        };
        connecting_paths(&tree, &mut self.world, &mut self.cache, source, dest, options)
    }

    fn fspl_constant(&mut self) -> f64 {
        let frequency = self.params.get(&FREQUENCY);
        *self.fspl_constant.get_or_insert_with(|| {
            debug!("Recomputing FSPL constant for {} MHz", frequency);
            channel::fspl_constant(frequency)
        })
    }

    fn transmission(
        &mut self,
        tx: &dyn TxPair,
        mut trace: Option<&mut TracedRays>,
    ) -> (SignalStrength, Combined) {
        let paths = self.paths_between(tx.source(), tx.destination());

        if let Some(trace) = trace.as_deref_mut() {
            trace.line("Signal components:");
            for path in &paths {
                trace.line(format!("* {}", path));
                trace.segments.extend(path.subpaths().map(|(segment, _)| segment));
            }
        }

        let fspl_constant = self.fspl_constant();
        let loss_model = LossModel::new(&self.params, fspl_constant);
        let losses: Vec<PathLoss> = paths
            .iter()
            .map(|path| path_loss(path, &loss_model, &mut self.world))
            .collect();
        let combined = combine(&losses, self.params.get(&FREQUENCY));

        if let Some(trace) = trace.as_deref_mut() {
            for component in &combined.components {
                trace.line(format!(
                    "{}Signal component: {:.3} dB, phase {:.3} pi",
                    if component.significant { "" } else { "(IGNORED) " },
                    component.gain_db,
                    component.phase_pi
                ));
            }
            trace.line(format!("Total path gain: {:.3} dB", combined.gain_db));
            trace.line(format!("Delay spread: {:.3}", combined.delay_spread_us));
            trace.line(format!("RMS delay spread: {:.3}", combined.rms_delay_spread_us));
        }

        let mut variance = 0.0;
        let mut system_gain = self.params.get(&SYSTEM_GAIN_MEAN);
        let system_gain_var = self.params.get(&SYSTEM_GAIN_VAR);
        if self.params.get(&APPLY_RANDOM) {
            let z: f64 = self.rng.sample(StandardNormal);
            system_gain += system_gain_var.sqrt() * z;
        } else {
            variance += system_gain_var;
        }

        let tx_gain = if self.params.get(&TX_WITH_GAIN) {
            tx.tx_gain()
        } else {
            0.0
        };

        let signal = SignalStrength {
            mean_dbm: tx.tx_power() + system_gain + tx_gain + combined.gain_db,
            variance,
        };

        if let Some(trace) = trace {
            trace.line(format!(
                "Received signal strength: {:.3} dB (variance {})",
                signal.mean_dbm, signal.variance
            ));
        }

        (signal, combined)
    }

    fn sinr_traced(
        &mut self,
        tx: &dyn TxPair,
        interference_dbm: f64,
        mut trace: Option<&mut TracedRays>,
    ) -> Sinr {
        let (signal, _) = self.transmission(tx, trace.as_deref_mut());

        let rx_gain = if self.params.get(&RX_WITH_GAIN) {
            tx.rx_gain()
        } else {
            0.0
        };
        let noise = Noise {
            mean_dbm: self.params.get(&BG_NOISE_MEAN),
            variance: self.params.get(&BG_NOISE_VAR),
        };
        let sample = if self.params.get(&APPLY_RANDOM) {
            Some(self.rng.sample::<f64, _>(StandardNormal))
        } else {
            None
        };

        let sinr = channel::sinr(&signal, rx_gain, &noise, interference_dbm, sample);

        if let Some(trace) = trace {
            trace.line(format!(
                "Received SNR: {:.3} dB (variance {})",
                sinr.mean_db, sinr.variance
            ));
        }
        sinr
    }

    fn probability_traced(
        &mut self,
        tx: &dyn TxPair,
        interference_dbm: f64,
        mut trace: Option<&mut TracedRays>,
    ) -> Reception {
        let sinr = self.sinr_traced(tx, interference_dbm, trace.as_deref_mut());
        let snr_threshold = self.params.get(&SNR_THRESHOLD);
        let reception =
            reception_probability(&sinr, snr_threshold, self.params.get(&RX_SENSITIVITY));

        if let Some(trace) = trace {
            if reception.threshold_db > snr_threshold {
                trace.line("Weak signal: increasing threshold");
            }
            trace.line(format!(
                "Reception probability: {:.1}%",
                100.0 * reception.probability
            ));
        }
        reception
    }
}
