//! Trigger strategies.
//!
//! The engine drives a strategy through the [`TriggerStrategy`] trait and never
//! depends on a concrete implementation, so new strategies plug in without
//! engine changes.

/// Per-class candidate slots and speed tracking.
pub mod candidates;
/// Closest-point-per-layer strategy.
pub mod smart_layer;

use tracing::debug;

use crate::config::{RunConfig, StabilizationType};
use crate::error::{ConfigError, StabilizationResult};
use crate::plan::SnapshotPlan;
use crate::position::Position;

pub use candidates::{CandidateTable, SpeedTracker, TriggerCandidate};
pub use smart_layer::{LayerState, SmartLayerStrategy};

/// Callback that may replace the stabilization point between layers.
///
/// Receives the current point and returns the point to use for the next layer.
pub type TargetOverride = Box<dyn FnMut(f64, f64) -> (f64, f64) + Send>;

/// Stabilization point a layer's snapshot is aligned on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizationPoint {
    /// Target X.
    pub x: f64,
    /// Target Y.
    pub y: f64,
}

impl StabilizationPoint {
    /// The configured default point.
    #[must_use]
    pub const fn from_config(config: &RunConfig) -> Self {
        Self {
            x: config.x_coordinate,
            y: config.y_coordinate,
        }
    }
}

/// What a strategy may touch during a run.
pub struct StrategyContext<'a> {
    plans: &'a mut Vec<SnapshotPlan>,
    target_override: Option<&'a mut TargetOverride>,
}

impl<'a> StrategyContext<'a> {
    /// Creates a context writing finalized plans into `plans`.
    pub fn new(plans: &'a mut Vec<SnapshotPlan>, target_override: Option<&'a mut TargetOverride>) -> Self {
        Self {
            plans,
            target_override,
        }
    }

    /// Appends a finalized plan to the run's output.
    pub fn commit(&mut self, plan: SnapshotPlan) {
        self.plans.push(plan);
    }

    /// Number of plans committed so far.
    #[must_use]
    pub fn plans_committed(&self) -> usize {
        self.plans.len()
    }

    /// Stabilization point for the next layer.
    ///
    /// Without an override callback this is `current` unchanged. Non-finite
    /// values returned by the callback are ignored.
    pub fn next_target(&mut self, current: StabilizationPoint) -> StabilizationPoint {
        let Some(callback) = self.target_override.as_deref_mut() else {
            return current;
        };
        let (x, y) = callback(current.x, current.y);
        if x.is_finite() && y.is_finite() {
            StabilizationPoint { x, y }
        } else {
            debug!(x, y, "ignoring non-finite stabilization point override");
            current
        }
    }
}

/// Decides where each layer's snapshot belongs.
pub trait TriggerStrategy {
    /// Strategy name used in logs.
    fn name(&self) -> &'static str;

    /// Folds one consecutive pair of positions into the strategy state.
    ///
    /// Returning a recoverable error rejects `current`: the engine counts it
    /// and keeps `previous` as the predecessor of the next record.
    fn process_pair(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        current: &Position,
        previous: &Position,
    ) -> StabilizationResult<()>;

    /// Called once at stream end to flush any unfinalized layer.
    fn on_complete(&mut self, ctx: &mut StrategyContext<'_>);
}

/// Builds the strategy selected by `config.stabilization_type`.
pub fn for_config(config: &RunConfig) -> Result<Box<dyn TriggerStrategy + Send>, ConfigError> {
    config.validate()?;
    match config.stabilization_type {
        StabilizationType::SmartLayer => Ok(Box::new(SmartLayerStrategy::new(config))),
    }
}
