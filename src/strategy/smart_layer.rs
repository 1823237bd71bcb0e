//! Smart-layer trigger strategy.
//!
//! For every layer the strategy keeps the position closest to the
//! stabilization point, one per movement class, and emits a single plan when
//! the next layer starts (or the stream ends).
//!
//! State machine, cyclic per layer:
//!
//! ```text
//! AwaitingLayerChange --layer key increases--> AccumulatingCandidates
//! AccumulatingCandidates --next layer / stream end--> Finalizing --> AwaitingLayerChange
//! ```
//!
//! With `snap_to_fastest`, an extrusion candidate must run within
//! `speed_threshold` of the fastest extrusion speed seen so far in the layer.
//! A kept candidate that falls behind a newly observed faster speed is
//! evicted, so a faster but farther move can take its place.

use tracing::debug;

use crate::config::{RunConfig, SmartLayerArgs};
use crate::error::StabilizationResult;
use crate::plan::{SnapshotPlan, TriggerProvenance};
use crate::position::{height_increment_index, MovementClass, Position};

use super::candidates::{CandidateTable, SpeedTracker, TriggerCandidate};
use super::{StabilizationPoint, StrategyContext, TriggerStrategy};

/// Where the strategy is in its per-layer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    /// Waiting for the layer key to increase.
    AwaitingLayerChange,
    /// Collecting candidates for the current layer.
    AccumulatingCandidates,
    /// Choosing the winner and committing the layer's plan.
    Finalizing,
}

/// Closest-point-per-layer strategy.
#[derive(Debug, Clone)]
pub struct SmartLayerStrategy {
    args: SmartLayerArgs,
    x_disabled: bool,
    y_disabled: bool,
    /// Band height when layers are detected by height increment.
    height_increment: Option<f64>,
    state: LayerState,
    current_key: u32,
    target: StabilizationPoint,
    candidates: CandidateTable,
    speeds: SpeedTracker,
    last_line: u64,
}

impl SmartLayerStrategy {
    /// Creates a strategy for one run.
    #[must_use]
    pub fn new(config: &RunConfig) -> Self {
        Self {
            args: config.smart_layer,
            x_disabled: config.x_disabled,
            y_disabled: config.y_disabled,
            height_increment: config.uses_height_increment().then_some(config.height_increment),
            state: LayerState::AwaitingLayerChange,
            current_key: 0,
            target: StabilizationPoint::from_config(config),
            candidates: CandidateTable::default(),
            speeds: SpeedTracker::default(),
            last_line: 0,
        }
    }

    /// Current position in the per-layer cycle.
    #[must_use]
    pub const fn state(&self) -> LayerState {
        self.state
    }

    /// Key of the layer currently tracked (0 before the first layer).
    #[must_use]
    pub const fn current_layer(&self) -> u32 {
        self.current_key
    }

    /// Stabilization point of the current layer.
    #[must_use]
    pub const fn target(&self) -> StabilizationPoint {
        self.target
    }

    /// Candidates collected so far in the current layer.
    #[must_use]
    pub const fn candidates(&self) -> &CandidateTable {
        &self.candidates
    }

    fn layer_key(&self, position: &Position) -> u32 {
        let Some(increment) = self.height_increment else {
            return position.layer;
        };
        if let Some(index) = position.height_increment {
            return index;
        }
        // Only extruding moves establish a new height; Z-hops must not.
        match position.z {
            Some(z) if position.is_extruding => height_increment_index(z, increment),
            _ => self.current_key,
        }
    }

    fn begin_layer(&mut self, ctx: &mut StrategyContext<'_>, key: u32, line: u64) {
        self.current_key = key;
        self.candidates.clear();
        self.speeds.reset();
        self.target = ctx.next_target(self.target);
        self.last_line = line;
        self.state = LayerState::AccumulatingCandidates;
        debug!(layer = key, line, x = self.target.x, y = self.target.y, "layer started");
    }

    /// Distance from `position` to the stabilization point, with disabled axes
    /// pinned to the target. `None` if a needed coordinate is missing.
    fn measure(&self, position: &Position) -> Option<(f64, f64, f64)> {
        let x = if self.x_disabled { self.target.x } else { position.x? };
        let y = if self.y_disabled { self.target.y } else { position.y? };
        let distance = (x - self.target.x).hypot(y - self.target.y);
        distance.is_finite().then_some((x, y, distance))
    }

    fn evaluate(&mut self, current: &Position, previous: &Position) {
        let Some(class) = current.classify(previous) else {
            return;
        };
        let snapping = self.args.snap_to_fastest && class == MovementClass::Extrusion;
        if class == MovementClass::Extrusion {
            self.speeds.observe(current.feed_rate);
        }
        if snapping {
            let threshold = self.args.speed_threshold;
            let stale = self
                .candidates
                .get(class)
                .is_some_and(|kept| !self.speeds.is_fast_enough(kept.speed, threshold));
            if stale {
                if let Some(evicted) = self.candidates.evict(class) {
                    debug!(line = evicted.line_number, speed = evicted.speed, "evicted slower candidate");
                }
            }
        }
        if !self.args.trigger_type.accepts(class) {
            return;
        }
        let Some((x, y, distance)) = self.measure(current) else {
            return;
        };
        if snapping && !self.speeds.is_fast_enough(current.feed_rate, self.args.speed_threshold) {
            return;
        }

        self.candidates
            .offer(TriggerCandidate::from_position(current, class, distance, x, y));
    }

    fn finalize_layer(&mut self, ctx: &mut StrategyContext<'_>) {
        self.state = LayerState::Finalizing;
        let layer = self.current_key;
        let target = (self.target.x, self.target.y);
        let mut provenance = TriggerProvenance {
            fastest_speed: self.speeds.fastest(),
            slowest_speed: self.speeds.slowest(),
            single_speed: self.speeds.is_single_speed(),
            ..TriggerProvenance::default()
        };

        let plan = match self.candidates.best() {
            Some(winner) => {
                provenance.movement_class = Some(winner.class);
                provenance.distance = Some(winner.distance);
                provenance.speed = Some(winner.speed);
                let mut plan =
                    SnapshotPlan::travel_to_snapshot(layer, (winner.x, winner.y), target, winner.line_number)
                        .returning_to(winner.head_x, winner.head_y);
                plan.trigger_z = winner.z;
                plan.triggering_command = winner.command.clone();
                plan
            }
            None => {
                debug!(layer, "no qualifying candidate, using the stabilization point");
                provenance.used_default = true;
                SnapshotPlan::travel_to_snapshot(layer, target, target, self.last_line)
            }
        };
        let plan = SnapshotPlan { provenance, ..plan };

        debug!(
            layer,
            line = plan.source_line,
            x = plan.trigger_x,
            y = plan.trigger_y,
            "snapshot plan finalized"
        );
        ctx.commit(plan);
        self.candidates.clear();
        self.state = LayerState::AwaitingLayerChange;
    }
}

impl TriggerStrategy for SmartLayerStrategy {
    fn name(&self) -> &'static str {
        "smart_layer"
    }

    fn process_pair(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        current: &Position,
        previous: &Position,
    ) -> StabilizationResult<()> {
        let key = self.layer_key(current);
        if key > self.current_key {
            if self.state == LayerState::AccumulatingCandidates {
                self.finalize_layer(ctx);
            }
            self.begin_layer(ctx, key, current.line_number);
        }

        if self.state == LayerState::AccumulatingCandidates {
            self.last_line = current.line_number;
            self.evaluate(current, previous);
        }
        Ok(())
    }

    fn on_complete(&mut self, ctx: &mut StrategyContext<'_>) {
        if self.state == LayerState::AccumulatingCandidates {
            self.finalize_layer(ctx);
        }
    }
}
