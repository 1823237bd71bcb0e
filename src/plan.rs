//! Finalized snapshot plans.

use serde::{Deserialize, Serialize};

use crate::position::MovementClass;

/// When the triggering command is sent relative to the snapshot steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendParsedCommand {
    /// Send the triggering command, then run the plan.
    #[default]
    First,
    /// Run the plan, then send the triggering command.
    Last,
    /// Suppress the triggering command.
    Never,
}

/// Kind of a plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Travel,
    Snapshot,
}

/// One instruction around a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: PlanAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl PlanStep {
    /// Travel to (`x`, `y`).
    #[must_use]
    pub const fn travel(x: f64, y: f64) -> Self {
        Self {
            action: PlanAction::Travel,
            x: Some(x),
            y: Some(y),
        }
    }

    /// Take the snapshot at the current head position.
    #[must_use]
    pub const fn snapshot() -> Self {
        Self {
            action: PlanAction::Snapshot,
            x: None,
            y: None,
        }
    }
}

/// Why a trigger point was chosen.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TriggerProvenance {
    /// Class of the winning candidate, `None` when the default was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_class: Option<MovementClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Fastest extrusion speed seen in the layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fastest_speed: Option<f64>,
    /// Slowest extrusion speed seen in the layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slowest_speed: Option<f64>,
    /// Every extrusion move of the layer ran at one speed.
    pub single_speed: bool,
    /// No candidate qualified and the stabilization point was used unmodified.
    pub used_default: bool,
}

/// A finalized snapshot trigger for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPlan {
    /// Layer (or height-increment) key the plan belongs to.
    pub layer: u32,
    pub trigger_x: f64,
    pub trigger_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_z: Option<f64>,
    /// Line after which the plan runs.
    pub source_line: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggering_command: Option<String>,
    pub send_parsed_command: SendParsedCommand,
    /// Steps from the trigger point to the snapshot.
    pub pre_steps: Vec<PlanStep>,
    /// Steps back to the trigger point.
    pub post_steps: Vec<PlanStep>,
    pub provenance: TriggerProvenance,
}

impl SnapshotPlan {
    /// Builds the travel-snapshot-return sequence for a trigger point and a
    /// stabilization point.
    #[must_use]
    pub fn travel_to_snapshot(
        layer: u32,
        trigger: (f64, f64),
        stabilization: (f64, f64),
        source_line: u64,
    ) -> Self {
        Self {
            layer,
            trigger_x: trigger.0,
            trigger_y: trigger.1,
            trigger_z: None,
            source_line,
            triggering_command: None,
            send_parsed_command: SendParsedCommand::First,
            pre_steps: vec![PlanStep::travel(stabilization.0, stabilization.1), PlanStep::snapshot()],
            post_steps: vec![PlanStep::travel(trigger.0, trigger.1)],
            provenance: TriggerProvenance::default(),
        }
    }

    /// Replaces the return travel with a move to (`x`, `y`); a `None` axis is left alone.
    #[must_use]
    pub fn returning_to(mut self, x: Option<f64>, y: Option<f64>) -> Self {
        self.post_steps = vec![PlanStep {
            action: PlanAction::Travel,
            x,
            y,
        }];
        self
    }

    /// Feeds every plan field into `hasher` in a fixed order.
    pub fn fingerprint(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.layer.to_le_bytes());
        hasher.update(&self.trigger_x.to_bits().to_le_bytes());
        hasher.update(&self.trigger_y.to_bits().to_le_bytes());
        hash_opt_f64(hasher, self.trigger_z);
        hasher.update(&self.source_line.to_le_bytes());
        match &self.triggering_command {
            Some(cmd) => {
                hasher.update(&[1]);
                hasher.update(&(cmd.len() as u64).to_le_bytes());
                hasher.update(cmd.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(&[self.send_parsed_command as u8]);
        for steps in [&self.pre_steps, &self.post_steps] {
            hasher.update(&(steps.len() as u64).to_le_bytes());
            for step in steps {
                hasher.update(&[step.action as u8]);
                hash_opt_f64(hasher, step.x);
                hash_opt_f64(hasher, step.y);
            }
        }
        let p = &self.provenance;
        hasher.update(&[p.movement_class.map_or(0, |c| c.index() as u8 + 1)]);
        for v in [p.distance, p.speed, p.fastest_speed, p.slowest_speed] {
            hash_opt_f64(hasher, v);
        }
        hasher.update(&[u8::from(p.single_speed), u8::from(p.used_default)]);
    }
}

fn hash_opt_f64(hasher: &mut blake3::Hasher, value: Option<f64>) {
    match value {
        Some(v) => {
            hasher.update(&[1]);
            hasher.update(&v.to_bits().to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

/// blake3 digest (hex) of an ordered plan list.
#[must_use]
pub fn plan_digest(plans: &[SnapshotPlan]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(plans.len() as u64).to_le_bytes());
    for plan in plans {
        plan.fingerprint(&mut hasher);
    }
    hasher.finalize().to_hex().to_string()
}
