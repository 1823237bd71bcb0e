//! Per-layer candidate state.
//!
//! The table holds exactly one slot per [`MovementClass`] and is cleared on
//! every layer transition.

use crate::position::{MovementClass, Position};

/// A position under consideration as its class's snapshot trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerCandidate {
    pub class: MovementClass,
    /// Planar distance to the stabilization point, disabled axes excluded.
    pub distance: f64,
    /// Feed rate of the move.
    pub speed: f64,
    pub line_number: u64,
    /// Trigger X, pinned to the target when the axis is disabled.
    pub x: f64,
    /// Trigger Y, pinned to the target when the axis is disabled.
    pub y: f64,
    pub z: Option<f64>,
    /// X of the head after the move.
    pub head_x: Option<f64>,
    /// Y of the head after the move.
    pub head_y: Option<f64>,
    pub command: Option<String>,
}

impl TriggerCandidate {
    /// Captures the fields of `position` needed to build a plan.
    #[must_use]
    pub fn from_position(position: &Position, class: MovementClass, distance: f64, x: f64, y: f64) -> Self {
        Self {
            class,
            distance,
            speed: position.feed_rate,
            line_number: position.line_number,
            x,
            y,
            z: position.z,
            head_x: position.x,
            head_y: position.y,
            command: position.command.clone(),
        }
    }
}

/// Fixed-size table of the best candidate per movement class.
#[derive(Debug, Clone, Default)]
pub struct CandidateTable {
    slots: [Option<TriggerCandidate>; 2],
}

impl CandidateTable {
    /// Current candidate for `class`.
    #[must_use]
    pub fn get(&self, class: MovementClass) -> Option<&TriggerCandidate> {
        self.slots[class.index()].as_ref()
    }

    /// True if `distance` would replace the slot for `class`.
    ///
    /// Only a strictly smaller distance wins, so ties keep the first-seen candidate.
    #[must_use]
    pub fn is_closer(&self, class: MovementClass, distance: f64) -> bool {
        self.get(class).map_or(true, |current| distance < current.distance)
    }

    /// Stores `candidate` if it is closer than the current slot. Returns true if stored.
    pub fn offer(&mut self, candidate: TriggerCandidate) -> bool {
        if !self.is_closer(candidate.class, candidate.distance) {
            return false;
        }
        let idx = candidate.class.index();
        self.slots[idx] = Some(candidate);
        true
    }

    /// Removes and returns the slot for `class`.
    pub fn evict(&mut self, class: MovementClass) -> Option<TriggerCandidate> {
        self.slots[class.index()].take()
    }

    /// Highest-priority candidate: extrusion first, then retracted travel.
    #[must_use]
    pub fn best(&self) -> Option<&TriggerCandidate> {
        MovementClass::ALL.iter().find_map(|class| self.get(*class))
    }

    /// True if no slot is filled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Empties every slot.
    pub fn clear(&mut self) {
        self.slots = [None, None];
    }
}

/// Running extrusion-speed range of one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedTracker {
    fastest: Option<f64>,
    slowest: Option<f64>,
}

impl SpeedTracker {
    /// Records one observed extrusion speed.
    pub fn observe(&mut self, speed: f64) {
        self.fastest = Some(self.fastest.map_or(speed, |f| f.max(speed)));
        self.slowest = Some(self.slowest.map_or(speed, |s| s.min(speed)));
    }

    #[must_use]
    pub const fn fastest(&self) -> Option<f64> {
        self.fastest
    }

    #[must_use]
    pub const fn slowest(&self) -> Option<f64> {
        self.slowest
    }

    /// True if every observed speed was identical.
    #[must_use]
    pub fn is_single_speed(&self) -> bool {
        match (self.fastest, self.slowest) {
            (Some(fast), Some(slow)) => fast == slow,
            _ => false,
        }
    }

    /// True if `speed` lies within `threshold` of the fastest observed speed.
    #[must_use]
    pub fn is_fast_enough(&self, speed: f64, threshold: f64) -> bool {
        self.fastest.map_or(true, |fastest| speed >= fastest - threshold)
    }

    /// Forgets all observations.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(class: MovementClass, distance: f64, line: u64) -> TriggerCandidate {
        TriggerCandidate {
            class,
            distance,
            speed: 0.0,
            line_number: line,
            x: 0.0,
            y: 0.0,
            z: None,
            head_x: Some(0.0),
            head_y: Some(0.0),
            command: None,
        }
    }

    #[test]
    fn offer_keeps_strictly_closer_candidate() {
        let mut t = CandidateTable::default();
        assert!(t.offer(candidate(MovementClass::Extrusion, 5.0, 1)));
        assert!(t.offer(candidate(MovementClass::Extrusion, 2.0, 2)));
        // Tie keeps the first-seen candidate.
        assert!(!t.offer(candidate(MovementClass::Extrusion, 2.0, 3)));
        assert!(!t.offer(candidate(MovementClass::Extrusion, 4.0, 4)));
        assert_eq!(t.get(MovementClass::Extrusion).unwrap().line_number, 2);
    }

    #[test]
    fn slots_are_independent_per_class() {
        let mut t = CandidateTable::default();
        t.offer(candidate(MovementClass::RetractedTravel, 1.0, 1));
        t.offer(candidate(MovementClass::Extrusion, 9.0, 2));
        assert_eq!(t.get(MovementClass::RetractedTravel).unwrap().line_number, 1);
        assert_eq!(t.get(MovementClass::Extrusion).unwrap().line_number, 2);
    }

    #[test]
    fn best_prefers_extrusion() {
        let mut t = CandidateTable::default();
        assert!(t.best().is_none());
        t.offer(candidate(MovementClass::RetractedTravel, 1.0, 1));
        assert_eq!(t.best().unwrap().class, MovementClass::RetractedTravel);
        t.offer(candidate(MovementClass::Extrusion, 9.0, 2));
        assert_eq!(t.best().unwrap().class, MovementClass::Extrusion);
    }

    #[test]
    fn clear_and_evict() {
        let mut t = CandidateTable::default();
        t.offer(candidate(MovementClass::Extrusion, 1.0, 1));
        t.offer(candidate(MovementClass::RetractedTravel, 1.0, 2));
        assert_eq!(t.evict(MovementClass::Extrusion).unwrap().line_number, 1);
        assert!(t.get(MovementClass::Extrusion).is_none());
        assert!(!t.is_empty());
        t.clear();
        assert!(t.is_empty());
    }

    #[test]
    fn speed_tracker_range_and_filter() {
        let mut s = SpeedTracker::default();
        assert!(s.is_fast_enough(1.0, 0.0));
        assert!(!s.is_single_speed());

        s.observe(50.0);
        assert!(s.is_single_speed());
        s.observe(100.0);
        assert!(!s.is_single_speed());
        assert_eq!(s.fastest(), Some(100.0));
        assert_eq!(s.slowest(), Some(50.0));

        assert!(s.is_fast_enough(90.0, 10.0));
        assert!(!s.is_fast_enough(89.9, 10.0));

        s.reset();
        assert_eq!(s.fastest(), None);
    }
}
