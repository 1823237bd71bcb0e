//! Parsed machine-state records.
//!
//! A [`Position`] is one sample per motion command, produced by an external
//! tokenizer and consumed read-only by the engine and strategies.

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Tolerance used when rounding heights up to a height-increment index.
const HEIGHT_EPSILON: f64 = 1e-9;

/// Movement class of a consecutive position pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementClass {
    /// The move extrudes filament.
    Extrusion,
    /// A travel move made while the filament is retracted.
    RetractedTravel,
}

impl MovementClass {
    /// All classes, in selection priority order.
    pub const ALL: [Self; 2] = [Self::Extrusion, Self::RetractedTravel];

    /// Stable slot index for fixed-size per-class tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Extrusion => 0,
            Self::RetractedTravel => 1,
        }
    }
}

/// One parsed machine-state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number in the source file.
    pub line_number: u64,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
    /// Extrusion amount of this move (negative for retractions).
    #[serde(default)]
    pub extrusion: f64,
    /// Feed rate in mm/min; the extrusion speed for extruding moves.
    #[serde(default)]
    pub feed_rate: f64,
    #[serde(default)]
    pub is_extruding: bool,
    #[serde(default)]
    pub is_retracted: bool,
    /// Layer index, 0 before the first printed layer.
    #[serde(default)]
    pub layer: u32,
    /// Height-increment index, if the tokenizer computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_increment: Option<u32>,
    /// Raw command text of the line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Position {
    /// A non-extruding, non-retracted position at the given coordinates.
    #[must_use]
    pub fn at(line_number: u64, x: f64, y: f64, z: f64) -> Self {
        Self {
            line_number,
            x: Some(x),
            y: Some(y),
            z: Some(z),
            extrusion: 0.0,
            feed_rate: 0.0,
            is_extruding: false,
            is_retracted: false,
            layer: 0,
            height_increment: None,
            command: None,
        }
    }

    /// Marks the move as extruding at `feed_rate`.
    #[must_use]
    pub fn extruding(mut self, feed_rate: f64) -> Self {
        self.is_extruding = true;
        self.is_retracted = false;
        self.feed_rate = feed_rate;
        if self.extrusion <= 0.0 {
            self.extrusion = 0.1;
        }
        self
    }

    /// Marks the move as a travel with filament retracted.
    #[must_use]
    pub fn retracted(mut self) -> Self {
        self.is_retracted = true;
        self.is_extruding = false;
        self
    }

    /// Sets the layer index.
    #[must_use]
    pub fn on_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    /// Sets the height-increment index.
    #[must_use]
    pub fn with_height_increment(mut self, index: u32) -> Self {
        self.height_increment = Some(index);
        self
    }

    /// Sets the feed rate without changing the movement flags.
    #[must_use]
    pub fn with_feed_rate(mut self, feed_rate: f64) -> Self {
        self.feed_rate = feed_rate;
        self
    }

    /// Attaches the raw command text.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Checks that every numeric field present is finite.
    ///
    /// Missing coordinates are allowed; they only exclude the record from candidacy.
    pub fn validate(&self) -> Result<(), InputError> {
        let line = self.line_number;
        let fields = [
            ("x", self.x),
            ("y", self.y),
            ("z", self.z),
            ("extrusion", Some(self.extrusion)),
            ("feed_rate", Some(self.feed_rate)),
        ];
        for (field, value) in fields {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(InputError::NonFinite { line, field });
            }
        }
        Ok(())
    }

    /// True if this record moved an axis or extruded relative to `previous`.
    ///
    /// The first record of a stream counts as motion when it carries any coordinate.
    #[must_use]
    pub fn is_motion_from(&self, previous: Option<&Self>) -> bool {
        match previous {
            None => self.x.is_some() || self.y.is_some() || self.z.is_some(),
            Some(prev) => {
                self.extrusion != 0.0 || self.x != prev.x || self.y != prev.y || self.z != prev.z
            }
        }
    }

    /// True if X or Y differs from `previous`.
    #[must_use]
    pub fn has_xy_changed(&self, previous: &Self) -> bool {
        self.x != previous.x || self.y != previous.y
    }

    /// Classifies the move from `previous` to `self`.
    ///
    /// Returns `None` for moves that are neither extrusions nor retracted
    /// travels (unretracted travel, pure retractions, Z-only moves).
    #[must_use]
    pub fn classify(&self, previous: &Self) -> Option<MovementClass> {
        if self.is_extruding && !self.is_retracted {
            return Some(MovementClass::Extrusion);
        }
        if self.is_retracted && !self.is_extruding && self.has_xy_changed(previous) {
            return Some(MovementClass::RetractedTravel);
        }
        None
    }
}

/// Height-increment index of `z` for a band height of `increment`.
///
/// Heights are rounded up, so `z == increment` is band 1 and anything just
/// above it is band 2. Returns 0 when `increment` is not positive.
#[must_use]
pub fn height_increment_index(z: f64, increment: f64) -> u32 {
    if increment <= 0.0 || !z.is_finite() || z <= 0.0 {
        return 0;
    }
    let bands = (z / increment - HEIGHT_EPSILON).ceil();
    if bands >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = bands.max(0.0) as u32;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_missing_coordinates() {
        let mut p = Position::at(3, 1.0, 2.0, 0.2);
        p.x = None;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_finite_fields() {
        let mut p = Position::at(9, 1.0, 2.0, 0.2);
        p.y = Some(f64::NAN);
        assert_eq!(
            p.validate().unwrap_err(),
            InputError::NonFinite { line: 9, field: "y" }
        );

        let p = Position::at(10, 1.0, 2.0, 0.2).extruding(f64::INFINITY);
        assert_eq!(
            p.validate().unwrap_err(),
            InputError::NonFinite {
                line: 10,
                field: "feed_rate"
            }
        );
    }

    #[test]
    fn classify_extrusion_and_retracted_travel() {
        let prev = Position::at(1, 0.0, 0.0, 0.2);
        let ext = Position::at(2, 5.0, 0.0, 0.2).extruding(1200.0);
        assert_eq!(ext.classify(&prev), Some(MovementClass::Extrusion));

        let travel = Position::at(3, 5.0, 5.0, 0.2).retracted();
        assert_eq!(travel.classify(&prev), Some(MovementClass::RetractedTravel));

        let plain_travel = Position::at(4, 5.0, 5.0, 0.2);
        assert_eq!(plain_travel.classify(&prev), None);
    }

    #[test]
    fn retraction_without_xy_motion_is_not_a_travel() {
        let prev = Position::at(1, 5.0, 5.0, 0.2);
        let retract = Position::at(2, 5.0, 5.0, 0.2).retracted();
        assert_eq!(retract.classify(&prev), None);
    }

    #[test]
    fn motion_detection() {
        let first = Position::at(1, 0.0, 0.0, 0.0);
        assert!(first.is_motion_from(None));

        let same = Position::at(2, 0.0, 0.0, 0.0);
        assert!(!same.is_motion_from(Some(&first)));

        let moved = Position::at(3, 1.0, 0.0, 0.0);
        assert!(moved.is_motion_from(Some(&first)));
    }

    #[test]
    fn height_increment_rounds_up() {
        assert_eq!(height_increment_index(0.0, 0.2), 0);
        assert_eq!(height_increment_index(0.2, 0.2), 1);
        assert_eq!(height_increment_index(0.21, 0.2), 2);
        assert_eq!(height_increment_index(0.6, 0.2), 3);
        assert_eq!(height_increment_index(1.0, 0.0), 0);
    }

    #[test]
    fn deserializes_tokenizer_record() {
        let json = r#"{"line_number":12,"x":10.5,"y":20.0,"z":0.3,"extrusion":0.02,
            "feed_rate":1800,"is_extruding":true,"is_retracted":false,"layer":2,
            "height_increment":2,"command":"G1 X10.5 Y20 E0.02"}"#;
        let p: Position = serde_json::from_str(json).unwrap();
        assert_eq!(p.line_number, 12);
        assert_eq!(p.x, Some(10.5));
        assert_eq!(p.layer, 2);
        assert_eq!(p.height_increment, Some(2));
        assert!(p.is_extruding);
    }

    #[test]
    fn deserializes_sparse_record() {
        let p: Position = serde_json::from_str(r#"{"line_number":1}"#).unwrap();
        assert_eq!(p.x, None);
        assert_eq!(p.layer, 0);
        assert!(!p.is_extruding);
    }
}
