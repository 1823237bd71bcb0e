//! Per-run settings.
//!
//! `RunConfig` is plain data: it can be loaded from JSON, cloned and compared.
//! Caller-owned closures live separately in
//! [`RunCallbacks`](crate::engine::RunCallbacks).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::position::MovementClass;

/// Stabilization algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilizationType {
    /// Per-layer closest-point selection.
    #[default]
    SmartLayer,
}

impl StabilizationType {
    /// Stable name, as used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SmartLayer => "smart_layer",
        }
    }
}

/// Which movement classes may become trigger candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Accept both extrusion and retracted-travel candidates.
    #[default]
    Compatibility,
    /// Only extrusion moves, so a snapshot never waits for a travel.
    Fast,
    /// Only retracted travels, so the nozzle never oozes during the snapshot.
    HighQuality,
}

impl TriggerType {
    /// True if candidates of `class` are allowed.
    #[must_use]
    pub const fn accepts(self, class: MovementClass) -> bool {
        match self {
            Self::Compatibility => true,
            Self::Fast => matches!(class, MovementClass::Extrusion),
            Self::HighQuality => matches!(class, MovementClass::RetractedTravel),
        }
    }
}

/// Smart-layer strategy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartLayerArgs {
    pub trigger_type: TriggerType,
    /// Extrusion speeds within this distance of the layer's fastest speed pass
    /// the snap-to-fastest filter.
    pub speed_threshold: f64,
    /// Prefer fast extrusion moves over pure proximity.
    pub snap_to_fastest: bool,
}

/// Immutable settings for one stabilization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub stabilization_type: StabilizationType,
    /// Target X the snapshots are stabilized on.
    pub x_coordinate: f64,
    /// Target Y the snapshots are stabilized on.
    pub y_coordinate: f64,
    /// X is pinned to `x_coordinate` and ignored when measuring distance.
    pub x_disabled: bool,
    /// Y is pinned to `y_coordinate` and ignored when measuring distance.
    pub y_disabled: bool,
    /// Band height for layer detection; 0 uses the layer index instead.
    pub height_increment: f64,
    /// Minimum wall-clock time between progress notifications.
    pub notification_period_seconds: f64,
    /// Where an external writer should store the results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
    pub smart_layer: SmartLayerArgs,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            stabilization_type: StabilizationType::SmartLayer,
            x_coordinate: 0.0,
            y_coordinate: 0.0,
            x_disabled: false,
            y_disabled: false,
            height_increment: 0.0,
            notification_period_seconds: 0.25,
            result_path: None,
            smart_layer: SmartLayerArgs::default(),
        }
    }
}

impl RunConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    /// Validates every setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_finite("x_coordinate", self.x_coordinate)?;
        validate_finite("y_coordinate", self.y_coordinate)?;
        validate_non_negative("height_increment", self.height_increment)?;
        validate_non_negative("notification_period_seconds", self.notification_period_seconds)?;
        validate_non_negative("smart_layer.speed_threshold", self.smart_layer.speed_threshold)?;
        if let Some(path) = &self.result_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "result_path".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The notification period as a `Duration`.
    #[must_use]
    pub fn notification_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.notification_period_seconds).unwrap_or(Duration::ZERO)
    }

    /// True if layers are detected by height increment rather than layer index.
    #[must_use]
    pub fn uses_height_increment(&self) -> bool {
        self.height_increment > 0.0
    }
}

fn validate_finite(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be a finite number"))
    }
}

fn validate_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    validate_finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::invalid(field, format!("must be >= 0, got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_negative_and_non_finite_values() {
        let mut c = RunConfig::default();
        c.smart_layer.speed_threshold = -1.0;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "smart_layer.speed_threshold"
        ));

        let mut c = RunConfig::default();
        c.x_coordinate = f64::NAN;
        assert!(c.validate().is_err());

        let mut c = RunConfig::default();
        c.notification_period_seconds = -0.5;
        assert!(c.validate().is_err());

        let mut c = RunConfig::default();
        c.height_increment = f64::INFINITY;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_empty_result_path() {
        let c = RunConfig {
            result_path: Some(PathBuf::new()),
            ..RunConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn parses_json_with_defaults() {
        let c = RunConfig::from_json_str(
            r#"{"x_coordinate": 100.0, "y_coordinate": 110.0, "y_disabled": true,
                "smart_layer": {"trigger_type": "high_quality", "snap_to_fastest": true}}"#,
        )
        .unwrap();
        assert_eq!(c.stabilization_type, StabilizationType::SmartLayer);
        assert_eq!(c.x_coordinate, 100.0);
        assert!(c.y_disabled);
        assert!(!c.x_disabled);
        assert_eq!(c.smart_layer.trigger_type, TriggerType::HighQuality);
        assert!(c.smart_layer.snap_to_fastest);
        assert_eq!(c.smart_layer.speed_threshold, 0.0);
        assert_eq!(c.notification_period_seconds, 0.25);
    }

    #[test]
    fn rejects_unknown_stabilization_type() {
        let err = RunConfig::from_json_str(r#"{"stabilization_type": "lock_to_corner"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn trigger_type_filters_classes() {
        assert!(TriggerType::Compatibility.accepts(MovementClass::Extrusion));
        assert!(TriggerType::Compatibility.accepts(MovementClass::RetractedTravel));
        assert!(TriggerType::Fast.accepts(MovementClass::Extrusion));
        assert!(!TriggerType::Fast.accepts(MovementClass::RetractedTravel));
        assert!(!TriggerType::HighQuality.accepts(MovementClass::Extrusion));
        assert!(TriggerType::HighQuality.accepts(MovementClass::RetractedTravel));
    }

    #[test]
    fn notification_period_conversion() {
        let c = RunConfig {
            notification_period_seconds: 0.5,
            ..RunConfig::default()
        };
        assert_eq!(c.notification_period(), Duration::from_millis(500));
        assert!(!c.uses_height_increment());
    }
}
