//! # smartlapse - Timelapse stabilization planning for 3D prints
//!
//! smartlapse scans a stream of printer positions and decides, once per layer,
//! where the print head should pause so a snapshot can be taken at a fixed
//! stabilization point without leaving visible artifacts on the part.
//!
//! ## Core Concepts
//!
//! - **Position**: One parsed motion record with its layer and extrusion state
//! - **TriggerStrategy**: Consumes consecutive position pairs and commits plans
//! - **SmartLayerStrategy**: Picks the closest fast-enough move per layer
//! - **SnapshotPlan**: Where to trigger, and the travel/snapshot steps to run there
//! - **RunOutcome**: Ordered plans plus a run summary, produced by every run
//!
//! ## Usage
//!
//! ```rust
//! use smartlapse::{run, MemoryStream, Position, RunCallbacks, RunConfig, SmartLayerStrategy};
//!
//! let config = RunConfig {
//!     x_coordinate: 100.0,
//!     y_coordinate: 200.0,
//!     ..RunConfig::default()
//! };
//! let mut strategy = SmartLayerStrategy::new(&config);
//! let mut stream = MemoryStream::new(vec![
//!     Position::at(1, 0.0, 0.0, 0.0),
//!     Position::at(2, 90.0, 190.0, 0.2).extruding(1800.0).on_layer(1),
//!     Position::at(3, 10.0, 10.0, 0.2).extruding(1800.0).on_layer(1),
//! ]);
//! let outcome = run(&mut stream, &mut strategy, config, RunCallbacks::default());
//! assert!(outcome.is_success());
//! assert_eq!(outcome.plans.len(), 1);
//! assert_eq!(outcome.plans[0].source_line, 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data types
pub mod config;
pub mod error;
pub mod plan;
pub mod position;

// Scanning
pub mod engine;
pub mod strategy;
pub mod stream;

// Re-export primary types at crate root for convenience
pub use config::{RunConfig, SmartLayerArgs, StabilizationType, TriggerType};
pub use error::{ConfigError, InputError, StabilizationError, StabilizationResult, StreamError};
pub use plan::{plan_digest, PlanAction, PlanStep, SendParsedCommand, SnapshotPlan, TriggerProvenance};
pub use position::{MovementClass, Position};
pub use stream::{MemoryStream, PositionReader, PositionStream};

pub use engine::{
    run, run_path, spawn, Diagnostic, ProgressReport, ProgressSignal, RunCallbacks, RunCounts, RunHandle, RunId,
    RunOutcome, RunSummary, StabilizationEngine, StabilizationJob,
};
pub use strategy::{SmartLayerStrategy, StabilizationPoint, StrategyContext, TriggerStrategy};
