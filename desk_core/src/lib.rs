#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core movement control for a motorized standing desk (hardware-agnostic).
//!
//! All transport interactions go through `desk_traits::DeskCommands` and
//! `desk_traits::TelemetrySource`.
//!
//! ## Architecture
//!
//! - **Codec**: 4-byte telemetry frames to `(height, speed)` (`codec`)
//! - **Prediction**: stopping height and stop decisions (`predictor`)
//! - **Safety**: rolling-window stall detection (`stall`), manual-movement lock (`locker`)
//! - **Control**: the tick-driven `DeskMover` state machine (`mover`), or the
//!   repeating `MoveEngine` paired with a `MovementGuard` (`engine`, `guard`)
//! - **Orchestration**: one complete move-to-height (`runner`)
//!
//! Heights are device units (1/10 mm) as `u32`; speeds are the desk's
//! signed `i32` readings.

pub mod acquirer;
pub mod builder;
pub mod codec;
pub mod config;
pub mod conversions;
pub mod engine;
pub mod error;
pub mod guard;
pub mod hw_error;
pub mod locker;
pub mod mocks;
pub mod mover;
pub mod predictor;
pub mod runner;
pub mod stall;
pub mod types;
pub mod util;

pub use acquirer::InitialHeightAcquirer;
pub use builder::{DeskMoverBuilder, Missing, Set};
pub use config::{EngineCfg, MoverCfg, PredictorCfg, RunStrategy, RunnerCfg, StallCfg};
pub use engine::MoveEngine;
pub use error::{BuildError, DeskError, Report, Result, StallKind};
pub use guard::MovementGuard;
pub use locker::{DeskLocker, MoveAuthority};
pub use mover::{DeskMover, Evaluation, MoverHandle};
pub use predictor::{Prediction, StoppingPredictor};
pub use runner::{RunParams, run};
pub use stall::StallMonitor;
pub use types::{Command, Direction, HeightSample, MoverPhase, StopDecision};
pub use util::SharedCommands;
