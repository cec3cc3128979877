//! Runtime configuration for the movement components.
//!
//! These are separate from the TOML-deserialized config in `desk_config`;
//! see `conversions` for the bridges.

use std::time::Duration;

use crate::codec::BASE_OFFSET;

/// Stopping predictor tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorCfg {
    /// Speed value reported at full travel speed.
    pub max_speed: i32,
    /// Deceleration distance at full speed (device units), before fudge.
    pub max_speed_to_stop: u32,
    /// Scales both the tolerance band and the lookahead. Default: 2.0.
    pub fudge_factor: f32,
    /// Upper clamp for predicted stopping heights.
    pub max_height: u32,
}

impl Default for PredictorCfg {
    fn default() -> Self {
        Self {
            max_speed: 6200,
            max_speed_to_stop: 14,
            fudge_factor: 2.0,
            max_height: BASE_OFFSET + u32::from(u16::MAX),
        }
    }
}

/// Stall monitor window sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallCfg {
    pub window: usize,
    pub zero_speed_limit: usize,
}

impl Default for StallCfg {
    fn default() -> Self {
        Self {
            window: 5,
            zero_speed_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoverCfg {
    /// Evaluation timer period. Default: 100 ms.
    pub tick: Duration,
    /// How long a cycle waits for its initial height.
    pub acquire_timeout: Duration,
}

impl Default for MoverCfg {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            acquire_timeout: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCfg {
    /// Delay between repeated directional commands.
    pub command_interval: Duration,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            command_interval: Duration::from_millis(200),
        }
    }
}

/// How `runner::run` drives one move-to-height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunStrategy {
    /// `DeskMover`: timer plus telemetry evaluations
    #[default]
    Tick,
    /// `MoveEngine` repeating commands until `MovementGuard` reports a crossing
    Guarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerCfg {
    pub strategy: RunStrategy,
    pub cycle_timeout: Duration,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            strategy: RunStrategy::Tick,
            cycle_timeout: Duration::from_millis(60_000),
        }
    }
}
