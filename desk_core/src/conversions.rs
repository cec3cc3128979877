//! `From` implementations bridging `desk_config` types to `desk_core` types.

use std::time::Duration;

use crate::config::{EngineCfg, MoverCfg, PredictorCfg, RunStrategy, RunnerCfg, StallCfg};

// ── PredictorCfg ─────────────────────────────────────────────────────────────

impl From<&desk_config::PredictorCfg> for PredictorCfg {
    fn from(c: &desk_config::PredictorCfg) -> Self {
        Self {
            max_speed: c.max_speed,
            max_speed_to_stop: c.max_speed_to_stop,
            fudge_factor: c.fudge_factor,
            max_height: c.max_height,
        }
    }
}

// ── StallCfg ─────────────────────────────────────────────────────────────────

impl From<&desk_config::StallCfg> for StallCfg {
    fn from(c: &desk_config::StallCfg) -> Self {
        Self {
            window: c.window,
            zero_speed_limit: c.zero_speed_limit,
        }
    }
}

// ── MoverCfg ─────────────────────────────────────────────────────────────────

impl From<&desk_config::MoverCfg> for MoverCfg {
    fn from(c: &desk_config::MoverCfg) -> Self {
        Self {
            tick: Duration::from_millis(c.tick_ms),
            acquire_timeout: Duration::from_millis(c.acquire_timeout_ms),
        }
    }
}

// ── EngineCfg ────────────────────────────────────────────────────────────────

impl From<&desk_config::EngineCfg> for EngineCfg {
    fn from(c: &desk_config::EngineCfg) -> Self {
        Self {
            command_interval: Duration::from_millis(c.command_interval_ms),
        }
    }
}

// ── RunnerCfg ────────────────────────────────────────────────────────────────

impl From<desk_config::RunMode> for RunStrategy {
    fn from(m: desk_config::RunMode) -> Self {
        match m {
            desk_config::RunMode::Tick => Self::Tick,
            desk_config::RunMode::Guarded => Self::Guarded,
        }
    }
}

impl From<&desk_config::RunnerCfg> for RunnerCfg {
    fn from(c: &desk_config::RunnerCfg) -> Self {
        Self {
            strategy: c.mode.into(),
            cycle_timeout: Duration::from_millis(c.cycle_timeout_ms),
        }
    }
}
