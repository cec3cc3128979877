#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the desk movement controller.
//!
//! Every section is optional in the TOML and falls back to the defaults
//! below. `Config::validate` rejects values the controller cannot run with.
use serde::Deserialize;
use std::path::Path;

/// Device height offset added to every raw reading (1/10 mm).
pub const BASE_OFFSET: u32 = 6200;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PredictorCfg {
    /// Speed value the desk reports at full travel speed.
    pub max_speed: i32,
    /// Deceleration distance (device units) at full speed, before fudge.
    pub max_speed_to_stop: u32,
    /// Multiplier applied to both the tolerance band and the lookahead.
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

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StallCfg {
    /// Rolling window size (samples) for both stall checks
    pub window: usize,
    /// Zero-speed samples inside a full window that count as a stall
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

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MoverCfg {
    /// Evaluation timer period in milliseconds
    pub tick_ms: u64,
    /// Give up on initial-height acquisition after this long
    pub acquire_timeout_ms: u64,
}

impl Default for MoverCfg {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            acquire_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineCfg {
    /// Delay between repeated Up/Down commands
    pub command_interval_ms: u64,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            command_interval_ms: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Timer-driven evaluator (`DeskMover`)
    #[default]
    Tick,
    /// Repeating command loop stopped by a crossing guard
    Guarded,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerCfg {
    pub mode: RunMode,
    /// Hard cap on one move-to-height cycle
    pub cycle_timeout_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            mode: RunMode::Tick,
            cycle_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub predictor: PredictorCfg,
    pub stall: StallCfg,
    pub mover: MoverCfg,
    pub engine: EngineCfg,
    pub runner: RunnerCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("reading config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parsing config {}: {e}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Predictor
        if self.predictor.max_speed <= 0 {
            eyre::bail!("predictor.max_speed must be > 0");
        }
        if !self.predictor.fudge_factor.is_finite() || self.predictor.fudge_factor <= 0.0 {
            eyre::bail!("predictor.fudge_factor must be a finite value > 0");
        }
        if self.predictor.max_height <= BASE_OFFSET {
            eyre::bail!("predictor.max_height must be above the base offset ({BASE_OFFSET})");
        }

        // Stall
        if self.stall.window < 2 {
            eyre::bail!("stall.window must be >= 2");
        }
        if self.stall.zero_speed_limit == 0 || self.stall.zero_speed_limit > self.stall.window {
            eyre::bail!("stall.zero_speed_limit must be in [1, stall.window]");
        }

        // Mover
        if self.mover.tick_ms == 0 {
            eyre::bail!("mover.tick_ms must be >= 1");
        }
        if self.mover.tick_ms > 10_000 {
            eyre::bail!("mover.tick_ms is unreasonably large (>10s)");
        }
        if self.mover.acquire_timeout_ms == 0 {
            eyre::bail!("mover.acquire_timeout_ms must be >= 1");
        }

        // Engine
        if self.engine.command_interval_ms == 0 {
            eyre::bail!("engine.command_interval_ms must be >= 1");
        }

        // Runner
        if self.runner.cycle_timeout_ms == 0 {
            eyre::bail!("runner.cycle_timeout_ms must be >= 1");
        }
        if self.runner.cycle_timeout_ms < self.mover.acquire_timeout_ms {
            eyre::bail!("runner.cycle_timeout_ms must be >= mover.acquire_timeout_ms");
        }
        Ok(())
    }
}
