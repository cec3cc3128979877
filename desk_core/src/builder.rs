//! Type-state builder for `DeskMover`.
//!
//! `build()` is only available once both the command executor and the
//! telemetry source are set. `try_build()` is always available for dynamic
//! checks. Both validate the tuning values.

use std::marker::PhantomData;
use std::sync::Arc;

use desk_traits::{DeskCommands, TelemetrySource};

use crate::config::{MoverCfg, PredictorCfg, StallCfg};
use crate::error::BuildError;
use crate::mover::DeskMover;
use crate::util::SharedCommands;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct DeskMoverBuilder<C, T> {
    commands: Option<SharedCommands>,
    telemetry: Option<Arc<dyn TelemetrySource + Send + Sync>>,
    predictor: PredictorCfg,
    stall: StallCfg,
    mover: MoverCfg,
    _c: PhantomData<C>,
    _t: PhantomData<T>,
}

impl Default for DeskMoverBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            commands: None,
            telemetry: None,
            predictor: PredictorCfg::default(),
            stall: StallCfg::default(),
            mover: MoverCfg::default(),
            _c: PhantomData,
            _t: PhantomData,
        }
    }
}

impl<C, T> DeskMoverBuilder<C, T> {
    fn retype<C2, T2>(self) -> DeskMoverBuilder<C2, T2> {
        DeskMoverBuilder {
            commands: self.commands,
            telemetry: self.telemetry,
            predictor: self.predictor,
            stall: self.stall,
            mover: self.mover,
            _c: PhantomData,
            _t: PhantomData,
        }
    }

    pub fn commands<D>(mut self, commands: D) -> DeskMoverBuilder<Set, T>
    where
        D: DeskCommands + Send + Sync + 'static,
    {
        self.commands = Some(Arc::new(commands));
        self.retype()
    }

    pub fn telemetry<S>(mut self, source: S) -> DeskMoverBuilder<C, Set>
    where
        S: TelemetrySource + Send + Sync + 'static,
    {
        self.telemetry = Some(Arc::new(source));
        self.retype()
    }

    pub fn with_predictor(mut self, cfg: PredictorCfg) -> Self {
        self.predictor = cfg;
        self
    }

    pub fn with_stall(mut self, cfg: StallCfg) -> Self {
        self.stall = cfg;
        self
    }

    pub fn with_mover(mut self, cfg: MoverCfg) -> Self {
        self.mover = cfg;
        self
    }

    /// Apply every relevant section of a loaded config file.
    pub fn with_config(self, cfg: &desk_config::Config) -> Self {
        self.with_predictor((&cfg.predictor).into())
            .with_stall((&cfg.stall).into())
            .with_mover((&cfg.mover).into())
    }

    /// Validate and construct, whatever the type-state.
    pub fn try_build(self) -> Result<DeskMover, BuildError> {
        let commands = self.commands.ok_or(BuildError::MissingCommands)?;
        let telemetry = self.telemetry.ok_or(BuildError::MissingTelemetry)?;
        validate(&self.predictor, &self.stall, &self.mover)?;
        Ok(DeskMover::new(
            commands,
            telemetry,
            self.predictor,
            self.stall,
            self.mover,
        ))
    }
}

impl DeskMoverBuilder<Set, Set> {
    /// Validate and build. Only available once commands and telemetry are set.
    pub fn build(self) -> Result<DeskMover, BuildError> {
        self.try_build()
    }
}

fn validate(p: &PredictorCfg, s: &StallCfg, m: &MoverCfg) -> Result<(), BuildError> {
    if p.max_speed <= 0 {
        return Err(BuildError::InvalidConfig("predictor.max_speed must be > 0"));
    }
    if !p.fudge_factor.is_finite() || p.fudge_factor <= 0.0 {
        return Err(BuildError::InvalidConfig(
            "predictor.fudge_factor must be finite and > 0",
        ));
    }
    if s.window < 2 {
        return Err(BuildError::InvalidConfig("stall.window must be >= 2"));
    }
    if s.zero_speed_limit == 0 || s.zero_speed_limit > s.window {
        return Err(BuildError::InvalidConfig(
            "stall.zero_speed_limit must be in [1, stall.window]",
        ));
    }
    if m.tick.is_zero() {
        return Err(BuildError::InvalidConfig("mover.tick must be > 0"));
    }
    if m.acquire_timeout.is_zero() {
        return Err(BuildError::InvalidConfig("mover.acquire_timeout must be > 0"));
    }
    Ok(())
}
