//! One complete move-to-height, start to finish.
//!
//! `run` wires the components for a single cycle, blocks until the desk has
//! stopped (or the cycle timeout expires) and returns the final height.

use std::sync::Arc;
use std::time::Instant;

use desk_traits::TelemetrySource;

use crate::acquirer::InitialHeightAcquirer;
use crate::config::{EngineCfg, MoverCfg, PredictorCfg, RunStrategy, RunnerCfg, StallCfg};
use crate::engine::MoveEngine;
use crate::error::{DeskError, Result};
use crate::guard::MovementGuard;
use crate::mover::DeskMover;
use crate::predictor::StoppingPredictor;
use crate::types::Command;
use crate::util::{SharedCommands, issue};

/// Everything one run needs besides the transport.
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    pub target: u32,
    pub predictor: PredictorCfg,
    pub stall: StallCfg,
    pub mover: MoverCfg,
    pub engine: EngineCfg,
    pub runner: RunnerCfg,
}

impl RunParams {
    pub fn from_config(cfg: &desk_config::Config, target: u32) -> Self {
        Self {
            target,
            predictor: (&cfg.predictor).into(),
            stall: (&cfg.stall).into(),
            mover: (&cfg.mover).into(),
            engine: (&cfg.engine).into(),
            runner: (&cfg.runner).into(),
        }
    }
}

/// Move the desk to `params.target` and return the height it stopped at.
///
/// Faults that end the cycle (stall, acquisition timeout) are returned as
/// errors; a cycle that outlives `cycle_timeout` is stopped and reported as
/// `DeskError::Timeout`.
pub fn run(
    commands: SharedCommands,
    source: Arc<dyn TelemetrySource + Send + Sync>,
    params: &RunParams,
) -> Result<u32> {
    if params.target == 0 {
        return Err(DeskError::State("target height is not set".into()).into());
    }
    tracing::info!(
        target = params.target,
        strategy = ?params.runner.strategy,
        "run starting"
    );
    match params.runner.strategy {
        RunStrategy::Tick => run_tick(commands, source, params),
        RunStrategy::Guarded => run_guarded(commands, source.as_ref(), params),
    }
}

fn run_tick(
    commands: SharedCommands,
    source: Arc<dyn TelemetrySource + Send + Sync>,
    params: &RunParams,
) -> Result<u32> {
    let mover = DeskMover::builder()
        .commands(commands)
        .telemetry(source)
        .with_predictor(params.predictor)
        .with_stall(params.stall)
        .with_mover(params.mover)
        .build()?;
    mover.initialize();
    mover.set_target_height(params.target)?;
    let finished = mover.finished();
    let faults = mover.faults();
    mover.start()?;

    match finished.recv_timeout(params.runner.cycle_timeout) {
        Ok(height) => match faults.try_recv() {
            Ok(fault) => Err(fault.into()),
            Err(_) => Ok(height),
        },
        Err(_) => {
            tracing::error!(target = params.target, "movement cycle timed out");
            mover.stop_movement();
            Err(DeskError::Timeout("movement cycle").into())
        }
    }
}

fn run_guarded(
    commands: SharedCommands,
    source: &dyn TelemetrySource,
    params: &RunParams,
) -> Result<u32> {
    let deadline = Instant::now() + params.runner.cycle_timeout;

    let acquirer = InitialHeightAcquirer::new(commands.clone());
    acquirer.initialize(source);
    let height = match acquirer.start(0)? {
        Some(h) => h,
        None => {
            let waited = acquirer.finished().recv_timeout(params.mover.acquire_timeout);
            if let Ok(h) = waited {
                h
            } else {
                acquirer.dispose();
                if let Err(e) = issue(commands.as_ref(), Command::Stop) {
                    tracing::warn!(error = %e, "stop after failed acquisition failed");
                }
                return Err(DeskError::Timeout("initial height").into());
            }
        }
    };
    acquirer.dispose();

    let predictor = StoppingPredictor::new(params.predictor);
    let direction = predictor.desired_direction(height, params.target);
    if direction.is_none() {
        tracing::info!(height, target = params.target, "already within tolerance");
        return Ok(height);
    }

    let guard = MovementGuard::new(predictor);
    guard.initialize(source);
    let reached = guard.reached();
    if let Some(h) = guard.guard(direction, params.target, height) {
        return Ok(h);
    }

    let engine = MoveEngine::new(commands, params.engine);
    engine.move_in(direction)?;
    let res = reached.recv_timeout(deadline.saturating_duration_since(Instant::now()));
    guard.stop_guarding();
    if let Err(e) = engine.stop() {
        tracing::warn!(error = %e, "final stop failed");
    }

    if let Ok(h) = res {
        tracing::info!(height = h, "run finished");
        Ok(h)
    } else {
        tracing::error!(target = params.target, "movement cycle timed out");
        Err(DeskError::Timeout("movement cycle").into())
    }
}
