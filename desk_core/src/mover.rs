//! Move-to-height state machine.
//!
//! `DeskMover` owns one dispatcher thread that serializes every trigger:
//! telemetry samples from its subscription, timer ticks (only while a cycle
//! is evaluating), the acquisition deadline and control messages. Each
//! trigger runs one evaluation behind a try-acquire gate; a trigger that
//! finds the gate held is dropped, never queued.
//!
//! Stopping is a latched transition on `MoverState` taken under the state
//! lock. Whoever wins the latch issues the single transport Stop and emits
//! `finished`, so a stop requested from inside an evaluation runs inline
//! and a second stop is a no-op.
//!
//! The state lock is never held across a transport call.

use crossbeam_channel as xch;
use desk_traits::{RawFrame, TelemetrySource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::acquirer::InitialHeightAcquirer;
use crate::builder::{DeskMoverBuilder, Missing};
use crate::config::{MoverCfg, PredictorCfg, StallCfg};
use crate::error::{DeskError, StallKind};
use crate::locker::MoveAuthority;
use crate::predictor::StoppingPredictor;
use crate::stall::StallMonitor;
use crate::types::{Command, Direction, HeightSample, MoverPhase};
use crate::util::{SharedCommands, issue};

const BEGIN_RETRY: Duration = Duration::from_millis(2);

/// Outcome of one evaluation trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Another evaluation held the gate; this trigger was dropped.
    Skipped,
    /// No cycle is evaluating.
    Idle,
    /// Still travelling in the commanded direction.
    Holding,
    Commanded(Direction),
    /// The command failed; the next evaluation retries.
    CommandFailed(Direction),
    /// This evaluation ended the cycle.
    Stopped,
}

enum Control {
    /// Cycle entered acquisition; arm the deadline.
    Acquire,
    /// Cycle entered evaluation; start ticking.
    Arm,
    /// Run the opening evaluation the caller could not.
    Begin,
    /// Cycle ended; silence timers.
    Disarm,
    Shutdown,
}

#[derive(Clone, Copy)]
enum Trigger {
    Tick,
    Sample,
    Begin,
}

enum Step {
    Done(Evaluation),
    Command { direction: Direction, cycle: u64 },
    Stop { height: u32, fault: Option<DeskError> },
}

#[derive(Debug)]
struct MoverState {
    phase: MoverPhase,
    height: u32,
    speed: i32,
    target_height: u32,
    start_direction: Direction,
    /// Only set after the transport accepted the command.
    commanded_direction: Direction,
    is_allowed_to_move: bool,
    finished_emitted: bool,
    stall: StallMonitor,
    cycle: u64,
    control: Option<xch::Sender<Control>>,
}

impl MoverState {
    fn active(&self) -> bool {
        matches!(self.phase, MoverPhase::Acquiring | MoverPhase::Evaluating)
    }

    fn send(&self, msg: Control) {
        if let Some(tx) = &self.control {
            let _ = tx.send(msg);
        }
    }

    /// Latch the end of the cycle. Returns the height to report, once.
    fn begin_stop(&mut self) -> Option<u32> {
        if self.finished_emitted || !self.active() {
            return None;
        }
        self.is_allowed_to_move = false;
        self.commanded_direction = Direction::None;
        self.finished_emitted = true;
        self.phase = MoverPhase::Stopped;
        self.send(Control::Disarm);
        Some(self.height)
    }

    fn stop_step(&mut self, fault: Option<DeskError>) -> Step {
        match self.begin_stop() {
            Some(height) => Step::Stop { height, fault },
            None => Step::Done(Evaluation::Idle),
        }
    }

    fn plan(&mut self, predictor: &StoppingPredictor) -> Step {
        let decision = predictor.decide(
            self.height,
            self.speed,
            self.target_height,
            self.start_direction,
            self.commanded_direction,
        );
        if decision.should_stop {
            tracing::debug!(
                height = self.height,
                speed = self.speed,
                target = self.target_height,
                desired = ?decision.desired,
                "stop condition reached"
            );
            return self.stop_step(None);
        }
        if decision.desired != self.commanded_direction {
            Step::Command {
                direction: decision.desired,
                cycle: self.cycle,
            }
        } else {
            Step::Done(Evaluation::Holding)
        }
    }
}

struct Shared {
    cfg: MoverCfg,
    commands: SharedCommands,
    predictor: StoppingPredictor,
    acquirer: InitialHeightAcquirer,
    state: Mutex<MoverState>,
    evaluating: AtomicBool,
    initialized: AtomicBool,
    disposed: AtomicBool,
    finished_tx: xch::Sender<u32>,
    finished_rx: xch::Receiver<u32>,
    faults_tx: xch::Sender<DeskError>,
    faults_rx: xch::Receiver<DeskError>,
}

/// Held while an evaluation runs.
struct EvalGate<'a>(&'a AtomicBool);

impl<'a> EvalGate<'a> {
    fn try_enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for EvalGate<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MoverState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn evaluate(&self, trigger: Trigger, sample: Option<HeightSample>) -> Evaluation {
        let Some(_gate) = EvalGate::try_enter(&self.evaluating) else {
            tracing::trace!("evaluation in flight; trigger dropped");
            return Evaluation::Skipped;
        };
        if self.disposed.load(Ordering::Acquire) {
            return Evaluation::Idle;
        }

        let mut st = self.lock();
        if let Some(s) = sample {
            st.height = s.height;
            st.speed = s.speed;
        }
        if st.phase == MoverPhase::Acquiring {
            drop(st);
            let Some(height) = sample.and_then(|s| self.acquirer.observe(&s)) else {
                return Evaluation::Idle;
            };
            if !self.begin_cycle(height) {
                return Evaluation::Idle;
            }
            st = self.lock();
        } else if st.phase != MoverPhase::Evaluating {
            return Evaluation::Idle;
        }

        let step = match trigger {
            Trigger::Tick => {
                let height = st.height;
                st.stall.record_height(height);
                if st.stall.is_height_changing() {
                    st.plan(&self.predictor)
                } else {
                    st.stop_step(Some(DeskError::Stall(StallKind::HeightUnchanged)))
                }
            }
            Trigger::Sample if !st.commanded_direction.is_none() => {
                let (height, speed) = (st.height, st.speed);
                match st.stall.assert_moving(height, speed) {
                    Ok(()) => st.plan(&self.predictor),
                    Err(kind) => st.stop_step(Some(DeskError::Stall(kind))),
                }
            }
            Trigger::Sample | Trigger::Begin => st.plan(&self.predictor),
        };
        drop(st);
        self.execute(step)
    }

    fn execute(&self, step: Step) -> Evaluation {
        match step {
            Step::Done(e) => e,
            Step::Stop { height, fault } => {
                self.finish_stop(height, fault);
                Evaluation::Stopped
            }
            Step::Command { direction, cycle } => self.command(direction, cycle),
        }
    }

    fn command(&self, direction: Direction, cycle: u64) -> Evaluation {
        let Some(cmd) = direction.command() else {
            return Evaluation::Holding;
        };
        tracing::debug!(%cmd, "issuing movement command");
        let res = issue(self.commands.as_ref(), cmd);
        if self.disposed.load(Ordering::Acquire) {
            return Evaluation::Idle;
        }
        match res {
            Ok(()) => {
                let mut st = self.lock();
                if st.cycle == cycle && st.phase == MoverPhase::Evaluating && st.is_allowed_to_move
                {
                    st.commanded_direction = direction;
                    Evaluation::Commanded(direction)
                } else {
                    drop(st);
                    // Accepted after the cycle ended: undo it.
                    tracing::debug!(%cmd, "command completed after stop; stopping again");
                    if let Err(e) = issue(self.commands.as_ref(), Command::Stop) {
                        tracing::warn!(error = %e, "stop after late command failed");
                    }
                    Evaluation::Stopped
                }
            }
            Err(e) if e.is_fatal() => {
                let stop = {
                    let mut st = self.lock();
                    if st.cycle == cycle {
                        st.begin_stop()
                    } else {
                        None
                    }
                };
                match stop {
                    Some(height) => {
                        self.finish_stop(height, Some(e));
                        Evaluation::Stopped
                    }
                    None => Evaluation::CommandFailed(direction),
                }
            }
            Err(e) => {
                tracing::warn!(%cmd, error = %e, "movement command failed; will retry");
                let mut st = self.lock();
                if st.cycle == cycle {
                    st.commanded_direction = Direction::None;
                }
                Evaluation::CommandFailed(direction)
            }
        }
    }

    /// Returns false when the cycle is no longer acquiring.
    fn begin_cycle(&self, height: u32) -> bool {
        let mut st = self.lock();
        if st.phase != MoverPhase::Acquiring {
            return false;
        }
        if height > 0 {
            st.height = height;
        }
        st.start_direction = self.predictor.desired_direction(st.height, st.target_height);
        st.commanded_direction = Direction::None;
        st.is_allowed_to_move = true;
        st.stall.reset();
        st.phase = MoverPhase::Evaluating;
        st.send(Control::Arm);
        tracing::debug!(
            height = st.height,
            target = st.target_height,
            direction = ?st.start_direction,
            "evaluating"
        );
        true
    }

    fn finish_stop(&self, height: u32, fault: Option<DeskError>) {
        self.acquirer.cancel();
        if let Some(f) = fault {
            tracing::error!(error = %f, height, "movement fault");
            let _ = self.faults_tx.send(f);
        }
        if let Err(e) = issue(self.commands.as_ref(), Command::Stop) {
            tracing::warn!(error = %e, "stop command failed");
        }
        tracing::info!(height, "movement finished");
        let _ = self.finished_tx.send(height);
    }

    fn stop_movement(&self) {
        let stop = self.lock().begin_stop();
        if let Some(height) = stop {
            self.finish_stop(height, None);
        }
    }

    fn acquire_timed_out(&self) {
        let stop = {
            let mut st = self.lock();
            if st.phase != MoverPhase::Acquiring {
                return;
            }
            st.begin_stop()
        };
        if let Some(height) = stop {
            self.finish_stop(height, Some(DeskError::Timeout("initial height")));
        }
    }

    fn forward(&self, cmd: Command) -> bool {
        if !self.lock().is_allowed_to_move {
            return false;
        }
        match issue(self.commands.as_ref(), cmd) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%cmd, error = %e, "forwarded command failed");
                false
            }
        }
    }
}

fn dispatch(
    shared: &Shared,
    mut telemetry: xch::Receiver<RawFrame>,
    control: &xch::Receiver<Control>,
) {
    let mut ticker = xch::never::<Instant>();
    let mut deadline = xch::never::<Instant>();
    let mut retry = xch::never::<Instant>();
    loop {
        xch::select! {
            recv(telemetry) -> msg => match msg {
                Ok(frame) => {
                    if let Some(sample) = crate::codec::decode(&frame) {
                        shared.evaluate(Trigger::Sample, Some(sample));
                    }
                }
                Err(_) => {
                    tracing::debug!("telemetry source disconnected");
                    telemetry = xch::never();
                }
            },
            recv(control) -> msg => match msg {
                Ok(Control::Acquire) => deadline = xch::after(shared.cfg.acquire_timeout),
                Ok(Control::Arm) => {
                    deadline = xch::never();
                    ticker = xch::tick(shared.cfg.tick);
                }
                Ok(Control::Begin) => retry = begin_or_retry(shared),
                Ok(Control::Disarm) => {
                    retry = xch::never();
                    deadline = xch::never();
                    ticker = xch::never();
                }
                Ok(Control::Shutdown) | Err(_) => break,
            },
            recv(ticker) -> _ => {
                shared.evaluate(Trigger::Tick, None);
            },
            recv(retry) -> _ => retry = begin_or_retry(shared),
            recv(deadline) -> _ => {
                deadline = xch::never();
                tracing::warn!("initial height not acquired in time");
                shared.acquire_timed_out();
            },
        }
    }
    tracing::trace!("mover dispatcher exiting");
}

/// Run the opening evaluation, or schedule another attempt while the gate
/// is held elsewhere.
fn begin_or_retry(shared: &Shared) -> xch::Receiver<Instant> {
    if shared.evaluate(Trigger::Begin, None) == Evaluation::Skipped {
        xch::after(BEGIN_RETRY)
    } else {
        xch::never()
    }
}

/// Moves a desk to a target height.
///
/// ```no_run
/// # use std::sync::Arc;
/// # fn demo(desk: Arc<desk_hardware::SimulatedDesk>) -> Result<(), desk_core::DeskError> {
/// let mover = desk_core::DeskMover::builder()
///     .commands(desk.clone())
///     .telemetry(desk)
///     .build()
///     .map_err(|e| desk_core::DeskError::State(e.to_string()))?;
/// mover.initialize();
/// mover.set_target_height(9000)?;
/// mover.start()?;
/// let final_height = mover.finished().recv();
/// # let _ = final_height;
/// # Ok(())
/// # }
/// ```
pub struct DeskMover {
    shared: Arc<Shared>,
    source: Arc<dyn TelemetrySource + Send + Sync>,
    dispatcher: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl core::fmt::Debug for DeskMover {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = self.shared.lock();
        f.debug_struct("DeskMover")
            .field("phase", &st.phase)
            .field("height", &st.height)
            .field("target_height", &st.target_height)
            .field("commanded", &st.commanded_direction)
            .finish_non_exhaustive()
    }
}

impl DeskMover {
    /// Start building a mover.
    pub fn builder() -> DeskMoverBuilder<Missing, Missing> {
        DeskMoverBuilder::default()
    }

    pub fn new(
        commands: SharedCommands,
        source: Arc<dyn TelemetrySource + Send + Sync>,
        predictor: PredictorCfg,
        stall: StallCfg,
        cfg: MoverCfg,
    ) -> Self {
        let (finished_tx, finished_rx) = xch::unbounded();
        let (faults_tx, faults_rx) = xch::unbounded();
        let shared = Shared {
            cfg,
            acquirer: InitialHeightAcquirer::new(Arc::clone(&commands)),
            commands,
            predictor: StoppingPredictor::new(predictor),
            state: Mutex::new(MoverState {
                phase: MoverPhase::Idle,
                height: 0,
                speed: 0,
                target_height: 0,
                start_direction: Direction::None,
                commanded_direction: Direction::None,
                is_allowed_to_move: false,
                finished_emitted: false,
                stall: StallMonitor::new(stall),
                cycle: 0,
                control: None,
            }),
            evaluating: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            finished_tx,
            finished_rx,
            faults_tx,
            faults_rx,
        };
        Self {
            shared: Arc::new(shared),
            source,
            dispatcher: Mutex::new(None),
        }
    }

    /// Subscribe to telemetry and start the dispatcher. Calling it again
    /// replaces the previous subscription.
    pub fn initialize(&self) {
        self.teardown();
        let (control_tx, control_rx) = xch::unbounded();
        let telemetry = self.source.subscribe();
        self.shared.lock().control = Some(control_tx);
        self.shared.disposed.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::spawn(move || dispatch(&shared, telemetry, &control_rx));
        *self.dispatcher.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        self.shared.initialized.store(true, Ordering::Release);
        tracing::debug!("desk mover initialized");
    }

    /// Stop any active cycle, then drop the subscription and timers.
    /// Transport results arriving afterwards are discarded.
    pub fn dispose(&self) {
        self.shared.stop_movement();
        self.shared.disposed.store(true, Ordering::Release);
        self.shared.initialized.store(false, Ordering::Release);
        self.teardown();
    }

    fn teardown(&self) {
        if let Some(tx) = self.shared.lock().control.take() {
            let _ = tx.send(Control::Shutdown);
        }
        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "mover dispatcher panicked during shutdown");
            }
        }
    }

    /// Begin a movement cycle toward `target_height`.
    ///
    /// Fails fast when not initialized, when no target is set, or while a
    /// cycle is already running. A failed nudge during acquisition is not an
    /// error here; the acquisition deadline ends that cycle.
    ///
    /// With a known height the opening evaluation runs on the caller's
    /// thread. If another evaluation holds the gate at that moment, the
    /// dispatcher runs it once the gate is free.
    pub fn start(&self) -> Result<(), DeskError> {
        if !self.shared.initialized.load(Ordering::Acquire) {
            return Err(DeskError::State("start() called before initialize()".into()));
        }
        let (known, target) = {
            let mut st = self.shared.lock();
            if st.target_height == 0 {
                return Err(DeskError::State("target height is not set".into()));
            }
            if st.active() {
                return Err(DeskError::State("a movement cycle is already active".into()));
            }
            st.phase = MoverPhase::Acquiring;
            st.finished_emitted = false;
            st.is_allowed_to_move = false;
            st.commanded_direction = Direction::None;
            st.start_direction = Direction::None;
            // Speed from the previous cycle says nothing about this one.
            st.speed = 0;
            st.stall.reset();
            st.cycle += 1;
            st.send(Control::Acquire);
            (st.height, st.target_height)
        };
        tracing::info!(height = known, target, "movement cycle starting");

        match self.shared.acquirer.start(known) {
            Ok(Some(height)) => {
                if self.shared.begin_cycle(height)
                    && self.shared.evaluate(Trigger::Begin, None) == Evaluation::Skipped
                {
                    self.shared.lock().send(Control::Begin);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "waiting for acquisition deadline"),
        }
        Ok(())
    }

    /// Forward an Up command while a cycle allows movement.
    pub fn up(&self) -> bool {
        self.shared.forward(Command::Up)
    }

    /// Forward a Down command while a cycle allows movement.
    pub fn down(&self) -> bool {
        self.shared.forward(Command::Down)
    }

    /// End the active cycle. No-op when idle or already stopped.
    pub fn stop_movement(&self) {
        self.shared.stop_movement();
    }

    /// Set the target. Zero is rejected while a cycle is active.
    pub fn set_target_height(&self, target: u32) -> Result<(), DeskError> {
        let mut st = self.shared.lock();
        if target == 0 && st.active() {
            return Err(DeskError::State("cannot clear the target during a cycle".into()));
        }
        st.target_height = target;
        Ok(())
    }

    pub fn target_height(&self) -> u32 {
        self.shared.lock().target_height
    }

    pub fn height(&self) -> u32 {
        self.shared.lock().height
    }

    pub fn speed(&self) -> i32 {
        self.shared.lock().speed
    }

    pub fn is_allowed_to_move(&self) -> bool {
        self.shared.lock().is_allowed_to_move
    }

    pub fn phase(&self) -> MoverPhase {
        self.shared.lock().phase
    }

    /// Final height of every cycle, one value per cycle.
    pub fn finished(&self) -> xch::Receiver<u32> {
        self.shared.finished_rx.clone()
    }

    /// Faults that ended a cycle (stall, acquisition timeout).
    pub fn faults(&self) -> xch::Receiver<DeskError> {
        self.shared.faults_rx.clone()
    }

    pub fn handle(&self) -> MoverHandle {
        MoverHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run one timer-triggered evaluation.
    pub fn tick(&self) -> Evaluation {
        self.shared.evaluate(Trigger::Tick, None)
    }

    /// Run one telemetry-triggered evaluation.
    pub fn on_sample(&self, sample: HeightSample) -> Evaluation {
        self.shared.evaluate(Trigger::Sample, Some(sample))
    }
}

impl Drop for DeskMover {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Clonable view onto a mover, for components that watch or stop it.
#[derive(Clone)]
pub struct MoverHandle {
    shared: Arc<Shared>,
}

impl core::fmt::Debug for MoverHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MoverHandle")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl MoverHandle {
    pub fn height(&self) -> u32 {
        self.shared.lock().height
    }

    pub fn speed(&self) -> i32 {
        self.shared.lock().speed
    }

    pub fn target_height(&self) -> u32 {
        self.shared.lock().target_height
    }

    pub fn is_allowed_to_move(&self) -> bool {
        self.shared.lock().is_allowed_to_move
    }

    pub fn phase(&self) -> MoverPhase {
        self.shared.lock().phase
    }

    pub fn stop_movement(&self) {
        self.shared.stop_movement();
    }
}

impl MoveAuthority for MoverHandle {
    fn is_allowed_to_move(&self) -> bool {
        self.shared.lock().is_allowed_to_move
    }
}
