//! Simulated linear-actuator desk.
//!
//! `SimulatedDesk` implements both transport seams from `desk_traits`: it
//! accepts Up/Down/Stop commands and publishes encoded height/speed frames
//! to every subscriber, the way the real desk notifies its telemetry
//! characteristic. Physics advance on `step()`; `run()` spawns a thread that
//! steps at a fixed period.
pub mod error;
pub mod util;

use crossbeam_channel as xch;
use desk_traits::{Clock, DeskCommands, MonotonicClock, RawFrame, TelemetrySource, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::HwError;

/// Height offset the desk subtracts before putting a height on the wire.
pub const BASE_OFFSET: u32 = 6200;

/// Encode a height/speed pair the way the desk does:
/// `[u16 LE height - BASE_OFFSET][i16 LE speed]`, saturating out-of-range values.
pub fn encode_frame(height: u32, speed: i32) -> [u8; 4] {
    let raw = u16::try_from(height.saturating_sub(BASE_OFFSET)).unwrap_or(u16::MAX);
    let speed = i16::try_from(speed).unwrap_or(if speed < 0 { i16::MIN } else { i16::MAX });
    let [h0, h1] = raw.to_le_bytes();
    let [s0, s1] = speed.to_le_bytes();
    [h0, h1, s0, s1]
}

#[derive(Debug, Clone)]
pub struct SimDeskCfg {
    pub initial_height: u32,
    pub min_height: u32,
    pub max_height: u32,
    /// Travel rate in device units per second
    pub travel_per_sec: u32,
    /// Speed value reported while travelling
    pub reported_speed: i32,
    /// Extra travel after a Stop while moving
    pub coast: u32,
    /// Physics period used by `run()`
    pub period_ms: u64,
    /// Publish frames while standing still
    pub report_idle: bool,
    /// A single Up/Down only moves the desk this long (None = until Stop)
    pub hold_ms: Option<u64>,
}

impl Default for SimDeskCfg {
    fn default() -> Self {
        Self {
            initial_height: 7000,
            min_height: BASE_OFFSET,
            max_height: 12_700,
            travel_per_sec: 400,
            reported_speed: 6200,
            coast: 10,
            period_ms: 20,
            report_idle: false,
            hold_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Idle,
    Up,
    Down,
}

impl Motion {
    fn sign(self) -> f64 {
        match self {
            Motion::Idle => 0.0,
            Motion::Up => 1.0,
            Motion::Down => -1.0,
        }
    }
}

/// Accepted commands per kind, plus rejections.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommandCounts {
    pub up: usize,
    pub down: usize,
    pub stop: usize,
    pub rejected: usize,
}

#[derive(Debug)]
struct SimState {
    height: f64,
    motion: Motion,
    commanded_at: Instant,
    last_step: Instant,
    jammed: bool,
    connected: bool,
    write_fault: Option<String>,
    reject_next: u32,
    counts: CommandCounts,
}

pub struct SimulatedDesk {
    cfg: SimDeskCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    state: Mutex<SimState>,
    subscribers: Mutex<Vec<xch::Sender<RawFrame>>>,
}

impl core::fmt::Debug for SimulatedDesk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = self.lock_state();
        f.debug_struct("SimulatedDesk")
            .field("height", &st.height)
            .field("motion", &st.motion)
            .field("counts", &st.counts)
            .finish()
    }
}

impl SimulatedDesk {
    pub fn new(cfg: SimDeskCfg) -> Self {
        Self::with_clock(cfg, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(cfg: SimDeskCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let now = clock.now();
        let height = f64::from(cfg.initial_height.clamp(cfg.min_height, cfg.max_height));
        Self {
            cfg,
            clock,
            state: Mutex::new(SimState {
                height,
                motion: Motion::Idle,
                commanded_at: now,
                last_step: now,
                jammed: false,
                connected: true,
                write_fault: None,
                reject_next: 0,
                counts: CommandCounts::default(),
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn height(&self) -> u32 {
        self.lock_state().height.round() as u32
    }

    pub fn motion(&self) -> Motion {
        self.lock_state().motion
    }

    /// Block until `reached(height)` holds or `timeout` expires.
    pub fn wait_for_height(
        &self,
        reached: impl Fn(u32) -> bool,
        timeout: Duration,
    ) -> error::Result<u32> {
        util::wait_until_with_timeout(|| reached(self.height()), timeout, Duration::from_millis(5))?;
        Ok(self.height())
    }

    pub fn counts(&self) -> CommandCounts {
        self.lock_state().counts
    }

    /// Reject the next `n` commands with `Ok(false)`.
    pub fn reject_next(&self, n: u32) {
        self.lock_state().reject_next = n;
    }

    /// While disconnected every command fails with `HwError::Disconnected`.
    pub fn set_connected(&self, connected: bool) {
        self.lock_state().connected = connected;
    }

    /// While set every command fails with `HwError::Write(reason)`.
    pub fn set_write_fault(&self, reason: Option<&str>) {
        self.lock_state().write_fault = reason.map(str::to_owned);
    }

    /// A jammed desk reports speed while moving but its height never changes.
    pub fn set_jammed(&self, jammed: bool) {
        self.lock_state().jammed = jammed;
    }

    /// Move the desk by hand (no command involved) and report it.
    pub fn push_manually(&self, delta: i32) {
        let (height, speed) = {
            let mut st = self.lock_state();
            st.height = (st.height + f64::from(delta))
                .clamp(f64::from(self.cfg.min_height), f64::from(self.cfg.max_height));
            (st.height.round() as u32, delta.signum() * self.cfg.reported_speed)
        };
        tracing::debug!(height, delta, "manual movement");
        self.publish(height, speed);
    }

    /// Publish arbitrary bytes as a telemetry frame.
    pub fn inject_raw(&self, bytes: &[u8]) {
        self.publish_raw(RawFrame::new(self.clock.now(), bytes));
    }

    /// Advance physics up to `clock.now()` and publish the resulting frame.
    pub fn step(&self) {
        let now = self.clock.now();
        let report = {
            let mut st = self.lock_state();
            if st.motion == Motion::Idle {
                st.last_step = now;
                self.cfg
                    .report_idle
                    .then(|| (st.height.round() as u32, 0))
            } else if let Some(hold) = self.cfg.hold_ms
                && now.saturating_duration_since(st.commanded_at) >= Duration::from_millis(hold)
            {
                self.integrate(&mut st, now);
                st.motion = Motion::Idle;
                tracing::trace!("hold expired; desk stops on its own");
                Some((st.height.round() as u32, 0))
            } else {
                self.integrate(&mut st, now);
                let at_limit = (st.motion == Motion::Up
                    && st.height >= f64::from(self.cfg.max_height))
                    || (st.motion == Motion::Down && st.height <= f64::from(self.cfg.min_height));
                if at_limit {
                    st.motion = Motion::Idle;
                    Some((st.height.round() as u32, 0))
                } else {
                    let speed = (st.motion.sign() as i32) * self.cfg.reported_speed;
                    Some((st.height.round() as u32, speed))
                }
            }
        };
        if let Some((height, speed)) = report {
            self.publish(height, speed);
        }
    }

    fn integrate(&self, st: &mut SimState, now: Instant) {
        let dt = now.saturating_duration_since(st.last_step).as_secs_f64();
        st.last_step = now;
        if st.jammed {
            return;
        }
        let travel = f64::from(self.cfg.travel_per_sec) * dt * st.motion.sign();
        st.height = (st.height + travel)
            .clamp(f64::from(self.cfg.min_height), f64::from(self.cfg.max_height));
    }

    fn command(&self, next: Motion, is_stop: bool) -> Result<bool, TransportError> {
        let now = self.clock.now();
        let report = {
            let mut st = self.lock_state();
            if !st.connected {
                return Err(Box::new(HwError::Disconnected));
            }
            if let Some(reason) = &st.write_fault {
                return Err(Box::new(HwError::Write(reason.clone())));
            }
            if st.reject_next > 0 {
                st.reject_next -= 1;
                st.counts.rejected += 1;
                tracing::debug!(?next, is_stop, "simulated desk rejected command");
                return Ok(false);
            }
            self.integrate(&mut st, now);
            if is_stop {
                st.counts.stop += 1;
                if st.motion == Motion::Idle {
                    None
                } else {
                    if !st.jammed {
                        let coast = f64::from(self.cfg.coast) * st.motion.sign();
                        st.height = (st.height + coast)
                            .clamp(f64::from(self.cfg.min_height), f64::from(self.cfg.max_height));
                    }
                    st.motion = Motion::Idle;
                    Some((st.height.round() as u32, 0))
                }
            } else {
                match next {
                    Motion::Up => st.counts.up += 1,
                    Motion::Down => st.counts.down += 1,
                    Motion::Idle => {}
                }
                st.motion = next;
                st.commanded_at = now;
                None
            }
        };
        if let Some((height, speed)) = report {
            self.publish(height, speed);
        }
        Ok(true)
    }

    fn publish(&self, height: u32, speed: i32) {
        self.publish_raw(RawFrame::new(self.clock.now(), encode_frame(height, speed)));
    }

    fn publish_raw(&self, frame: RawFrame) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subs.retain(|tx| tx.send(frame.clone()).is_ok());
    }

    /// Spawn the physics thread; it stops when the returned runner is dropped.
    pub fn run(self: &Arc<Self>) -> SimRunner {
        let desk = Arc::clone(self);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_bg = shutdown.clone();
        let period = Duration::from_millis(self.cfg.period_ms.max(1));
        let join_handle = std::thread::spawn(move || {
            while !shutdown_bg.load(Ordering::Relaxed) {
                std::thread::sleep(period);
                desk.step();
            }
            tracing::trace!("simulated desk thread exiting");
        });
        SimRunner {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl DeskCommands for SimulatedDesk {
    fn up(&self) -> Result<bool, TransportError> {
        self.command(Motion::Up, false)
    }
    fn down(&self) -> Result<bool, TransportError> {
        self.command(Motion::Down, false)
    }
    fn stop(&self) -> Result<bool, TransportError> {
        self.command(Motion::Idle, true)
    }
}

impl TelemetrySource for SimulatedDesk {
    fn subscribe(&self) -> xch::Receiver<RawFrame> {
        let (tx, rx) = xch::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(tx);
        rx
    }
}

/// Handle for the physics thread started by [`SimulatedDesk::run`].
pub struct SimRunner {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Drop for SimRunner {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "simulated desk thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_frame_is_little_endian_with_offset() {
        assert_eq!(encode_frame(6200 + 0x0102, -2), [0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn encode_frame_saturates_out_of_range() {
        assert_eq!(encode_frame(100, 0), [0, 0, 0, 0]);
        assert_eq!(encode_frame(u32::MAX, 40_000), [0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(encode_frame(6200, -40_000), [0, 0, 0x00, 0x80]);
    }
}
