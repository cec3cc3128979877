//! Test and helper mocks for desk_core.
//!
//! `ScriptedCommands` records every command and answers from a script;
//! `ManualTelemetry` publishes frames only when told to.

use crossbeam_channel as xch;
use desk_traits::{DeskCommands, RawFrame, TelemetrySource, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::types::Command;

/// Scripted answer for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    /// `Ok(false)`
    Reject,
    /// `Err` with this message
    Fail(String),
}

type Hook = Box<dyn Fn(Command) + Send + Sync>;

/// Command executor that records calls. Unscripted calls are accepted.
#[derive(Default)]
pub struct ScriptedCommands {
    calls: Mutex<Vec<Command>>,
    script: Mutex<VecDeque<Outcome>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    hook: Mutex<Option<Hook>>,
}

impl core::fmt::Debug for ScriptedCommands {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScriptedCommands")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl ScriptedCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every Up/Down call blocks this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *relock(&self.delay) = delay;
    }

    /// Queue the answer for the next unanswered call.
    pub fn push_outcome(&self, outcome: Outcome) {
        relock(&self.script).push_back(outcome);
    }

    /// Run `hook` after every accepted command, e.g. to publish telemetry.
    pub fn on_accept<F>(&self, hook: F)
    where
        F: Fn(Command) + Send + Sync + 'static,
    {
        *relock(&self.hook) = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Command> {
        relock(&self.calls).clone()
    }

    pub fn count(&self, cmd: Command) -> usize {
        relock(&self.calls).iter().filter(|&&c| c == cmd).count()
    }

    /// Highest number of Up/Down calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn call(&self, cmd: Command) -> Result<bool, TransportError> {
        relock(&self.calls).push(cmd);
        let directional = cmd != Command::Stop;
        if directional {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let delay = *relock(&self.delay);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        let outcome = relock(&self.script)
            .pop_front()
            .unwrap_or(Outcome::Accept);
        if directional {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        match outcome {
            Outcome::Accept => {
                if let Some(hook) = relock(&self.hook).as_ref() {
                    hook(cmd);
                }
                Ok(true)
            }
            Outcome::Reject => Ok(false),
            Outcome::Fail(msg) => Err(Box::new(std::io::Error::other(msg))),
        }
    }
}

impl DeskCommands for ScriptedCommands {
    fn up(&self) -> Result<bool, TransportError> {
        self.call(Command::Up)
    }
    fn down(&self) -> Result<bool, TransportError> {
        self.call(Command::Down)
    }
    fn stop(&self) -> Result<bool, TransportError> {
        self.call(Command::Stop)
    }
}

/// Telemetry source driven by the test.
#[derive(Debug, Default, Clone)]
pub struct ManualTelemetry {
    subscribers: Arc<Mutex<Vec<xch::Sender<RawFrame>>>>,
}

impl ManualTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an encoded height/speed frame. Returns false when the pair
    /// does not fit the wire format.
    pub fn push(&self, height: u32, speed: i32) -> bool {
        match crate::codec::encode(height, speed) {
            Some(bytes) => {
                self.push_raw(&bytes);
                true
            }
            None => false,
        }
    }

    pub fn push_raw(&self, bytes: &[u8]) {
        let frame = RawFrame::new(Instant::now(), bytes);
        relock(&self.subscribers).retain(|tx| tx.send(frame.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        relock(&self.subscribers).len()
    }
}

impl TelemetrySource for ManualTelemetry {
    fn subscribe(&self) -> xch::Receiver<RawFrame> {
        let (tx, rx) = xch::unbounded();
        relock(&self.subscribers).push(tx);
        rx
    }
}
