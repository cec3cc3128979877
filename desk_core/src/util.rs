//! Shared helpers: command dispatch and telemetry worker threads.

use crossbeam_channel as xch;
use desk_traits::{DeskCommands, RawFrame};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::DeskError;
use crate::hw_error::map_hw_error;
use crate::types::{Command, HeightSample};

/// Command executor shared between components and their worker threads.
pub type SharedCommands = Arc<dyn DeskCommands + Send + Sync>;

/// How often idle workers re-check their shutdown flag.
pub const WORKER_POLL: Duration = Duration::from_millis(50);

/// Send one command, mapping `Ok(false)` to `Rejected` and faults through `map_hw_error`.
pub fn issue(commands: &dyn DeskCommands, cmd: Command) -> Result<(), DeskError> {
    let res = match cmd {
        Command::Up => commands.up(),
        Command::Down => commands.down(),
        Command::Stop => commands.stop(),
    };
    match res {
        Ok(true) => Ok(()),
        Ok(false) => Err(DeskError::Rejected(cmd)),
        Err(e) => Err(map_hw_error(e.as_ref())),
    }
}

/// Thread that decodes one telemetry subscription and hands samples to a callback.
///
/// Exits when the subscription disconnects or on drop, which joins it.
pub struct TelemetryWorker {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TelemetryWorker {
    pub fn spawn<F>(name: &'static str, rx: xch::Receiver<RawFrame>, mut on_sample: F) -> Self
    where
        F: FnMut(HeightSample) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_bg = shutdown.clone();
        let join_handle = std::thread::spawn(move || {
            while !shutdown_bg.load(Ordering::Relaxed) {
                match rx.recv_timeout(WORKER_POLL) {
                    Ok(frame) => {
                        if let Some(sample) = crate::codec::decode(&frame) {
                            on_sample(sample);
                        }
                    }
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => {
                        tracing::debug!(worker = name, "telemetry source disconnected");
                        break;
                    }
                }
            }
            tracing::trace!(worker = name, "telemetry worker exiting");
        });
        Self {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for TelemetryWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            // A callback that drops its own worker must not join itself.
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "telemetry worker panicked during shutdown");
            }
        }
    }
}
