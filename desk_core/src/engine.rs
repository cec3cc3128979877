//! Repeating command loop.
//!
//! Some desks only travel for a short while per Up/Down write, so
//! `MoveEngine` re-sends the directional command every
//! `command_interval` until told otherwise. Failures are logged and the
//! loop keeps going.

use crossbeam_channel as xch;
use std::sync::{Mutex, MutexGuard};

use crate::config::EngineCfg;
use crate::error::DeskError;
use crate::types::{Command, Direction};
use crate::util::{SharedCommands, issue};

struct CommandLoop {
    direction: Direction,
    /// Dropping the sender cancels the loop.
    cancel: xch::Sender<()>,
    join_handle: std::thread::JoinHandle<()>,
}

impl CommandLoop {
    fn cancel(self) {
        drop(self.cancel);
        if let Err(e) = self.join_handle.join() {
            tracing::warn!(?e, "command loop panicked");
        }
    }
}

pub struct MoveEngine {
    commands: SharedCommands,
    cfg: EngineCfg,
    active: Mutex<Option<CommandLoop>>,
}

impl core::fmt::Debug for MoveEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MoveEngine")
            .field("cfg", &self.cfg)
            .field("direction", &self.direction())
            .finish_non_exhaustive()
    }
}

impl MoveEngine {
    pub fn new(commands: SharedCommands, cfg: EngineCfg) -> Self {
        Self {
            commands,
            cfg,
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<CommandLoop>> {
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Direction of the running loop, `None` when idle.
    pub fn direction(&self) -> Direction {
        self.active()
            .as_ref()
            .map_or(Direction::None, |l| l.direction)
    }

    /// Keep moving in `direction`. `Direction::None` stops.
    ///
    /// Asking for the direction already running is a no-op; a new direction
    /// replaces the running loop without an intermediate Stop. The loop ends
    /// on its own after a fatal transport error.
    pub fn move_in(&self, direction: Direction) -> Result<(), DeskError> {
        let Some(cmd) = direction.command() else {
            return self.stop();
        };
        let mut active = self.active();
        if active.as_ref().is_some_and(|l| l.direction == direction) {
            return Ok(());
        }
        if let Some(prev) = active.take() {
            prev.cancel();
        }

        let (cancel, cancelled) = xch::bounded::<()>(0);
        let commands = self.commands.clone();
        let interval = self.cfg.command_interval;
        let join_handle = std::thread::spawn(move || {
            loop {
                match issue(commands.as_ref(), cmd) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        tracing::error!(%cmd, error = %e, "command loop giving up");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(%cmd, error = %e, "repeated command failed; continuing");
                    }
                }
                match cancelled.recv_timeout(interval) {
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
            }
            tracing::trace!(%cmd, "command loop exiting");
        });
        tracing::debug!(?direction, "command loop started");
        *active = Some(CommandLoop {
            direction,
            cancel,
            join_handle,
        });
        Ok(())
    }

    /// Cancel the loop (if any) and send a final Stop.
    pub fn stop(&self) -> Result<(), DeskError> {
        let prev = self.active().take();
        if let Some(prev) = prev {
            prev.cancel();
            tracing::debug!("command loop cancelled");
        }
        issue(self.commands.as_ref(), Command::Stop)
    }

    /// Cancel the loop without sending Stop.
    pub fn cancel(&self) {
        let prev = self.active().take();
        if let Some(prev) = prev {
            prev.cancel();
        }
    }
}

impl Drop for MoveEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}
