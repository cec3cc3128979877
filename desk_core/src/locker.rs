//! Lock against manual movement.
//!
//! While locked, any telemetry sample that arrives when no movement cycle
//! is allowed to move means someone is moving the desk by hand; the locker
//! answers with a Stop.

use desk_traits::TelemetrySource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::types::{Command, HeightSample};
use crate::util::{SharedCommands, TelemetryWorker, issue};

/// Tells the locker whether movement is currently legitimate.
pub trait MoveAuthority {
    fn is_allowed_to_move(&self) -> bool;
}

impl<T: MoveAuthority + ?Sized> MoveAuthority for Arc<T> {
    fn is_allowed_to_move(&self) -> bool {
        (**self).is_allowed_to_move()
    }
}

struct Inner {
    commands: SharedCommands,
    authority: Box<dyn MoveAuthority + Send + Sync>,
    locked: AtomicBool,
}

impl Inner {
    fn on_sample(&self, sample: &HeightSample) -> bool {
        if !self.locked.load(Ordering::Acquire) || self.authority.is_allowed_to_move() {
            return false;
        }
        tracing::info!(
            height = sample.height,
            speed = sample.speed,
            "manual movement while locked; stopping"
        );
        if let Err(e) = issue(self.commands.as_ref(), Command::Stop) {
            tracing::warn!(error = %e, "locker stop failed");
        }
        true
    }
}

pub struct DeskLocker {
    inner: Arc<Inner>,
    worker: Mutex<Option<TelemetryWorker>>,
}

impl core::fmt::Debug for DeskLocker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeskLocker")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

impl DeskLocker {
    pub fn new<A>(commands: SharedCommands, authority: A) -> Self
    where
        A: MoveAuthority + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                commands,
                authority: Box::new(authority),
                locked: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Watch telemetry on a worker thread; replaces any previous subscription.
    pub fn initialize(&self, source: &dyn TelemetrySource) {
        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        worker.take();
        let inner = Arc::clone(&self.inner);
        *worker = Some(TelemetryWorker::spawn("locker", source.subscribe(), move |s| {
            inner.on_sample(&s);
        }));
    }

    pub fn dispose(&self) {
        self.worker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
    }

    pub fn lock(&self) {
        self.inner.locked.store(true, Ordering::Release);
        tracing::debug!("desk locked");
    }

    pub fn unlock(&self) {
        self.inner.locked.store(false, Ordering::Release);
        tracing::debug!("desk unlocked");
    }

    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    /// Handle one sample; returns true when it caused a Stop.
    pub fn on_sample(&self, sample: &HeightSample) -> bool {
        self.inner.on_sample(sample)
    }
}

impl Drop for DeskLocker {
    fn drop(&mut self) {
        self.dispose();
    }
}
