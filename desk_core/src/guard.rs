//! Target crossing guard.
//!
//! `MovementGuard` watches telemetry while one direction+target is guarded
//! and reports the predicted stopping height as soon as the predicted or
//! actual height crosses the target in the travel direction. It then stops
//! guarding, so each `guard()` call reports at most once.

use crossbeam_channel as xch;
use desk_traits::TelemetrySource;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::predictor::StoppingPredictor;
use crate::types::{Direction, HeightSample};
use crate::util::TelemetryWorker;

#[derive(Debug, Clone, Copy)]
struct Guarding {
    direction: Direction,
    target: u32,
}

fn crossed(direction: Direction, height: u32, target: u32) -> bool {
    match direction {
        Direction::Up => height >= target,
        Direction::Down => height <= target,
        Direction::None => true,
    }
}

struct Inner {
    predictor: StoppingPredictor,
    guarding: Mutex<Option<Guarding>>,
    reached_tx: xch::Sender<u32>,
    reached_rx: xch::Receiver<u32>,
}

impl Inner {
    fn guarding(&self) -> MutexGuard<'_, Option<Guarding>> {
        self.guarding.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn observe(&self, sample: &HeightSample) -> Option<u32> {
        let mut guarding = self.guarding();
        let g = (*guarding)?;
        let p = self
            .predictor
            .predict(sample.height, sample.speed, g.target, g.direction);
        if !crossed(g.direction, p.stopping_height, g.target)
            && !crossed(g.direction, sample.height, g.target)
        {
            return None;
        }
        *guarding = None;
        drop(guarding);
        tracing::debug!(
            height = sample.height,
            stopping_height = p.stopping_height,
            target = g.target,
            "target crossing predicted"
        );
        let _ = self.reached_tx.send(p.stopping_height);
        Some(p.stopping_height)
    }
}

pub struct MovementGuard {
    inner: Arc<Inner>,
    worker: Mutex<Option<TelemetryWorker>>,
}

impl core::fmt::Debug for MovementGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MovementGuard")
            .field("guarding", &*self.inner.guarding())
            .finish_non_exhaustive()
    }
}

impl MovementGuard {
    pub fn new(predictor: StoppingPredictor) -> Self {
        let (reached_tx, reached_rx) = xch::unbounded();
        Self {
            inner: Arc::new(Inner {
                predictor,
                guarding: Mutex::new(None),
                reached_tx,
                reached_rx,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Watch telemetry on a worker thread; replaces any previous subscription.
    pub fn initialize(&self, source: &dyn TelemetrySource) {
        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        worker.take();
        let inner = Arc::clone(&self.inner);
        *worker = Some(TelemetryWorker::spawn("guard", source.subscribe(), move |s| {
            inner.observe(&s);
        }));
    }

    pub fn dispose(&self) {
        self.stop_guarding();
        self.worker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
    }

    /// Guard travel in `direction` toward `target`.
    ///
    /// Reports `current_height` right away when it is already at or past the
    /// target (or when there is no direction to travel in).
    pub fn guard(&self, direction: Direction, target: u32, current_height: u32) -> Option<u32> {
        let mut guarding = self.inner.guarding();
        if crossed(direction, current_height, target) {
            *guarding = None;
            drop(guarding);
            tracing::debug!(current_height, target, "already past target");
            let _ = self.inner.reached_tx.send(current_height);
            return Some(current_height);
        }
        *guarding = Some(Guarding { direction, target });
        tracing::debug!(?direction, target, "guarding");
        None
    }

    pub fn stop_guarding(&self) {
        self.inner.guarding().take();
    }

    pub fn is_guarding(&self) -> bool {
        self.inner.guarding().is_some()
    }

    /// Feed one sample; returns the stopping height when it crosses the target.
    pub fn observe(&self, sample: &HeightSample) -> Option<u32> {
        self.inner.observe(sample)
    }

    /// Receives one stopping height per crossing.
    pub fn reached(&self) -> xch::Receiver<u32> {
        self.inner.reached_rx.clone()
    }
}

impl Drop for MovementGuard {
    fn drop(&mut self) {
        self.dispose();
    }
}
