//! Initial height acquisition.
//!
//! The desk does not always report its height on connect. When no height is
//! known, a short Up+Stop nudge provokes a telemetry sample and the first
//! sample with a nonzero height is latched as the starting height.

use crossbeam_channel as xch;
use desk_traits::TelemetrySource;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::DeskError;
use crate::types::{Command, HeightSample};
use crate::util::{SharedCommands, TelemetryWorker, issue};

#[derive(Debug, Default)]
struct Acquisition {
    awaiting: bool,
    /// Up+Stop in flight; samples are held back until it completes
    nudging: bool,
    candidate: Option<u32>,
}

struct Inner {
    commands: SharedCommands,
    state: Mutex<Acquisition>,
    finished_tx: xch::Sender<u32>,
    finished_rx: xch::Receiver<u32>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, Acquisition> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn signal(&self, height: u32) {
        // A stale value nobody collected is replaced by the new one.
        while self.finished_rx.try_recv().is_ok() {}
        let _ = self.finished_tx.try_send(height);
    }

    fn observe(&self, sample: &HeightSample) -> Option<u32> {
        if sample.height == 0 {
            return None;
        }
        {
            let mut st = self.state();
            if !st.awaiting {
                return None;
            }
            if st.nudging {
                // Latching now would let the nudge's own Stop halt the cycle.
                st.candidate = Some(sample.height);
                return None;
            }
            st.awaiting = false;
        }
        tracing::debug!(height = sample.height, "initial height acquired");
        self.signal(sample.height);
        Some(sample.height)
    }
}

pub struct InitialHeightAcquirer {
    inner: Arc<Inner>,
    worker: Mutex<Option<TelemetryWorker>>,
}

impl core::fmt::Debug for InitialHeightAcquirer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InitialHeightAcquirer")
            .field("awaiting", &self.is_awaiting())
            .finish_non_exhaustive()
    }
}

impl InitialHeightAcquirer {
    pub fn new(commands: SharedCommands) -> Self {
        let (finished_tx, finished_rx) = xch::bounded(1);
        Self {
            inner: Arc::new(Inner {
                commands,
                state: Mutex::new(Acquisition::default()),
                finished_tx,
                finished_rx,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Subscribe to telemetry on a dedicated worker thread.
    ///
    /// Owners that already consume telemetry can skip this and feed samples
    /// through [`observe`](Self::observe) instead. Calling it again replaces
    /// the previous subscription.
    pub fn initialize(&self, source: &dyn TelemetrySource) {
        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        worker.take();
        let inner = Arc::clone(&self.inner);
        *worker = Some(TelemetryWorker::spawn("acquirer", source.subscribe(), move |s| {
            inner.observe(&s);
        }));
    }

    /// Drop the telemetry subscription, if any.
    pub fn dispose(&self) {
        self.cancel();
        self.worker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
    }

    /// Begin acquiring.
    ///
    /// A nonzero `known_height` is signalled immediately and returned.
    /// Otherwise the desk is nudged. A sample seen during the nudge completes
    /// acquisition as soon as the nudge is done and is returned; without one,
    /// `Ok(None)` is returned and the height arrives later on
    /// [`finished`](Self::finished). A failed nudge is returned as an error
    /// and nothing is signalled.
    pub fn start(&self, known_height: u32) -> Result<Option<u32>, DeskError> {
        while self.inner.finished_rx.try_recv().is_ok() {}
        if known_height > 0 {
            *self.inner.state() = Acquisition::default();
            self.inner.signal(known_height);
            return Ok(Some(known_height));
        }

        // Armed before the nudge so the sample it provokes is not missed.
        *self.inner.state() = Acquisition {
            awaiting: true,
            nudging: true,
            candidate: None,
        };
        tracing::debug!("height unknown; nudging desk");
        let nudge = issue(self.inner.commands.as_ref(), Command::Up)
            .and_then(|()| issue(self.inner.commands.as_ref(), Command::Stop));

        let early = {
            let mut st = self.inner.state();
            st.nudging = false;
            match st.candidate.take() {
                Some(h) if st.awaiting && nudge.is_ok() => {
                    st.awaiting = false;
                    Some(h)
                }
                _ => None,
            }
        };
        if let Err(e) = nudge {
            tracing::warn!(error = %e, "nudge for initial height failed");
            return Err(e);
        }
        if let Some(height) = early {
            tracing::debug!(height, "initial height acquired during nudge");
            self.inner.signal(height);
        }
        Ok(early)
    }

    /// Feed one sample; returns the height when it completes acquisition.
    pub fn observe(&self, sample: &HeightSample) -> Option<u32> {
        self.inner.observe(sample)
    }

    /// Stop waiting for a sample.
    pub fn cancel(&self) {
        let mut st = self.inner.state();
        st.awaiting = false;
        st.candidate = None;
    }

    pub fn is_awaiting(&self) -> bool {
        self.inner.state().awaiting
    }

    /// Receives the acquired height, once per `start()`.
    pub fn finished(&self) -> xch::Receiver<u32> {
        self.inner.finished_rx.clone()
    }
}
