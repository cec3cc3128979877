//! Rolling-window stall detection.
//!
//! Two checks share one monitor:
//! - `is_height_changing` looks at the last `window` heights fed by the
//!   evaluation timer and is optimistic until the window fills.
//! - `assert_moving` looks at the last `window` telemetry samples and fails
//!   with a `StallKind` once the window is full.
//!
//! Call `reset()` at the start of every cycle.

use std::collections::VecDeque;

use crate::config::StallCfg;
use crate::error::StallKind;

#[derive(Debug, Clone)]
pub struct StallMonitor {
    cfg: StallCfg,
    heights: VecDeque<u32>,
    samples: VecDeque<(u32, i32)>,
}

impl Default for StallMonitor {
    fn default() -> Self {
        Self::new(StallCfg::default())
    }
}

impl StallMonitor {
    pub fn new(cfg: StallCfg) -> Self {
        let window = cfg.window.max(1);
        Self {
            cfg: StallCfg { window, ..cfg },
            heights: VecDeque::with_capacity(window),
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn reset(&mut self) {
        self.heights.clear();
        self.samples.clear();
    }

    /// Record a polled height for `is_height_changing`.
    pub fn record_height(&mut self, height: u32) {
        if self.heights.len() == self.cfg.window {
            self.heights.pop_front();
        }
        self.heights.push_back(height);
    }

    pub fn is_height_changing(&self) -> bool {
        if self.heights.len() < self.cfg.window {
            return true;
        }
        !all_equal(self.heights.iter().copied())
    }

    /// Push a telemetry sample and check the windowed stall conditions.
    pub fn assert_moving(&mut self, height: u32, speed: i32) -> Result<(), StallKind> {
        if self.samples.len() == self.cfg.window {
            self.samples.pop_front();
        }
        self.samples.push_back((height, speed));
        if self.samples.len() < self.cfg.window {
            return Ok(());
        }
        if all_equal(self.samples.iter().map(|&(h, _)| h)) {
            return Err(StallKind::HeightUnchanged);
        }
        let zero = self.samples.iter().filter(|&&(_, s)| s == 0).count();
        if zero >= self.cfg.zero_speed_limit {
            return Err(StallKind::SpeedZero);
        }
        Ok(())
    }
}

fn all_equal(mut it: impl Iterator<Item = u32>) -> bool {
    match it.next() {
        Some(first) => it.all(|h| h == first),
        None => true,
    }
}
