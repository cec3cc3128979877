//! Stopping-height prediction.
//!
//! The desk keeps travelling for a speed-dependent distance after a Stop.
//! `StoppingPredictor` estimates that distance linearly from the reported
//! speed and decides whether a cycle should keep moving.

use crate::config::PredictorCfg;
use crate::types::{Direction, StopDecision};

/// One evaluation of the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub desired: Direction,
    /// Signed travel expected after an immediate Stop.
    pub movement_until_stop: i32,
    pub stopping_height: u32,
    /// Distance between the target and `stopping_height`.
    pub delta: u32,
    pub has_reached_target: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoppingPredictor {
    cfg: PredictorCfg,
}

impl StoppingPredictor {
    pub fn new(cfg: PredictorCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &PredictorCfg {
        &self.cfg
    }

    /// Half-width of the band around the target where no movement is needed.
    pub fn tolerance(&self) -> u32 {
        let t = (self.cfg.max_speed_to_stop as f32 * self.cfg.fudge_factor).round();
        if t.is_finite() && t > 0.0 {
            t as u32
        } else {
            0
        }
    }

    pub fn desired_direction(&self, height: u32, target: u32) -> Direction {
        if height.abs_diff(target) <= self.tolerance() {
            Direction::None
        } else if height > target {
            Direction::Down
        } else {
            Direction::Up
        }
    }

    /// Travel expected after a Stop issued at `speed`, truncated toward zero.
    pub fn movement_until_stop(&self, speed: i32) -> i32 {
        if speed == 0 || self.cfg.max_speed == 0 {
            return 0;
        }
        let mus = f64::from(speed) / f64::from(self.cfg.max_speed)
            * f64::from(self.cfg.max_speed_to_stop)
            * f64::from(self.cfg.fudge_factor);
        if mus.is_finite() {
            mus.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
        } else {
            0
        }
    }

    pub fn predict(
        &self,
        height: u32,
        speed: i32,
        target: u32,
        start_direction: Direction,
    ) -> Prediction {
        let desired = self.desired_direction(height, target);
        let movement_until_stop = self.movement_until_stop(speed);
        let stopping_height = (i64::from(height) + i64::from(movement_until_stop))
            .clamp(0, i64::from(self.cfg.max_height));
        let stopping_height = u32::try_from(stopping_height).unwrap_or(self.cfg.max_height);
        let delta = target.abs_diff(stopping_height);

        let travel = Direction::from_speed(speed);
        let reversed = !start_direction.is_none() && !travel.is_none() && travel != start_direction;
        let heading = if travel.is_none() { start_direction } else { travel };
        let past_target = match heading {
            Direction::Up => stopping_height >= target,
            Direction::Down => stopping_height <= target,
            Direction::None => false,
        };

        let has_reached_target = reversed
            || past_target
            || delta <= movement_until_stop.unsigned_abs()
            || desired.is_none();

        Prediction {
            desired,
            movement_until_stop,
            stopping_height,
            delta,
            has_reached_target,
        }
    }

    /// Decide whether the cycle must stop given what is currently commanded.
    pub fn decide(
        &self,
        height: u32,
        speed: i32,
        target: u32,
        start_direction: Direction,
        commanded: Direction,
    ) -> StopDecision {
        let p = self.predict(height, speed, target, start_direction);
        let changed_direction = !commanded.is_none() && p.desired != commanded;
        StopDecision {
            should_stop: p.desired.is_none() || p.has_reached_target || changed_direction,
            desired: p.desired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictor(max_speed: i32, max_speed_to_stop: u32, fudge_factor: f32) -> StoppingPredictor {
        StoppingPredictor::new(PredictorCfg {
            max_speed,
            max_speed_to_stop,
            fudge_factor,
            ..PredictorCfg::default()
        })
    }

    #[test]
    fn default_tolerance_is_fudged_stop_distance() {
        assert_eq!(StoppingPredictor::default().tolerance(), 28);
    }

    #[test]
    fn movement_until_stop_is_signed_and_truncated() {
        let p = predictor(6200, 14, 2.0);
        assert_eq!(p.movement_until_stop(6200), 28);
        assert_eq!(p.movement_until_stop(-3100), -14);
        assert_eq!(p.movement_until_stop(100), 0);
        assert_eq!(p.movement_until_stop(0), 0);
    }

    #[test]
    fn stopping_height_is_clamped_at_zero() {
        let p = predictor(10, 100, 1.0);
        let pred = p.predict(50, -10, 0, Direction::Down);
        assert_eq!(pred.stopping_height, 0);
    }

    #[test]
    fn reversal_counts_as_reached() {
        let p = predictor(6200, 14, 2.0);
        let pred = p.predict(7000, -6200, 8000, Direction::Up);
        assert_eq!(pred.desired, Direction::Up);
        assert!(pred.has_reached_target);
    }
}
