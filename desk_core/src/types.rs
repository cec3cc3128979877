//! Plain data shared across the movement components.

use std::fmt;
use std::time::Instant;

/// Travel direction, either commanded or observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
}

impl Direction {
    /// Direction implied by a signed speed reading.
    #[inline]
    pub fn from_speed(speed: i32) -> Self {
        match speed.signum() {
            1 => Direction::Up,
            -1 => Direction::Down,
            _ => Direction::None,
        }
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == Direction::None
    }

    /// The motor command that produces this direction, if any.
    pub fn command(self) -> Option<Command> {
        match self {
            Direction::None => None,
            Direction::Up => Some(Command::Up),
            Direction::Down => Some(Command::Down),
        }
    }
}

/// Low-level motor command sent to the desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Up,
    Down,
    Stop,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Up => "up",
            Command::Down => "down",
            Command::Stop => "stop",
        })
    }
}

/// One decoded telemetry sample. Height in device units (1/10 mm).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightSample {
    pub timestamp: Instant,
    pub height: u32,
    pub speed: i32,
}

impl HeightSample {
    pub fn new(height: u32, speed: i32) -> Self {
        Self {
            timestamp: Instant::now(),
            height,
            speed,
        }
    }
}

/// Result of one predictor evaluation against the commanded direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopDecision {
    pub should_stop: bool,
    pub desired: Direction,
}

/// Where a `DeskMover` is in its movement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoverPhase {
    #[default]
    Idle,
    /// Waiting for the initial height
    Acquiring,
    /// Timer and telemetry drive evaluations
    Evaluating,
    /// Cycle ended; `start()` begins the next one
    Stopped,
}
