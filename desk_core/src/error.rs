use thiserror::Error;

use crate::types::Command;

/// Why a stall check tripped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StallKind {
    #[error("height did not change")]
    HeightUnchanged,
    #[error("speed was zero")]
    SpeedZero,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeskError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("desk rejected {0} command")]
    Rejected(Command),
    #[error("malformed telemetry frame ({0} bytes)")]
    MalformedTelemetry(usize),
    #[error("stall detected: {0}")]
    Stall(StallKind),
    #[error("invalid state: {0}")]
    State(String),
    #[error("timeout waiting for {0}")]
    Timeout(&'static str),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
}

impl DeskError {
    /// Faults that end a movement cycle and must not be retried within it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeskError::Stall(_) | DeskError::HardwareFault(_))
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing desk command executor")]
    MissingCommands,
    #[error("missing telemetry source")]
    MissingTelemetry,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
