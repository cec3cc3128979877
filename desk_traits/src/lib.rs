pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::sync::Arc;
use std::time::Instant;

/// Error type crossing the transport boundary.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// One raw notification from the desk's height/speed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub timestamp: Instant,
    pub bytes: Vec<u8>,
}

impl RawFrame {
    pub fn new(timestamp: Instant, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp,
            bytes: bytes.into(),
        }
    }
}

/// Low-level motor commands accepted by the desk.
///
/// `Ok(false)` means the desk (or the link) rejected the command; `Err` is a
/// transport fault. Calls may block until the write is acknowledged.
pub trait DeskCommands {
    fn up(&self) -> Result<bool, TransportError>;
    fn down(&self) -> Result<bool, TransportError>;
    fn stop(&self) -> Result<bool, TransportError>;
}

/// Source of raw telemetry frames.
///
/// Every call registers a new consumer. Frames are delivered in order until
/// the returned receiver is dropped, which ends the subscription.
pub trait TelemetrySource {
    fn subscribe(&self) -> crossbeam_channel::Receiver<RawFrame>;
}

impl<T: DeskCommands + ?Sized> DeskCommands for Arc<T> {
    fn up(&self) -> Result<bool, TransportError> {
        (**self).up()
    }
    fn down(&self) -> Result<bool, TransportError> {
        (**self).down()
    }
    fn stop(&self) -> Result<bool, TransportError> {
        (**self).stop()
    }
}

impl<T: TelemetrySource + ?Sized> TelemetrySource for Arc<T> {
    fn subscribe(&self) -> crossbeam_channel::Receiver<RawFrame> {
        (**self).subscribe()
    }
}
