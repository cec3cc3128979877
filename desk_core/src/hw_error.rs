//! Maps `Box<dyn Error>` from trait boundaries to typed `DeskError`.
//!
//! `desk_traits` uses `Box<dyn Error + Send + Sync>` so any transport can
//! plug in; this module converts those to our typed error enum, with an
//! optional feature-gated path for `desk_hardware::HwError` downcasting.

use crate::error::DeskError;

/// Map a trait-boundary error to a typed `DeskError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DeskError {
    #[cfg(feature = "hardware-errors")]
    {
        use desk_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Disconnected => DeskError::Transport(hw.to_string()),
                HwError::Timeout => DeskError::Timeout("desk response"),
                other => DeskError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        DeskError::Timeout("desk response")
    } else {
        DeskError::Transport(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_fall_back_to_message() {
        let e = std::io::Error::other("link dropped");
        assert_eq!(map_hw_error(&e), DeskError::Transport("link dropped".into()));
        let e = std::io::Error::other("write Timeout");
        assert_eq!(map_hw_error(&e), DeskError::Timeout("desk response"));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hardware_errors_are_downcast() {
        use desk_hardware::error::HwError;
        assert!(matches!(
            map_hw_error(&HwError::Disconnected),
            DeskError::Transport(_)
        ));
        assert_eq!(
            map_hw_error(&HwError::Timeout),
            DeskError::Timeout("desk response")
        );
        assert!(matches!(
            map_hw_error(&HwError::Write("nak".into())),
            DeskError::HardwareFault(_)
        ));
    }
}
