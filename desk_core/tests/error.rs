use desk_core::Command;
use desk_core::error::{BuildError, DeskError, StallKind};
use desk_core::mocks::{Outcome, ScriptedCommands};
use desk_core::util::issue;
use rstest::rstest;

#[rstest]
#[case(DeskError::Stall(StallKind::HeightUnchanged), "stall detected: height did not change")]
#[case(DeskError::Stall(StallKind::SpeedZero), "stall detected: speed was zero")]
#[case(DeskError::Rejected(Command::Up), "desk rejected up command")]
#[case(DeskError::Timeout("initial height"), "timeout waiting for initial height")]
#[case(DeskError::MalformedTelemetry(3), "malformed telemetry frame (3 bytes)")]
fn messages_are_stable(#[case] err: DeskError, #[case] msg: &str) {
    assert_eq!(err.to_string(), msg);
}

#[test]
fn only_stalls_and_faults_are_fatal() {
    assert!(DeskError::Stall(StallKind::SpeedZero).is_fatal());
    assert!(DeskError::HardwareFault("motor".into()).is_fatal());
    assert!(!DeskError::Rejected(Command::Stop).is_fatal());
    assert!(!DeskError::Transport("gone".into()).is_fatal());
}

#[test]
fn build_error_names_the_missing_part() {
    assert_eq!(
        BuildError::MissingTelemetry.to_string(),
        "missing telemetry source"
    );
}

#[test]
fn issue_maps_transport_answers() {
    let commands = ScriptedCommands::new();
    commands.push_outcome(Outcome::Reject);
    commands.push_outcome(Outcome::Fail("gatt error".into()));
    assert_eq!(
        issue(&commands, Command::Down),
        Err(DeskError::Rejected(Command::Down))
    );
    assert_eq!(
        issue(&commands, Command::Up),
        Err(DeskError::Transport("gatt error".into()))
    );
    assert_eq!(issue(&commands, Command::Stop), Ok(()));
}

#[cfg(feature = "hardware-errors")]
#[test]
fn hardware_errors_map_through_the_boundary() {
    use desk_hardware::{SimDeskCfg, SimulatedDesk};
    let desk = SimulatedDesk::new(SimDeskCfg::default());
    desk.set_connected(false);
    assert_eq!(
        issue(&desk, Command::Up),
        Err(DeskError::Transport("desk disconnected".into()))
    );
}
