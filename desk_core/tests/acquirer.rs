use desk_core::mocks::{ManualTelemetry, Outcome, ScriptedCommands};
use desk_core::{Command, DeskError, HeightSample, InitialHeightAcquirer};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn known_height_is_signalled_without_moving() {
    let commands = Arc::new(ScriptedCommands::new());
    let acq = InitialHeightAcquirer::new(commands.clone());
    assert_eq!(acq.start(7300).unwrap(), Some(7300));
    assert_eq!(acq.finished().try_recv().unwrap(), 7300);
    assert!(commands.calls().is_empty());
}

#[test]
fn unknown_height_nudges_and_latches_first_valid_sample() {
    let commands = Arc::new(ScriptedCommands::new());
    let acq = InitialHeightAcquirer::new(commands.clone());
    assert_eq!(acq.start(0).unwrap(), None);
    assert_eq!(commands.calls(), vec![Command::Up, Command::Stop]);
    assert!(acq.is_awaiting());

    assert_eq!(acq.observe(&HeightSample::new(0, 0)), None);
    assert_eq!(acq.observe(&HeightSample::new(7010, 0)), Some(7010));
    assert_eq!(acq.observe(&HeightSample::new(7020, 0)), None);
    assert_eq!(acq.finished().try_iter().collect::<Vec<_>>(), vec![7010]);
}

#[test]
fn failed_nudge_leaves_finished_unsignalled() {
    let commands = Arc::new(ScriptedCommands::new());
    commands.push_outcome(Outcome::Fail("radio off".into()));
    let acq = InitialHeightAcquirer::new(commands.clone());
    let err = acq.start(0).unwrap_err();
    assert!(matches!(err, DeskError::Transport(_)));
    assert_eq!(commands.calls(), vec![Command::Up]);
    assert!(acq.finished().try_recv().is_err());
}

#[test]
fn subscription_latches_nudge_response() {
    let commands = Arc::new(ScriptedCommands::new());
    let telemetry = ManualTelemetry::new();
    {
        let telemetry = telemetry.clone();
        commands.on_accept(move |cmd| {
            if cmd == Command::Stop {
                telemetry.push(7040, 0);
            }
        });
    }
    let acq = InitialHeightAcquirer::new(commands.clone());
    acq.initialize(&telemetry);
    // The response may land while the nudge is still in flight.
    let early = acq.start(0).unwrap();
    assert!(matches!(early, None | Some(7040)));
    assert_eq!(
        acq.finished().recv_timeout(Duration::from_secs(2)).unwrap(),
        7040
    );
    acq.dispose();
}

#[test]
fn sample_during_nudge_is_latched_after_it() {
    let commands = Arc::new(ScriptedCommands::new());
    let acq = Arc::new(InitialHeightAcquirer::new(commands.clone()));
    {
        let acq = Arc::clone(&acq);
        commands.on_accept(move |cmd| {
            if cmd == Command::Up {
                assert_eq!(acq.observe(&HeightSample::new(7005, 6200)), None);
            }
        });
    }
    assert_eq!(acq.start(0).unwrap(), Some(7005));
    assert!(!acq.is_awaiting());
    assert_eq!(acq.finished().try_recv().unwrap(), 7005);
}
