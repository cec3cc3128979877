use desk_core::mocks::{ManualTelemetry, ScriptedCommands};
use desk_core::{Command, DeskLocker, HeightSample, MoveAuthority};
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Flag(AtomicBool);

impl MoveAuthority for Flag {
    fn is_allowed_to_move(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[rstest]
#[case(false, false, false)]
#[case(false, true, false)]
#[case(true, true, false)]
#[case(true, false, true)]
fn stops_only_when_locked_and_not_moving(
    #[case] locked: bool,
    #[case] mover_moving: bool,
    #[case] expect_stop: bool,
) {
    let commands = Arc::new(ScriptedCommands::new());
    let authority = Arc::new(Flag::default());
    authority.0.store(mover_moving, Ordering::SeqCst);
    let locker = DeskLocker::new(commands.clone(), authority);
    if locked {
        locker.lock();
    }

    assert_eq!(locker.on_sample(&HeightSample::new(7000, -6200)), expect_stop);
    assert_eq!(commands.count(Command::Stop), usize::from(expect_stop));
}

#[test]
fn unlock_releases_the_desk() {
    let commands = Arc::new(ScriptedCommands::new());
    let locker = DeskLocker::new(commands.clone(), Flag::default());
    locker.lock();
    assert!(locker.is_locked());
    locker.unlock();
    assert!(!locker.is_locked());
    assert!(!locker.on_sample(&HeightSample::new(7000, 6200)));
    assert!(commands.calls().is_empty());
}

#[test]
fn worker_stops_manual_movement_from_telemetry() {
    let commands = Arc::new(ScriptedCommands::new());
    let telemetry = ManualTelemetry::new();
    let locker = DeskLocker::new(commands.clone(), Flag::default());
    locker.initialize(&telemetry);
    locker.lock();

    telemetry.push(7100, 6200);
    let deadline = Instant::now() + Duration::from_secs(2);
    while commands.count(Command::Stop) == 0 {
        assert!(Instant::now() < deadline, "locker never stopped the desk");
        std::thread::sleep(Duration::from_millis(2));
    }

    locker.dispose();
    assert_eq!(telemetry.subscriber_count(), 1);
    telemetry.push(7200, 6200);
    // The dropped subscription is pruned on the next publish.
    assert_eq!(telemetry.subscriber_count(), 0);
}
