use std::sync::Arc;
use std::time::Duration;

use desk_hardware::error::HwError;
use desk_hardware::{BASE_OFFSET, Motion, SimDeskCfg, SimulatedDesk};
use desk_traits::{DeskCommands, ManualClock, RawFrame, TelemetrySource};
use rstest::rstest;

fn decode(frame: &RawFrame) -> (u32, i32) {
    let raw = u16::from_le_bytes([frame.bytes[0], frame.bytes[1]]);
    let speed = i16::from_le_bytes([frame.bytes[2], frame.bytes[3]]);
    (BASE_OFFSET + u32::from(raw), i32::from(speed))
}

fn manual_desk(cfg: SimDeskCfg) -> (SimulatedDesk, ManualClock) {
    let clock = ManualClock::new();
    let desk = SimulatedDesk::with_clock(cfg, Arc::new(clock.clone()));
    (desk, clock)
}

#[test]
fn up_moves_at_travel_rate_and_reports_speed() {
    let (desk, clock) = manual_desk(SimDeskCfg::default());
    let rx = desk.subscribe();

    assert!(desk.up().unwrap());
    clock.advance(Duration::from_millis(500));
    desk.step();

    assert_eq!(desk.height(), 7200);
    let (height, speed) = decode(&rx.try_recv().expect("frame published"));
    assert_eq!(height, 7200);
    assert_eq!(speed, 6200);
}

#[test]
fn stop_coasts_and_reports_zero_speed() {
    let (desk, clock) = manual_desk(SimDeskCfg::default());
    let rx = desk.subscribe();

    desk.down().unwrap();
    clock.advance(Duration::from_millis(250));
    assert!(desk.stop().unwrap());

    // 100 units of travel plus 10 units of coast
    assert_eq!(desk.height(), 6890);
    assert_eq!(desk.motion(), Motion::Idle);
    let (height, speed) = decode(&rx.try_recv().expect("stop frame"));
    assert_eq!((height, speed), (6890, 0));
}

#[test]
fn idle_desk_is_silent_unless_configured() {
    let (desk, _clock) = manual_desk(SimDeskCfg::default());
    let rx = desk.subscribe();
    desk.step();
    assert!(rx.try_recv().is_err());

    let (chatty, _clock) = manual_desk(SimDeskCfg {
        report_idle: true,
        ..SimDeskCfg::default()
    });
    let rx = chatty.subscribe();
    chatty.step();
    assert_eq!(decode(&rx.try_recv().unwrap()), (7000, 0));
}

#[test]
fn stop_while_idle_publishes_nothing() {
    let (desk, _clock) = manual_desk(SimDeskCfg::default());
    let rx = desk.subscribe();
    assert!(desk.stop().unwrap());
    assert!(rx.try_recv().is_err());
    assert_eq!(desk.counts().stop, 1);
}

#[test]
fn hold_expiry_stops_the_desk() {
    let (desk, clock) = manual_desk(SimDeskCfg {
        hold_ms: Some(100),
        ..SimDeskCfg::default()
    });
    desk.up().unwrap();
    clock.advance(Duration::from_millis(300));
    desk.step();
    assert_eq!(desk.motion(), Motion::Idle);
    // Integrates the full elapsed time once, then stops.
    assert_eq!(desk.height(), 7120);
}

#[rstest]
#[case(Motion::Up, 12_700)]
#[case(Motion::Down, 6200)]
fn travel_clamps_at_limits(#[case] motion: Motion, #[case] limit: u32) {
    let (desk, clock) = manual_desk(SimDeskCfg::default());
    match motion {
        Motion::Up => desk.up().unwrap(),
        _ => desk.down().unwrap(),
    };
    clock.advance(Duration::from_secs(60));
    desk.step();
    assert_eq!(desk.height(), limit);
    assert_eq!(desk.motion(), Motion::Idle);
}

#[test]
fn rejections_and_disconnects_are_reported() {
    let (desk, _clock) = manual_desk(SimDeskCfg::default());
    desk.reject_next(2);
    assert!(!desk.up().unwrap());
    assert!(!desk.stop().unwrap());
    assert!(desk.up().unwrap());
    assert_eq!(desk.counts().rejected, 2);
    assert_eq!(desk.counts().up, 1);

    desk.set_connected(false);
    let err = desk.down().expect_err("disconnected");
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::Disconnected)
    ));
}

#[test]
fn jammed_desk_keeps_reporting_speed_without_moving() {
    let (desk, clock) = manual_desk(SimDeskCfg::default());
    let rx = desk.subscribe();
    desk.set_jammed(true);
    desk.up().unwrap();
    for _ in 0..3 {
        clock.advance(Duration::from_millis(100));
        desk.step();
    }
    let frames: Vec<_> = rx.try_iter().map(|f| decode(&f)).collect();
    assert_eq!(frames, vec![(7000, 6200); 3]);
}

#[test]
fn dropped_subscribers_are_pruned() {
    let (desk, _clock) = manual_desk(SimDeskCfg::default());
    let kept = desk.subscribe();
    drop(desk.subscribe());
    desk.push_manually(-30);
    desk.push_manually(-30);
    let frames: Vec<_> = kept.try_iter().map(|f| decode(&f)).collect();
    assert_eq!(frames, vec![(6970, -6200), (6940, -6200)]);
}

#[test]
fn physics_thread_moves_desk_in_real_time() {
    let desk = Arc::new(SimulatedDesk::new(SimDeskCfg::default()));
    let runner = desk.run();
    desk.up().unwrap();
    let height = desk
        .wait_for_height(|h| h >= 7040, Duration::from_secs(2))
        .expect("desk should rise");
    assert!(height >= 7040);
    desk.stop().unwrap();
    drop(runner);
}
